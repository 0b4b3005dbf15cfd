//! Event types for PetalSonic ISM

use crate::world::SourceId;
use std::time::Duration;

/// Per-frame timing summary
#[derive(Debug, Clone, PartialEq)]
pub struct FrameTimingEvent {
    /// Index of the frame, starting at 0
    pub frame: u64,
    /// Wall-clock time spent in `step`
    pub duration: Duration,
    /// Ray tracing budget per source for the next frame, in seconds
    pub time_budget: f64,
    /// Diffuse rays traced over all sources
    pub rays_traced: u64,
    /// Valid specular paths over all sources
    pub valid_paths: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReverbEvent {
    IrUploaded {
        source_id: SourceId,
        slot: usize,
    },
    AirAbsorptionBypassed {
        reason: String,
    },
    FrameTiming(FrameTimingEvent),
}

impl ReverbEvent {
    /// The source an event is about, if any
    pub fn source_id(&self) -> Option<SourceId> {
        match self {
            Self::IrUploaded { source_id, .. } => Some(*source_id),
            _ => None,
        }
    }

    /// True for events reporting degraded operation
    pub fn is_error(&self) -> bool {
        matches!(self, Self::AirAbsorptionBypassed { .. })
    }
}
