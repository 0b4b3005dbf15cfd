use crate::math::Vec3;

/// Number of impulse response slots offered by the convolution sink
pub const MAX_IR_SLOTS: usize = 16;

/// Configuration for a reverberated source
#[derive(Debug, Clone)]
pub struct SourceDesc {
    /// Initial position of the source
    pub position: Vec3,
    /// Name attached to every upload of this source's impulse response
    pub label: String,
    /// Sink slot the impulse response is uploaded to (`< MAX_IR_SLOTS`)
    pub slot: usize,
    /// Seconds of simulated time between two uploads
    pub update_interval: f64,
    /// Keep averaging ray tracing results over frames while nothing moves
    pub accumulate_results: bool,
}

impl Default for SourceDesc {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            label: String::from("source"),
            slot: 0,
            update_interval: 1.0,
            accumulate_results: true,
        }
    }
}

impl SourceDesc {
    /// Create a source description at the given position
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_slot(mut self, slot: usize) -> Self {
        self.slot = slot;
        self
    }

    pub fn with_update_interval(mut self, seconds: f64) -> Self {
        self.update_interval = seconds;
        self
    }

    pub fn with_accumulation(mut self, accumulate: bool) -> Self {
        self.accumulate_results = accumulate;
        self
    }
}
