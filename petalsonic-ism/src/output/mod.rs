//! Collaborators that receive the finished impulse responses.
//!
//! [`IrSink`] is the upload destination (a convolution reverb, a file writer,
//! a test probe) and [`AirAbsorptionStage`] is the optional filter applied
//! right before an upload.

mod air_absorption;
mod sink;

pub use air_absorption::{AirAbsorptionFilter, AirAbsorptionStage, DistanceLowpass};
pub use sink::{ChannelSink, IrSink, IrUpload, NullSink};
