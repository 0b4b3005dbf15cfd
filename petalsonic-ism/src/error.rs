//! Error types for PetalSonic ISM

use crate::world::SourceId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReverbError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Material error: {0}")]
    Material(String),

    #[error("Air absorption error: {0}")]
    AirAbsorption(String),

    #[error("Unknown source: {0}")]
    UnknownSource(SourceId),
}

pub type Result<T> = std::result::Result<T, ReverbError>;
