//! Image Source Method for early specular reflections.
//!
//! [`ImageSourceGenerator`] mirrors the source across the registry's planes up
//! to the configured reflection order and [`PathValidator`] keeps only the
//! image sources that correspond to a path the listener can actually hear.

mod image_source;
mod validator;

pub use image_source::{ImageSource, ImageSourceForest, ImageSourceGenerator};
pub use validator::{PathValidator, Reflection, ValidPath, ValidationRequest};
