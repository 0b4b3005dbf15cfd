//! Stochastic ray tracing of the late diffuse field.

mod accumulator;
mod tracer;

pub use accumulator::DiffuseAccumulator;
pub use tracer::{DiffuseTracer, SPREADING_EPSILON, TraceRequest, TraceStats};
