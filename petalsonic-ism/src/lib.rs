//! # PetalSonic ISM
//!
//! Room impulse responses for moving sources and listeners, computed frame by
//! frame under a fixed time budget.
//!
//! Early reflections come from the Image Source Method: the source is mirrored
//! across every reflecting plane of the room, recursively, and each mirrored
//! position is checked against the scene geometry to see whether it stands
//! for a path the listener can actually hear. The late diffuse field comes
//! from stochastic ray tracing, averaged over as many frames as the scene
//! stays still. Both are merged into one fixed-length impulse response per
//! source, which is handed to an [`IrSink`](output::IrSink) for convolution.
//!
//! ## Quick Start
//!
//! ```no_run
//! use petalsonic_ism::*;
//! use petalsonic_ism::math::Vec3;
//! use petalsonic_ism::output::ChannelSink;
//! use petalsonic_ism::scene::RoomGeometry;
//! use std::sync::Arc;
//!
//! // Four walls around the origin, 12 units apart
//! let room = Arc::new(RoomGeometry::square_room(Vec3::ZERO, 6.0, 4.0, None));
//! // Small collider at the source so that specular paths can reach it
//! let emitter = room.add_emitter(Vec3::ZERO, 0.1);
//!
//! let sink = Arc::new(ChannelSink::new());
//! let mut world = ReverbWorld::with_room(WorldDesc::default(), room.clone(), sink.clone())?;
//! world.settings_mut().set_reflection_order(2);
//!
//! let source = world.add_source(SourceDesc::at(Vec3::ZERO).with_label("voice"))?;
//! world.set_listener_position(Vec3::new(5.0, 0.0, 0.0));
//!
//! // One step per frame from the host's loop
//! for frame in 0..600 {
//!     let x = (frame as f32 * 0.01).sin();
//!     room.set_emitter_position(emitter, Vec3::new(x, 0.0, 0.0));
//!     world.set_source_position(source, Vec3::new(x, 0.0, 0.0))?;
//!     world.step(1.0 / 60.0);
//!
//!     for upload in sink.drain() {
//!         println!("slot {}: {} samples", upload.slot, upload.samples.len());
//!     }
//! }
//! # Ok::<(), ReverbError>(())
//! ```
//!
//! ## Key Components
//!
//! - **[`ReverbWorld`]**: Owns the settings, the sources and the external collaborators; call [`ReverbWorld::step`] once per frame
//! - **[`GeometryOracle`](scene::GeometryOracle)**: Ray queries against the host's scene
//! - **[`MirrorPlaneRegistry`](scene::MirrorPlaneRegistry)**: Reflecting planes gathered from [`RoomBoundary`](scene::RoomBoundary) objects
//! - **[`ImageSourceGenerator`](ism::ImageSourceGenerator)** and **[`PathValidator`](ism::PathValidator)**: Early specular reflections
//! - **[`DiffuseTracer`](diffuse::DiffuseTracer)**: Late diffuse energy within a wall-clock budget
//! - **[`Synthesizer`](synth::Synthesizer)**: Merges both into the impulse response
//! - **[`BudgetAllocator`](budget::BudgetAllocator)**: Shares the frame time among sources
//!
//! ## Threading
//!
//! A single thread drives `step`. Batched ray queries may fan out internally
//! (see [`ParallelOracle`](scene::ParallelOracle)) but always return before the
//! pipeline continues. Settings are only changed between steps.

pub mod budget;
pub mod config;
pub mod diffuse;
pub mod error;
pub mod events;
pub mod ism;
pub mod math;
pub mod output;
pub mod scene;
pub mod source;
pub mod synth;
pub mod world;

pub use config::{MAX_IR_SLOTS, RenderSettings, SPEED_OF_SOUND, SourceDesc, WorldDesc};
pub use error::{ReverbError, Result};
pub use events::{FrameTimingEvent, ReverbEvent};
pub use source::{FrameChanges, ReverbSource, SourceFrameReport};
pub use world::{ReverbWorld, SourceId};
