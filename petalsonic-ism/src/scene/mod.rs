//! Scene interfaces consumed by the reverb pipeline.
//!
//! The host scene is reached through two narrow interfaces:
//!
//! 1. **GeometryOracle** - nearest-hit ray queries, single or batched
//! 2. **RoomBoundary** - reflecting planes of the room, observable for changes
//!
//! Hit surfaces carry an optional material index that is resolved through a
//! **MaterialTable** of [`SurfaceMaterial`]s. [`RoomGeometry`] implements both
//! interfaces analytically for rooms built from rectangular walls.
//!
//! # Example
//!
//! ```
//! use petalsonic_ism::math::Vec3;
//! use petalsonic_ism::scene::{MaterialTable, MirrorPlaneRegistry, RoomGeometry, SurfaceMaterial};
//!
//! let mut materials = MaterialTable::new();
//! let plaster = materials.add(SurfaceMaterial::PLASTER)?;
//!
//! let (min, max) = (Vec3::new(-4.0, 0.0, -3.0), Vec3::new(4.0, 3.0, 3.0));
//! let room = RoomGeometry::shoebox(min, max, Some(plaster));
//! let registry = MirrorPlaneRegistry::construct(room.boundaries());
//! assert_eq!(registry.len(), 6);
//! # Ok::<(), petalsonic_ism::ReverbError>(())
//! ```

pub mod material;
pub mod plane_registry;
pub mod ray_tracer;
pub mod room;

pub use material::{MaterialId, MaterialTable, SurfaceMaterial};
pub use plane_registry::{MirrorPlane, MirrorPlaneRegistry, RoomBoundary};
pub use ray_tracer::{GeometryOracle, LayerMask, ParallelOracle, RayHit, RayQuery};
pub use room::{EmitterHandle, EmitterProxy, RoomGeometry, SURFACE_EPSILON, Wall, WallShape};
