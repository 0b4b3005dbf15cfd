//! Geometry oracle: the ray intersection interface to the host scene.
//!
//! The reverb pipeline never owns scene geometry. It asks an implementation of
//! [`GeometryOracle`] for the nearest hit along a ray, either one query at a
//! time or as a batch that the implementation is free to resolve in parallel.

use crate::math::Vec3;
use crate::scene::material::MaterialId;
use rayon::prelude::*;
use std::ops::BitOr;

/// Set of collision layers a query is allowed to hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayerMask(u32);

impl LayerMask {
    /// Nothing is hit
    pub const NONE: Self = Self(0);
    /// Room boundaries that reflect sound
    pub const REFLECTORS: Self = Self(1);
    /// Small proxy colliders placed at sound emitters
    pub const EMITTERS: Self = Self(1 << 1);
    /// Every layer
    pub const ALL: Self = Self(u32::MAX);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns true if the two masks share at least one layer
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for LayerMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// A single ray query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayQuery {
    /// Ray starting position in world space
    pub origin: Vec3,
    /// Ray direction; implementations must not assume it is normalized
    pub direction: Vec3,
    /// Maximum distance to test along the normalized direction
    pub max_distance: f32,
    /// Layers the ray may hit
    pub layers: LayerMask,
}

impl RayQuery {
    pub fn new(origin: Vec3, direction: Vec3, max_distance: f32, layers: LayerMask) -> Self {
        Self {
            origin,
            direction,
            max_distance,
            layers,
        }
    }
}

/// Information about the closest intersection of a ray with the scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// World-space hit position
    pub point: Vec3,

    /// Surface normal at the hit point (normalized, pointing away from the surface)
    pub normal: Vec3,

    /// Distance from ray origin to hit point
    pub distance: f32,

    /// Material of the hit surface, if it has one
    ///
    /// Surfaces without a material fall back to the global absorption and
    /// diffuse proportion of [`RenderSettings`](crate::RenderSettings).
    pub material: Option<MaterialId>,
}

impl RayHit {
    pub fn new(point: Vec3, normal: Vec3, distance: f32, material: Option<MaterialId>) -> Self {
        Self {
            point,
            normal,
            distance,
            material,
        }
    }
}

/// Trait for providing scene intersection queries to the reverb pipeline.
///
/// Implement this trait to connect the host's collision system (a game engine,
/// a BVH, an analytic room) to the image source validator and the diffuse ray
/// tracer.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`. Sources simulated in the same frame
/// may submit batches independently, so a shared oracle has to tolerate
/// concurrent `cast_batch` calls; each call owns its queries and its result
/// vector, nothing is aliased between submissions.
///
/// # Emitters
///
/// The path validator confirms that a specular path reaches the real source by
/// hitting it. Scenes are therefore expected to place a small proxy collider on
/// the [`LayerMask::EMITTERS`] layer at every source, with a radius below the
/// configured path tolerance.
///
/// # Example
///
/// ```
/// use petalsonic_ism::math::Vec3;
/// use petalsonic_ism::scene::{GeometryOracle, RayHit, RayQuery};
///
/// struct FloorOracle;
///
/// impl GeometryOracle for FloorOracle {
///     fn cast_ray(&self, query: &RayQuery) -> Option<RayHit> {
///         let dir = query.direction.normalize_or_zero();
///         if dir.y >= 0.0 || query.origin.y <= 0.0 {
///             return None;
///         }
///         let t = -query.origin.y / dir.y;
///         (t <= query.max_distance)
///             .then(|| RayHit::new(query.origin + dir * t, Vec3::Y, t, None))
///     }
/// }
/// ```
pub trait GeometryOracle: Send + Sync {
    /// Returns the closest hit along the ray, or `None` if nothing on the
    /// requested layers lies within `max_distance`.
    ///
    /// Hits closer than a small surface epsilon should be ignored so that a ray
    /// leaving a surface does not immediately hit that same surface.
    fn cast_ray(&self, query: &RayQuery) -> Option<RayHit>;

    /// Resolves many queries at once.
    ///
    /// The result has the same length and order as `queries`. The default
    /// implementation resolves them sequentially.
    fn cast_batch(&self, queries: &[RayQuery]) -> Vec<Option<RayHit>> {
        queries.iter().map(|query| self.cast_ray(query)).collect()
    }

    /// Called once per frame before any source runs (optional).
    fn begin_frame(&self) {}

    /// Called once per frame after every source has run (optional).
    fn end_frame(&self) {}
}

/// Wraps an oracle so that batches are resolved on the rayon thread pool.
///
/// The caller still sees a synchronous call: the batch is split across worker
/// threads and the results are collected back in query order before
/// `cast_batch` returns.
#[derive(Debug, Clone)]
pub struct ParallelOracle<O> {
    inner: O,
}

impl<O: GeometryOracle> ParallelOracle<O> {
    pub fn new(inner: O) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &O {
        &self.inner
    }

    pub fn into_inner(self) -> O {
        self.inner
    }
}

impl<O: GeometryOracle> GeometryOracle for ParallelOracle<O> {
    fn cast_ray(&self, query: &RayQuery) -> Option<RayHit> {
        self.inner.cast_ray(query)
    }

    fn cast_batch(&self, queries: &[RayQuery]) -> Vec<Option<RayHit>> {
        queries
            .par_iter()
            .map(|query| self.inner.cast_ray(query))
            .collect()
    }

    fn begin_frame(&self) {
        self.inner.begin_frame();
    }

    fn end_frame(&self) {
        self.inner.end_frame();
    }
}
