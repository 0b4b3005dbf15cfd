//! Analytic room geometry.
//!
//! [`RoomGeometry`] is a small self-contained scene made of rectangular walls
//! and spherical emitter proxies. It implements [`GeometryOracle`] and hands
//! out its walls as [`RoomBoundary`] objects, which makes it a complete host
//! for the reverb pipeline in tests, demos and tools that have no engine behind
//! them.

use crate::math::Vec3;
use crate::scene::material::MaterialId;
use crate::scene::plane_registry::{MirrorPlane, RoomBoundary};
use crate::scene::ray_tracer::{GeometryOracle, LayerMask, RayHit, RayQuery};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// Hits closer than this to the ray origin are ignored
pub const SURFACE_EPSILON: f32 = 1e-4;

/// Shape of a rectangular wall.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WallShape {
    pub center: Vec3,
    /// Unit normal pointing into the room
    pub normal: Vec3,
    /// Unit in-plane axis along which `half_width` is measured
    pub tangent: Vec3,
    pub half_width: f32,
    pub half_height: f32,
}

impl WallShape {
    /// Creates a wall shape, orthonormalizing `tangent` against `normal`.
    pub fn new(
        center: Vec3,
        normal: Vec3,
        tangent: Vec3,
        half_width: f32,
        half_height: f32,
    ) -> Self {
        let normal = normal.normalize_or_zero();
        let tangent = (tangent - normal * tangent.dot(normal)).normalize_or_zero();
        Self {
            center,
            normal,
            tangent,
            half_width,
            half_height,
        }
    }

    fn bitangent(&self) -> Vec3 {
        self.normal.cross(self.tangent)
    }

    fn intersect(&self, origin: Vec3, dir: Vec3, max_distance: f32) -> Option<(f32, Vec3)> {
        let denom = dir.dot(self.normal);
        if denom.abs() < 1e-8 {
            return None;
        }
        let t = (self.center - origin).dot(self.normal) / denom;
        if t <= SURFACE_EPSILON || t > max_distance {
            return None;
        }
        let local = origin + dir * t - self.center;
        if local.dot(self.tangent).abs() > self.half_width
            || local.dot(self.bitangent()).abs() > self.half_height
        {
            return None;
        }
        // Report the face the ray arrived from
        let normal = if denom > 0.0 { -self.normal } else { self.normal };
        Some((t, normal))
    }
}

/// A movable rectangular wall on the reflector layer.
#[derive(Debug)]
pub struct Wall {
    shape: RwLock<WallShape>,
    material: Option<MaterialId>,
    changed: AtomicBool,
}

impl Wall {
    pub fn new(shape: WallShape, material: Option<MaterialId>) -> Self {
        Self {
            shape: RwLock::new(shape),
            material,
            changed: AtomicBool::new(true),
        }
    }

    pub fn shape(&self) -> WallShape {
        *self.shape.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn material(&self) -> Option<MaterialId> {
        self.material
    }

    /// Replaces the wall's shape and flags it as changed
    pub fn set_shape(&self, shape: WallShape) {
        *self.shape.write().unwrap_or_else(|e| e.into_inner()) = shape;
        self.changed.store(true, Ordering::Release);
    }

    /// Moves the wall by `offset` and flags it as changed
    pub fn translate(&self, offset: Vec3) {
        let mut shape = self.shape();
        shape.center += offset;
        self.set_shape(shape);
    }
}

impl RoomBoundary for Wall {
    fn mirror_planes(&self) -> Vec<MirrorPlane> {
        let shape = self.shape();
        vec![MirrorPlane::new(shape.center, shape.normal)]
    }

    fn take_changed(&self) -> bool {
        self.changed.swap(false, Ordering::AcqRel)
    }
}

/// Spherical collider marking a sound emitter on the [`LayerMask::EMITTERS`] layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmitterProxy {
    pub position: Vec3,
    pub radius: f32,
}

impl EmitterProxy {
    fn intersect(&self, origin: Vec3, dir: Vec3, max_distance: f32) -> Option<(f32, Vec3)> {
        let oc = origin - self.position;
        let c = oc.length_squared() - self.radius * self.radius;
        if c <= 0.0 {
            // Rays starting inside the proxy pass through it
            return None;
        }
        let b = oc.dot(dir);
        let disc = b * b - c;
        if disc < 0.0 {
            return None;
        }
        let t = -b - disc.sqrt();
        if t <= SURFACE_EPSILON || t > max_distance {
            return None;
        }
        let normal = (origin + dir * t - self.position).normalize_or_zero();
        Some((t, normal))
    }
}

/// Handle of an emitter proxy inside a [`RoomGeometry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EmitterHandle(usize);

/// Walls plus emitter proxies, queryable as a [`GeometryOracle`].
///
/// # Example
///
/// ```
/// use petalsonic_ism::math::Vec3;
/// use petalsonic_ism::scene::{GeometryOracle, LayerMask, RayQuery, RoomGeometry};
///
/// let room = RoomGeometry::shoebox(Vec3::splat(-5.0), Vec3::splat(5.0), None);
/// let hit = room
///     .cast_ray(&RayQuery::new(Vec3::ZERO, Vec3::X, 100.0, LayerMask::REFLECTORS))
///     .unwrap();
/// assert!((hit.distance - 5.0).abs() < 1e-5);
/// assert_eq!(hit.normal, -Vec3::X);
/// ```
#[derive(Debug, Default)]
pub struct RoomGeometry {
    walls: Vec<Arc<Wall>>,
    emitters: RwLock<Vec<EmitterProxy>>,
}

impl RoomGeometry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Four vertical walls around `center`, `2 * half_size` apart, without floor or ceiling.
    pub fn square_room(
        center: Vec3,
        half_size: f32,
        height: f32,
        material: Option<MaterialId>,
    ) -> Self {
        let mut room = Self::new();
        for normal in [Vec3::X, -Vec3::X, Vec3::Z, -Vec3::Z] {
            let tangent = normal.cross(Vec3::Y);
            let shape = WallShape::new(
                center - normal * half_size,
                normal,
                tangent,
                half_size,
                height * 0.5,
            );
            room.add_wall(shape, material);
        }
        room
    }

    /// Closed axis-aligned box spanning `min` to `max` (six walls).
    pub fn shoebox(min: Vec3, max: Vec3, material: Option<MaterialId>) -> Self {
        let center = (min + max) * 0.5;
        let half = (max - min) * 0.5;
        let mut room = Self::new();

        // (inward normal, in-plane tangent, half extents along tangent / bitangent)
        let faces = [
            (Vec3::X, Vec3::Z, half.z, half.y),
            (-Vec3::X, Vec3::Z, half.z, half.y),
            (Vec3::Y, Vec3::X, half.x, half.z),
            (-Vec3::Y, Vec3::X, half.x, half.z),
            (Vec3::Z, Vec3::X, half.x, half.y),
            (-Vec3::Z, Vec3::X, half.x, half.y),
        ];
        for (normal, tangent, half_width, half_height) in faces {
            let offset = (half * normal).length();
            room.add_wall(
                WallShape::new(center - normal * offset, normal, tangent, half_width, half_height),
                material,
            );
        }
        room
    }

    /// Adds a wall and returns the shared handle to it
    pub fn add_wall(&mut self, shape: WallShape, material: Option<MaterialId>) -> Arc<Wall> {
        let wall = Arc::new(Wall::new(shape, material));
        self.walls.push(wall.clone());
        wall
    }

    pub fn walls(&self) -> &[Arc<Wall>] {
        &self.walls
    }

    /// The walls as boundaries for a [`MirrorPlaneRegistry`](crate::scene::MirrorPlaneRegistry)
    pub fn boundaries(&self) -> Vec<Arc<dyn RoomBoundary>> {
        self.walls
            .iter()
            .map(|wall| wall.clone() as Arc<dyn RoomBoundary>)
            .collect()
    }

    /// Adds an emitter proxy; `radius` should stay below the path tolerance
    pub fn add_emitter(&self, position: Vec3, radius: f32) -> EmitterHandle {
        let mut emitters = self.emitters.write().unwrap_or_else(|e| e.into_inner());
        emitters.push(EmitterProxy { position, radius });
        EmitterHandle(emitters.len() - 1)
    }

    pub fn set_emitter_position(&self, handle: EmitterHandle, position: Vec3) {
        let mut emitters = self.emitters.write().unwrap_or_else(|e| e.into_inner());
        if let Some(emitter) = emitters.get_mut(handle.0) {
            emitter.position = position;
        }
    }

    pub fn emitter(&self, handle: EmitterHandle) -> Option<EmitterProxy> {
        self.emitters
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(handle.0)
            .copied()
    }
}

impl GeometryOracle for RoomGeometry {
    fn cast_ray(&self, query: &RayQuery) -> Option<RayHit> {
        let dir = query.direction.normalize_or_zero();
        if dir == Vec3::ZERO {
            return None;
        }

        let mut best: Option<RayHit> = None;
        let mut nearest = query.max_distance;

        if query.layers.intersects(LayerMask::REFLECTORS) {
            for wall in &self.walls {
                if let Some((t, normal)) = wall.shape().intersect(query.origin, dir, nearest) {
                    nearest = t;
                    best = Some(RayHit::new(query.origin + dir * t, normal, t, wall.material()));
                }
            }
        }

        if query.layers.intersects(LayerMask::EMITTERS) {
            let emitters = self.emitters.read().unwrap_or_else(|e| e.into_inner());
            for emitter in emitters.iter() {
                if let Some((t, normal)) = emitter.intersect(query.origin, dir, nearest) {
                    nearest = t;
                    best = Some(RayHit::new(query.origin + dir * t, normal, t, None));
                }
            }
        }

        best
    }
}
