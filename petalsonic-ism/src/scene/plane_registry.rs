//! Mirror plane registry.
//!
//! Flattens the reflecting planes of every room boundary into one contiguous
//! array that the image source generator iterates. Boundaries are owned by the
//! host and shared with the registry; when one of them reports a change only
//! its slots are re-derived.

use crate::math::Vec3;
use std::ops::Range;
use std::sync::Arc;

/// A planar reflecting surface, described by a point on it and its outward normal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MirrorPlane {
    pub center: Vec3,
    /// Unit normal, pointing into the room
    pub normal: Vec3,
}

impl MirrorPlane {
    /// Creates a plane, normalizing `normal`.
    ///
    /// A zero normal stays zero; such a plane never produces an image source.
    pub fn new(center: Vec3, normal: Vec3) -> Self {
        Self {
            center,
            normal: normal.normalize_or_zero(),
        }
    }

    /// Plane equation constant `dot(center, normal)`
    pub fn offset(&self) -> f32 {
        self.center.dot(self.normal)
    }

    pub fn is_degenerate(&self) -> bool {
        self.normal == Vec3::ZERO
    }
}

/// A piece of room geometry that contributes mirror planes.
///
/// Implemented by the host for whatever represents walls, boxes or meshes in
/// its scene. The same object is usually also visible to the
/// [`GeometryOracle`](crate::scene::GeometryOracle), so it is shared through an
/// `Arc` and reports changes through interior mutability.
pub trait RoomBoundary: Send + Sync {
    /// Current mirror planes of this boundary
    fn mirror_planes(&self) -> Vec<MirrorPlane>;

    /// Returns whether the geometry changed since the last call, and resets the flag
    fn take_changed(&self) -> bool;
}

/// Flattened set of mirror planes aggregated from all room boundaries.
pub struct MirrorPlaneRegistry {
    boundaries: Vec<Arc<dyn RoomBoundary>>,
    start_indices: Vec<usize>,
    planes: Vec<MirrorPlane>,
}

impl MirrorPlaneRegistry {
    /// Builds the registry from a fixed set of boundaries.
    ///
    /// Boundary membership never changes afterwards; only the contents of each
    /// boundary's slots are refreshed.
    pub fn construct(boundaries: Vec<Arc<dyn RoomBoundary>>) -> Self {
        let mut start_indices = Vec::with_capacity(boundaries.len());
        let mut planes = Vec::new();

        for boundary in &boundaries {
            // Construction consumes any pending change
            boundary.take_changed();
            start_indices.push(planes.len());
            planes.extend(boundary.mirror_planes().into_iter().map(normalized));
        }

        let degenerate = planes.iter().filter(|p| p.is_degenerate()).count();
        if degenerate > 0 {
            log::warn!("{} mirror planes have a zero normal and will be ignored", degenerate);
        }

        log::info!(
            "Mirror plane registry built: {} boundaries, {} planes",
            boundaries.len(),
            planes.len()
        );

        Self {
            boundaries,
            start_indices,
            planes,
        }
    }

    /// Re-derives the planes of every boundary that changed since the last call.
    ///
    /// Returns whether any boundary changed.
    pub fn refresh(&mut self) -> bool {
        let mut changed = false;

        for index in 0..self.boundaries.len() {
            if !self.boundaries[index].take_changed() {
                continue;
            }
            changed = true;

            let slots = self.boundary_range(index);
            let fresh = self.boundaries[index].mirror_planes();
            if fresh.len() != slots.len() {
                log::warn!(
                    "Boundary {} now reports {} planes but owns {} slots; extra planes are ignored",
                    index,
                    fresh.len(),
                    slots.len()
                );
            }

            for (slot, plane) in self.planes[slots].iter_mut().zip(fresh) {
                *slot = normalized(plane);
            }
        }

        if changed {
            log::debug!("Mirror planes refreshed");
        }
        changed
    }

    /// All planes, in boundary order
    pub fn planes(&self) -> &[MirrorPlane] {
        &self.planes
    }

    /// Number of planes
    pub fn len(&self) -> usize {
        self.planes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.planes.is_empty()
    }

    pub fn boundary_count(&self) -> usize {
        self.boundaries.len()
    }

    /// Slots owned by boundary `index`
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a boundary index.
    pub fn boundary_range(&self, index: usize) -> Range<usize> {
        let start = self.start_indices[index];
        let end = self
            .start_indices
            .get(index + 1)
            .copied()
            .unwrap_or(self.planes.len());
        start..end
    }
}

fn normalized(plane: MirrorPlane) -> MirrorPlane {
    MirrorPlane::new(plane.center, plane.normal)
}
