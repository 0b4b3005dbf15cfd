//! Specular path validation.
//!
//! An image source only stands for a real reflection path if a ray from the
//! listener towards it actually bounces off the expected walls, in the expected
//! order, and finally arrives at the real source. The validator checks this for
//! every image source in range, advancing all candidates one reflection per
//! pass so that each pass is a single batched oracle query.

use crate::ism::image_source::ImageSourceForest;
use crate::math::Vec3;
use crate::scene::{GeometryOracle, LayerMask, MaterialTable, RayHit, RayQuery, SurfaceMaterial};

/// A confirmed wall hit along a specular path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reflection {
    pub point: Vec3,
    pub absorption: f32,
    pub diffuse_proportion: f32,
}

/// A physically realizable specular path from the listener to the real source.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidPath {
    /// Wall hits, ordered from the listener towards the source
    pub reflections: Vec<Reflection>,
    /// Total geometric length of the path
    pub length: f32,
}

impl ValidPath {
    /// Number of reflections (0 for the direct path)
    pub fn order(&self) -> usize {
        self.reflections.len()
    }

    /// Fraction of energy that survives every reflection specularly
    pub fn specular_gain(&self) -> f32 {
        self.reflections
            .iter()
            .map(|r| (1.0 - r.absorption) * (1.0 - r.diffuse_proportion))
            .product()
    }
}

/// Where the listener is and how far a path may reach.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidationRequest {
    pub listener: Vec3,
    /// Image sources at least this far from the listener are not considered
    pub max_path_length: f32,
}

impl ValidationRequest {
    pub fn new(listener: Vec3, max_path_length: f32) -> Self {
        Self {
            listener,
            max_path_length,
        }
    }
}

/// A path under construction: where the next ray starts, where it aims, and
/// what has been confirmed so far.
#[derive(Debug, Clone)]
struct CandidatePath {
    origin: Vec3,
    direction: Vec3,
    target: usize,
    traveled: f32,
    reflections: Vec<Reflection>,
}

/// Confirms image sources against scene geometry.
#[derive(Debug, Clone)]
pub struct PathValidator {
    tolerance: f32,
    default_surface: SurfaceMaterial,
}

impl PathValidator {
    /// # Arguments
    /// * `tolerance` - Allowed distance between a hit and the expected plane or arrival point
    /// * `default_surface` - Coefficients used for hit surfaces without a material
    pub fn new(tolerance: f32, default_surface: SurfaceMaterial) -> Self {
        Self {
            tolerance,
            default_surface,
        }
    }

    pub fn tolerance(&self) -> f32 {
        self.tolerance
    }

    /// Returns every valid specular path from the listener to the root of `forest`.
    ///
    /// The direct path is checked first with a single query. Reflected paths are
    /// then advanced in passes: every pass issues one batch containing exactly
    /// one query per live candidate. A candidate of order `k` needs `k` plane
    /// hits plus the arrival at the source, so at most `max_order + 1` passes
    /// run; whatever is still live after that is dropped.
    pub fn validate(
        &self,
        forest: &ImageSourceForest,
        request: ValidationRequest,
        oracle: &dyn GeometryOracle,
        materials: &MaterialTable,
    ) -> Vec<ValidPath> {
        let ValidationRequest {
            listener,
            max_path_length,
        } = request;
        let Some(root) = forest.root() else {
            return Vec::new();
        };
        let mut paths = Vec::new();

        if listener.distance(root.position) < max_path_length {
            let direct = CandidatePath {
                origin: listener,
                direction: root.position - listener,
                target: 0,
                traveled: 0.0,
                reflections: Vec::new(),
            };
            let hit = oracle.cast_ray(&self.arrival_query(&direct, root.position));
            if let Some(path) = hit.and_then(|hit| self.arrive(&direct, &hit, root.position)) {
                paths.push(path);
            }
        }

        let mut live: Vec<CandidatePath> = forest
            .nodes()
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, node)| listener.distance(node.position) < max_path_length)
            .map(|(index, node)| CandidatePath {
                origin: listener,
                direction: node.position - listener,
                target: index,
                traveled: 0.0,
                reflections: Vec::with_capacity(node.order as usize),
            })
            .collect();
        let seeded = live.len();

        for _pass in 0..=forest.max_order() {
            if live.is_empty() {
                break;
            }

            let queries: Vec<RayQuery> = live
                .iter()
                .map(|candidate| {
                    let target = &forest.nodes()[candidate.target];
                    if target.is_root() {
                        self.arrival_query(candidate, target.position)
                    } else {
                        let reach = candidate.origin.distance(target.position);
                        RayQuery::new(
                            candidate.origin,
                            candidate.direction,
                            reach + self.tolerance,
                            LayerMask::REFLECTORS,
                        )
                    }
                })
                .collect();

            let hits = oracle.cast_batch(&queries);
            if hits.len() != queries.len() {
                log::warn!(
                    "Geometry oracle answered {} of {} queries; unanswered paths are dropped",
                    hits.len(),
                    queries.len()
                );
            }

            let mut next = Vec::with_capacity(live.len());
            for (mut candidate, hit) in live.drain(..).zip(hits) {
                // Nothing hit: the ray cannot have reached its target
                let Some(hit) = hit else { continue };
                let target = forest.nodes()[candidate.target];

                match target.parent {
                    None => {
                        if let Some(path) = self.arrive(&candidate, &hit, target.position) {
                            paths.push(path);
                        }
                    }
                    Some(parent) => {
                        if target.plane_distance(hit.point).abs() > self.tolerance {
                            // Bounced off something other than the expected mirror
                            continue;
                        }
                        let surface = materials
                            .lookup(hit.material)
                            .copied()
                            .unwrap_or(self.default_surface);
                        candidate.reflections.push(Reflection {
                            point: hit.point,
                            absorption: surface.absorption,
                            diffuse_proportion: surface.diffuse_proportion,
                        });
                        candidate.traveled += hit.distance;
                        candidate.origin = hit.point;
                        candidate.direction = forest.nodes()[parent].position - hit.point;
                        candidate.target = parent;
                        next.push(candidate);
                    }
                }
            }
            live = next;
        }

        log::debug!(
            "Validated {} specular paths from {} image sources ({} unterminated)",
            paths.len(),
            seeded + 1,
            live.len()
        );
        paths
    }

    fn arrival_query(&self, candidate: &CandidatePath, source: Vec3) -> RayQuery {
        RayQuery::new(
            candidate.origin,
            candidate.direction,
            candidate.origin.distance(source) + self.tolerance,
            LayerMask::REFLECTORS | LayerMask::EMITTERS,
        )
    }

    /// Accepts the hit as the arrival at the real source if it happened where
    /// the source is, not earlier on some other collider.
    fn arrive(&self, candidate: &CandidatePath, hit: &RayHit, source: Vec3) -> Option<ValidPath> {
        let remaining = candidate.origin.distance(source);
        if (hit.distance - remaining).abs() > self.tolerance {
            return None;
        }
        Some(ValidPath {
            reflections: candidate.reflections.clone(),
            length: candidate.traveled + remaining,
        })
    }
}
