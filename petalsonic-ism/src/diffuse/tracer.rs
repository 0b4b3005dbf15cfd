use crate::diffuse::accumulator::DiffuseAccumulator;
use crate::math::{Vec3, cosine_hemisphere, random_direction};
use crate::scene::{GeometryOracle, LayerMask, MaterialTable, RayQuery, SurfaceMaterial};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::f32::consts::TAU;
use std::time::{Duration, Instant};

/// Added to the spreading area `2π·r²` so that contributions stay finite for
/// hits right next to the listener
pub const SPREADING_EPSILON: f32 = 1.0;

/// Everything one call to [`DiffuseTracer::trace`] needs to know.
#[derive(Debug, Clone, Copy)]
pub struct TraceRequest {
    pub source: Vec3,
    pub listener: Vec3,
    /// Wall-clock time the call may spend tracing
    pub budget: Duration,
    /// Clear the accumulated energy before tracing
    pub reset: bool,
    pub sample_rate: u32,
    pub speed_of_sound: f32,
    /// Rays are followed until they traveled this far
    pub max_ray_length: f32,
    /// Bounces below this count keep only their diffuse share of energy
    pub specular_order: u32,
    /// Coefficients for surfaces without a material
    pub default_surface: SurfaceMaterial,
}

/// Work done by one call to [`DiffuseTracer::trace`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraceStats {
    pub rays: u64,
    pub bounces: u64,
    pub contributions: u64,
}

/// Monte-Carlo estimator of the late diffuse field of one source.
///
/// Rays leave the source in random directions and scatter off every surface
/// they hit. At each bounce the energy that reaches the listener unoccluded is
/// folded into a [`DiffuseAccumulator`]. The amount of work per call is bounded
/// by wall-clock time only, so the estimate sharpens the longer results are
/// accumulated.
#[derive(Debug, Clone)]
pub struct DiffuseTracer {
    accumulator: DiffuseAccumulator,
    rng: StdRng,
}

impl DiffuseTracer {
    /// Creates a tracer for an impulse response of `len` samples.
    ///
    /// `seed` fixes the sequence of ray directions; `None` seeds from the OS.
    pub fn new(len: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            accumulator: DiffuseAccumulator::new(len),
            rng,
        }
    }

    pub fn accumulator(&self) -> &DiffuseAccumulator {
        &self.accumulator
    }

    /// Discards all accumulated energy
    pub fn reset(&mut self) {
        self.accumulator.reset();
    }

    /// Traces rays until `request.budget` has elapsed.
    ///
    /// The deadline is checked before every new ray and after every bounce.
    pub fn trace(
        &mut self,
        request: &TraceRequest,
        oracle: &dyn GeometryOracle,
        materials: &MaterialTable,
    ) -> TraceStats {
        if request.reset {
            self.accumulator.reset();
        }

        let mut stats = TraceStats::default();
        let Some(deadline) = Instant::now().checked_add(request.budget) else {
            log::warn!("Ray tracing budget {:?} is out of range", request.budget);
            return stats;
        };
        let samples_per_unit = request.sample_rate as f32 / request.speed_of_sound;

        while Instant::now() < deadline {
            stats.rays += 1;

            let mut origin = request.source;
            let mut direction = random_direction(&mut self.rng);
            let mut energy = 1.0f32;
            let mut remaining = request.max_ray_length;
            let mut bounces = 0u32;

            while remaining > 0.0 {
                let query = RayQuery::new(origin, direction, remaining, LayerMask::REFLECTORS);
                let Some(hit) = oracle.cast_ray(&query) else {
                    // Escaped the scene
                    break;
                };

                origin = hit.point;
                remaining -= hit.distance;

                let surface = materials
                    .lookup(hit.material)
                    .copied()
                    .unwrap_or(request.default_surface);
                if bounces < request.specular_order {
                    // The specular share of early bounces is covered by the image sources
                    energy *= surface.diffuse_proportion;
                }
                energy *= 1.0 - surface.absorption;
                bounces += 1;
                stats.bounces += 1;

                let to_listener = request.listener - hit.point;
                let listener_distance = to_listener.length();
                let occlusion =
                    RayQuery::new(hit.point, to_listener, listener_distance, LayerMask::ALL);
                let occluded = listener_distance > 0.0 && oracle.cast_ray(&occlusion).is_some();

                if !occluded {
                    let arrival = hit.distance + listener_distance;
                    let index = (arrival * samples_per_unit).round() as usize;
                    let spreading = TAU * hit.distance * hit.distance + SPREADING_EPSILON;
                    let contribution = energy / spreading;
                    if self.accumulator.add(index, contribution) {
                        stats.contributions += 1;
                    }
                }

                direction = cosine_hemisphere(hit.normal, &mut self.rng);

                if Instant::now() >= deadline {
                    break;
                }
            }
        }

        stats
    }
}
