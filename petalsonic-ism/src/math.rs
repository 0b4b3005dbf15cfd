//! Math types and small geometric helpers for the acoustic pipeline.

pub use glam::{Quat, Vec3};
use rand::Rng;
use rand_distr::{Distribution, UnitDisc, UnitSphere};

/// Distance below which two positions count as the same place.
///
/// Used to decide whether a source or the listener has moved between frames.
pub const POSITION_EPSILON: f32 = 1e-4;

/// Returns true if `a` and `b` are closer than [`POSITION_EPSILON`].
pub fn positions_equal(a: Vec3, b: Vec3) -> bool {
    a.distance_squared(b) < POSITION_EPSILON * POSITION_EPSILON
}

/// Signed distance of `point` from the plane through `center` with unit `normal`.
///
/// Positive values are in front of the plane (on the side the normal points to).
pub fn signed_plane_distance(point: Vec3, center: Vec3, normal: Vec3) -> f32 {
    (point - center).dot(normal)
}

/// Mirrors `point` across the plane through `center` with unit `normal`.
pub fn mirror_point(point: Vec3, center: Vec3, normal: Vec3) -> Vec3 {
    point - 2.0 * normal * signed_plane_distance(point, center, normal)
}

/// Uniformly distributed direction on the unit sphere.
pub fn random_direction<R: Rng + ?Sized>(rng: &mut R) -> Vec3 {
    let [x, y, z]: [f32; 3] = UnitSphere.sample(rng);
    Vec3::new(x, y, z)
}

/// Cosine-weighted direction on the hemisphere around `normal`.
///
/// A point on the unit disc is lifted onto the +Y hemisphere (Malley's method)
/// and then rotated so that +Y maps onto `normal`.
pub fn cosine_hemisphere<R: Rng + ?Sized>(normal: Vec3, rng: &mut R) -> Vec3 {
    let [x, z]: [f32; 2] = UnitDisc.sample(rng);
    let y = (1.0 - x * x - z * z).max(0.0).sqrt();
    let upward = Vec3::new(x, y, z);
    Quat::from_rotation_arc(Vec3::Y, normal.normalize_or(Vec3::Y)) * upward
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_mirror_point_across_axis_plane() {
        let mirrored = mirror_point(Vec3::new(1.0, 2.0, 3.0), Vec3::ZERO, Vec3::X);
        assert!(mirrored.abs_diff_eq(Vec3::new(-1.0, 2.0, 3.0), 1e-6));
    }

    #[test]
    fn test_mirror_point_offset_plane() {
        let center = Vec3::new(0.0, 0.0, 5.0);
        let mirrored = mirror_point(Vec3::new(0.0, 1.0, 2.0), center, -Vec3::Z);
        assert!(mirrored.abs_diff_eq(Vec3::new(0.0, 1.0, 8.0), 1e-5));
    }

    #[test]
    fn test_positions_equal() {
        assert!(positions_equal(Vec3::ONE, Vec3::ONE + Vec3::splat(1e-6)));
        assert!(!positions_equal(Vec3::ONE, Vec3::new(1.0, 1.0, 1.01)));
    }

    #[test]
    fn test_cosine_hemisphere_stays_above_surface() {
        let mut rng = StdRng::seed_from_u64(7);
        let normals = [Vec3::Y, -Vec3::Y, Vec3::X, Vec3::new(1.0, 1.0, 0.0).normalize()];
        for normal in normals {
            for _ in 0..256 {
                let dir = cosine_hemisphere(normal, &mut rng);
                assert!((dir.length() - 1.0).abs() < 1e-4);
                assert!(dir.dot(normal) >= -1e-5);
            }
        }
    }

    #[test]
    fn test_random_direction_is_unit() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..64 {
            assert!((random_direction(&mut rng).length() - 1.0).abs() < 1e-4);
        }
    }
}
