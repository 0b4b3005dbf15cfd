//! Impulse response synthesis.
//!
//! Merges the validated specular paths and the diffuse energy estimate into
//! one sample buffer. Sample `i` stands for an arrival `i / sample_rate`
//! seconds after emission; sample 0 carries the dry signal.

use crate::config::SPEED_OF_SOUND;
use crate::diffuse::DiffuseAccumulator;
use crate::ism::ValidPath;
use rand::Rng;

/// Added to the path length before dividing so that very short paths stay bounded
pub const PATH_EPSILON: f32 = 1.0;

/// Per-source impulse response writer.
///
/// The noise that shapes the diffuse tail is drawn once, when the synthesizer
/// is created, and reused for every frame so the tail does not flicker.
#[derive(Debug, Clone)]
pub struct Synthesizer {
    noise: Vec<f32>,
    sample_rate: u32,
    speed_of_sound: f32,
}

impl Synthesizer {
    /// Creates a synthesizer for `len` samples, drawing its noise from `rng`
    pub fn new<R: Rng + ?Sized>(len: usize, sample_rate: u32, rng: &mut R) -> Self {
        let noise = (0..len).map(|_| rng.random_range(-1.0f32..=1.0)).collect();
        Self {
            noise,
            sample_rate,
            speed_of_sound: SPEED_OF_SOUND,
        }
    }

    pub fn len(&self) -> usize {
        self.noise.len()
    }

    pub fn is_empty(&self) -> bool {
        self.noise.is_empty()
    }

    pub fn noise(&self) -> &[f32] {
        &self.noise
    }

    pub fn set_speed_of_sound(&mut self, speed: f32) {
        self.speed_of_sound = speed;
    }

    /// Sample index at which a path of `length` arrives
    pub fn arrival_index(&self, length: f32) -> usize {
        (self.sample_rate as f32 * length / self.speed_of_sound).round() as usize
    }

    /// Overwrites `out` with the impulse response for this frame.
    ///
    /// Paths arriving after the end of the buffer are skipped. Paths that land
    /// on the same sample add up.
    pub fn synthesize(&self, paths: &[ValidPath], diffuse: &DiffuseAccumulator, out: &mut [f32]) {
        out.fill(0.0);
        let Some(first) = out.first_mut() else {
            return;
        };
        *first = 1.0;

        for path in paths {
            let index = self.arrival_index(path.length);
            let Some(sample) = out.get_mut(index) else {
                continue;
            };
            // Every reflection inverts the phase
            let sign = if path.order() % 2 == 0 { 1.0 } else { -1.0 };
            *sample += sign * path.specular_gain() / (path.length + PATH_EPSILON);
        }

        for ((sample, &energy), &noise) in out.iter_mut().zip(diffuse.values()).zip(&self.noise) {
            *sample += energy.sqrt() * noise;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ism::Reflection;
    use crate::math::Vec3;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const LEN: usize = 4800;

    fn synthesizer() -> Synthesizer {
        Synthesizer::new(LEN, 48000, &mut StdRng::seed_from_u64(9))
    }

    fn bounce(absorption: f32, diffuse_proportion: f32) -> Reflection {
        Reflection {
            point: Vec3::ZERO,
            absorption,
            diffuse_proportion,
        }
    }

    #[test]
    fn test_dry_impulse_only() {
        let mut ir = vec![0.5; LEN];
        synthesizer().synthesize(&[], &DiffuseAccumulator::new(LEN), &mut ir);
        assert_eq!(ir[0], 1.0);
        assert!(ir[1..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_direct_path_placement() {
        let synth = synthesizer();
        let direct = ValidPath {
            reflections: Vec::new(),
            length: 5.0,
        };
        let mut ir = vec![0.0; LEN];
        synth.synthesize(&[direct], &DiffuseAccumulator::new(LEN), &mut ir);

        let index = synth.arrival_index(5.0);
        assert_eq!(index, 699);
        assert!((ir[index] - 1.0 / 6.0).abs() < 1e-6);
    }

    #[test]
    fn test_reflection_sign_and_gain() {
        let synth = synthesizer();
        let once = ValidPath {
            reflections: vec![bounce(0.5, 0.2)],
            length: 9.0,
        };
        let twice = ValidPath {
            reflections: vec![bounce(0.5, 0.0), bounce(0.0, 0.5)],
            length: 19.0,
        };
        let mut ir = vec![0.0; LEN];
        synth.synthesize(&[once, twice], &DiffuseAccumulator::new(LEN), &mut ir);

        let first = ir[synth.arrival_index(9.0)];
        assert!((first + 0.5 * 0.8 / 10.0).abs() < 1e-6);
        let second = ir[synth.arrival_index(19.0)];
        assert!((second - 0.25 / 20.0).abs() < 1e-6);
    }

    #[test]
    fn test_coinciding_paths_sum() {
        let synth = synthesizer();
        let path = ValidPath {
            reflections: Vec::new(),
            length: 3.0,
        };
        let mut ir = vec![0.0; LEN];
        synth.synthesize(&[path.clone(), path], &DiffuseAccumulator::new(LEN), &mut ir);
        assert!((ir[synth.arrival_index(3.0)] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_late_paths_are_skipped() {
        let synth = synthesizer();
        let late = ValidPath {
            reflections: Vec::new(),
            length: 1000.0,
        };
        let mut ir = vec![0.0; LEN];
        synth.synthesize(&[late], &DiffuseAccumulator::new(LEN), &mut ir);
        assert!(ir[1..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_diffuse_tail_uses_fixed_noise() {
        let synth = synthesizer();
        let mut diffuse = DiffuseAccumulator::new(LEN);
        diffuse.add(100, 0.25);
        diffuse.add(2000, 0.04);

        let mut first = vec![0.0; LEN];
        let mut second = vec![0.0; LEN];
        synth.synthesize(&[], &diffuse, &mut first);
        synth.synthesize(&[], &diffuse, &mut second);
        assert_eq!(first, second);

        assert!((first[100] - 0.5 * synth.noise()[100]).abs() < 1e-6);
        assert!((first[2000] - 0.2 * synth.noise()[2000]).abs() < 1e-6);
        assert!(synth.noise().iter().all(|n| (-1.0..=1.0).contains(n)));
    }

    #[test]
    fn test_empty_buffer() {
        let mut ir: Vec<f32> = Vec::new();
        synthesizer().synthesize(&[], &DiffuseAccumulator::new(0), &mut ir);
        assert!(ir.is_empty());
    }
}
