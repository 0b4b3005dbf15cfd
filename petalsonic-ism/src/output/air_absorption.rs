use crate::config::SPEED_OF_SOUND;
use crate::error::{ReverbError, Result};
use std::f32::consts::TAU;

/// Filter applied to a finished impulse response to model air absorption.
///
/// Implementations may wrap an external library. Any error makes the pipeline
/// bypass the filter for good.
pub trait AirAbsorptionFilter: Send {
    /// Prepares the filter for impulse responses at `sample_rate`
    fn initialize(&mut self, sample_rate: u32) -> Result<()>;

    /// Returns the filtered impulse response.
    ///
    /// The result should have the same length as `ir`; other lengths are
    /// tolerated but reported.
    fn apply(&mut self, ir: &[f32]) -> Result<Vec<f32>>;

    /// Releases whatever the filter holds (optional)
    fn terminate(&mut self) {}
}

/// Optional air absorption step of the pipeline.
///
/// Once the filter fails, during initialization or later, the stage switches to
/// bypass: it logs a single warning, remembers why, and leaves every following
/// impulse response untouched.
pub struct AirAbsorptionStage {
    filter: Option<Box<dyn AirAbsorptionFilter>>,
    bypass_reason: Option<String>,
    pending_notice: Option<String>,
    length_warned: bool,
}

impl AirAbsorptionStage {
    /// Initializes `filter` for `sample_rate`, bypassing it if that fails
    pub fn new(mut filter: Box<dyn AirAbsorptionFilter>, sample_rate: u32) -> Self {
        let mut stage = Self {
            filter: None,
            bypass_reason: None,
            pending_notice: None,
            length_warned: false,
        };
        match filter.initialize(sample_rate) {
            Ok(()) => {
                log::info!("Air absorption filter initialized at {} Hz", sample_rate);
                stage.filter = Some(filter);
            }
            Err(e) => stage.bypass(e.to_string()),
        }
        stage
    }

    /// True while the filter is usable
    pub fn is_active(&self) -> bool {
        self.filter.is_some()
    }

    /// Why the stage is bypassed, if it is
    pub fn bypass_reason(&self) -> Option<&str> {
        self.bypass_reason.as_deref()
    }

    /// Returns the bypass reason once, the first time it is asked after the bypass happened
    pub fn take_bypass_notice(&mut self) -> Option<String> {
        self.pending_notice.take()
    }

    /// Filters `ir` in place.
    ///
    /// Returns whether the filter ran. A result of different length is
    /// truncated or zero padded to the length of `ir`.
    pub fn process(&mut self, ir: &mut [f32]) -> bool {
        let Some(filter) = self.filter.as_mut() else {
            return false;
        };

        match filter.apply(ir) {
            Ok(filtered) => {
                if filtered.len() != ir.len() && !self.length_warned {
                    log::warn!(
                        "Air absorption returned {} samples for an impulse response of {}",
                        filtered.len(),
                        ir.len()
                    );
                    self.length_warned = true;
                }
                let kept = filtered.len().min(ir.len());
                ir[..kept].copy_from_slice(&filtered[..kept]);
                ir[kept..].fill(0.0);
                true
            }
            Err(e) => {
                self.bypass(e.to_string());
                false
            }
        }
    }

    fn bypass(&mut self, reason: String) {
        log::warn!("Air absorption unavailable, bypassing: {}", reason);
        if let Some(mut filter) = self.filter.take() {
            filter.terminate();
        }
        self.pending_notice = Some(reason.clone());
        self.bypass_reason = Some(reason);
    }
}

impl Drop for AirAbsorptionStage {
    fn drop(&mut self) {
        if let Some(mut filter) = self.filter.take() {
            filter.terminate();
        }
    }
}

impl std::fmt::Debug for AirAbsorptionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AirAbsorptionStage")
            .field("active", &self.is_active())
            .field("bypass_reason", &self.bypass_reason)
            .finish()
    }
}

/// Air absorption as a one-pole lowpass whose cutoff falls with distance.
///
/// Sample `i` of an impulse response arrives after travelling
/// `i * speed_of_sound / sample_rate`; the filter uses
/// `y[n] = x[n] + coeff * (y[n-1] - x[n])` with `coeff = exp(-2π f / fs)` and
/// a cutoff `f` that decays exponentially with that distance.
#[derive(Debug, Clone)]
pub struct DistanceLowpass {
    max_cutoff: f32,
    min_cutoff: f32,
    rolloff_distance: f32,
    speed_of_sound: f32,
    sample_rate: Option<u32>,
}

impl Default for DistanceLowpass {
    fn default() -> Self {
        Self {
            max_cutoff: 20_000.0,
            min_cutoff: 1_000.0,
            rolloff_distance: 100.0,
            speed_of_sound: SPEED_OF_SOUND,
            sample_rate: None,
        }
    }
}

impl DistanceLowpass {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cutoff right at the source and the lowest cutoff reached far away
    pub fn with_cutoffs(mut self, max_hz: f32, min_hz: f32) -> Self {
        self.max_cutoff = max_hz;
        self.min_cutoff = min_hz;
        self
    }

    /// Distance over which the cutoff falls by a factor of e
    pub fn with_rolloff_distance(mut self, distance: f32) -> Self {
        self.rolloff_distance = distance;
        self
    }

    /// Cutoff frequency applied to sound that travelled `distance`
    pub fn cutoff_at(&self, distance: f32) -> f32 {
        (self.max_cutoff * (-distance / self.rolloff_distance).exp()).max(self.min_cutoff)
    }
}

impl AirAbsorptionFilter for DistanceLowpass {
    fn initialize(&mut self, sample_rate: u32) -> Result<()> {
        if sample_rate == 0 {
            return Err(ReverbError::AirAbsorption("Sample rate must be positive".into()));
        }
        let valid = self.rolloff_distance > 0.0
            && self.min_cutoff > 0.0
            && self.max_cutoff >= self.min_cutoff;
        if !valid {
            return Err(ReverbError::AirAbsorption(format!(
                "Invalid lowpass parameters: cutoff {}..{} Hz, rolloff {} m",
                self.min_cutoff, self.max_cutoff, self.rolloff_distance
            )));
        }
        self.sample_rate = Some(sample_rate);
        Ok(())
    }

    fn apply(&mut self, ir: &[f32]) -> Result<Vec<f32>> {
        let sample_rate = self
            .sample_rate
            .ok_or_else(|| ReverbError::AirAbsorption("Filter used before initialization".into()))?
            as f32;
        let metres_per_sample = self.speed_of_sound / sample_rate;

        let mut state = 0.0f32;
        let filtered = ir
            .iter()
            .enumerate()
            .map(|(i, &x)| {
                let cutoff = self.cutoff_at(i as f32 * metres_per_sample);
                let coeff = (-TAU * cutoff / sample_rate).exp();
                state = x + coeff * (state - x);
                state
            })
            .collect();
        Ok(filtered)
    }

    fn terminate(&mut self) {
        self.sample_rate = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingInit;

    impl AirAbsorptionFilter for FailingInit {
        fn initialize(&mut self, _sample_rate: u32) -> Result<()> {
            Err(ReverbError::AirAbsorption("library not found".into()))
        }

        fn apply(&mut self, ir: &[f32]) -> Result<Vec<f32>> {
            Ok(ir.to_vec())
        }
    }

    /// Halves the input, fails after `fail_after` calls, counts terminations
    struct Flaky {
        calls: usize,
        fail_after: usize,
        output_len: Option<usize>,
        terminated: Arc<AtomicUsize>,
    }

    impl AirAbsorptionFilter for Flaky {
        fn initialize(&mut self, _sample_rate: u32) -> Result<()> {
            Ok(())
        }

        fn apply(&mut self, ir: &[f32]) -> Result<Vec<f32>> {
            self.calls += 1;
            if self.calls > self.fail_after {
                return Err(ReverbError::AirAbsorption("crashed".into()));
            }
            let len = self.output_len.unwrap_or(ir.len());
            Ok((0..len).map(|i| ir.get(i).copied().unwrap_or(9.0) * 0.5).collect())
        }

        fn terminate(&mut self) {
            self.terminated.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn flaky(fail_after: usize, output_len: Option<usize>) -> (Box<Flaky>, Arc<AtomicUsize>) {
        let terminated = Arc::new(AtomicUsize::new(0));
        let filter = Box::new(Flaky {
            calls: 0,
            fail_after,
            output_len,
            terminated: terminated.clone(),
        });
        (filter, terminated)
    }

    #[test]
    fn test_failed_initialization_bypasses() {
        let mut stage = AirAbsorptionStage::new(Box::new(FailingInit), 48000);
        assert!(!stage.is_active());
        assert!(stage.bypass_reason().unwrap().contains("library not found"));

        let mut ir = vec![1.0, 0.5];
        assert!(!stage.process(&mut ir));
        assert_eq!(ir, vec![1.0, 0.5]);

        assert!(stage.take_bypass_notice().is_some());
        assert!(stage.take_bypass_notice().is_none());
    }

    #[test]
    fn test_failing_apply_bypasses_once() {
        let (filter, terminated) = flaky(1, None);
        let mut stage = AirAbsorptionStage::new(filter, 48000);

        let mut ir = vec![1.0, 1.0];
        assert!(stage.process(&mut ir));
        assert_eq!(ir, vec![0.5, 0.5]);

        assert!(!stage.process(&mut ir));
        assert_eq!(ir, vec![0.5, 0.5]);
        assert!(!stage.is_active());
        assert_eq!(terminated.load(Ordering::SeqCst), 1);

        assert!(!stage.process(&mut ir));
        assert_eq!(stage.take_bypass_notice().as_deref(), Some("Air absorption error: crashed"));
        assert!(stage.take_bypass_notice().is_none());
    }

    #[test]
    fn test_short_output_is_zero_padded() {
        let (filter, _) = flaky(usize::MAX, Some(2));
        let mut stage = AirAbsorptionStage::new(filter, 48000);
        let mut ir = vec![1.0; 4];
        assert!(stage.process(&mut ir));
        assert_eq!(ir, vec![0.5, 0.5, 0.0, 0.0]);
    }

    #[test]
    fn test_long_output_is_truncated() {
        let (filter, _) = flaky(usize::MAX, Some(6));
        let mut stage = AirAbsorptionStage::new(filter, 48000);
        let mut ir = vec![1.0; 3];
        assert!(stage.process(&mut ir));
        assert_eq!(ir, vec![0.5; 3]);
    }

    #[test]
    fn test_drop_terminates_filter() {
        let (filter, terminated) = flaky(usize::MAX, None);
        drop(AirAbsorptionStage::new(filter, 48000));
        assert_eq!(terminated.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_lowpass_requires_initialization() {
        let mut filter = DistanceLowpass::new();
        assert!(filter.apply(&[1.0]).is_err());
        assert!(filter.initialize(0).is_err());
        assert!(filter.initialize(48000).is_ok());
        assert_eq!(filter.apply(&[0.0; 16]).unwrap().len(), 16);
    }

    #[test]
    fn test_lowpass_passes_dc() {
        let mut filter = DistanceLowpass::new();
        filter.initialize(48000).unwrap();
        let out = filter.apply(&vec![1.0; 4800]).unwrap();
        assert!((out[4799] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_cutoff_falls_with_distance() {
        let filter = DistanceLowpass::new();
        assert!((filter.cutoff_at(0.0) - 20_000.0).abs() < 1e-2);
        assert!(filter.cutoff_at(50.0) < filter.cutoff_at(10.0));
        assert_eq!(filter.cutoff_at(10_000.0), 1_000.0);
    }

    #[test]
    fn test_late_energy_is_darker() {
        // Alternating signal at Nyquist: early part loses less than late part
        let mut filter = DistanceLowpass::new();
        filter.initialize(48000).unwrap();
        let input: Vec<f32> = (0..48000).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let out = filter.apply(&input).unwrap();

        let early: f32 = out[100..200].iter().map(|s| s.abs()).sum();
        let late: f32 = out[40000..40100].iter().map(|s| s.abs()).sum();
        assert!(late < early);
    }
}
