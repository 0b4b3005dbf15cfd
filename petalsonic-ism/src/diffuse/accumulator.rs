/// Running average of diffuse energy per impulse response sample.
///
/// Every sample keeps the mean of all contributions that landed on it and the
/// number of those contributions. The mean is updated online with
/// `avg += (x - avg) / count`, so nothing grows with the accumulation window.
#[derive(Debug, Clone, Default)]
pub struct DiffuseAccumulator {
    values: Vec<f32>,
    counts: Vec<u32>,
}

impl DiffuseAccumulator {
    /// Creates a silent accumulator covering `len` samples
    pub fn new(len: usize) -> Self {
        Self {
            values: vec![0.0; len],
            counts: vec![0; len],
        }
    }

    /// Folds `sample` into the average at `index`.
    ///
    /// Returns false (and changes nothing) if `index` is out of range.
    pub fn add(&mut self, index: usize, sample: f32) -> bool {
        let (Some(value), Some(count)) = (self.values.get_mut(index), self.counts.get_mut(index))
        else {
            return false;
        };
        *count = count.saturating_add(1);
        *value += (sample - *value) / *count as f32;
        true
    }

    /// Clears every average and count back to zero
    pub fn reset(&mut self) {
        self.values.fill(0.0);
        self.counts.fill(0);
    }

    /// Averaged energy per sample
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Number of contributions per sample
    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    pub fn get(&self, index: usize) -> Option<f32> {
        self.values.get(index).copied()
    }

    /// Total number of contributions over all samples
    pub fn total_contributions(&self) -> u64 {
        self.counts.iter().map(|&c| c as u64).sum()
    }

    /// True if no sample holds any energy
    pub fn is_silent(&self) -> bool {
        self.values.iter().all(|&v| v == 0.0)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_of_contributions() {
        let mut acc = DiffuseAccumulator::new(8);
        for v in [1.0, 2.0, 3.0, 6.0] {
            assert!(acc.add(3, v));
        }
        assert!((acc.get(3).unwrap() - 3.0).abs() < 1e-6);
        assert_eq!(acc.counts()[3], 4);
        assert_eq!(acc.get(2), Some(0.0));
        assert_eq!(acc.total_contributions(), 4);
    }

    #[test]
    fn test_out_of_range_is_ignored() {
        let mut acc = DiffuseAccumulator::new(4);
        assert!(!acc.add(4, 1.0));
        assert!(acc.is_silent());
        assert_eq!(acc.total_contributions(), 0);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut acc = DiffuseAccumulator::new(4);
        acc.add(0, 0.5);
        acc.add(1, 0.25);
        assert!(!acc.is_silent());

        acc.reset();
        assert!(acc.is_silent());
        assert!(acc.counts().iter().all(|&c| c == 0));
        assert_eq!(acc.len(), 4);
    }
}
