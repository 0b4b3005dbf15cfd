/// Configuration descriptor for a reverb world
#[derive(Debug, Clone)]
pub struct WorldDesc {
    /// Sample rate of every impulse response produced by the world
    pub sample_rate: u32,
    /// Maximum number of concurrently reverberated sources
    pub max_sources: usize,
    /// Seed for the per-source noise tails and ray directions.
    ///
    /// `None` seeds from the operating system, so every run differs. A fixed seed
    /// makes the noise and the order of traced rays reproducible (the number of
    /// rays per frame still depends on wall-clock time).
    pub seed: Option<u64>,
}

impl Default for WorldDesc {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            max_sources: 16,
            seed: None,
        }
    }
}

impl WorldDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    pub fn max_sources(mut self, max: usize) -> Self {
        self.max_sources = max;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}
