//! Per-source ray tracing time budget.

use std::time::Duration;

/// Splits the frame time among the active sources.
///
/// After each frame the budget for the next one is
/// `max((target - overspend) / active_sources, floor)`, where the overspend is
/// the part of the last frame that went beyond what was handed out
/// (`last_frame - budget * active_sources`, negative when the frame finished
/// early). The result never exceeds an even share of the target, so idle
/// frames cannot bank time.
#[derive(Debug, Clone)]
pub struct BudgetAllocator {
    target_frame_time: f64,
    floor: f64,
    budget: f64,
    /// No source was active in the last frame
    idle: bool,
}

impl BudgetAllocator {
    /// # Arguments
    /// * `target_frame_time` - Desired frame duration in seconds
    /// * `floor` - Smallest budget ever handed out, in seconds (must be positive)
    pub fn new(target_frame_time: f64, floor: f64) -> Self {
        Self {
            target_frame_time,
            floor,
            budget: floor,
            idle: true,
        }
    }

    /// Budget per source for the coming frame, in seconds
    pub fn budget(&self) -> f64 {
        self.budget
    }

    pub fn budget_duration(&self) -> Duration {
        Duration::from_secs_f64(self.budget)
    }

    pub fn floor(&self) -> f64 {
        self.floor
    }

    pub fn set_target_frame_time(&mut self, seconds: f64) {
        self.target_frame_time = seconds;
    }

    pub fn set_floor(&mut self, seconds: f64) {
        self.floor = seconds;
        self.budget = self.budget.max(seconds);
    }

    /// Even share of the target frame time, never below the floor
    fn share(&self, sources: f64) -> f64 {
        (self.target_frame_time / sources).max(self.floor)
    }

    /// Called before the sources run.
    ///
    /// The first frame with active sources after an idle one has no history to
    /// correct, so it starts from an even share of the target.
    pub fn begin_frame(&mut self, active_sources: usize) -> f64 {
        if self.idle && active_sources > 0 {
            self.budget = self.share(active_sources as f64);
            self.idle = false;
        }
        self.budget
    }

    /// Recomputes the budget from the length of the frame that just ended.
    ///
    /// `last_frame` is the whole frame as seen by the host, not just the time
    /// spent tracing. With no active source the budget falls back to the floor.
    pub fn end_frame(&mut self, last_frame: Duration, active_sources: usize) -> f64 {
        if active_sources == 0 {
            self.budget = self.floor;
            self.idle = true;
            return self.budget;
        }

        let sources = active_sources as f64;
        let overspend = last_frame.as_secs_f64() - self.budget * sources;
        let budget = (self.target_frame_time - overspend) / sources;
        // NaN from a broken clock also ends up on the floor
        self.budget = if budget > self.floor {
            budget.min(self.share(sources))
        } else {
            self.floor
        };

        log::trace!(
            "Frame took {:.3} ms, overspend {:.3} ms, next budget {:.3} ms for {} sources",
            last_frame.as_secs_f64() * 1e3,
            overspend * 1e3,
            self.budget * 1e3,
            active_sources
        );
        self.budget
    }
}
