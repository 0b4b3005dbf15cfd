/// Speed of sound in air (m/s)
pub const SPEED_OF_SOUND: f32 = 343.15;

/// Acoustic parameters shared by every reverberated source.
///
/// Setters normalise malformed input instead of rejecting it so that the frame
/// loop can always proceed. Any setter that changes a value marks the settings
/// as changed; [`ReverbWorld::step`](crate::ReverbWorld::step) turns that mark
/// into a rebuild of every source's impulse response and clears it at the end
/// of the frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSettings {
    absorption: f32,
    diffuse_proportion: f32,
    ir_length: f32,
    reflection_order: u32,
    use_ism: bool,
    use_raycast: bool,
    apply_air_absorption: bool,
    target_frame_time: f64,
    speed_of_sound: f32,
    path_tolerance: f32,
    budget_floor: f64,
    changed: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            absorption: 0.8,
            diffuse_proportion: 0.2,
            ir_length: 1.0,
            reflection_order: 2,
            use_ism: true,
            use_raycast: true,
            apply_air_absorption: false,
            target_frame_time: 0.016,
            speed_of_sound: SPEED_OF_SOUND,
            path_tolerance: 0.2,
            budget_floor: 0.001,
            // The first frame always builds every impulse response.
            changed: true,
        }
    }
}

impl RenderSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default wall absorption in [0, 1], used when a surface has no material
    pub fn absorption(&self) -> f32 {
        self.absorption
    }

    pub fn set_absorption(&mut self, absorption: f32) {
        let absorption = clamp_unit("absorption", absorption);
        self.mark_if(self.absorption != absorption);
        self.absorption = absorption;
    }

    /// Default proportion of reflected energy that scatters diffusely, in [0, 1]
    pub fn diffuse_proportion(&self) -> f32 {
        self.diffuse_proportion
    }

    pub fn set_diffuse_proportion(&mut self, diffuse_proportion: f32) {
        let diffuse_proportion = clamp_unit("diffuse_proportion", diffuse_proportion);
        self.mark_if(self.diffuse_proportion != diffuse_proportion);
        self.diffuse_proportion = diffuse_proportion;
    }

    /// Length of the impulse response in seconds
    pub fn ir_length(&self) -> f32 {
        self.ir_length
    }

    /// Sets the IR length. Buffers of existing sources keep their length; only
    /// the maximum contributing ray length follows the new value.
    pub fn set_ir_length(&mut self, seconds: f32) {
        if !seconds.is_finite() || seconds == 0.0 {
            log::warn!("Ignoring invalid IR length {}", seconds);
            return;
        }
        let seconds = seconds.abs();
        self.mark_if(self.ir_length != seconds);
        self.ir_length = seconds;
    }

    /// Number of reflections simulated with the image source method
    pub fn reflection_order(&self) -> u32 {
        self.reflection_order
    }

    /// Sets the reflection order. Negative input is normalised to its absolute value.
    pub fn set_reflection_order(&mut self, order: i32) {
        if order < 0 {
            log::warn!(
                "Negative reflection order {} normalised to {}",
                order,
                order.unsigned_abs()
            );
        }
        let order = order.unsigned_abs();
        self.mark_if(self.reflection_order != order);
        self.reflection_order = order;
    }

    pub fn use_ism(&self) -> bool {
        self.use_ism
    }

    pub fn set_use_ism(&mut self, enabled: bool) {
        self.mark_if(self.use_ism != enabled);
        self.use_ism = enabled;
    }

    pub fn use_raycast(&self) -> bool {
        self.use_raycast
    }

    pub fn set_use_raycast(&mut self, enabled: bool) {
        self.mark_if(self.use_raycast != enabled);
        self.use_raycast = enabled;
    }

    pub fn apply_air_absorption(&self) -> bool {
        self.apply_air_absorption
    }

    pub fn set_apply_air_absorption(&mut self, enabled: bool) {
        self.mark_if(self.apply_air_absorption != enabled);
        self.apply_air_absorption = enabled;
    }

    /// Desired wall-clock time per frame in seconds
    pub fn target_frame_time(&self) -> f64 {
        self.target_frame_time
    }

    pub fn target_fps(&self) -> f64 {
        1.0 / self.target_frame_time
    }

    pub fn set_target_fps(&mut self, fps: f64) {
        if !fps.is_finite() || fps <= 0.0 {
            log::warn!("Ignoring invalid target frame rate {}", fps);
            return;
        }
        self.target_frame_time = 1.0 / fps;
    }

    pub fn speed_of_sound(&self) -> f32 {
        self.speed_of_sound
    }

    pub fn set_speed_of_sound(&mut self, speed: f32) {
        if !speed.is_finite() || speed <= 0.0 {
            log::warn!("Ignoring invalid speed of sound {}", speed);
            return;
        }
        self.mark_if(self.speed_of_sound != speed);
        self.speed_of_sound = speed;
    }

    /// Distance tolerance for plane membership and arrival tests in path validation
    pub fn path_tolerance(&self) -> f32 {
        self.path_tolerance
    }

    pub fn set_path_tolerance(&mut self, tolerance: f32) {
        if !tolerance.is_finite() {
            log::warn!("Ignoring invalid path tolerance {}", tolerance);
            return;
        }
        let tolerance = tolerance.abs();
        self.mark_if(self.path_tolerance != tolerance);
        self.path_tolerance = tolerance;
    }

    /// Smallest per-source ray tracing budget in seconds
    pub fn budget_floor(&self) -> f64 {
        self.budget_floor
    }

    pub fn set_budget_floor(&mut self, seconds: f64) {
        if !seconds.is_finite() || seconds <= 0.0 {
            log::warn!("Ignoring invalid budget floor {}", seconds);
            return;
        }
        self.budget_floor = seconds;
    }

    /// Maximum length of a ray that still contributes to the impulse response
    pub fn max_ray_length(&self) -> f32 {
        self.ir_length * self.speed_of_sound
    }

    /// Whether any simulation-critical value changed since the last frame
    pub fn has_changed(&self) -> bool {
        self.changed
    }

    /// Forces every source to rebuild its impulse response on the next frame
    pub fn request_update(&mut self) {
        self.changed = true;
    }

    pub(crate) fn clear_changed(&mut self) {
        self.changed = false;
    }

    pub fn with_absorption(mut self, absorption: f32) -> Self {
        self.set_absorption(absorption);
        self
    }

    pub fn with_diffuse_proportion(mut self, diffuse_proportion: f32) -> Self {
        self.set_diffuse_proportion(diffuse_proportion);
        self
    }

    pub fn with_ir_length(mut self, seconds: f32) -> Self {
        self.set_ir_length(seconds);
        self
    }

    pub fn with_reflection_order(mut self, order: i32) -> Self {
        self.set_reflection_order(order);
        self
    }

    pub fn with_use_ism(mut self, enabled: bool) -> Self {
        self.set_use_ism(enabled);
        self
    }

    pub fn with_use_raycast(mut self, enabled: bool) -> Self {
        self.set_use_raycast(enabled);
        self
    }

    pub fn with_target_fps(mut self, fps: f64) -> Self {
        self.set_target_fps(fps);
        self
    }

    pub fn with_path_tolerance(mut self, tolerance: f32) -> Self {
        self.set_path_tolerance(tolerance);
        self
    }

    fn mark_if(&mut self, differs: bool) {
        self.changed |= differs;
    }
}

fn clamp_unit(name: &str, value: f32) -> f32 {
    if value.is_nan() {
        log::warn!("{} is NaN, using 0.0", name);
        return 0.0;
    }
    let clamped = value.clamp(0.0, 1.0);
    if clamped != value {
        log::warn!("{} {} clamped to {}", name, value, clamped);
    }
    clamped
}
