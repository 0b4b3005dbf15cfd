//! Per-source reverb pipeline.
//!
//! A [`ReverbSource`] owns everything that belongs to one emitter: its image
//! source forest, its valid specular paths, its diffuse tracer, its noise and
//! its impulse response buffer. Nothing in here is shared between sources.

use crate::config::{MAX_IR_SLOTS, RenderSettings, SourceDesc};
use crate::diffuse::{DiffuseAccumulator, DiffuseTracer, TraceRequest, TraceStats};
use crate::error::{ReverbError, Result};
use crate::ism::{
    ImageSourceForest, ImageSourceGenerator, PathValidator, ValidPath, ValidationRequest,
};
use crate::math::{Vec3, positions_equal};
use crate::output::{AirAbsorptionStage, IrSink};
use crate::scene::{GeometryOracle, MaterialTable, MirrorPlane, SurfaceMaterial};
use crate::synth::Synthesizer;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// What changed since the previous frame.
///
/// Passed explicitly through the pipeline in place of hidden dirty flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameChanges {
    pub source_moved: bool,
    pub listener_moved: bool,
    /// Acoustic parameters or room geometry changed
    pub settings_changed: bool,
}

impl FrameChanges {
    /// True if the source or the listener moved
    pub fn locations_changed(&self) -> bool {
        self.source_moved || self.listener_moved
    }

    pub fn any(&self) -> bool {
        self.locations_changed() || self.settings_changed
    }
}

/// Shared, read-only state every source sees during one frame.
pub(crate) struct FrameContext<'a> {
    pub settings: &'a RenderSettings,
    pub planes: &'a [MirrorPlane],
    pub oracle: &'a dyn GeometryOracle,
    pub materials: &'a MaterialTable,
    pub sample_rate: u32,
    pub listener: Vec3,
    pub listener_moved: bool,
    pub time_budget: Duration,
    pub delta_time: f64,
}

/// What one source did during a frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceFrameReport {
    pub changes: FrameChanges,
    /// Specular paths were re-validated
    pub paths_rebuilt: bool,
    pub trace: TraceStats,
    pub valid_paths: usize,
    /// The impulse response was handed to the sink
    pub uploaded: bool,
}

pub struct ReverbSource {
    label: String,
    slot: usize,
    update_interval: f64,
    accumulate_results: bool,
    position: Vec3,
    last_position: Option<Vec3>,
    generator: ImageSourceGenerator,
    paths: Vec<ValidPath>,
    tracer: DiffuseTracer,
    synth: Synthesizer,
    ir: Vec<f32>,
    clock: f64,
    next_sync: f64,
    last_changes: FrameChanges,
}

impl ReverbSource {
    /// Creates a source with a buffer of `ir_len` samples.
    ///
    /// `seed` fixes the noise tail and the ray directions; `None` seeds from the OS.
    ///
    /// # Errors
    ///
    /// Returns an error if the upload slot is out of range.
    pub fn new(
        desc: &SourceDesc,
        ir_len: usize,
        sample_rate: u32,
        seed: Option<u64>,
    ) -> Result<Self> {
        if desc.slot >= MAX_IR_SLOTS {
            return Err(ReverbError::Configuration(format!(
                "IR slot {} is out of range (max {})",
                desc.slot,
                MAX_IR_SLOTS - 1
            )));
        }

        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let synth = Synthesizer::new(ir_len, sample_rate, &mut rng);
        let tracer = DiffuseTracer::new(ir_len, Some(rng.random()));

        let update_interval = if desc.update_interval.is_finite() {
            desc.update_interval.abs()
        } else {
            log::warn!(
                "Invalid update interval {} for '{}', uploading every frame",
                desc.update_interval,
                desc.label
            );
            0.0
        };

        Ok(Self {
            label: desc.label.clone(),
            slot: desc.slot,
            update_interval,
            accumulate_results: desc.accumulate_results,
            position: desc.position,
            last_position: None,
            generator: ImageSourceGenerator::new(),
            paths: Vec::new(),
            tracer,
            synth,
            ir: vec![0.0; ir_len],
            clock: 0.0,
            next_sync: 0.0,
            last_changes: FrameChanges::default(),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    pub fn set_accumulate_results(&mut self, accumulate: bool) {
        self.accumulate_results = accumulate;
    }

    /// The current impulse response; its length never changes
    pub fn impulse_response(&self) -> &[f32] {
        &self.ir
    }

    pub fn valid_paths(&self) -> &[ValidPath] {
        &self.paths
    }

    pub fn forest(&self) -> &ImageSourceForest {
        self.generator.forest()
    }

    pub fn diffuse(&self) -> &DiffuseAccumulator {
        self.tracer.accumulator()
    }

    /// Changes seen by the most recent frame
    pub fn last_changes(&self) -> FrameChanges {
        self.last_changes
    }

    /// Runs one frame of the pipeline and uploads the result when it is due.
    pub(crate) fn step(
        &mut self,
        ctx: &FrameContext<'_>,
        sink: &dyn IrSink,
        air_absorption: Option<&mut AirAbsorptionStage>,
    ) -> SourceFrameReport {
        let settings = ctx.settings;
        let changes = FrameChanges {
            source_moved: self
                .last_position
                .is_none_or(|last| !positions_equal(last, self.position)),
            listener_moved: ctx.listener_moved,
            settings_changed: settings.has_changed(),
        };
        let default_surface =
            SurfaceMaterial::new(settings.absorption(), settings.diffuse_proportion());
        let mut report = SourceFrameReport {
            changes,
            ..Default::default()
        };

        if changes.any() {
            if settings.use_ism() {
                self.generator.update(
                    self.position,
                    ctx.planes,
                    settings.reflection_order(),
                    changes.settings_changed,
                );
                let validator = PathValidator::new(settings.path_tolerance(), default_surface);
                self.paths = validator.validate(
                    self.generator.forest(),
                    ValidationRequest::new(ctx.listener, settings.max_ray_length()),
                    ctx.oracle,
                    ctx.materials,
                );
            } else {
                self.paths.clear();
            }
            report.paths_rebuilt = true;
        }
        report.valid_paths = self.paths.len();

        let reset = !self.accumulate_results || changes.any();
        if settings.use_raycast() {
            let request = TraceRequest {
                source: self.position,
                listener: ctx.listener,
                budget: ctx.time_budget,
                reset,
                sample_rate: ctx.sample_rate,
                speed_of_sound: settings.speed_of_sound(),
                max_ray_length: settings.max_ray_length(),
                specular_order: settings.reflection_order(),
                default_surface,
            };
            report.trace = self.tracer.trace(&request, ctx.oracle, ctx.materials);
        } else {
            self.tracer.reset();
        }
        if reset {
            log::trace!("'{}': diffuse accumulation restarted", self.label);
        }

        self.synth.set_speed_of_sound(settings.speed_of_sound());
        self.synth.synthesize(&self.paths, self.tracer.accumulator(), &mut self.ir);

        if settings.apply_air_absorption() {
            if let Some(stage) = air_absorption {
                stage.process(&mut self.ir);
            }
        }

        self.clock += ctx.delta_time;
        if self.clock >= self.next_sync {
            sink.upload(&self.ir, self.slot, &self.label);
            self.next_sync += self.update_interval;
            report.uploaded = true;
        }

        self.last_position = Some(self.position);
        self.last_changes = changes;
        report
    }
}

impl std::fmt::Debug for ReverbSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReverbSource")
            .field("label", &self.label)
            .field("slot", &self.slot)
            .field("position", &self.position)
            .field("ir_len", &self.ir.len())
            .field("valid_paths", &self.paths.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{ChannelSink, NullSink};
    use crate::scene::RoomGeometry;

    const FS: u32 = 8000;

    struct Fixture {
        room: RoomGeometry,
        planes: Vec<MirrorPlane>,
        materials: MaterialTable,
        settings: RenderSettings,
    }

    impl Fixture {
        fn new() -> Self {
            let room =
                RoomGeometry::shoebox(Vec3::new(-4.0, -2.0, -3.0), Vec3::new(5.0, 2.0, 4.0), None);
            room.add_emitter(Vec3::ZERO, 0.05);
            let planes = room
                .walls()
                .iter()
                .map(|w| MirrorPlane::new(w.shape().center, w.shape().normal))
                .collect();
            Self {
                room,
                planes,
                materials: MaterialTable::new(),
                settings: RenderSettings::default(),
            }
        }

        fn context(
            &self,
            listener_moved: bool,
            budget: Duration,
            delta_time: f64,
        ) -> FrameContext<'_> {
            FrameContext {
                settings: &self.settings,
                planes: &self.planes,
                oracle: &self.room,
                materials: &self.materials,
                sample_rate: FS,
                listener: Vec3::new(2.0, 0.5, 1.0),
                listener_moved,
                time_budget: budget,
                delta_time,
            }
        }
    }

    fn source(desc: SourceDesc) -> ReverbSource {
        ReverbSource::new(&desc, FS as usize, FS, Some(42)).unwrap()
    }

    #[test]
    fn test_slot_out_of_range() {
        let desc = SourceDesc::default().with_slot(MAX_IR_SLOTS);
        assert!(matches!(
            ReverbSource::new(&desc, 16, FS, Some(1)),
            Err(ReverbError::Configuration(_))
        ));
    }

    #[test]
    fn test_first_frame_builds_and_uploads() {
        let fixture = Fixture::new();
        let sink = ChannelSink::new();
        let mut src = source(SourceDesc::default().with_label("first").with_slot(3));

        let report = src.step(&fixture.context(true, Duration::from_millis(5), 0.016), &sink, None);
        assert!(report.changes.source_moved);
        assert!(report.paths_rebuilt);
        assert!(report.valid_paths > 0);
        assert!(report.uploaded);
        assert!(report.trace.rays > 0);

        let uploads = sink.drain();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].slot, 3);
        assert_eq!(uploads[0].label, "first");
        assert_eq!(uploads[0].samples.len(), FS as usize);
        assert_eq!(uploads[0].samples[0], 1.0);
    }

    #[test]
    fn test_static_frames_reuse_paths() {
        let mut fixture = Fixture::new();
        let mut src = source(SourceDesc::default());
        src.step(&fixture.context(true, Duration::ZERO, 0.016), &NullSink, None);
        fixture.settings.clear_changed();

        let report = src.step(&fixture.context(false, Duration::ZERO, 0.016), &NullSink, None);
        assert!(!report.changes.any());
        assert!(!report.paths_rebuilt);
        assert!(report.valid_paths > 0);

        src.set_position(Vec3::new(0.5, 0.0, 0.0));
        let report = src.step(&fixture.context(false, Duration::ZERO, 0.016), &NullSink, None);
        assert!(report.changes.source_moved);
        assert!(report.paths_rebuilt);
    }

    #[test]
    fn test_upload_cadence() {
        let fixture = Fixture::new();
        let sink = ChannelSink::new();
        let mut src = source(SourceDesc::default().with_update_interval(1.0));

        let uploads: Vec<bool> = (0..6)
            .map(|_| {
                src.step(&fixture.context(false, Duration::ZERO, 0.3), &sink, None)
                    .uploaded
            })
            .collect();
        // Uploads at clock 0.3; the next one is due at 1.0 and happens at 1.2
        assert_eq!(uploads, vec![true, false, false, true, false, false]);
        assert_eq!(sink.drain().len(), 2);
    }

    #[test]
    fn test_disabled_ism_clears_paths() {
        let mut fixture = Fixture::new();
        let mut src = source(SourceDesc::default());
        src.step(&fixture.context(true, Duration::ZERO, 0.016), &NullSink, None);
        assert!(!src.valid_paths().is_empty());

        fixture.settings.set_use_ism(false);
        src.step(&fixture.context(false, Duration::ZERO, 0.016), &NullSink, None);
        assert!(src.valid_paths().is_empty());
        assert_eq!(src.impulse_response()[0], 1.0);
        assert!(src.impulse_response()[1..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_disabled_raycast_keeps_diffuse_silent() {
        let mut fixture = Fixture::new();
        let mut src = source(SourceDesc::default());
        src.step(&fixture.context(true, Duration::from_millis(5), 0.016), &NullSink, None);
        assert!(!src.diffuse().is_silent());

        fixture.settings.set_use_raycast(false);
        for _ in 0..3 {
            let ctx = fixture.context(false, Duration::from_millis(5), 0.016);
            let report = src.step(&ctx, &NullSink, None);
            assert_eq!(report.trace, TraceStats::default());
            assert!(src.diffuse().is_silent());
            fixture.settings.clear_changed();
        }
    }

    #[test]
    fn test_accumulation_across_static_frames() {
        let mut fixture = Fixture::new();
        let mut src = source(SourceDesc::default());
        src.step(&fixture.context(true, Duration::from_millis(3), 0.016), &NullSink, None);
        fixture.settings.clear_changed();
        let first = src.diffuse().total_contributions();

        src.step(&fixture.context(false, Duration::from_millis(3), 0.016), &NullSink, None);
        assert!(src.diffuse().total_contributions() > first);

        src.set_accumulate_results(false);
        src.step(&fixture.context(false, Duration::ZERO, 0.016), &NullSink, None);
        assert!(src.diffuse().is_silent());
    }
}
