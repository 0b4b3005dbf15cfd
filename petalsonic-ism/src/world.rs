use crate::budget::BudgetAllocator;
use crate::config::{RenderSettings, SourceDesc, WorldDesc};
use crate::error::{ReverbError, Result};
use crate::events::{FrameTimingEvent, ReverbEvent};
use crate::math::{Vec3, positions_equal};
use crate::output::{AirAbsorptionFilter, AirAbsorptionStage, IrSink};
use crate::scene::{GeometryOracle, MaterialTable, MirrorPlaneRegistry, RoomBoundary, RoomGeometry};
use crate::source::{FrameContext, ReverbSource};
use crossbeam_channel::{Receiver, Sender};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Lightweight, type-safe handle for reverberated sources.
///
/// Returned by [`ReverbWorld::add_source`] and used for every later operation
/// on that source.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u64);

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SourceId({})", self.0)
    }
}

/// Main world object that computes room impulse responses.
///
/// `ReverbWorld` is driven by an external loop: the host updates positions and
/// settings between frames and calls [`step`](Self::step) once per frame. Each
/// step refreshes the mirror planes, runs every source's pipeline within its
/// share of the frame budget, and uploads impulse responses that are due.
///
/// # Example
///
/// ```
/// use petalsonic_ism::math::Vec3;
/// use petalsonic_ism::output::NullSink;
/// use petalsonic_ism::scene::RoomGeometry;
/// use petalsonic_ism::{ReverbWorld, SourceDesc, WorldDesc};
/// use std::sync::Arc;
///
/// let room = Arc::new(RoomGeometry::shoebox(Vec3::splat(-4.0), Vec3::splat(4.0), None));
/// room.add_emitter(Vec3::ZERO, 0.05);
///
/// let mut world = ReverbWorld::with_room(WorldDesc::default().seed(7), room, Arc::new(NullSink))?;
/// let id = world.add_source(SourceDesc::at(Vec3::ZERO))?;
/// world.set_listener_position(Vec3::new(2.0, 0.0, 1.0));
/// world.step(1.0 / 60.0);
///
/// assert_eq!(world.impulse_response(id).unwrap()[0], 1.0);
/// # Ok::<(), petalsonic_ism::ReverbError>(())
/// ```
pub struct ReverbWorld {
    desc: WorldDesc,
    settings: RenderSettings,
    registry: MirrorPlaneRegistry,
    oracle: Arc<dyn GeometryOracle>,
    materials: MaterialTable,
    sink: Arc<dyn IrSink>,
    air_absorption: Option<AirAbsorptionStage>,
    budget: BudgetAllocator,
    listener: Vec3,
    last_listener: Option<Vec3>,
    sources: HashMap<SourceId, ReverbSource>,
    next_source_id: u64,
    frame: u64,
    event_sender: Sender<ReverbEvent>,
    event_receiver: Receiver<ReverbEvent>,
}

impl ReverbWorld {
    /// Creates a world over the host's geometry.
    ///
    /// # Arguments
    ///
    /// * `desc` - Sample rate, source limit and seed
    /// * `oracle` - Ray intersection queries against the scene
    /// * `boundaries` - Objects contributing mirror planes; fixed for the lifetime of the world
    /// * `sink` - Destination of finished impulse responses
    ///
    /// # Errors
    ///
    /// Returns an error if the sample rate or the source limit is zero.
    pub fn new(
        desc: WorldDesc,
        oracle: Arc<dyn GeometryOracle>,
        boundaries: Vec<Arc<dyn RoomBoundary>>,
        sink: Arc<dyn IrSink>,
    ) -> Result<Self> {
        if desc.sample_rate == 0 {
            return Err(ReverbError::Configuration("Sample rate must be positive".into()));
        }
        if desc.max_sources == 0 {
            return Err(ReverbError::Configuration(
                "A world needs room for at least one source".into(),
            ));
        }

        let settings = RenderSettings::default();
        let budget = BudgetAllocator::new(settings.target_frame_time(), settings.budget_floor());
        let registry = MirrorPlaneRegistry::construct(boundaries);
        let (event_sender, event_receiver) = crossbeam_channel::unbounded();

        log::info!(
            "Reverb world created: {} Hz, up to {} sources, {} mirror planes",
            desc.sample_rate,
            desc.max_sources,
            registry.len()
        );

        Ok(Self {
            desc,
            settings,
            registry,
            oracle,
            materials: MaterialTable::new(),
            sink,
            air_absorption: None,
            budget,
            listener: Vec3::ZERO,
            last_listener: None,
            sources: HashMap::new(),
            next_source_id: 0,
            frame: 0,
            event_sender,
            event_receiver,
        })
    }

    /// Creates a world whose geometry is a [`RoomGeometry`]
    pub fn with_room(
        desc: WorldDesc,
        room: Arc<RoomGeometry>,
        sink: Arc<dyn IrSink>,
    ) -> Result<Self> {
        let boundaries = room.boundaries();
        Self::new(desc, room, boundaries, sink)
    }

    pub fn sample_rate(&self) -> u32 {
        self.desc.sample_rate
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// Mutable access to the acoustic parameters.
    ///
    /// Changes take effect on the next [`step`](Self::step).
    pub fn settings_mut(&mut self) -> &mut RenderSettings {
        &mut self.settings
    }

    pub fn materials(&self) -> &MaterialTable {
        &self.materials
    }

    /// Mutable access to the material table; every source rebuilds on the next step
    pub fn materials_mut(&mut self) -> &mut MaterialTable {
        self.settings.request_update();
        &mut self.materials
    }

    pub fn registry(&self) -> &MirrorPlaneRegistry {
        &self.registry
    }

    /// Installs an air absorption filter.
    ///
    /// On success the filter is enabled. If it fails to initialize the world
    /// keeps running without it and reports the bypass as an event.
    pub fn set_air_absorption(&mut self, filter: Box<dyn AirAbsorptionFilter>) {
        let mut stage = AirAbsorptionStage::new(filter, self.desc.sample_rate);
        let active = stage.is_active();
        if let Some(reason) = stage.take_bypass_notice() {
            self.send_event(ReverbEvent::AirAbsorptionBypassed { reason });
        }
        self.settings.set_apply_air_absorption(active);
        self.air_absorption = Some(stage);
    }

    /// Removes the air absorption filter and disables the effect
    pub fn clear_air_absorption(&mut self) {
        self.air_absorption = None;
        self.settings.set_apply_air_absorption(false);
    }

    pub fn air_absorption(&self) -> Option<&AirAbsorptionStage> {
        self.air_absorption.as_ref()
    }

    /// Adds a reverberated source.
    ///
    /// Its impulse response has `ceil(ir_length * sample_rate)` samples, fixed
    /// for the source's lifetime. The first step after creation uploads it.
    ///
    /// # Errors
    ///
    /// Returns an error if the world is full or the upload slot is out of range.
    pub fn add_source(&mut self, desc: SourceDesc) -> Result<SourceId> {
        if self.sources.len() >= self.desc.max_sources {
            return Err(ReverbError::Configuration(format!(
                "Source limit reached ({} sources)",
                self.desc.max_sources
            )));
        }

        let ir_len = (self.settings.ir_length() * self.desc.sample_rate as f32).ceil() as usize;
        let id = SourceId(self.next_source_id);
        let seed = self.desc.seed.map(|seed| seed.wrapping_add(id.0));
        let source = ReverbSource::new(&desc, ir_len, self.desc.sample_rate, seed)?;
        self.next_source_id += 1;

        log::info!(
            "Added {} '{}' at {:?}: {} samples, slot {}",
            id,
            desc.label,
            desc.position,
            ir_len,
            desc.slot
        );
        self.sources.insert(id, source);
        Ok(id)
    }

    /// Removes a source.
    ///
    /// # Errors
    ///
    /// Returns an error if the source does not exist.
    pub fn remove_source(&mut self, id: SourceId) -> Result<()> {
        if self.sources.remove(&id).is_none() {
            return Err(ReverbError::UnknownSource(id));
        }
        log::info!("Removed {}", id);
        Ok(())
    }

    /// Moves a source; the move is picked up by the next step.
    ///
    /// # Errors
    ///
    /// Returns an error if the source does not exist.
    pub fn set_source_position(&mut self, id: SourceId, position: Vec3) -> Result<()> {
        let source = self.sources.get_mut(&id).ok_or(ReverbError::UnknownSource(id))?;
        source.set_position(position);
        Ok(())
    }

    pub fn set_listener_position(&mut self, position: Vec3) {
        self.listener = position;
    }

    pub fn listener_position(&self) -> Vec3 {
        self.listener
    }

    pub fn source(&self, id: SourceId) -> Option<&ReverbSource> {
        self.sources.get(&id)
    }

    /// Returns the ids of every source, in creation order
    pub fn source_ids(&self) -> Vec<SourceId> {
        let mut ids: Vec<SourceId> = self.sources.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// The latest impulse response of a source
    pub fn impulse_response(&self, id: SourceId) -> Option<&[f32]> {
        self.sources.get(&id).map(|source| source.impulse_response())
    }

    /// Ray tracing time per source for the next frame, in seconds
    pub fn time_budget(&self) -> f64 {
        self.budget.budget()
    }

    /// Runs one frame.
    ///
    /// `delta_time` is the host's frame time in seconds. It drives the upload
    /// schedule of every source and, together with the time spent inside this
    /// call, the ray tracing budget of the next frame. A step never fails:
    /// problems inside a frame are logged and only degrade the result.
    pub fn step(&mut self, delta_time: f64) -> FrameTimingEvent {
        let started = Instant::now();

        if self.registry.refresh() {
            self.settings.request_update();
        }
        self.check_air_absorption();
        self.budget.set_target_frame_time(self.settings.target_frame_time());
        self.budget.set_floor(self.settings.budget_floor());

        let listener_moved = self
            .last_listener
            .is_none_or(|last| !positions_equal(last, self.listener));
        if self.settings.has_changed() {
            log::debug!(
                "Frame {}: settings or geometry changed, rebuilding every source",
                self.frame
            );
        }

        self.oracle.begin_frame();
        self.budget.begin_frame(self.sources.len());

        let ctx = FrameContext {
            settings: &self.settings,
            planes: self.registry.planes(),
            oracle: self.oracle.as_ref(),
            materials: &self.materials,
            sample_rate: self.desc.sample_rate,
            listener: self.listener,
            listener_moved,
            time_budget: self.budget.budget_duration(),
            delta_time,
        };

        let mut rays_traced = 0;
        let mut valid_paths = 0;
        for (&id, source) in self.sources.iter_mut() {
            let report = source.step(&ctx, self.sink.as_ref(), self.air_absorption.as_mut());
            rays_traced += report.trace.rays;
            valid_paths += report.valid_paths;
            if report.uploaded {
                log::trace!("Uploaded {} to slot {}", id, source.slot());
                let _ = self.event_sender.send(ReverbEvent::IrUploaded {
                    source_id: id,
                    slot: source.slot(),
                });
            }
        }

        self.oracle.end_frame();

        let notice = self
            .air_absorption
            .as_mut()
            .and_then(|stage| stage.take_bypass_notice());
        if let Some(reason) = notice {
            self.settings.set_apply_air_absorption(false);
            self.send_event(ReverbEvent::AirAbsorptionBypassed { reason });
        }

        let duration = started.elapsed();
        // A frame lasts at least as long as this step took
        let frame_length = Duration::try_from_secs_f64(delta_time)
            .unwrap_or_default()
            .max(duration);
        let time_budget = self.budget.end_frame(frame_length, self.sources.len());
        self.settings.clear_changed();
        self.last_listener = Some(self.listener);

        let timing = FrameTimingEvent {
            frame: self.frame,
            duration,
            time_budget,
            rays_traced,
            valid_paths,
        };
        self.frame += 1;
        self.send_event(ReverbEvent::FrameTiming(timing.clone()));
        timing
    }

    /// Returns every event emitted since the last call
    pub fn poll_events(&self) -> Vec<ReverbEvent> {
        self.event_receiver.try_iter().collect()
    }

    /// Number of frames stepped so far
    pub fn frame_count(&self) -> u64 {
        self.frame
    }

    /// Frame time the budget allocator aims for
    pub fn target_frame_duration(&self) -> Duration {
        Duration::from_secs_f64(self.settings.target_frame_time())
    }

    /// Turns the air absorption flag off if nothing can honour it
    fn check_air_absorption(&mut self) {
        if !self.settings.apply_air_absorption() {
            return;
        }
        let active = self.air_absorption.as_ref().is_some_and(|stage| stage.is_active());
        if !active {
            log::warn!("Air absorption requested but no working filter is installed, disabling it");
            self.settings.set_apply_air_absorption(false);
            self.send_event(ReverbEvent::AirAbsorptionBypassed {
                reason: "no air absorption filter installed".into(),
            });
        }
    }

    fn send_event(&self, event: ReverbEvent) {
        // The world owns the receiver, so the channel cannot be disconnected
        let _ = self.event_sender.send(event);
    }
}

impl std::fmt::Debug for ReverbWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReverbWorld")
            .field("desc", &self.desc)
            .field("settings", &self.settings)
            .field("planes", &self.registry.len())
            .field("sources", &self.sources.len())
            .field("listener", &self.listener)
            .field("frame", &self.frame)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{ChannelSink, DistanceLowpass};

    fn world_with_sink() -> (ReverbWorld, Arc<ChannelSink>, Arc<RoomGeometry>) {
        let room = Arc::new(RoomGeometry::shoebox(Vec3::splat(-4.0), Vec3::splat(4.0), None));
        room.add_emitter(Vec3::ZERO, 0.05);
        let sink = Arc::new(ChannelSink::new());
        let desc = WorldDesc::default().sample_rate(8000).seed(3);
        let mut world = ReverbWorld::with_room(desc, room.clone(), sink.clone()).unwrap();
        world.set_listener_position(Vec3::new(1.5, 0.5, -1.0));
        (world, sink, room)
    }

    #[test]
    fn test_invalid_world_desc() {
        let room = Arc::new(RoomGeometry::new());
        let sink: Arc<dyn IrSink> = Arc::new(ChannelSink::new());
        let zero_rate = WorldDesc::default().sample_rate(0);
        assert!(ReverbWorld::with_room(zero_rate, room.clone(), sink.clone()).is_err());
        assert!(ReverbWorld::with_room(WorldDesc::default().max_sources(0), room, sink).is_err());
    }

    #[test]
    fn test_source_lifecycle() {
        let (mut world, _, _) = world_with_sink();
        let a = world.add_source(SourceDesc::at(Vec3::ZERO)).unwrap();
        let b = world.add_source(SourceDesc::at(Vec3::ONE).with_slot(1)).unwrap();
        assert_ne!(a, b);
        assert_eq!(world.source_ids(), vec![a, b]);
        assert_eq!(world.impulse_response(a).unwrap().len(), 8000);

        world.set_source_position(b, Vec3::new(0.5, 0.0, 0.0)).unwrap();
        assert_eq!(world.source(b).unwrap().position(), Vec3::new(0.5, 0.0, 0.0));

        world.remove_source(a).unwrap();
        assert!(matches!(world.remove_source(a), Err(ReverbError::UnknownSource(id)) if id == a));
        assert!(world.set_source_position(a, Vec3::ZERO).is_err());
        assert_eq!(world.source_count(), 1);
    }

    #[test]
    fn test_source_limit() {
        let room = Arc::new(RoomGeometry::new());
        let mut world = ReverbWorld::with_room(
            WorldDesc::default().max_sources(1),
            room,
            Arc::new(ChannelSink::new()),
        )
        .unwrap();
        world.add_source(SourceDesc::default()).unwrap();
        assert!(world.add_source(SourceDesc::default()).is_err());
    }

    #[test]
    fn test_step_uploads_and_reports() {
        let (mut world, sink, _) = world_with_sink();
        let id = world
            .add_source(SourceDesc::at(Vec3::ZERO).with_slot(5).with_label("voice"))
            .unwrap();

        let timing = world.step(0.016);
        assert_eq!(timing.frame, 0);
        assert!(timing.valid_paths > 0);
        assert!(!world.settings().has_changed());

        let uploads = sink.drain();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].slot, 5);
        assert_eq!(uploads[0].label, "voice");

        let events = world.poll_events();
        assert!(events.contains(&ReverbEvent::IrUploaded { source_id: id, slot: 5 }));
        let uploaded: Vec<SourceId> = events.iter().filter_map(ReverbEvent::source_id).collect();
        assert_eq!(uploaded, vec![id]);
        assert!(!events.iter().any(ReverbEvent::is_error));
        assert!(events.iter().any(|e| matches!(e, ReverbEvent::FrameTiming(t) if t.frame == 0)));
        assert!(world.poll_events().is_empty());
    }

    #[test]
    fn test_budget_stays_bounded_while_tracing_is_off() {
        let (mut world, _, _) = world_with_sink();
        world.add_source(SourceDesc::at(Vec3::ZERO)).unwrap();
        world.settings_mut().set_use_raycast(false);
        let target = world.settings().target_frame_time();

        for _ in 0..300 {
            let timing = world.step(1.0 / 60.0);
            assert!(timing.time_budget <= target + 1e-9, "budget {}", timing.time_budget);
        }
        assert!(world.time_budget() <= target + 1e-9);

        world.settings_mut().set_use_raycast(true);
        let started = Instant::now();
        let timing = world.step(1.0 / 60.0);
        assert!(timing.rays_traced > 0);
        // One frame's share plus slack for a slow machine, not the banked idle time
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_long_frames_shrink_budget_to_floor() {
        let (mut world, _, _) = world_with_sink();
        world.add_source(SourceDesc::at(Vec3::ZERO)).unwrap();
        world.settings_mut().set_use_raycast(false);

        // Host reports 100 ms frames against a 16 ms target
        world.step(0.1);
        assert_eq!(world.time_budget(), world.settings().budget_floor());

        // Invalid frame times count as the time spent in the step itself
        world.step(f64::NAN);
        world.step(-1.0);
        assert!(world.time_budget() <= world.settings().target_frame_time());
    }

    #[test]
    fn test_moving_wall_triggers_rebuild() {
        let (mut world, _, room) = world_with_sink();
        let id = world.add_source(SourceDesc::at(Vec3::ZERO)).unwrap();
        world.step(0.016);
        world.step(0.016);
        assert!(!world.source(id).unwrap().last_changes().any());

        room.walls()[0].translate(Vec3::new(-0.5, 0.0, 0.0));
        world.step(0.016);
        assert!(world.source(id).unwrap().last_changes().settings_changed);
        assert!((world.registry().planes()[0].center.x + 4.5).abs() < 1e-6);
    }

    #[test]
    fn test_listener_move_is_detected() {
        let (mut world, _, _) = world_with_sink();
        let id = world.add_source(SourceDesc::at(Vec3::ZERO)).unwrap();
        world.step(0.016);
        world.set_listener_position(Vec3::new(-1.0, 0.0, 2.0));
        world.step(0.016);
        let changes = world.source(id).unwrap().last_changes();
        assert!(changes.listener_moved);
        assert!(!changes.source_moved);
    }

    #[test]
    fn test_air_absorption_without_filter_is_disabled() {
        let (mut world, _, _) = world_with_sink();
        world.settings_mut().set_apply_air_absorption(true);
        world.step(0.016);
        assert!(!world.settings().apply_air_absorption());
        assert!(
            world
                .poll_events()
                .iter()
                .any(|e| matches!(e, ReverbEvent::AirAbsorptionBypassed { .. }))
        );
    }

    #[test]
    fn test_air_absorption_filter_is_applied() {
        let (mut world, _, _) = world_with_sink();
        world.set_air_absorption(Box::new(DistanceLowpass::new().with_cutoffs(2000.0, 500.0)));
        assert!(world.settings().apply_air_absorption());
        assert!(world.air_absorption().unwrap().is_active());

        let id = world.add_source(SourceDesc::at(Vec3::ZERO)).unwrap();
        world.step(0.016);
        // The lowpass smears the dry impulse
        let ir = world.impulse_response(id).unwrap();
        assert!(ir[0] > 0.0 && ir[0] < 1.0);
        assert!(world.settings().apply_air_absorption());
    }

    #[test]
    fn test_failing_filter_reports_bypass() {
        let (mut world, _, _) = world_with_sink();
        world.set_air_absorption(Box::new(DistanceLowpass::new().with_rolloff_distance(-1.0)));
        assert!(!world.settings().apply_air_absorption());
        assert!(!world.air_absorption().unwrap().is_active());
        assert!(
            world
                .poll_events()
                .iter()
                .any(|e| matches!(e, ReverbEvent::AirAbsorptionBypassed { .. }))
        );
    }
}
