use anyhow::{Context, Result};
use petalsonic_ism::math::Vec3;
use petalsonic_ism::output::{ChannelSink, DistanceLowpass, IrUpload};
use petalsonic_ism::scene::RoomGeometry;
use petalsonic_ism::{ReverbEvent, ReverbWorld, SourceDesc, WorldDesc};
use std::sync::Arc;

/// Matches the default 62.5 fps target of `RenderSettings`
const FRAME_TIME: f64 = 0.016;

/// A source circling the listener inside a square room for about five seconds.
pub fn run_orbit() -> Result<()> {
    let room = Arc::new(RoomGeometry::square_room(Vec3::ZERO, 6.0, 4.0, None));
    let emitter = room.add_emitter(Vec3::new(3.0, 0.0, 0.0), 0.1);
    let sink = Arc::new(ChannelSink::new());

    let mut world = ReverbWorld::with_room(WorldDesc::new().seed(7), room.clone(), sink.clone())
        .context("Failed to create reverb world")?;
    world.settings_mut().set_reflection_order(3);
    world.set_listener_position(Vec3::ZERO);
    log::info!(
        "Room ready: {} mirror planes, listener at {:?}",
        world.registry().len(),
        world.listener_position()
    );

    let source = world.add_source(
        SourceDesc::at(Vec3::new(3.0, 0.0, 0.0))
            .with_label("orbiter")
            .with_update_interval(0.25),
    )?;
    log::info!("Source {} added", source);

    for frame in 0..300 {
        let angle = frame as f32 * FRAME_TIME as f32;
        let position = Vec3::new(3.0 * angle.cos(), 0.0, 3.0 * angle.sin());
        room.set_emitter_position(emitter, position);
        world.set_source_position(source, position)?;

        world.step(FRAME_TIME);
        report_uploads(&sink.drain());
        report_events(&world.poll_events());
    }

    if let Some(src) = world.source(source) {
        log::info!(
            "Orbit finished after {} frames: {} valid paths, {} diffuse contributions",
            world.frame_count(),
            src.valid_paths().len(),
            src.diffuse().total_contributions()
        );
    }
    Ok(())
}

/// A static source while one wall of a shoebox slides outwards.
pub fn run_moving_wall() -> Result<()> {
    let room = Arc::new(RoomGeometry::shoebox(
        Vec3::new(-4.0, -1.5, -3.0),
        Vec3::new(4.0, 1.5, 3.0),
        None,
    ));
    // First wall of a shoebox faces +X at the low end
    let sliding = room.walls()[0].clone();
    let source_position = Vec3::new(-1.0, 0.0, 1.0);
    room.add_emitter(source_position, 0.1);

    let sink = Arc::new(ChannelSink::bounded(8));
    let mut world = ReverbWorld::with_room(WorldDesc::new(), room, sink.clone())?;
    world.settings_mut().set_use_raycast(false);
    world.set_listener_position(Vec3::new(2.0, 0.5, -1.0));
    let source = world.add_source(SourceDesc::at(source_position).with_label("static"))?;

    for frame in 0..120 {
        if frame % 30 == 29 {
            sliding.translate(Vec3::new(-0.5, 0.0, 0.0));
            log::info!("Frame {}: wall moved to {:?}", frame, sliding.shape().center);
        }
        world.step(FRAME_TIME);

        let rebuilt = world
            .source(source)
            .filter(|src| src.last_changes().settings_changed);
        if let Some(src) = rebuilt {
            log::info!("Frame {}: paths rebuilt, {} valid", frame, src.valid_paths().len());
        }
        report_uploads(&sink.drain());
        report_events(&world.poll_events());
    }
    Ok(())
}

/// Distance lowpass on top of the impulse response, with one misconfigured run.
pub fn run_air_absorption() -> Result<()> {
    let room = Arc::new(RoomGeometry::square_room(Vec3::ZERO, 8.0, 4.0, None));
    room.add_emitter(Vec3::new(-6.0, 0.0, 0.0), 0.1);
    let sink = Arc::new(ChannelSink::new());
    let mut world = ReverbWorld::with_room(WorldDesc::new(), room, sink.clone())?;
    world.set_listener_position(Vec3::new(6.0, 0.0, 0.0));
    let source = world.add_source(SourceDesc::at(Vec3::new(-6.0, 0.0, 0.0)))?;

    for (name, filter) in [
        ("lowpass", DistanceLowpass::new()),
        ("broken", DistanceLowpass::new().with_rolloff_distance(-1.0)),
    ] {
        log::info!("Installing {} filter", name);
        world.set_air_absorption(Box::new(filter));
        for _ in 0..30 {
            world.step(FRAME_TIME);
            report_events(&world.poll_events());
        }
        let uploads = sink.drain();
        let peak = uploads
            .last()
            .map(|upload| upload.samples.iter().skip(1).fold(0.0f32, |m, s| m.max(s.abs())))
            .unwrap_or_default();
        log::info!(
            "{}: air absorption {}, {} uploads, late peak {:.5}",
            name,
            if world.settings().apply_air_absorption() { "on" } else { "off" },
            uploads.len(),
            peak
        );
    }

    world.remove_source(source)?;
    Ok(())
}

fn report_uploads(uploads: &[IrUpload]) {
    for upload in uploads {
        let energy: f32 = upload.samples.iter().map(|s| s * s).sum();
        log::debug!(
            "Uploaded {} to slot {} ({} samples, energy {:.4})",
            upload.label,
            upload.slot,
            upload.samples.len(),
            energy
        );
    }
}

fn report_events(events: &[ReverbEvent]) {
    let uploads = events.iter().filter_map(ReverbEvent::source_id).count();
    if uploads > 1 {
        log::debug!("{} sources uploaded this frame", uploads);
    }

    for event in events {
        if event.is_error() {
            log::warn!("Degraded frame: {:?}", event);
            continue;
        }
        match event {
            ReverbEvent::FrameTiming(timing) if timing.frame % 60 == 0 => log::info!(
                "Frame {}: {:.2} ms, budget {:.2} ms, {} rays, {} paths",
                timing.frame,
                timing.duration.as_secs_f64() * 1000.0,
                timing.time_budget * 1000.0,
                timing.rays_traced,
                timing.valid_paths
            ),
            _ => {}
        }
    }
}
