//! Windowed runner: drives a [`Visualizer`] from winit's frame clock.
//!
//! The runner owns the event loop and window, forwards resize/mouse input
//! into the parameter state, merges externally streamed update batches
//! before each tick, and optionally captures one snapshot to disk after
//! the first presented frame.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::Receiver;
use tracing::{error, info, warn};
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::WindowBuilder;

use crate::params::ParamUpdate;
use crate::types::{EngineConfig, SnapshotRequest};
use crate::Visualizer;

/// Write one capture to disk after the first presented frame.
#[derive(Debug, Clone)]
pub struct SnapshotJob {
    pub path: PathBuf,
    pub request: SnapshotRequest,
    /// Close the window once the file is written (still-export mode).
    pub exit_after: bool,
}

/// Everything the runner needs beyond the engine config itself.
pub struct RunOptions {
    pub config: EngineConfig,
    pub title: String,
    /// Batches produced by an external adapter (stdin stream, analytics
    /// feed); drained before every tick.
    pub updates: Option<Receiver<Vec<ParamUpdate>>>,
    pub snapshot: Option<SnapshotJob>,
}

/// Opens a window, initializes the visualizer against it, and runs until
/// the window closes or a fatal engine error stops the loop.
pub fn run(options: RunOptions) -> Result<()> {
    let RunOptions {
        config,
        title,
        updates,
        mut snapshot,
    } = options;

    let event_loop = EventLoop::new().map_err(|err| anyhow!("failed to create event loop: {err}"))?;
    let window_size = winit::dpi::PhysicalSize::new(config.surface_size.0, config.surface_size.1);
    let window = WindowBuilder::new()
        .with_title(title)
        .with_inner_size(window_size)
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create window: {err}"))?;

    let frame_interval = config
        .target_fps
        .filter(|fps| *fps > 0.0)
        .map(|fps| Duration::from_secs_f32(1.0 / fps));

    let mut visualizer = Visualizer::new(config);
    visualizer.set_on_error(|err| error!(error = %err, "visualizer reported a fatal error"));
    visualizer.set_on_render(|info| {
        if info.frame_index % 600 == 0 {
            tracing::debug!(
                frame = info.frame_index,
                time = info.time,
                geometry = %info.geometry,
                projection = %info.projection,
                "frame presented"
            );
        }
    });
    visualizer.initialize(&window, window.inner_size())?;
    visualizer.start()?;

    let mut next_frame = Instant::now();
    let mut result = Ok(());
    // The handler borrows the locals; `result` is read back once the loop
    // exits.
    event_loop
        .run(|event, elwt| match event {
            Event::WindowEvent { event, .. } => match event {
                WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                    visualizer.dispose();
                    elwt.exit();
                }
                WindowEvent::Resized(new_size) => {
                    visualizer.resize(new_size);
                }
                WindowEvent::CursorMoved { position, .. } => {
                    if visualizer.is_disposed() {
                        return;
                    }
                    let size = window.inner_size();
                    let x = (position.x / f64::from(size.width.max(1))).clamp(0.0, 1.0);
                    let y = 1.0 - (position.y / f64::from(size.height.max(1))).clamp(0.0, 1.0);
                    if let Err(err) = visualizer.update(&[ParamUpdate::Mouse([x as f32, y as f32])])
                    {
                        warn!(error = %err, "dropping mouse update");
                    }
                }
                WindowEvent::RedrawRequested => {
                    // Queued redraws may still arrive while the loop shuts
                    // down; a disposed instance must not be driven again.
                    if visualizer.is_disposed() {
                        return;
                    }
                    if let Some(receiver) = updates.as_ref() {
                        for batch in receiver.try_iter() {
                            if let Err(err) = visualizer.update(&batch) {
                                warn!(error = %err, "dropping streamed update batch");
                            }
                        }
                    }
                    match visualizer.render_frame() {
                        Ok(true) => {
                            if let Some(interval) = frame_interval {
                                next_frame = Instant::now() + interval;
                            }
                            if let Some(job) = snapshot.take() {
                                match capture(&mut visualizer, &job) {
                                    Ok(()) if job.exit_after => {
                                        visualizer.dispose();
                                        elwt.exit();
                                    }
                                    Ok(()) => {}
                                    Err(err) => {
                                        error!(error = %err, "snapshot capture failed");
                                        result = Err(err);
                                        visualizer.dispose();
                                        elwt.exit();
                                    }
                                }
                            }
                        }
                        Ok(false) => {}
                        Err(err) => {
                            result = Err(anyhow!(err));
                            visualizer.dispose();
                            elwt.exit();
                        }
                    }
                }
                _ => {}
            },
            Event::AboutToWait => match frame_interval {
                Some(_) => {
                    let now = Instant::now();
                    if now >= next_frame {
                        window.request_redraw();
                    } else {
                        elwt.set_control_flow(ControlFlow::WaitUntil(next_frame));
                    }
                }
                None => window.request_redraw(),
            },
            _ => {}
        })
        .map_err(|err| anyhow!("event loop failed: {err}"))?;

    result
}

fn capture(visualizer: &mut Visualizer, job: &SnapshotJob) -> Result<()> {
    let snapshot = visualizer.snapshot(job.request)?;
    fs::write(&job.path, &snapshot.bytes)
        .with_context(|| format!("failed to write snapshot to {}", job.path.display()))?;
    info!(
        path = %job.path.display(),
        width = snapshot.width,
        height = snapshot.height,
        "wrote snapshot"
    );
    Ok(())
}
