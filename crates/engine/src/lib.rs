//! polychora engine: render-state synchronization and pipeline caching for
//! the 4D visualizer.
//!
//! The [`Visualizer`] owns a [`params::ParameterState`], mirrors it into
//! four GPU uniform buffers (uploading only what changed), resolves the
//! active (geometry, projection) pair against a lazily-filled pipeline
//! cache, and drives one fullscreen-triangle draw per host frame callback.
//! External feeds steer it exclusively through typed
//! [`params::ParamUpdate`] batches; frames come back through the
//! `on_render` callback or one-shot offscreen [`Visualizer::snapshot`]
//! captures.

mod compile;
mod gpu;
pub mod params;
pub mod types;
pub mod variants;
pub mod window;

use std::io::Cursor;
use std::time::Instant;

use anyhow::Context as AnyhowContext;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, info, warn};
use winit::dpi::PhysicalSize;

use gpu::{GpuState, RawFrame};
use variants::VariantRegistry;

pub use params::{DirtyBuffers, ParamUpdate, ParamValue, ParameterState};
pub use types::{
    ColorScheme, EngineConfig, GeometryType, PowerProfile, ProjectionMethod, Snapshot,
    SnapshotFormat, SnapshotRequest, DATA_CHANNEL_COUNT,
};

/// Errors surfaced across the engine's public boundary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The instance was disposed; continuing to drive it is a caller bug.
    #[error("visualizer already disposed; `{operation}` is invalid")]
    Disposed { operation: &'static str },
    /// The operation needs GPU resources that only exist after
    /// [`Visualizer::initialize`] succeeds.
    #[error("visualizer not initialized; `{operation}` requires initialize() first")]
    NotReady { operation: &'static str },
    /// Backend/device acquisition or initial resource setup failed.
    #[error("initialization failed: {0:#}")]
    Init(anyhow::Error),
    /// The surface failed in a way the loop cannot recover from.
    #[error("unrecoverable surface error: {0}")]
    Surface(wgpu::SurfaceError),
    /// An offscreen capture failed.
    #[error("snapshot failed: {0:#}")]
    Snapshot(anyhow::Error),
}

/// Lifecycle phases of one visualizer instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Uninitialized,
    Ready,
    Rendering,
    Stopped,
    Disposed,
}

/// Read-only view of the state handed to the `on_render` callback.
#[derive(Debug, Clone, Copy)]
pub struct FrameInfo {
    pub time: f32,
    pub frame_index: u64,
    pub geometry: GeometryType,
    pub projection: ProjectionMethod,
    pub resolution: [f32; 2],
    pub is_full_screen_effect: bool,
}

type RenderCallback = Box<dyn FnMut(&FrameInfo)>;
type ErrorCallback = Box<dyn FnMut(&EngineError)>;

/// The orchestrator: parameter state, GPU buffers, pipeline cache, and the
/// per-frame submission sequence behind one façade.
pub struct Visualizer {
    config: EngineConfig,
    registry: VariantRegistry,
    state: ParameterState,
    dirty: DirtyBuffers,
    phase: Phase,
    gpu: Option<GpuState>,
    started_at: Option<Instant>,
    base_time: f32,
    frame_index: u64,
    fatal_reported: bool,
    on_render: Option<RenderCallback>,
    on_error: Option<ErrorCallback>,
}

impl Visualizer {
    /// Builds an uninitialized instance; no GPU work happens here, so
    /// multiple instances are freely constructible (tests included).
    pub fn new(config: EngineConfig) -> Self {
        let registry = VariantRegistry::new();
        let mut state = ParameterState::new(&registry);
        state.apply(&registry, &ParamUpdate::Geometry(config.geometry));
        state.apply(&registry, &ParamUpdate::Projection(config.projection));
        let (width, height) = config.surface_size;
        state.set_resolution(width, height);
        Self {
            config,
            registry,
            state,
            dirty: DirtyBuffers::all(),
            phase: Phase::Uninitialized,
            gpu: None,
            started_at: None,
            base_time: 0.0,
            frame_index: 0,
            fatal_reported: false,
            on_render: None,
            on_error: None,
        }
    }

    /// Invoked once per successfully rendered frame with a state snapshot.
    pub fn set_on_render(&mut self, callback: impl FnMut(&FrameInfo) + 'static) {
        self.on_render = Some(Box::new(callback));
    }

    /// Invoked exactly once if the instance hits an unrecoverable error.
    pub fn set_on_error(&mut self, callback: impl FnMut(&EngineError) + 'static) {
        self.on_error = Some(Box::new(callback));
    }

    /// Acquires the GPU backend against the host surface, allocates the
    /// four uniform buffers, seeds them from the current state, and warms
    /// the initial pipeline. The one blocking step of the lifecycle; must
    /// complete before [`Self::start`].
    pub fn initialize<T>(
        &mut self,
        target: &T,
        surface_size: PhysicalSize<u32>,
    ) -> Result<(), EngineError>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        match self.phase {
            Phase::Disposed => {
                return Err(EngineError::Disposed {
                    operation: "initialize",
                })
            }
            Phase::Uninitialized => {}
            _ => {
                debug!("initialize called twice; ignoring");
                return Ok(());
            }
        }

        self.state
            .set_resolution(surface_size.width.max(1), surface_size.height.max(1));
        match GpuState::new(
            target,
            surface_size,
            self.config.power,
            &self.registry,
            &self.state,
        ) {
            Ok(gpu) => {
                info!(
                    adapter = gpu.adapter_name(),
                    width = surface_size.width,
                    height = surface_size.height,
                    geometry = %self.state.geometry,
                    projection = %self.state.projection,
                    "visualizer initialized"
                );
                self.gpu = Some(gpu);
                self.dirty.clear();
                self.phase = Phase::Ready;
                Ok(())
            }
            Err(err) => {
                let error = EngineError::Init(err);
                self.report_fatal(&error);
                Err(error)
            }
        }
    }

    /// Begins consuming host frame callbacks. No-op when already
    /// rendering; valid from `Ready` and `Stopped`.
    pub fn start(&mut self) -> Result<(), EngineError> {
        match self.phase {
            Phase::Rendering => Ok(()),
            Phase::Ready | Phase::Stopped => {
                self.started_at = Some(Instant::now());
                self.base_time = self.state.time;
                self.phase = Phase::Rendering;
                Ok(())
            }
            Phase::Uninitialized => Err(EngineError::NotReady { operation: "start" }),
            Phase::Disposed => Err(EngineError::Disposed { operation: "start" }),
        }
    }

    /// Cancels future ticks; an in-flight GPU submission completes on its
    /// own. Idempotent.
    pub fn stop(&mut self) {
        if self.phase == Phase::Rendering {
            self.phase = Phase::Stopped;
            self.started_at = None;
        }
    }

    /// Applies a typed update batch. Effects reach GPU memory on the next
    /// tick; before initialization they only mutate CPU state, which the
    /// initial upload then seeds.
    pub fn update(&mut self, updates: &[ParamUpdate]) -> Result<(), EngineError> {
        if self.phase == Phase::Disposed {
            return Err(EngineError::Disposed {
                operation: "update",
            });
        }
        self.dirty.merge(self.state.apply_all(&self.registry, updates));
        Ok(())
    }

    /// Adopts a new host surface size (resize events from the runner).
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if let Some(gpu) = self.gpu.as_mut() {
            gpu.resize(new_size);
        }
        if self.state.set_resolution(new_size.width, new_size.height) {
            self.dirty.global = true;
        }
    }

    /// One host-clock tick: advance time, re-derive resolution, upload
    /// dirty buffers, draw. Returns whether a frame was actually
    /// presented; phases other than `Rendering` tick as no-ops.
    pub fn render_frame(&mut self) -> Result<bool, EngineError> {
        match self.phase {
            Phase::Disposed => {
                return Err(EngineError::Disposed {
                    operation: "render_frame",
                })
            }
            Phase::Rendering => {}
            _ => return Ok(false),
        }
        let Some(gpu) = self.gpu.as_mut() else {
            return Err(EngineError::NotReady {
                operation: "render_frame",
            });
        };

        if let Some(started_at) = self.started_at {
            self.state
                .advance_time(self.base_time + started_at.elapsed().as_secs_f32());
            self.dirty.global = true;
        }
        let surface_size = gpu.size();
        if self
            .state
            .set_resolution(surface_size.width, surface_size.height)
        {
            self.dirty.global = true;
        }

        gpu.upload(&self.registry, &self.state, &self.dirty);

        match gpu.render(&self.registry, &self.state) {
            Ok(drew) => {
                self.dirty.clear();
                if drew {
                    self.frame_index = self.frame_index.saturating_add(1);
                    let info = FrameInfo {
                        time: self.state.time,
                        frame_index: self.frame_index,
                        geometry: self.state.geometry,
                        projection: self.state.projection,
                        resolution: self.state.resolution,
                        is_full_screen_effect: self.state.is_full_screen_effect,
                    };
                    if let Some(callback) = self.on_render.as_mut() {
                        callback(&info);
                    }
                }
                Ok(drew)
            }
            Err(err @ (wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated)) => {
                warn!(error = ?err, "surface lost; reconfiguring");
                gpu.reconfigure_surface();
                Ok(false)
            }
            Err(wgpu::SurfaceError::Timeout) => {
                warn!("surface frame acquisition timed out; skipping tick");
                Ok(false)
            }
            Err(err) => {
                // Out of memory or device loss: fatal for this instance.
                self.stop();
                let error = EngineError::Surface(err);
                self.report_fatal(&error);
                Err(error)
            }
        }
    }

    /// One synchronous offscreen render at the requested size, sharing the
    /// live pipeline cache and uniform buffers. Does not advance the
    /// animation clock, so the periodic loop's cadence is untouched.
    pub fn snapshot(&mut self, request: SnapshotRequest) -> Result<Snapshot, EngineError> {
        if self.phase == Phase::Disposed {
            return Err(EngineError::Disposed {
                operation: "snapshot",
            });
        }
        let Some(gpu) = self.gpu.as_mut() else {
            return Err(EngineError::NotReady {
                operation: "snapshot",
            });
        };

        let surface_size = gpu.size();
        let width = request.width.unwrap_or(surface_size.width);
        let height = request.height.unwrap_or(surface_size.height);
        let raw = gpu
            .render_offscreen(&self.registry, &self.state, width, height)
            .map_err(EngineError::Snapshot)?;
        encode_snapshot(raw, request.format, request.quality).map_err(EngineError::Snapshot)
    }

    /// Stops the loop, releases every GPU resource (buffers, pipelines,
    /// device), and poisons the instance; all further driving calls fail
    /// with [`EngineError::Disposed`].
    pub fn dispose(&mut self) {
        self.stop();
        self.gpu = None;
        self.phase = Phase::Disposed;
    }

    /// Current parameter values (read-only).
    pub fn state(&self) -> &ParameterState {
        &self.state
    }

    /// Buffers currently pending upload; cleared by the next tick.
    pub fn dirty(&self) -> DirtyBuffers {
        self.dirty
    }

    pub fn is_rendering(&self) -> bool {
        self.phase == Phase::Rendering
    }

    pub fn is_disposed(&self) -> bool {
        self.phase == Phase::Disposed
    }

    fn report_fatal(&mut self, error: &EngineError) {
        if self.fatal_reported {
            return;
        }
        self.fatal_reported = true;
        if let Some(callback) = self.on_error.as_mut() {
            callback(error);
        }
    }
}

/// Wraps raw readback pixels into the requested snapshot encoding.
fn encode_snapshot(
    raw: RawFrame,
    format: SnapshotFormat,
    quality: Option<u8>,
) -> anyhow::Result<Snapshot> {
    let RawFrame {
        width,
        height,
        rgba,
    } = raw;
    let bytes = match format {
        SnapshotFormat::Buffer => rgba,
        SnapshotFormat::Png => {
            let image = image::RgbaImage::from_raw(width, height, rgba)
                .context("snapshot pixel buffer has unexpected size")?;
            let mut cursor = Cursor::new(Vec::new());
            image::DynamicImage::ImageRgba8(image)
                .write_to(&mut cursor, image::ImageFormat::Png)
                .context("failed to encode PNG snapshot")?;
            cursor.into_inner()
        }
        SnapshotFormat::Jpeg => {
            let image = image::RgbaImage::from_raw(width, height, rgba)
                .context("snapshot pixel buffer has unexpected size")?;
            let rgb = image::DynamicImage::ImageRgba8(image).to_rgb8();
            let mut cursor = Cursor::new(Vec::new());
            let quality = quality.unwrap_or(90).clamp(1, 100);
            let mut encoder =
                image::codecs::jpeg::JpegEncoder::new_with_quality(&mut cursor, quality);
            encoder
                .encode_image(&rgb)
                .context("failed to encode JPEG snapshot")?;
            cursor.into_inner()
        }
    };
    Ok(Snapshot {
        width,
        height,
        format,
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DATA_CHANNEL_COUNT;

    fn visualizer() -> Visualizer {
        Visualizer::new(EngineConfig::default())
    }

    #[test]
    fn updates_before_initialization_mutate_cpu_state() {
        let mut viz = visualizer();
        viz.update(&[ParamUpdate::GridDensity(11.0)]).unwrap();
        assert_eq!(viz.state().grid_density, 11.0);
        assert!(viz.dirty().global);
    }

    #[test]
    fn start_requires_initialization() {
        let mut viz = visualizer();
        assert!(!viz.is_rendering());
        assert!(matches!(
            viz.start(),
            Err(EngineError::NotReady { operation: "start" })
        ));
        assert!(!viz.is_rendering());
    }

    #[test]
    fn disposed_instances_fail_loudly() {
        let mut viz = visualizer();
        viz.dispose();
        assert!(viz.is_disposed());
        assert!(matches!(
            viz.update(&[ParamUpdate::Time(1.0)]),
            Err(EngineError::Disposed { .. })
        ));
        assert!(matches!(viz.start(), Err(EngineError::Disposed { .. })));
        assert!(matches!(
            viz.snapshot(SnapshotRequest::new(SnapshotFormat::Buffer)),
            Err(EngineError::Disposed { .. })
        ));
        assert!(matches!(
            viz.render_frame(),
            Err(EngineError::Disposed { .. })
        ));
    }

    #[test]
    fn dispose_and_stop_are_idempotent() {
        let mut viz = visualizer();
        viz.stop();
        viz.stop();
        viz.dispose();
        viz.dispose();
        assert!(viz.is_disposed());
    }

    #[test]
    fn config_selections_seed_the_state() {
        let config = EngineConfig {
            geometry: GeometryType::FullScreenLattice,
            projection: ProjectionMethod::Stereographic,
            ..EngineConfig::default()
        };
        let viz = Visualizer::new(config);
        assert_eq!(viz.state().geometry, GeometryType::FullScreenLattice);
        assert_eq!(viz.state().projection, ProjectionMethod::Stereographic);
        assert!(viz.state().is_full_screen_effect);
    }

    #[test]
    fn buffer_snapshot_encoding_passes_raw_bytes_through() {
        let raw = RawFrame {
            width: 2,
            height: 2,
            rgba: vec![255; 16],
        };
        let snapshot = encode_snapshot(raw, SnapshotFormat::Buffer, None).unwrap();
        assert_eq!(snapshot.bytes.len(), 16);
        assert_eq!(snapshot.width, 2);
    }

    #[test]
    fn png_snapshot_encoding_produces_png_magic() {
        let raw = RawFrame {
            width: 4,
            height: 4,
            rgba: vec![128; 64],
        };
        let snapshot = encode_snapshot(raw, SnapshotFormat::Png, None).unwrap();
        assert_eq!(&snapshot.bytes[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn jpeg_snapshot_encoding_produces_jpeg_magic() {
        let raw = RawFrame {
            width: 4,
            height: 4,
            rgba: vec![64; 64],
        };
        let snapshot = encode_snapshot(raw, SnapshotFormat::Jpeg, Some(75)).unwrap();
        assert_eq!(&snapshot.bytes[..2], b"\xff\xd8");
    }

    #[test]
    fn update_stream_accumulates_until_tick() {
        let mut viz = visualizer();
        viz.update(&[ParamUpdate::Time(0.5)]).unwrap();
        viz.update(&[ParamUpdate::DataChannels(Box::new(
            [0.5; DATA_CHANNEL_COUNT],
        ))])
        .unwrap();
        let dirty = viz.dirty();
        assert!(dirty.global);
        assert!(dirty.data_channels);
    }
}
