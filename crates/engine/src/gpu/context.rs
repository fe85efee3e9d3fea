use anyhow::{anyhow, Context as AnyhowContext, Result};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::dpi::PhysicalSize;

use crate::types::PowerProfile;

impl PowerProfile {
    fn wgpu_preference(self) -> wgpu::PowerPreference {
        match self {
            PowerProfile::LowPower => wgpu::PowerPreference::LowPower,
            PowerProfile::HighPerformance => wgpu::PowerPreference::HighPerformance,
        }
    }
}

/// wgpu instance/surface/device bundle backing one visualizer.
pub(crate) struct GpuContext {
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub surface_config: wgpu::SurfaceConfiguration,
    pub size: PhysicalSize<u32>,
    pub surface_format: wgpu::TextureFormat,
    pub adapter_name: String,
    // Kept alive for the surface, which was created from its raw handles.
    _instance: wgpu::Instance,
}

impl GpuContext {
    /// Acquires backend, surface, adapter, and device. Device acquisition
    /// is the one genuinely asynchronous step of initialization; it is
    /// resolved here with a blocking wait.
    pub(crate) fn new<T>(
        target: &T,
        initial_size: PhysicalSize<u32>,
        power: PowerProfile,
    ) -> Result<Self>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
            backend_options: wgpu::BackendOptions::default(),
        });

        let raw_display = target
            .display_handle()
            .map_err(|err| anyhow!("display handle unavailable: {err}"))?
            .as_raw();
        let raw_window = target
            .window_handle()
            .map_err(|err| anyhow!("window handle unavailable: {err}"))?
            .as_raw();
        // The target only has to outlive this call, so the surface is built
        // from raw handles rather than an owned window.
        let surface = unsafe {
            instance.create_surface_unsafe(wgpu::SurfaceTargetUnsafe::RawHandle {
                raw_display_handle: raw_display,
                raw_window_handle: raw_window,
            })
        }
        .context("surface creation failed")?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: power.wgpu_preference(),
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .context("no compatible GPU adapter")?;
        let adapter_info = adapter.get_info();
        tracing::debug!(
            name = %adapter_info.name,
            backend = ?adapter_info.backend,
            device_type = ?adapter_info.device_type,
            "selected GPU adapter"
        );

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("polychora device"),
            required_features: wgpu::Features::empty(),
            required_limits: adapter.limits(),
            memory_hints: wgpu::MemoryHints::MemoryUsage,
            trace: wgpu::Trace::default(),
        }))
        .context("GPU device request rejected")?;

        let caps = surface.get_capabilities(&adapter);
        let surface_format = pick_surface_format(&caps);
        let size = PhysicalSize::new(initial_size.width.max(1), initial_size.height.max(1));
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode: pick_present_mode(&caps),
            alpha_mode: caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        Ok(Self {
            surface,
            device,
            queue,
            surface_config,
            size,
            surface_format,
            adapter_name: adapter_info.name,
            _instance: instance,
        })
    }

    pub(crate) fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        self.size = new_size;
        self.surface_config.width = new_size.width;
        self.surface_config.height = new_size.height;
        self.surface.configure(&self.device, &self.surface_config);
    }

    /// Re-applies the current configuration after a Lost/Outdated surface.
    pub(crate) fn reconfigure(&self) {
        self.surface.configure(&self.device, &self.surface_config);
    }
}

/// Shaders emit gamma-encoded color directly, and snapshots read the
/// rendered bytes back verbatim, so a non-sRGB swapchain format keeps the
/// presented and captured pixels identical.
fn pick_surface_format(caps: &wgpu::SurfaceCapabilities) -> wgpu::TextureFormat {
    caps.formats
        .iter()
        .copied()
        .find(|format| !format.is_srgb())
        .unwrap_or(caps.formats[0])
}

fn pick_present_mode(caps: &wgpu::SurfaceCapabilities) -> wgpu::PresentMode {
    if caps.present_modes.contains(&wgpu::PresentMode::Fifo) {
        wgpu::PresentMode::Fifo
    } else {
        caps.present_modes[0]
    }
}
