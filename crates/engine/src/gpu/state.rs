use anyhow::{anyhow, Context as AnyhowContext, Result};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::debug;
use winit::dpi::PhysicalSize;

use crate::params::{DirtyBuffers, ParameterState};
use crate::types::PowerProfile;
use crate::variants::VariantRegistry;

use super::context::GpuContext;
use super::pipeline::{PipelineCache, PipelineKey, PipelineLayouts};
use super::uniforms::{UniformPacker, DATA_CHANNEL_BYTES, GLOBAL_UNIFORM_BYTES};

/// Tightly-packed RGBA8 pixels read back from an offscreen pass.
pub(crate) struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// GPU-side mirror of the parameter state: the four uniform buffers, their
/// bind group, and the pipeline cache. Owned exclusively by one
/// orchestrator and released wholesale on disposal.
pub(crate) struct GpuState {
    context: GpuContext,
    layouts: PipelineLayouts,
    global_buffer: wgpu::Buffer,
    data_channel_buffer: wgpu::Buffer,
    geometry_buffer: wgpu::Buffer,
    projection_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    packer: UniformPacker,
    pipeline_cache: PipelineCache,
}

impl GpuState {
    pub(crate) fn new<T>(
        target: &T,
        initial_size: PhysicalSize<u32>,
        power: PowerProfile,
        registry: &VariantRegistry,
        state: &ParameterState,
    ) -> Result<Self>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let context = GpuContext::new(target, initial_size, power)?;
        let layouts = PipelineLayouts::new(&context.device)?;

        let make_buffer = |label: &str, size: usize| {
            context.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: size as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };
        let global_buffer = make_buffer("global uniforms", GLOBAL_UNIFORM_BYTES);
        let data_channel_buffer = make_buffer("data channels", DATA_CHANNEL_BYTES);
        let geometry_buffer =
            make_buffer("geometry uniforms", registry.geometry_buffer_slots() * 4);
        let projection_buffer =
            make_buffer("projection uniforms", registry.projection_buffer_slots() * 4);

        let uniform_bind_group = context
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("uniform bind group"),
                layout: &layouts.uniform_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: global_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: data_channel_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: geometry_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: projection_buffer.as_entire_binding(),
                    },
                ],
            });

        let mut gpu = Self {
            context,
            layouts,
            global_buffer,
            data_channel_buffer,
            geometry_buffer,
            projection_buffer,
            uniform_bind_group,
            packer: UniformPacker::new(registry),
            pipeline_cache: PipelineCache::new(),
        };

        // Seed every buffer and warm the initial pipeline so the first
        // tick renders without a compilation stall.
        gpu.upload(registry, state, &DirtyBuffers::all());
        gpu.pipeline_cache.get_or_build(
            &gpu.context.device,
            &gpu.layouts,
            registry,
            gpu.context.surface_format,
            PipelineKey::new(state.geometry, state.projection),
        );

        Ok(gpu)
    }

    pub(crate) fn size(&self) -> PhysicalSize<u32> {
        self.context.size
    }

    pub(crate) fn adapter_name(&self) -> &str {
        &self.context.adapter_name
    }

    pub(crate) fn resize(&mut self, new_size: PhysicalSize<u32>) {
        self.context.resize(new_size);
    }

    pub(crate) fn reconfigure_surface(&self) {
        self.context.reconfigure();
    }

    /// Uploads exactly the buffers named in `dirty`.
    pub(crate) fn upload(
        &mut self,
        registry: &VariantRegistry,
        state: &ParameterState,
        dirty: &DirtyBuffers,
    ) {
        let queue = &self.context.queue;
        if dirty.global {
            let packed = UniformPacker::pack_global(state);
            queue.write_buffer(&self.global_buffer, 0, bytemuck::bytes_of(&packed));
        }
        if dirty.data_channels {
            let packed = UniformPacker::pack_data_channels(state);
            queue.write_buffer(&self.data_channel_buffer, 0, bytemuck::bytes_of(&packed));
        }
        if dirty.geometry {
            let packed = self.packer.pack_geometry(registry, state);
            queue.write_buffer(&self.geometry_buffer, 0, bytemuck::cast_slice(packed));
        }
        if dirty.projection {
            let packed = self.packer.pack_projection(registry, state);
            queue.write_buffer(&self.projection_buffer, 0, bytemuck::cast_slice(packed));
        }
    }

    /// Renders one frame to the surface. Returns `Ok(false)` without
    /// touching the swapchain when the active pair has no usable pipeline,
    /// leaving the previous frame on screen.
    pub(crate) fn render(
        &mut self,
        registry: &VariantRegistry,
        state: &ParameterState,
    ) -> Result<bool, wgpu::SurfaceError> {
        let key = PipelineKey::new(state.geometry, state.projection);
        let Some(pipeline) = self.pipeline_cache.get_or_build(
            &self.context.device,
            &self.layouts,
            registry,
            self.context.surface_format,
            key,
        ) else {
            return Ok(false);
        };

        let frame = self.context.surface.get_current_texture()?;
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("render encoder"),
                });
        self.encode_pass(&mut encoder, &view, &pipeline.pipeline, state);
        self.context.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        Ok(true)
    }

    /// One synchronous offscreen pass at the requested size, read back as
    /// tightly-packed RGBA8. Shares the pipeline cache and uniform buffers
    /// with the surface path; the periodic loop's cadence is untouched.
    pub(crate) fn render_offscreen(
        &mut self,
        registry: &VariantRegistry,
        state: &ParameterState,
        width: u32,
        height: u32,
    ) -> Result<RawFrame> {
        let width = width.max(1);
        let height = height.max(1);
        let key = PipelineKey::new(state.geometry, state.projection);
        let pipeline = self
            .pipeline_cache
            .get_or_build(
                &self.context.device,
                &self.layouts,
                registry,
                self.context.surface_format,
                key,
            )
            .ok_or_else(|| anyhow!("no usable pipeline for {}", key.label()))?;

        let texture = self.context.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("snapshot target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.context.surface_format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let unpadded_bytes_per_row = width * 4;
        let padded_bytes_per_row = padded_bytes_per_row(width);
        let staging = self.context.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("snapshot staging"),
            size: u64::from(padded_bytes_per_row) * u64::from(height),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        // The offscreen pass samples the same uniforms at the requested
        // size, so the global block briefly carries the snapshot
        // resolution.
        let mut snapshot_state = state.clone();
        snapshot_state.set_resolution(width, height);
        let packed = UniformPacker::pack_global(&snapshot_state);
        self.context
            .queue
            .write_buffer(&self.global_buffer, 0, bytemuck::bytes_of(&packed));

        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("snapshot encoder"),
                });
        self.encode_pass(&mut encoder, &view, &pipeline.pipeline, state);
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.context.queue.submit(std::iter::once(encoder.finish()));

        // Restore the live resolution before the next tick uploads.
        let packed = UniformPacker::pack_global(state);
        self.context
            .queue
            .write_buffer(&self.global_buffer, 0, bytemuck::bytes_of(&packed));

        let slice = staging.slice(..);
        let (sender, receiver) = crossbeam_channel::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.context
            .device
            .poll(wgpu::PollType::Wait)
            .map_err(|err| anyhow!("device poll failed during readback: {err:?}"))?;
        receiver
            .recv()
            .context("snapshot readback channel closed")?
            .context("failed to map snapshot staging buffer")?;

        let padded = slice.get_mapped_range().to_vec();
        staging.unmap();

        let rows = strip_row_padding(
            &padded,
            padded_bytes_per_row as usize,
            unpadded_bytes_per_row as usize,
            height as usize,
        );
        let rgba = surface_bytes_to_rgba(self.context.surface_format, rows);
        debug!(width, height, "captured offscreen frame");

        Ok(RawFrame {
            width,
            height,
            rgba,
        })
    }

    fn encode_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        view: &wgpu::TextureView,
        pipeline: &wgpu::RenderPipeline,
        state: &ParameterState,
    ) {
        let background = state.colors.background;
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("render pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color {
                        r: f64::from(background[0]),
                        g: f64::from(background[1]),
                        b: f64::from(background[2]),
                        a: 1.0,
                    }),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        render_pass.set_pipeline(pipeline);
        render_pass.set_bind_group(0, &self.uniform_bind_group, &[]);
        render_pass.draw(0..3, 0..1);
    }
}

/// Rounds a row of RGBA8 pixels up to wgpu's copy alignment.
fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// Drops the per-row alignment padding a texture-to-buffer copy imposes.
fn strip_row_padding(
    padded: &[u8],
    padded_bytes_per_row: usize,
    unpadded_bytes_per_row: usize,
    rows: usize,
) -> Vec<u8> {
    if padded_bytes_per_row == unpadded_bytes_per_row {
        return padded[..unpadded_bytes_per_row * rows].to_vec();
    }
    let mut packed = Vec::with_capacity(unpadded_bytes_per_row * rows);
    for row in 0..rows {
        let start = row * padded_bytes_per_row;
        packed.extend_from_slice(&padded[start..start + unpadded_bytes_per_row]);
    }
    packed
}

/// Normalizes readback bytes to RGBA8 channel order.
fn surface_bytes_to_rgba(format: wgpu::TextureFormat, mut bytes: Vec<u8>) -> Vec<u8> {
    match format {
        wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb => {
            for pixel in bytes.chunks_exact_mut(4) {
                pixel.swap(0, 2);
            }
            bytes
        }
        _ => bytes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_padding_rounds_to_copy_alignment() {
        assert_eq!(padded_bytes_per_row(64), 256);
        assert_eq!(padded_bytes_per_row(63), 256);
        assert_eq!(padded_bytes_per_row(65), 512);
        assert_eq!(padded_bytes_per_row(128), 512);
    }

    #[test]
    fn strip_row_padding_drops_tail_bytes() {
        // Two rows of three meaningful bytes padded to a stride of five.
        let padded = vec![1, 2, 3, 0, 0, 4, 5, 6, 0, 0];
        let packed = strip_row_padding(&padded, 5, 3, 2);
        assert_eq!(packed, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn strip_row_padding_is_a_copy_when_already_tight() {
        let padded = vec![1, 2, 3, 4, 5, 6];
        let packed = strip_row_padding(&padded, 3, 3, 2);
        assert_eq!(packed, padded);
    }

    #[test]
    fn bgra_readback_swizzles_to_rgba() {
        let bytes = vec![10, 20, 30, 255, 40, 50, 60, 128];
        let rgba = surface_bytes_to_rgba(wgpu::TextureFormat::Bgra8Unorm, bytes);
        assert_eq!(rgba, vec![30, 20, 10, 255, 60, 50, 40, 128]);
    }

    #[test]
    fn rgba_readback_passes_through() {
        let bytes = vec![10, 20, 30, 255];
        let rgba = surface_bytes_to_rgba(wgpu::TextureFormat::Rgba8Unorm, bytes.clone());
        assert_eq!(rgba, bytes);
    }
}
