use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};

use tracing::{debug, warn};

use crate::compile::{
    assemble_fragment_source, compile_fragment_shader, compile_vertex_shader,
    DATA_CHANNEL_BINDING, GEOMETRY_BINDING, GLOBAL_BINDING, PROJECTION_BINDING,
};
use crate::types::{GeometryType, ProjectionMethod};
use crate::variants::VariantRegistry;

/// Bind group layout (one group, four uniform buffers) plus the shared
/// vertex module; created once and reused by every cached pipeline.
pub(crate) struct PipelineLayouts {
    pub uniform_layout: wgpu::BindGroupLayout,
    pub vertex_module: wgpu::ShaderModule,
}

impl PipelineLayouts {
    pub fn new(device: &wgpu::Device) -> Result<Self> {
        let entries = [
            GLOBAL_BINDING,
            DATA_CHANNEL_BINDING,
            GEOMETRY_BINDING,
            PROJECTION_BINDING,
        ]
        .map(|binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        });
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("uniform layout"),
            entries: &entries,
        });

        let vertex_module = compile_vertex_shader(device)?;

        Ok(Self {
            uniform_layout,
            vertex_module,
        })
    }
}

/// Cache key for one compiled variant pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct PipelineKey {
    pub geometry: GeometryType,
    pub projection: ProjectionMethod,
}

impl PipelineKey {
    pub fn new(geometry: GeometryType, projection: ProjectionMethod) -> Self {
        Self {
            geometry,
            projection,
        }
    }

    pub fn label(&self) -> String {
        format!("{}/{}", self.geometry, self.projection)
    }
}

pub(crate) struct VariantPipeline {
    pub pipeline: wgpu::RenderPipeline,
}

/// Cheaply clonable reference to a cached pipeline.
#[derive(Clone)]
pub(crate) struct PipelineHandle(Arc<VariantPipeline>);

impl PipelineHandle {
    fn from_pipeline(pipeline: VariantPipeline) -> Self {
        Self(Arc::new(pipeline))
    }
}

impl Deref for PipelineHandle {
    type Target = VariantPipeline;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Lazily-populated pipeline cache keyed by variant pair.
///
/// The key space is bounded (geometries x projections), so entries are
/// never evicted; the cache dies with the orchestrator. Failed builds are
/// cached too: the fragments are static, so retrying the same pair every
/// frame would only repeat the same diagnostics.
pub(crate) struct PipelineCache {
    entries: HashMap<PipelineKey, Option<PipelineHandle>>,
}

impl PipelineCache {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Returns the pipeline for the pair, compiling at most once per key.
    /// `None` means the pair failed to compile; the caller skips the draw
    /// and keeps the previous frame on screen.
    pub fn get_or_build(
        &mut self,
        device: &wgpu::Device,
        layouts: &PipelineLayouts,
        registry: &VariantRegistry,
        surface_format: wgpu::TextureFormat,
        key: PipelineKey,
    ) -> Option<PipelineHandle> {
        self.lookup_or_insert(key, || {
            build_pipeline(device, layouts, registry, surface_format, key)
        })
    }

    /// Cache bookkeeping, separated from the GPU build so the
    /// compile-at-most-once contract is testable without a device.
    fn lookup_or_insert(
        &mut self,
        key: PipelineKey,
        build: impl FnOnce() -> Result<PipelineHandle>,
    ) -> Option<PipelineHandle> {
        if let Some(entry) = self.entries.get(&key) {
            return entry.clone();
        }

        let entry = match build() {
            Ok(handle) => {
                debug!(key = %key.label(), "compiled variant pipeline");
                Some(handle)
            }
            Err(err) => {
                warn!(
                    key = %key.label(),
                    error = %err,
                    "pipeline compilation failed; draws for this pair are skipped"
                );
                None
            }
        };
        self.entries.insert(key, entry.clone());
        entry
    }
}

fn build_pipeline(
    device: &wgpu::Device,
    layouts: &PipelineLayouts,
    registry: &VariantRegistry,
    surface_format: wgpu::TextureFormat,
    key: PipelineKey,
) -> Result<PipelineHandle> {
    let source = assemble_fragment_source(registry, key.geometry, key.projection);
    let label = key.label();

    // Validation failures in naga/wgpu surface through the error scope
    // rather than a return value; capture them so a broken fragment cannot
    // take down the render loop.
    device.push_error_scope(wgpu::ErrorFilter::Validation);

    let fragment_module = compile_fragment_shader(device, &source, &label);
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("variant pipeline layout"),
        bind_group_layouts: &[&layouts.uniform_layout],
        push_constant_ranges: &[],
    });

    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label.as_str()),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &layouts.vertex_module,
            entry_point: Some("main"),
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        fragment: Some(wgpu::FragmentState {
            module: &fragment_module,
            entry_point: Some("main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: surface_format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
        cache: None,
    });

    if let Some(error) = pollster::block_on(device.pop_error_scope()) {
        return Err(anyhow!("{error}"))
            .with_context(|| format!("pipeline validation failed for {label}"));
    }

    Ok(PipelineHandle::from_pipeline(VariantPipeline { pipeline }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn keys_hash_by_variant_pair() {
        let a = PipelineKey::new(GeometryType::Hypercube, ProjectionMethod::Perspective);
        let b = PipelineKey::new(GeometryType::Hypercube, ProjectionMethod::Perspective);
        let c = PipelineKey::new(GeometryType::Hypersphere, ProjectionMethod::Perspective);
        assert_eq!(a, b);
        assert_ne!(a, c);

        let mut seen = HashSet::new();
        for geometry in GeometryType::ALL {
            for projection in ProjectionMethod::ALL {
                seen.insert(PipelineKey::new(geometry, projection));
            }
        }
        // Bounded key space: 5 geometries x 3 projections.
        assert_eq!(seen.len(), 15);
    }

    #[test]
    fn key_label_is_slash_separated() {
        let key = PipelineKey::new(GeometryType::Duocylinder, ProjectionMethod::Stereographic);
        assert_eq!(key.label(), "duocylinder/stereographic");
    }

    #[test]
    fn builds_run_at_most_once_per_key() {
        let mut cache = PipelineCache::new();
        let key = PipelineKey::new(GeometryType::Hypercube, ProjectionMethod::Perspective);
        let mut attempts = 0;
        for _ in 0..3 {
            let entry = cache.lookup_or_insert(key, || {
                attempts += 1;
                Err(anyhow!("shader rejected"))
            });
            // A failed pair is cached too: the caller skips the draw.
            assert!(entry.is_none());
        }
        assert_eq!(attempts, 1);

        let other = PipelineKey::new(GeometryType::Hypersphere, ProjectionMethod::Perspective);
        cache.lookup_or_insert(other, || {
            attempts += 1;
            Err(anyhow!("shader rejected"))
        });
        assert_eq!(attempts, 2);
    }
}
