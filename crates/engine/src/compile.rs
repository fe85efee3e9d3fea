//! Shader assembly: stitches the shared prelude, the generated uniform
//! block declarations, and the active variant fragments into one GLSL
//! fragment shader, then hands the result to naga's GLSL frontend.

use std::borrow::Cow;

use anyhow::Result;
use wgpu::naga::ShaderStage;

use crate::types::{GeometryType, ProjectionMethod};
use crate::variants::{GroupLayout, VariantRegistry};

/// Binding slots inside the engine's single bind group. The packer, the
/// generated GLSL, and the bind group layout all index off these.
pub(crate) const GLOBAL_BINDING: u32 = 0;
pub(crate) const DATA_CHANNEL_BINDING: u32 = 1;
pub(crate) const GEOMETRY_BINDING: u32 = 2;
pub(crate) const PROJECTION_BINDING: u32 = 3;

/// Compiles the static full-screen triangle vertex shader.
pub(crate) fn compile_vertex_shader(device: &wgpu::Device) -> Result<wgpu::ShaderModule> {
    Ok(device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("fullscreen triangle vertex"),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Borrowed(VERTEX_SHADER_GLSL),
            stage: ShaderStage::Vertex,
            defines: &[],
        },
    }))
}

/// Compiles an assembled fragment shader for one (geometry, projection)
/// pair. Validation errors surface through the caller's error scope, not
/// here.
pub(crate) fn compile_fragment_shader(
    device: &wgpu::Device,
    source: &str,
    label: &str,
) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Owned(source.to_owned()),
            stage: ShaderStage::Fragment,
            defines: &[],
        },
    })
}

/// Builds the complete fragment shader source for a variant pair.
///
/// Layout mirrors the packed buffers exactly: the global block is
/// hand-written against `GlobalUniforms`, the data channels ride in
/// `vec4[16]` so std140 array striding cannot stretch them, and the two
/// variant blocks are generated from the same field tables the packer
/// walks.
pub(crate) fn assemble_fragment_source(
    registry: &VariantRegistry,
    geometry: GeometryType,
    projection: ProjectionMethod,
) -> String {
    let geometry_fragment = registry.geometry_fragment(geometry);
    let projection_fragment = registry.projection_fragment(projection);
    let geometry_block = uniform_block_glsl(
        "GeometryParams",
        "geom",
        GEOMETRY_BINDING,
        registry.geometry_layout(geometry),
    );
    let projection_block = uniform_block_glsl(
        "ProjectionParams",
        "proj",
        PROJECTION_BINDING,
        registry.projection_layout(projection),
    );
    format!(
        "{HEADER}\n{geometry_block}\n{projection_block}\n{HELPERS}\n{projection_source}\n{geometry_source}\n{FOOTER}",
        projection_source = projection_fragment.source,
        geometry_source = geometry_fragment.source,
    )
}

/// Emits one std140 uniform block whose member offsets reproduce the
/// packer's slot layout; gaps become explicit `float` padding members.
fn uniform_block_glsl(
    block_name: &str,
    instance: &str,
    binding: u32,
    layout: &GroupLayout,
) -> String {
    let mut body = String::new();
    let mut cursor = 0usize;
    let mut pad_index = 0usize;
    for field in layout.fields() {
        while cursor < field.offset {
            body.push_str(&format!("    float _pad{pad_index};\n"));
            pad_index += 1;
            cursor += 1;
        }
        body.push_str(&format!(
            "    {} {};\n",
            field.kind.glsl_type(),
            field.name
        ));
        cursor += field.kind.components();
    }
    if layout.fields().is_empty() {
        body.push_str("    vec4 _reserved0;\n");
    }
    format!(
        "layout(std140, set = 0, binding = {binding}) uniform {block_name} {{\n{body}}} {instance};\n"
    )
}

/// Shared prelude: global uniforms, data channels, and the fragment
/// interface. The global block layout must match `GlobalUniforms` in
/// `gpu/uniforms.rs` slot for slot.
const HEADER: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 outColor;

layout(std140, set = 0, binding = 0) uniform GlobalParams {
    vec2 u_resolution;
    float u_time;
    float _globalPad0;
    float u_dimension;
    float u_morphFactor;
    float u_rotationSpeed;
    float u_universeModifier;
    float u_patternIntensity;
    float u_gridDensity;
    float u_latticeGridDensity;
    float u_lineThickness;
    float u_shellWidth;
    float u_tetraThickness;
    float u_glitchIntensity;
    float u_colorShift;
    vec2 u_mouse;
    uint u_isFullScreenEffect;
    float _globalPad1;
    vec3 u_primaryColor;
    vec3 u_secondaryColor;
    vec3 u_backgroundColor;
};

layout(std140, set = 0, binding = 1) uniform DataChannelParams {
    vec4 u_dataChannels[16];
};

float dataChannel(int index) {
    return u_dataChannels[index >> 2][index & 3];
}
";

/// 4D rotation planes involving W, plus the hue-rotation used by the
/// footer's palette handling.
const HELPERS: &str = r"
mat4 rotXW(float angle) {
    float c = cos(angle);
    float s = sin(angle);
    return mat4(
        c, 0.0, 0.0, -s,
        0.0, 1.0, 0.0, 0.0,
        0.0, 0.0, 1.0, 0.0,
        s, 0.0, 0.0, c);
}

mat4 rotYW(float angle) {
    float c = cos(angle);
    float s = sin(angle);
    return mat4(
        1.0, 0.0, 0.0, 0.0,
        0.0, c, 0.0, -s,
        0.0, 0.0, 1.0, 0.0,
        0.0, s, 0.0, c);
}

mat4 rotZW(float angle) {
    float c = cos(angle);
    float s = sin(angle);
    return mat4(
        1.0, 0.0, 0.0, 0.0,
        0.0, 1.0, 0.0, 0.0,
        0.0, 0.0, c, -s,
        0.0, 0.0, s, c);
}

vec3 hueShift(vec3 color, float shift) {
    float angle = shift * 6.2831853;
    float s = sin(angle);
    float c = cos(angle);
    mat3 rot = mat3(
        0.299 + 0.701 * c + 0.168 * s, 0.587 - 0.587 * c + 0.330 * s, 0.114 - 0.114 * c - 0.497 * s,
        0.299 - 0.299 * c - 0.328 * s, 0.587 + 0.413 * c + 0.035 * s, 0.114 - 0.114 * c + 0.292 * s,
        0.299 - 0.300 * c + 1.250 * s, 0.587 - 0.588 * c - 1.050 * s, 0.114 + 0.886 * c - 0.203 * s);
    return clamp(color * rot, 0.0, 1.0);
}
";

/// Shared shading path: sample the active geometry's lattice, split the
/// channels when glitching, tint, and composite over the background.
const FOOTER: &str = r"
void main() {
    vec2 uv = gl_FragCoord.xy / u_resolution;
    vec2 centered = uv - 0.5;
    centered.x *= u_resolution.x / max(u_resolution.y, 1.0);

    vec3 samplePoint = vec3(centered * 2.2, 0.6 + 0.35 * sin(u_time * 0.13));
    samplePoint.xy += (u_mouse - 0.5) * 1.4;

    float glitch = u_glitchIntensity * (0.55 + 0.45 * sin(u_time * 7.3));
    vec3 shift = vec3(glitch * 0.05, glitch * 0.03, 0.0);

    float valueG = clamp(latticeValue(samplePoint) * u_patternIntensity, 0.0, 1.0);
    float valueR = valueG;
    float valueB = valueG;
    if (glitch > 0.001) {
        valueR = clamp(latticeValue(samplePoint + shift) * u_patternIntensity, 0.0, 1.0);
        valueB = clamp(latticeValue(samplePoint - shift) * u_patternIntensity, 0.0, 1.0);
    }

    vec3 primary = hueShift(u_primaryColor, u_colorShift);
    vec3 secondary = hueShift(u_secondaryColor, u_colorShift);
    vec3 color = mix(u_backgroundColor, primary, vec3(valueR, valueG, valueB));
    color += secondary * valueG * valueG * 0.6;

    if (u_isFullScreenEffect != 0u) {
        color = mix(u_backgroundColor, primary, valueG) + secondary * valueG * 0.35;
    }

    outColor = vec4(color, 1.0);
}
";

/// Minimal full-screen triangle vertex shader.
const VERTEX_SHADER_GLSL: &str = r"#version 450
layout(location = 0) out vec2 v_uv;

const vec2 positions[3] = vec2[3](
    vec2(-1.0, -3.0),
    vec2(3.0, 1.0),
    vec2(-1.0, 1.0)
);

void main() {
    uint vertex_index = uint(gl_VertexIndex);
    vec2 pos = positions[vertex_index];
    v_uv = pos * 0.5 + vec2(0.5, 0.5);
    gl_Position = vec4(pos, 0.0, 1.0);
}
";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variants::{GroupLayout, UniformField};

    #[test]
    fn assembled_source_contains_both_fragments() {
        let registry = VariantRegistry::new();
        let source = assemble_fragment_source(
            &registry,
            GeometryType::Hypersphere,
            ProjectionMethod::Stereographic,
        );
        assert!(source.contains("float latticeValue(vec3 p)"));
        assert!(source.contains("vec3 project4Dto3D(vec4 p)"));
        assert!(source.contains("shellDensityFactor"));
        assert!(source.contains("poleW"));
        // Projection must be declared before the geometry that calls it.
        let projection_at = source.find("vec3 project4Dto3D").unwrap();
        let geometry_at = source.find("float latticeValue").unwrap();
        assert!(projection_at < geometry_at);
    }

    #[test]
    fn generated_block_pads_gaps_after_vec3() {
        let declared = [
            UniformField::scalar("a", 0.0),
            UniformField::vec3("tint", [0.0; 3]),
            UniformField::scalar("b", 0.0),
        ];
        let layout = GroupLayout::from_fields(&declared);
        let block = uniform_block_glsl("TestParams", "test", 2, &layout);
        // a at slot 0, three pads up to the vec3's 16-byte row, then one
        // pad covering the vec3's tail before b.
        let expected = "layout(std140, set = 0, binding = 2) uniform TestParams {\n    float a;\n    float _pad0;\n    float _pad1;\n    float _pad2;\n    vec3 tint;\n    float _pad3;\n    float b;\n} test;\n";
        assert_eq!(block, expected);
    }

    #[test]
    fn empty_layout_declares_reserved_member() {
        let layout = GroupLayout::from_fields(&[]);
        let block = uniform_block_glsl("TestParams", "test", 3, &layout);
        assert!(block.contains("vec4 _reserved0;"));
    }

    #[test]
    fn every_variant_pair_assembles() {
        let registry = VariantRegistry::new();
        for geometry in GeometryType::ALL {
            for projection in ProjectionMethod::ALL {
                let source = assemble_fragment_source(&registry, geometry, projection);
                assert!(
                    source.contains("void main()"),
                    "missing entry point for {geometry}/{projection}"
                );
            }
        }
    }
}
