//! CPU-side uniform packing.
//!
//! Four independently-uploaded buffers: the fixed global block, the
//! 64-slot data-channel array, and the two variant groups whose layouts
//! come from the registry's field tables. Packing is pure; repacking an
//! unchanged state produces byte-identical output.

use bytemuck::{Pod, Zeroable};

use crate::params::ParameterState;
use crate::types::DATA_CHANNEL_COUNT;
use crate::variants::VariantRegistry;

/// Size of the packed global block: 32 float slots.
pub(crate) const GLOBAL_UNIFORM_BYTES: usize = 128;

/// Size of the packed data-channel array.
pub(crate) const DATA_CHANNEL_BYTES: usize = DATA_CHANNEL_COUNT * 4;

/// The global uniform block, mirrored by `GlobalParams` in the shader
/// prelude. Field order is load-bearing; the std140 offsets are pinned by
/// the layout test below.
#[repr(C, align(16))]
#[derive(Clone, Copy)]
pub(crate) struct GlobalUniforms {
    pub resolution: [f32; 2],
    pub time: f32,
    _pad0: f32,
    pub dimension: f32,
    pub morph_factor: f32,
    pub rotation_speed: f32,
    pub universe_modifier: f32,
    pub pattern_intensity: f32,
    pub grid_density: f32,
    pub lattice_grid_density: f32,
    pub line_thickness: f32,
    pub shell_width: f32,
    pub tetra_thickness: f32,
    pub glitch_intensity: f32,
    pub color_shift: f32,
    pub mouse: [f32; 2],
    /// Boolean carried as u32; std140 has no 1-byte bool.
    pub is_full_screen_effect: u32,
    _pad1: f32,
    pub primary_color: [f32; 3],
    _pad2: f32,
    pub secondary_color: [f32; 3],
    _pad3: f32,
    pub background_color: [f32; 3],
    _pad4: f32,
}

unsafe impl Zeroable for GlobalUniforms {}
unsafe impl Pod for GlobalUniforms {}

impl GlobalUniforms {
    pub fn from_state(state: &ParameterState) -> Self {
        Self {
            resolution: state.resolution,
            time: state.time,
            _pad0: 0.0,
            dimension: state.dimensions,
            morph_factor: state.morph_factor,
            rotation_speed: state.rotation_speed,
            universe_modifier: state.universe_modifier,
            pattern_intensity: state.pattern_intensity,
            grid_density: state.grid_density,
            lattice_grid_density: state.lattice_grid_density,
            line_thickness: state.line_thickness,
            shell_width: state.shell_width,
            tetra_thickness: state.tetra_thickness,
            glitch_intensity: state.glitch_intensity,
            color_shift: state.color_shift,
            mouse: state.mouse,
            is_full_screen_effect: state.is_full_screen_effect as u32,
            _pad1: 0.0,
            primary_color: state.colors.primary,
            _pad2: 0.0,
            secondary_color: state.colors.secondary,
            _pad3: 0.0,
            background_color: state.colors.background,
            _pad4: 0.0,
        }
    }
}

/// Serializes state subsets into reusable scratch buffers sized once for
/// the largest variant sharing each buffer.
pub(crate) struct UniformPacker {
    geometry_scratch: Vec<f32>,
    projection_scratch: Vec<f32>,
}

impl UniformPacker {
    pub fn new(registry: &VariantRegistry) -> Self {
        Self {
            geometry_scratch: vec![0.0; registry.geometry_buffer_slots()],
            projection_scratch: vec![0.0; registry.projection_buffer_slots()],
        }
    }

    pub fn pack_global(state: &ParameterState) -> GlobalUniforms {
        GlobalUniforms::from_state(state)
    }

    pub fn pack_data_channels(state: &ParameterState) -> [f32; DATA_CHANNEL_COUNT] {
        state.data_channels
    }

    /// Packs the active geometry's group. Slots belonging to larger
    /// sibling variants are zeroed so nothing stale leaks across a switch.
    pub fn pack_geometry(
        &mut self,
        registry: &VariantRegistry,
        state: &ParameterState,
    ) -> &[f32] {
        self.geometry_scratch.fill(0.0);
        let layout = registry.geometry_layout(state.geometry);
        let declared = registry.geometry_fragment(state.geometry).fields;
        layout.pack(
            declared,
            state.geometry_values(state.geometry),
            &mut self.geometry_scratch,
        );
        &self.geometry_scratch
    }

    /// Projection counterpart of [`Self::pack_geometry`].
    pub fn pack_projection(
        &mut self,
        registry: &VariantRegistry,
        state: &ParameterState,
    ) -> &[f32] {
        self.projection_scratch.fill(0.0);
        let layout = registry.projection_layout(state.projection);
        let declared = registry.projection_fragment(state.projection).fields;
        layout.pack(
            declared,
            state.projection_values(state.projection),
            &mut self.projection_scratch,
        );
        &self.projection_scratch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{align_of, size_of};

    use crate::params::ParamUpdate;
    use crate::types::GeometryType;

    fn fresh() -> (VariantRegistry, ParameterState) {
        let registry = VariantRegistry::new();
        let state = ParameterState::new(&registry);
        (registry, state)
    }

    #[test]
    fn global_uniforms_follow_std140_layout() {
        let (_, state) = fresh();
        let uniforms = GlobalUniforms::from_state(&state);
        let base = &uniforms as *const _ as usize;

        assert_eq!(align_of::<GlobalUniforms>(), 16);
        assert_eq!(size_of::<GlobalUniforms>(), GLOBAL_UNIFORM_BYTES);
        assert_eq!((&uniforms.resolution as *const _ as usize) - base, 0);
        assert_eq!((&uniforms.time as *const _ as usize) - base, 8);
        assert_eq!((&uniforms.dimension as *const _ as usize) - base, 16);
        assert_eq!((&uniforms.color_shift as *const _ as usize) - base, 60);
        assert_eq!((&uniforms.mouse as *const _ as usize) - base, 64);
        assert_eq!(
            (&uniforms.is_full_screen_effect as *const _ as usize) - base,
            72
        );
        assert_eq!((&uniforms.primary_color as *const _ as usize) - base, 80);
        assert_eq!((&uniforms.secondary_color as *const _ as usize) - base, 96);
        assert_eq!((&uniforms.background_color as *const _ as usize) - base, 112);
    }

    #[test]
    fn global_packing_is_idempotent() {
        let (_, state) = fresh();
        let first = UniformPacker::pack_global(&state);
        let second = UniformPacker::pack_global(&state);
        assert_eq!(bytemuck::bytes_of(&first), bytemuck::bytes_of(&second));
        assert_eq!(bytemuck::bytes_of(&first).len(), GLOBAL_UNIFORM_BYTES);
    }

    #[test]
    fn data_channels_pack_verbatim() {
        let (registry, mut state) = fresh();
        state.apply(
            &registry,
            &ParamUpdate::DataChannels(Box::new([0.25; DATA_CHANNEL_COUNT])),
        );
        let packed = UniformPacker::pack_data_channels(&state);
        assert_eq!(packed, [0.25; DATA_CHANNEL_COUNT]);
        assert_eq!(bytemuck::bytes_of(&packed).len(), DATA_CHANNEL_BYTES);
    }

    #[test]
    fn full_screen_flag_round_trips_as_u32() {
        let (registry, mut state) = fresh();
        assert_eq!(UniformPacker::pack_global(&state).is_full_screen_effect, 0);
        state.apply(
            &registry,
            &ParamUpdate::Geometry(GeometryType::FullScreenLattice),
        );
        assert_eq!(UniformPacker::pack_global(&state).is_full_screen_effect, 1);
        state.apply(&registry, &ParamUpdate::Geometry(GeometryType::Hypercube));
        assert_eq!(UniformPacker::pack_global(&state).is_full_screen_effect, 0);
    }

    #[test]
    fn geometry_switch_zeroes_unclaimed_slots() {
        let (registry, mut state) = fresh();
        let mut packer = UniformPacker::new(&registry);
        // Hypercube claims the most slots; pack it first so the scratch is
        // fully populated, then switch to a smaller variant.
        let populated = packer.pack_geometry(&registry, &state).to_vec();
        assert!(populated.iter().any(|&slot| slot != 0.0));

        state.apply(
            &registry,
            &ParamUpdate::Geometry(GeometryType::Hypertetrahedron),
        );
        let repacked = packer.pack_geometry(&registry, &state);
        let active_slots = registry
            .geometry_layout(GeometryType::Hypertetrahedron)
            .slots();
        assert!(repacked[active_slots..].iter().all(|&slot| slot == 0.0));
    }

    #[test]
    fn variant_group_packing_is_idempotent() {
        let (registry, state) = fresh();
        let mut packer = UniformPacker::new(&registry);
        let first = packer.pack_geometry(&registry, &state).to_vec();
        let second = packer.pack_geometry(&registry, &state).to_vec();
        assert_eq!(first, second);
        let first = packer.pack_projection(&registry, &state).to_vec();
        let second = packer.pack_projection(&registry, &state).to_vec();
        assert_eq!(first, second);
    }
}
