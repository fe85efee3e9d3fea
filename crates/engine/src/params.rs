//! Render parameter state and the typed update surface.
//!
//! External feeds never touch GPU memory directly: they apply
//! [`ParamUpdate`] values to a [`ParameterState`], which records which of
//! the four uniform buffers went stale. The upload pass consumes the dirty
//! set on the next tick.

use tracing::{debug, warn};

use crate::types::{ColorScheme, GeometryType, ProjectionMethod, DATA_CHANNEL_COUNT};
use crate::variants::{FieldKind, VariantRegistry};

/// A loosely-shaped value targeting one declared variant-group field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    Scalar(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
}

impl ParamValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            ParamValue::Scalar(_) => FieldKind::Scalar,
            ParamValue::Vec2(_) => FieldKind::Vec2,
            ParamValue::Vec3(_) => FieldKind::Vec3,
        }
    }

    pub fn components(&self) -> &[f32] {
        match self {
            ParamValue::Scalar(value) => std::slice::from_ref(value),
            ParamValue::Vec2(value) => value,
            ParamValue::Vec3(value) => value,
        }
    }
}

/// Which CPU-side buffer copies have diverged from GPU memory.
///
/// Flags accumulate (OR) across updates and are cleared only after a
/// successful upload pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirtyBuffers {
    pub global: bool,
    pub data_channels: bool,
    pub geometry: bool,
    pub projection: bool,
    /// The (geometry, projection) selection changed; the next tick must
    /// re-resolve its pipeline from the cache.
    pub pipeline: bool,
}

impl DirtyBuffers {
    /// Every buffer stale, as after construction or a resize re-seed.
    pub fn all() -> Self {
        Self {
            global: true,
            data_channels: true,
            geometry: true,
            projection: true,
            pipeline: true,
        }
    }

    pub fn merge(&mut self, other: DirtyBuffers) {
        self.global |= other.global;
        self.data_channels |= other.data_channels;
        self.geometry |= other.geometry;
        self.projection |= other.projection;
        self.pipeline |= other.pipeline;
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// One strongly-typed parameter change.
///
/// The variants mirror the recognized field set; anything outside it is
/// rejected by the adapter layer before reaching the engine, so the engine
/// itself never parses strings on the hot path.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamUpdate {
    Time(f32),
    Dimensions(f32),
    MorphFactor(f32),
    RotationSpeed(f32),
    UniverseModifier(f32),
    PatternIntensity(f32),
    GridDensity(f32),
    LatticeGridDensity(f32),
    LineThickness(f32),
    ShellWidth(f32),
    TetraThickness(f32),
    GlitchIntensity(f32),
    ColorShift(f32),
    Geometry(GeometryType),
    Projection(ProjectionMethod),
    Mouse([f32; 2]),
    PrimaryColor([f32; 3]),
    SecondaryColor([f32; 3]),
    BackgroundColor([f32; 3]),
    /// Wholesale replacement; individual slots are never diffed.
    DataChannels(Box<[f32; DATA_CHANNEL_COUNT]>),
    /// A field inside one geometry variant's uniform group. Unknown field
    /// names and wrongly-shaped values are ignored with a log line.
    GeometryField {
        geometry: GeometryType,
        field: String,
        value: ParamValue,
    },
    /// Projection counterpart of `GeometryField`.
    ProjectionField {
        projection: ProjectionMethod,
        field: String,
        value: ParamValue,
    },
}

/// Every renderable parameter for one visualizer instance.
///
/// Plain data plus the dirty bookkeeping in [`ParameterState::apply`];
/// owned exclusively by one orchestrator, never shared or persisted.
#[derive(Debug, Clone)]
pub struct ParameterState {
    pub time: f32,
    /// Continuous 3–5 blend factor for how strongly the fourth dimension
    /// contributes.
    pub dimensions: f32,
    pub morph_factor: f32,
    pub rotation_speed: f32,
    pub universe_modifier: f32,
    pub pattern_intensity: f32,
    pub grid_density: f32,
    /// Grid density used by the full-screen lattice effect only.
    pub lattice_grid_density: f32,
    pub line_thickness: f32,
    pub shell_width: f32,
    pub tetra_thickness: f32,
    pub glitch_intensity: f32,
    pub color_shift: f32,
    pub geometry: GeometryType,
    pub projection: ProjectionMethod,
    /// Surface size in physical pixels; re-derived by the render tick.
    pub resolution: [f32; 2],
    /// Normalized 0–1 pointer position.
    pub mouse: [f32; 2],
    pub colors: ColorScheme,
    pub data_channels: [f32; DATA_CHANNEL_COUNT],
    /// Derived: true iff `geometry` is the full-screen lattice.
    pub is_full_screen_effect: bool,
    geometry_values: [Vec<ParamValue>; 5],
    projection_values: [Vec<ParamValue>; 3],
}

impl ParameterState {
    /// Documented defaults; variant groups seed from their declared tables.
    pub fn new(registry: &VariantRegistry) -> Self {
        let geometry_values = GeometryType::ALL.map(|g| {
            registry
                .geometry_layout(g)
                .default_values(registry.geometry_fragment(g).fields)
        });
        let projection_values = ProjectionMethod::ALL.map(|p| {
            registry
                .projection_layout(p)
                .default_values(registry.projection_fragment(p).fields)
        });
        Self {
            time: 0.0,
            dimensions: 4.0,
            morph_factor: 0.5,
            rotation_speed: 0.5,
            universe_modifier: 1.0,
            pattern_intensity: 1.0,
            grid_density: 8.0,
            lattice_grid_density: 12.0,
            line_thickness: 0.03,
            shell_width: 0.025,
            tetra_thickness: 0.035,
            glitch_intensity: 0.0,
            color_shift: 0.0,
            geometry: GeometryType::default(),
            projection: ProjectionMethod::default(),
            resolution: [1280.0, 720.0],
            mouse: [0.5, 0.5],
            colors: ColorScheme::default(),
            data_channels: [0.0; DATA_CHANNEL_COUNT],
            is_full_screen_effect: false,
            geometry_values,
            projection_values,
        }
    }

    /// Current values for one geometry's uniform group, parallel to the
    /// variant's declared field order.
    pub fn geometry_values(&self, geometry: GeometryType) -> &[ParamValue] {
        &self.geometry_values[geometry.index()]
    }

    pub fn projection_values(&self, projection: ProjectionMethod) -> &[ParamValue] {
        &self.projection_values[projection.index()]
    }

    /// Applies one update and reports the dirty flags it raised. Values
    /// deep-equal to the current state raise nothing.
    pub fn apply(&mut self, registry: &VariantRegistry, update: &ParamUpdate) -> DirtyBuffers {
        let mut dirty = DirtyBuffers::default();
        match update {
            ParamUpdate::Time(value) => dirty.global = set_f32(&mut self.time, *value),
            ParamUpdate::Dimensions(value) => dirty.global = set_f32(&mut self.dimensions, *value),
            ParamUpdate::MorphFactor(value) => {
                dirty.global = set_f32(&mut self.morph_factor, *value)
            }
            ParamUpdate::RotationSpeed(value) => {
                dirty.global = set_f32(&mut self.rotation_speed, *value)
            }
            ParamUpdate::UniverseModifier(value) => {
                dirty.global = set_f32(&mut self.universe_modifier, *value)
            }
            ParamUpdate::PatternIntensity(value) => {
                dirty.global = set_f32(&mut self.pattern_intensity, *value)
            }
            ParamUpdate::GridDensity(value) => {
                dirty.global = set_f32(&mut self.grid_density, *value)
            }
            ParamUpdate::LatticeGridDensity(value) => {
                dirty.global = set_f32(&mut self.lattice_grid_density, *value)
            }
            ParamUpdate::LineThickness(value) => {
                dirty.global = set_f32(&mut self.line_thickness, *value)
            }
            ParamUpdate::ShellWidth(value) => {
                dirty.global = set_f32(&mut self.shell_width, *value)
            }
            ParamUpdate::TetraThickness(value) => {
                dirty.global = set_f32(&mut self.tetra_thickness, *value)
            }
            ParamUpdate::GlitchIntensity(value) => {
                dirty.global = set_f32(&mut self.glitch_intensity, *value)
            }
            ParamUpdate::ColorShift(value) => {
                dirty.global = set_f32(&mut self.color_shift, *value)
            }
            ParamUpdate::Geometry(geometry) => {
                if self.geometry != *geometry {
                    self.geometry = *geometry;
                    self.is_full_screen_effect =
                        matches!(geometry, GeometryType::FullScreenLattice);
                    dirty.global = true;
                    dirty.geometry = true;
                    dirty.pipeline = true;
                }
            }
            ParamUpdate::Projection(projection) => {
                if self.projection != *projection {
                    self.projection = *projection;
                    dirty.projection = true;
                    dirty.pipeline = true;
                }
            }
            ParamUpdate::Mouse(value) => {
                if self.mouse != *value {
                    self.mouse = *value;
                    dirty.global = true;
                }
            }
            ParamUpdate::PrimaryColor(value) => {
                if self.colors.primary != *value {
                    self.colors.primary = *value;
                    dirty.global = true;
                }
            }
            ParamUpdate::SecondaryColor(value) => {
                if self.colors.secondary != *value {
                    self.colors.secondary = *value;
                    dirty.global = true;
                }
            }
            ParamUpdate::BackgroundColor(value) => {
                if self.colors.background != *value {
                    self.colors.background = *value;
                    dirty.global = true;
                }
            }
            ParamUpdate::DataChannels(channels) => {
                if self.data_channels != **channels {
                    self.data_channels = **channels;
                    dirty.data_channels = true;
                }
            }
            ParamUpdate::GeometryField {
                geometry,
                field,
                value,
            } => {
                let layout = registry.geometry_layout(*geometry);
                let declared = registry.geometry_fragment(*geometry).fields;
                if let Some(index) = layout.field_index(field) {
                    if declared[index].kind != value.kind() {
                        warn!(
                            geometry = %geometry,
                            field = field.as_str(),
                            expected = ?declared[index].kind,
                            got = ?value.kind(),
                            "rejecting mistyped geometry field update"
                        );
                    } else if self.geometry_values[geometry.index()][index] != *value {
                        self.geometry_values[geometry.index()][index] = *value;
                        dirty.geometry = true;
                    }
                } else {
                    debug!(
                        geometry = %geometry,
                        field = field.as_str(),
                        "ignoring unrecognized geometry field"
                    );
                }
            }
            ParamUpdate::ProjectionField {
                projection,
                field,
                value,
            } => {
                let layout = registry.projection_layout(*projection);
                let declared = registry.projection_fragment(*projection).fields;
                if let Some(index) = layout.field_index(field) {
                    if declared[index].kind != value.kind() {
                        warn!(
                            projection = %projection,
                            field = field.as_str(),
                            expected = ?declared[index].kind,
                            got = ?value.kind(),
                            "rejecting mistyped projection field update"
                        );
                    } else if self.projection_values[projection.index()][index] != *value {
                        self.projection_values[projection.index()][index] = *value;
                        dirty.projection = true;
                    }
                } else {
                    debug!(
                        projection = %projection,
                        field = field.as_str(),
                        "ignoring unrecognized projection field"
                    );
                }
            }
        }
        dirty
    }

    /// Applies a batch in order, OR-ing the raised flags.
    pub fn apply_all(
        &mut self,
        registry: &VariantRegistry,
        updates: &[ParamUpdate],
    ) -> DirtyBuffers {
        let mut dirty = DirtyBuffers::default();
        for update in updates {
            dirty.merge(self.apply(registry, update));
        }
        dirty
    }

    /// Adopts a new surface size; returns true when the stored resolution
    /// actually changed (the caller then marks the global buffer dirty).
    pub fn set_resolution(&mut self, width: u32, height: u32) -> bool {
        let resolution = [width as f32, height as f32];
        if self.resolution != resolution {
            self.resolution = resolution;
            true
        } else {
            false
        }
    }

    /// Advances the animation clock; always dirties the global buffer.
    pub fn advance_time(&mut self, seconds: f32) {
        self.time = seconds;
    }
}

fn set_f32(slot: &mut f32, value: f32) -> bool {
    if *slot != value {
        *slot = value;
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> (VariantRegistry, ParameterState) {
        let registry = VariantRegistry::new();
        let state = ParameterState::new(&registry);
        (registry, state)
    }

    fn only_global() -> DirtyBuffers {
        DirtyBuffers {
            global: true,
            ..DirtyBuffers::default()
        }
    }

    #[test]
    fn defaults_are_documented_values() {
        let (_, state) = fresh();
        assert_eq!(state.dimensions, 4.0);
        assert_eq!(state.grid_density, 8.0);
        assert_eq!(state.data_channels, [0.0; DATA_CHANNEL_COUNT]);
        assert_eq!(state.geometry, GeometryType::Hypercube);
        assert_eq!(state.projection, ProjectionMethod::Perspective);
        assert!(!state.is_full_screen_effect);
    }

    #[test]
    fn scalar_updates_dirty_only_global() {
        let (registry, mut state) = fresh();
        let updates = [
            ParamUpdate::Time(1.0),
            ParamUpdate::Dimensions(4.5),
            ParamUpdate::MorphFactor(0.9),
            ParamUpdate::RotationSpeed(1.2),
            ParamUpdate::UniverseModifier(0.8),
            ParamUpdate::PatternIntensity(1.4),
            ParamUpdate::GridDensity(10.0),
            ParamUpdate::LatticeGridDensity(16.0),
            ParamUpdate::LineThickness(0.05),
            ParamUpdate::ShellWidth(0.03),
            ParamUpdate::TetraThickness(0.04),
            ParamUpdate::GlitchIntensity(0.2),
            ParamUpdate::ColorShift(0.5),
            ParamUpdate::Mouse([0.1, 0.9]),
            ParamUpdate::PrimaryColor([1.0, 0.0, 0.0]),
            ParamUpdate::SecondaryColor([0.0, 1.0, 0.0]),
            ParamUpdate::BackgroundColor([0.0, 0.0, 0.1]),
        ];
        for update in updates {
            let dirty = state.apply(&registry, &update);
            assert_eq!(dirty, only_global(), "wrong flags for {update:?}");
        }
    }

    #[test]
    fn equal_values_mark_nothing() {
        let (registry, mut state) = fresh();
        assert_eq!(
            state.apply(&registry, &ParamUpdate::Dimensions(4.0)),
            DirtyBuffers::default()
        );
        assert_eq!(
            state.apply(&registry, &ParamUpdate::Geometry(GeometryType::Hypercube)),
            DirtyBuffers::default()
        );
        assert_eq!(
            state.apply(
                &registry,
                &ParamUpdate::DataChannels(Box::new([0.0; DATA_CHANNEL_COUNT]))
            ),
            DirtyBuffers::default()
        );
    }

    #[test]
    fn geometry_switch_dirties_global_geometry_and_pipeline() {
        let (registry, mut state) = fresh();
        let dirty = state.apply(&registry, &ParamUpdate::Geometry(GeometryType::Hypersphere));
        assert_eq!(
            dirty,
            DirtyBuffers {
                global: true,
                geometry: true,
                pipeline: true,
                ..DirtyBuffers::default()
            }
        );
        assert!(!state.is_full_screen_effect);
    }

    #[test]
    fn projection_switch_dirties_projection_and_pipeline() {
        let (registry, mut state) = fresh();
        let dirty = state.apply(
            &registry,
            &ParamUpdate::Projection(ProjectionMethod::Stereographic),
        );
        assert_eq!(
            dirty,
            DirtyBuffers {
                projection: true,
                pipeline: true,
                ..DirtyBuffers::default()
            }
        );
    }

    #[test]
    fn lattice_geometry_raises_full_screen_flag() {
        let (registry, mut state) = fresh();
        state.apply(
            &registry,
            &ParamUpdate::Geometry(GeometryType::FullScreenLattice),
        );
        assert!(state.is_full_screen_effect);
        state.apply(&registry, &ParamUpdate::Geometry(GeometryType::Duocylinder));
        assert!(!state.is_full_screen_effect);
    }

    #[test]
    fn data_channels_replace_wholesale() {
        let (registry, mut state) = fresh();
        let dirty = state.apply(
            &registry,
            &ParamUpdate::DataChannels(Box::new([0.25; DATA_CHANNEL_COUNT])),
        );
        assert_eq!(
            dirty,
            DirtyBuffers {
                data_channels: true,
                ..DirtyBuffers::default()
            }
        );
        assert_eq!(state.data_channels, [0.25; DATA_CHANNEL_COUNT]);
    }

    #[test]
    fn geometry_field_updates_dirty_only_geometry() {
        let (registry, mut state) = fresh();
        let dirty = state.apply(
            &registry,
            &ParamUpdate::GeometryField {
                geometry: GeometryType::Hypercube,
                field: "wCoordFactor1".into(),
                value: ParamValue::Scalar(2.0),
            },
        );
        assert_eq!(
            dirty,
            DirtyBuffers {
                geometry: true,
                ..DirtyBuffers::default()
            }
        );
        let index = registry
            .geometry_layout(GeometryType::Hypercube)
            .field_index("wCoordFactor1")
            .unwrap();
        assert_eq!(
            state.geometry_values(GeometryType::Hypercube)[index],
            ParamValue::Scalar(2.0)
        );
    }

    #[test]
    fn unknown_and_mistyped_group_fields_are_ignored() {
        let (registry, mut state) = fresh();
        let unknown = state.apply(
            &registry,
            &ParamUpdate::GeometryField {
                geometry: GeometryType::Hypercube,
                field: "noSuchKnob".into(),
                value: ParamValue::Scalar(1.0),
            },
        );
        assert_eq!(unknown, DirtyBuffers::default());
        let mistyped = state.apply(
            &registry,
            &ParamUpdate::ProjectionField {
                projection: ProjectionMethod::Perspective,
                field: "distance".into(),
                value: ParamValue::Vec3([1.0, 2.0, 3.0]),
            },
        );
        assert_eq!(mistyped, DirtyBuffers::default());
    }

    #[test]
    fn batched_updates_accumulate_flags() {
        let (registry, mut state) = fresh();
        let dirty = state.apply_all(
            &registry,
            &[
                ParamUpdate::Time(0.5),
                ParamUpdate::DataChannels(Box::new([1.0; DATA_CHANNEL_COUNT])),
                ParamUpdate::Projection(ProjectionMethod::Orthographic),
            ],
        );
        assert_eq!(
            dirty,
            DirtyBuffers {
                global: true,
                data_channels: true,
                projection: true,
                pipeline: true,
                ..DirtyBuffers::default()
            }
        );
    }

    #[test]
    fn resize_reports_change_once() {
        let (_, mut state) = fresh();
        assert!(state.set_resolution(640, 480));
        assert!(!state.set_resolution(640, 480));
        assert_eq!(state.resolution, [640.0, 480.0]);
    }
}
