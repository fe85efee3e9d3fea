//! Shader fragment providers for the geometry and projection variants.
//!
//! Each variant supplies a GLSL snippet plus a declared uniform field table.
//! The std140 slot layout of a variant's uniform block is derived from that
//! table once at registry construction, and the same table drives both the
//! CPU-side packer and the generated GLSL block declaration, so the two
//! cannot drift apart.

pub mod geometry;
pub mod projection;

use tracing::warn;

use crate::params::ParamValue;
use crate::types::{GeometryType, ProjectionMethod};

/// Scalar/vector shape of a declared uniform field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Scalar,
    Vec2,
    Vec3,
}

impl FieldKind {
    /// Number of meaningful float components.
    pub fn components(self) -> usize {
        match self {
            FieldKind::Scalar => 1,
            FieldKind::Vec2 => 2,
            FieldKind::Vec3 => 3,
        }
    }

    /// std140 alignment expressed in 4-byte slots.
    pub fn align_slots(self) -> usize {
        match self {
            FieldKind::Scalar => 1,
            FieldKind::Vec2 => 2,
            FieldKind::Vec3 => 4,
        }
    }

    /// Slots consumed in the packed buffer; a vec3 always carries one
    /// trailing padding slot.
    pub fn padded_slots(self) -> usize {
        match self {
            FieldKind::Scalar => 1,
            FieldKind::Vec2 => 2,
            FieldKind::Vec3 => 4,
        }
    }

    pub fn glsl_type(self) -> &'static str {
        match self {
            FieldKind::Scalar => "float",
            FieldKind::Vec2 => "vec2",
            FieldKind::Vec3 => "vec3",
        }
    }
}

/// One uniform field a variant's shader fragment reads.
///
/// `default` holds the tuned value the field starts at; unused lanes stay
/// zero for scalar/vec2 fields.
#[derive(Debug, Clone, Copy)]
pub struct UniformField {
    pub name: &'static str,
    pub kind: FieldKind,
    pub default: [f32; 3],
}

impl UniformField {
    pub const fn scalar(name: &'static str, default: f32) -> Self {
        Self {
            name,
            kind: FieldKind::Scalar,
            default: [default, 0.0, 0.0],
        }
    }

    pub const fn vec3(name: &'static str, default: [f32; 3]) -> Self {
        Self {
            name,
            kind: FieldKind::Vec3,
            default,
        }
    }

    pub fn default_value(&self) -> ParamValue {
        match self.kind {
            FieldKind::Scalar => ParamValue::Scalar(self.default[0]),
            FieldKind::Vec2 => ParamValue::Vec2([self.default[0], self.default[1]]),
            FieldKind::Vec3 => ParamValue::Vec3(self.default),
        }
    }
}

/// The static content a variant contributes to the assembled shader.
#[derive(Debug, Clone, Copy)]
pub struct VariantFragment {
    /// Registry name, lower-case.
    pub name: &'static str,
    /// GLSL snippet implementing the variant's contract
    /// (`latticeValue` for geometries, `project4Dto3D` for projections).
    pub source: &'static str,
    /// Uniform fields the snippet reads from its variant block, in
    /// declaration order.
    pub fields: &'static [UniformField],
}

/// Placeholder fragment for slots that have no real implementation yet.
/// Registering a new variant starts from this: empty code, empty layout,
/// nothing else in the engine needs touching.
pub const BASE_FRAGMENT: VariantFragment = VariantFragment {
    name: "base",
    source: "",
    fields: &[],
};

/// A field with its resolved slot offset inside the packed group buffer.
#[derive(Debug, Clone, Copy)]
pub struct PackedField {
    pub name: &'static str,
    pub kind: FieldKind,
    pub offset: usize,
}

/// std140 slot layout of one variant's uniform block, computed once from
/// the declared field table.
#[derive(Debug, Clone)]
pub struct GroupLayout {
    fields: Vec<PackedField>,
    slots: usize,
}

impl GroupLayout {
    pub fn from_fields(declared: &[UniformField]) -> Self {
        let mut fields = Vec::with_capacity(declared.len());
        let mut cursor = 0usize;
        for field in declared {
            let align = field.kind.align_slots();
            cursor = cursor.div_ceil(align) * align;
            fields.push(PackedField {
                name: field.name,
                kind: field.kind,
                offset: cursor,
            });
            cursor += field.kind.padded_slots();
        }
        // Blocks are sized in whole 16-byte rows; an empty layout still
        // occupies one row so the GLSL block has a member to declare.
        let slots = cursor.div_ceil(4).max(1) * 4;
        Self { fields, slots }
    }

    pub fn fields(&self) -> &[PackedField] {
        &self.fields
    }

    /// Total packed size in 4-byte slots (multiple of 4).
    pub fn slots(&self) -> usize {
        self.slots
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.name == name)
    }

    /// Per-field starting values for a fresh [`crate::params::ParameterState`].
    pub fn default_values(&self, declared: &[UniformField]) -> Vec<ParamValue> {
        declared.iter().map(UniformField::default_value).collect()
    }

    /// Serializes `values` (parallel to the declared field order) into
    /// `out`, which must cover at least `self.slots()` floats. Slots not
    /// claimed by a field are zeroed, so switching to a smaller variant
    /// never leaks a predecessor's bytes.
    pub fn pack(&self, declared: &[UniformField], values: &[ParamValue], out: &mut [f32]) {
        debug_assert!(out.len() >= self.slots);
        for slot in out[..self.slots].iter_mut() {
            *slot = 0.0;
        }
        for (index, field) in self.fields.iter().enumerate() {
            let declared_field = &declared[index];
            let value = values.get(index).copied().unwrap_or_else(|| {
                warn!(field = field.name, "missing group value; packing default");
                declared_field.default_value()
            });
            let value = if value.kind() == field.kind {
                value
            } else {
                warn!(
                    field = field.name,
                    expected = ?field.kind,
                    got = ?value.kind(),
                    "group value has wrong shape; packing default"
                );
                declared_field.default_value()
            };
            let components = value.components();
            out[field.offset..field.offset + components.len()].copy_from_slice(components);
        }
    }
}

struct VariantSlot {
    fragment: VariantFragment,
    layout: GroupLayout,
}

impl VariantSlot {
    fn new(fragment: VariantFragment) -> Self {
        let layout = GroupLayout::from_fields(fragment.fields);
        Self { fragment, layout }
    }
}

/// Immutable lookup table over every registered variant, built once at
/// orchestrator construction.
pub struct VariantRegistry {
    geometries: [VariantSlot; 5],
    projections: [VariantSlot; 3],
    geometry_slots: usize,
    projection_slots: usize,
}

impl VariantRegistry {
    pub fn new() -> Self {
        let geometries = GeometryType::ALL.map(|g| VariantSlot::new(geometry::fragment(g)));
        let projections = ProjectionMethod::ALL.map(|p| VariantSlot::new(projection::fragment(p)));
        let geometry_slots = geometries
            .iter()
            .map(|slot| slot.layout.slots())
            .max()
            .unwrap_or(4);
        let projection_slots = projections
            .iter()
            .map(|slot| slot.layout.slots())
            .max()
            .unwrap_or(4);
        Self {
            geometries,
            projections,
            geometry_slots,
            projection_slots,
        }
    }

    pub fn geometry_fragment(&self, geometry: GeometryType) -> &VariantFragment {
        &self.geometries[geometry.index()].fragment
    }

    pub fn geometry_layout(&self, geometry: GeometryType) -> &GroupLayout {
        &self.geometries[geometry.index()].layout
    }

    pub fn projection_fragment(&self, projection: ProjectionMethod) -> &VariantFragment {
        &self.projections[projection.index()].fragment
    }

    pub fn projection_layout(&self, projection: ProjectionMethod) -> &GroupLayout {
        &self.projections[projection.index()].layout
    }

    /// Buffer size (in float slots) that fits every geometry variant.
    pub fn geometry_buffer_slots(&self) -> usize {
        self.geometry_slots
    }

    /// Buffer size (in float slots) that fits every projection variant.
    pub fn projection_buffer_slots(&self) -> usize {
        self.projection_slots
    }

    /// Resolves a requested geometry name, falling back to the default
    /// variant for anything unregistered. Runs inside the hot loop, so it
    /// logs instead of erroring.
    pub fn resolve_geometry(&self, name: &str) -> GeometryType {
        GeometryType::from_name(name).unwrap_or_else(|| {
            let fallback = GeometryType::default();
            warn!(requested = name, fallback = %fallback, "unknown geometry variant");
            fallback
        })
    }

    /// Projection counterpart of [`Self::resolve_geometry`].
    pub fn resolve_projection(&self, name: &str) -> ProjectionMethod {
        ProjectionMethod::from_name(name).unwrap_or_else(|| {
            let fallback = ProjectionMethod::default();
            warn!(requested = name, fallback = %fallback, "unknown projection variant");
            fallback
        })
    }
}

impl Default for VariantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_fields_pack_consecutively() {
        let declared = [
            UniformField::scalar("a", 1.0),
            UniformField::scalar("b", 2.0),
            UniformField::scalar("c", 3.0),
        ];
        let layout = GroupLayout::from_fields(&declared);
        assert_eq!(layout.fields()[0].offset, 0);
        assert_eq!(layout.fields()[1].offset, 1);
        assert_eq!(layout.fields()[2].offset, 2);
        assert_eq!(layout.slots(), 4);
    }

    #[test]
    fn vec3_field_aligns_and_pads() {
        let declared = [
            UniformField::scalar("a", 0.0),
            UniformField::vec3("tint", [0.1, 0.2, 0.3]),
            UniformField::scalar("b", 0.0),
        ];
        let layout = GroupLayout::from_fields(&declared);
        // scalar at 0, vec3 skips to the next 16-byte row, scalar lands
        // after the vec3's padding slot.
        assert_eq!(layout.fields()[0].offset, 0);
        assert_eq!(layout.fields()[1].offset, 4);
        assert_eq!(layout.fields()[2].offset, 8);
        assert_eq!(layout.slots(), 12);
    }

    #[test]
    fn empty_layout_still_occupies_one_row() {
        let layout = GroupLayout::from_fields(BASE_FRAGMENT.fields);
        assert!(layout.fields().is_empty());
        assert_eq!(layout.slots(), 4);
    }

    #[test]
    fn pack_zeroes_unclaimed_slots() {
        let declared = [UniformField::scalar("a", 1.5)];
        let layout = GroupLayout::from_fields(&declared);
        let mut out = vec![7.0f32; 8];
        layout.pack(&declared, &[ParamValue::Scalar(2.5)], &mut out);
        assert_eq!(out[0], 2.5);
        assert_eq!(&out[1..4], &[0.0, 0.0, 0.0]);
        // Slots beyond the layout belong to a larger sibling variant and
        // are left for the caller to manage.
        assert_eq!(out[4], 7.0);
    }

    #[test]
    fn pack_substitutes_default_for_wrong_shape() {
        let declared = [UniformField::vec3("tint", [0.1, 0.2, 0.3])];
        let layout = GroupLayout::from_fields(&declared);
        let mut out = vec![0.0f32; layout.slots()];
        layout.pack(&declared, &[ParamValue::Scalar(9.0)], &mut out);
        assert_eq!(&out[0..3], &[0.1, 0.2, 0.3]);
    }

    #[test]
    fn registry_buffer_sizes_cover_largest_variant() {
        let registry = VariantRegistry::new();
        for geometry in GeometryType::ALL {
            assert!(registry.geometry_layout(geometry).slots() <= registry.geometry_buffer_slots());
        }
        for projection in ProjectionMethod::ALL {
            assert!(
                registry.projection_layout(projection).slots()
                    <= registry.projection_buffer_slots()
            );
        }
        assert_eq!(registry.geometry_buffer_slots() % 4, 0);
        assert_eq!(registry.projection_buffer_slots() % 4, 0);
    }

    #[test]
    fn unknown_variant_resolves_to_default() {
        let registry = VariantRegistry::new();
        assert_eq!(
            registry.resolve_geometry("nonexistent"),
            GeometryType::default()
        );
        assert_eq!(
            registry.resolve_projection("fisheye"),
            ProjectionMethod::default()
        );
    }

    #[test]
    fn registered_names_resolve_case_insensitively() {
        let registry = VariantRegistry::new();
        assert_eq!(
            registry.resolve_geometry("Duocylinder"),
            GeometryType::Duocylinder
        );
        assert_eq!(
            registry.resolve_projection("ORTHOGRAPHIC"),
            ProjectionMethod::Orthographic
        );
    }

    #[test]
    fn geometry_defaults_round_trip_through_packing() {
        let registry = VariantRegistry::new();
        for geometry in GeometryType::ALL {
            let fragment = registry.geometry_fragment(geometry);
            let layout = registry.geometry_layout(geometry);
            let values = layout.default_values(fragment.fields);
            let mut first = vec![0.0f32; registry.geometry_buffer_slots()];
            let mut second = vec![0.0f32; registry.geometry_buffer_slots()];
            layout.pack(fragment.fields, &values, &mut first);
            layout.pack(fragment.fields, &values, &mut second);
            assert_eq!(first, second, "packing must be idempotent for {geometry}");
            for (field, value) in layout.fields().iter().zip(&values) {
                let components = value.components();
                assert_eq!(
                    &first[field.offset..field.offset + components.len()],
                    components,
                    "default for {} must survive packing",
                    field.name
                );
            }
        }
    }
}
