//! Projection variant fragments.
//!
//! Every snippet implements `vec3 project4Dto3D(vec4 p)`. The current
//! variants are scalar-only, but the layout machinery handles vector fields
//! the same way it does for geometries, so a future variant can declare
//! them without packer changes.

use super::{UniformField, VariantFragment};
use crate::types::ProjectionMethod;

pub(super) fn fragment(projection: ProjectionMethod) -> VariantFragment {
    match projection {
        ProjectionMethod::Perspective => PERSPECTIVE,
        ProjectionMethod::Orthographic => ORTHOGRAPHIC,
        ProjectionMethod::Stereographic => STEREOGRAPHIC,
    }
}

const PERSPECTIVE_FIELDS: &[UniformField] = &[
    UniformField::scalar("distance", 2.5),
    UniformField::scalar("denomMin", 0.1),
];

const PERSPECTIVE: VariantFragment = VariantFragment {
    name: "perspective",
    fields: PERSPECTIVE_FIELDS,
    source: r"
vec3 project4Dto3D(vec4 p) {
    float denom = max(proj.distance + p.w, proj.denomMin);
    return p.xyz * (proj.distance / denom);
}
",
};

const ORTHOGRAPHIC_FIELDS: &[UniformField] = &[
    UniformField::scalar("perspectiveBlend", 0.2),
    UniformField::scalar("distance", 2.5),
];

const ORTHOGRAPHIC: VariantFragment = VariantFragment {
    name: "orthographic",
    fields: ORTHOGRAPHIC_FIELDS,
    source: r"
vec3 project4Dto3D(vec4 p) {
    float denom = max(proj.distance + p.w, 0.1);
    vec3 persp = p.xyz * (proj.distance / denom);
    return mix(p.xyz, persp, clamp(proj.perspectiveBlend, 0.0, 1.0));
}
",
};

const STEREOGRAPHIC_FIELDS: &[UniformField] = &[
    UniformField::scalar("poleW", -1.5),
    UniformField::scalar("scaleFactor", 1.0),
    UniformField::scalar("denomMin", 0.05),
];

const STEREOGRAPHIC: VariantFragment = VariantFragment {
    name: "stereographic",
    fields: STEREOGRAPHIC_FIELDS,
    source: r"
vec3 project4Dto3D(vec4 p) {
    float denom = p.w - proj.poleW;
    float safe = abs(denom) < proj.denomMin ? sign(denom) * proj.denomMin : denom;
    if (safe == 0.0) {
        safe = proj.denomMin;
    }
    return p.xyz * (proj.scaleFactor * -proj.poleW / safe);
}
",
};
