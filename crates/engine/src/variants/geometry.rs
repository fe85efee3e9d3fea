//! Geometry variant fragments.
//!
//! Every snippet implements `float latticeValue(vec3 p)`: given a point in
//! the marched 3D space it returns a lattice intensity in [0, 1]. The
//! snippets lean on the shared prelude (4D rotation helpers, `dataChannel`,
//! the global uniform block) and on `project4Dto3D` supplied by the active
//! projection variant. The numeric coefficients are tuned visual constants;
//! they carry no contract beyond surviving the round trip through packing.

use super::{UniformField, VariantFragment};
use crate::types::GeometryType;

pub(super) fn fragment(geometry: GeometryType) -> VariantFragment {
    match geometry {
        GeometryType::Hypercube => HYPERCUBE,
        GeometryType::Hypersphere => HYPERSPHERE,
        GeometryType::Hypertetrahedron => HYPERTETRAHEDRON,
        GeometryType::Duocylinder => DUOCYLINDER,
        GeometryType::FullScreenLattice => FULL_SCREEN_LATTICE,
    }
}

const HYPERCUBE_FIELDS: &[UniformField] = &[
    UniformField::scalar("wCoordFactor1", 1.4),
    UniformField::scalar("wCoordFactor2", 2.5),
    UniformField::scalar("wCoordFactor3", 3.0),
    UniformField::scalar("rotXWFactor", 0.31),
    UniformField::scalar("rotYWFactor", 0.27),
    UniformField::scalar("rotZWFactor", 0.23),
    UniformField::scalar("morphCoupling", 0.65),
    UniformField::vec3("edgeTint", [0.9, 0.7, 1.0]),
];

const HYPERCUBE: VariantFragment = VariantFragment {
    name: "hypercube",
    fields: HYPERCUBE_FIELDS,
    source: r"
float boxEdges(vec3 cell, float thickness) {
    vec3 d = abs(cell - 0.5);
    float nearest = max(d.x, max(d.y, d.z));
    return smoothstep(0.5, 0.5 - thickness, nearest);
}

float latticeValue(vec3 p) {
    float density = u_gridDensity * (1.0 + dataChannel(1) * 0.4);
    float thickness = u_lineThickness * (1.0 + dataChannel(2) * 0.8);
    float lattice3 = boxEdges(fract(p * density * 0.5), thickness);

    float w = sin(p.x * geom.wCoordFactor1 + u_time * 0.3)
        * cos(p.y * geom.wCoordFactor2 - u_time * 0.2)
        * sin(p.z * geom.wCoordFactor3 + u_time * 0.4);
    w *= geom.morphCoupling * (u_morphFactor + dataChannel(3) * 0.5);

    vec4 p4 = vec4(p, w);
    float spin = u_time * u_rotationSpeed;
    p4 = rotXW(spin * geom.rotXWFactor) * p4;
    p4 = rotYW(spin * geom.rotYWFactor) * p4;
    p4 = rotZW(spin * geom.rotZWFactor) * p4;
    vec3 projected = project4Dto3D(p4);
    float lattice4 = boxEdges(fract(projected * density * 0.5), thickness);

    float blend = smoothstep(3.0, 4.5, u_dimension);
    float lattice = mix(lattice3, lattice4, blend);
    float tintLuma = dot(geom.edgeTint, vec3(0.299, 0.587, 0.114));
    return pow(lattice * clamp(tintLuma, 0.0, 1.5), 1.0 / max(u_universeModifier, 0.1));
}
",
};

const HYPERSPHERE_FIELDS: &[UniformField] = &[
    UniformField::scalar("shellDensityFactor", 1.0),
    UniformField::scalar("shellPhaseSpeed", 0.85),
    UniformField::scalar("wCoordAmplitude", 0.6),
    UniformField::scalar("wCoordFrequency", 2.2),
    UniformField::scalar("rotXWFactor", 0.38),
    UniformField::scalar("rotYWFactor", 0.31),
];

const HYPERSPHERE: VariantFragment = VariantFragment {
    name: "hypersphere",
    fields: HYPERSPHERE_FIELDS,
    source: r"
float shellBands(float radius, float density, float width) {
    float bands = abs(fract(radius * density) - 0.5);
    return 1.0 - smoothstep(0.0, width * density, bands);
}

float latticeValue(vec3 p) {
    float density = u_gridDensity * geom.shellDensityFactor * (0.7 + dataChannel(1) * 0.5);
    float width = u_shellWidth * (1.0 + dataChannel(2));
    float shells3 = shellBands(length(p), density, width);

    float w = geom.wCoordAmplitude
        * sin(length(p) * geom.wCoordFrequency - u_time * geom.shellPhaseSpeed)
        * (0.5 + u_morphFactor);

    vec4 p4 = vec4(p, w);
    float spin = u_time * u_rotationSpeed;
    p4 = rotXW(spin * geom.rotXWFactor) * p4;
    p4 = rotYW(spin * geom.rotYWFactor) * p4;
    vec3 projected = project4Dto3D(p4);
    float shells4 = shellBands(length(projected), density, width);

    float blend = smoothstep(3.0, 4.5, u_dimension);
    float shells = mix(shells3, shells4, blend);
    return pow(max(shells, 0.0), 1.0 / max(u_universeModifier, 0.1));
}
",
};

const HYPERTETRAHEDRON_FIELDS: &[UniformField] = &[
    UniformField::scalar("planeOffset", 0.577),
    UniformField::scalar("vertexScale", 1.0),
    UniformField::scalar("rotSpeedScale", 1.15),
    UniformField::scalar("wCoordFactor", 0.72),
    UniformField::scalar("edgeSharpness", 6.0),
];

const HYPERTETRAHEDRON: VariantFragment = VariantFragment {
    name: "hypertetrahedron",
    fields: HYPERTETRAHEDRON_FIELDS,
    source: r"
float tetraPlanes(vec3 p, float thickness) {
    vec3 c1 = normalize(vec3(1.0, 1.0, 1.0));
    vec3 c2 = normalize(vec3(-1.0, -1.0, 1.0));
    vec3 c3 = normalize(vec3(-1.0, 1.0, -1.0));
    vec3 c4 = normalize(vec3(1.0, -1.0, -1.0));
    float d = min(
        min(abs(dot(p, c1) - geom.planeOffset), abs(dot(p, c2) - geom.planeOffset)),
        min(abs(dot(p, c3) - geom.planeOffset), abs(dot(p, c4) - geom.planeOffset)));
    return 1.0 - smoothstep(0.0, thickness * geom.edgeSharpness, d);
}

float latticeValue(vec3 p) {
    float density = u_gridDensity * 0.65 * (1.0 + dataChannel(1) * 0.3);
    float thickness = u_tetraThickness * (1.0 + dataChannel(2) * 0.6);
    vec3 cell = (fract(p * density * 0.5) - 0.5) * geom.vertexScale;
    float planes3 = tetraPlanes(cell, thickness);

    float w = geom.wCoordFactor * cos(length(cell) * 3.0 - u_time * 0.6)
        * (0.4 + u_morphFactor);

    vec4 p4 = vec4(cell, w);
    float spin = u_time * u_rotationSpeed * geom.rotSpeedScale;
    p4 = rotXW(spin * 0.28) * p4;
    p4 = rotZW(spin * 0.21) * p4;
    vec3 projected = project4Dto3D(p4);
    float planes4 = tetraPlanes(projected, thickness);

    float blend = smoothstep(3.0, 4.5, u_dimension);
    float planes = mix(planes3, planes4, blend);
    return pow(max(planes, 0.0), 1.0 / max(u_universeModifier, 0.1));
}
",
};

const DUOCYLINDER_FIELDS: &[UniformField] = &[
    UniformField::scalar("radius1", 0.62),
    UniformField::scalar("radius2", 0.58),
    UniformField::scalar("ringFalloff", 4.0),
    UniformField::scalar("phaseSpeed", 0.9),
    UniformField::scalar("rotXWFactor", 0.33),
    UniformField::scalar("rotZWFactor", 0.25),
];

const DUOCYLINDER: VariantFragment = VariantFragment {
    name: "duocylinder",
    fields: DUOCYLINDER_FIELDS,
    source: r"
float latticeValue(vec3 p) {
    float w = 0.45 * sin(u_time * geom.phaseSpeed + length(p) * 2.0)
        * (0.5 + u_morphFactor + dataChannel(3) * 0.5);
    vec4 p4 = vec4(p, w);
    float spin = u_time * u_rotationSpeed;
    p4 = rotXW(spin * geom.rotXWFactor) * p4;
    p4 = rotZW(spin * geom.rotZWFactor) * p4;

    // The duocylinder lives on two orthogonal circles (xy and zw); bands
    // form where either circle sits near its radius.
    float r1 = length(p4.xy);
    float r2 = length(p4.zw);
    float band1 = exp(-abs(r1 - geom.radius1) * geom.ringFalloff * u_gridDensity * 0.35);
    float band2 = exp(-abs(r2 - geom.radius2) * geom.ringFalloff * u_gridDensity * 0.35);

    vec3 projected = project4Dto3D(p4);
    float shellTerm = 1.0 - smoothstep(0.0, u_shellWidth * 8.0, abs(length(projected) - geom.radius1));

    float blend = smoothstep(3.0, 4.5, u_dimension);
    float lattice = mix(max(band1, band2), max(max(band1, band2), shellTerm), blend);
    return pow(clamp(lattice * u_patternIntensity, 0.0, 1.0), 1.0 / max(u_universeModifier, 0.1));
}
",
};

const FULL_SCREEN_LATTICE_FIELDS: &[UniformField] = &[
    UniformField::scalar("moireScale1", 1.01),
    UniformField::scalar("moireScale2", 0.99),
    UniformField::scalar("glowIntensity", 0.4),
    UniformField::scalar("vignetteRadius", 0.85),
    UniformField::scalar("vignetteSoftness", 0.35),
    UniformField::scalar("distortStrength", 0.15),
    UniformField::vec3("centerGlow", [0.25, 0.15, 0.4]),
];

const FULL_SCREEN_LATTICE: VariantFragment = VariantFragment {
    name: "fullscreenlattice",
    fields: FULL_SCREEN_LATTICE_FIELDS,
    source: r"
float gridLines(vec2 uv, float density, float thickness) {
    vec2 cell = abs(fract(uv * density) - 0.5);
    float nearest = max(cell.x, cell.y);
    return smoothstep(0.5, 0.5 - thickness, nearest);
}

float latticeValue(vec3 p) {
    // Screen-space effect: the marched point is ignored in favour of the
    // raw fragment coordinate.
    vec2 uv = gl_FragCoord.xy / u_resolution;
    vec2 centered = uv - 0.5;
    centered.x *= u_resolution.x / max(u_resolution.y, 1.0);

    vec2 warp = geom.distortStrength
        * vec2(sin(centered.y * 6.0 + u_time * 0.7), cos(centered.x * 6.0 - u_time * 0.5))
        * (0.5 + dataChannel(4));
    vec2 warped = centered + warp + (u_mouse - 0.5) * 0.2;

    float density = u_latticeGridDensity * (1.0 + dataChannel(1) * 0.6);
    float thickness = u_lineThickness * 2.0;
    float base = gridLines(warped, density, thickness);
    float moire = gridLines(warped * geom.moireScale1, density, thickness)
        * gridLines(warped * geom.moireScale2, density, thickness);
    float lattice = clamp(base + moire * geom.glowIntensity, 0.0, 1.0);

    float vignette = smoothstep(
        geom.vignetteRadius,
        geom.vignetteRadius - geom.vignetteSoftness,
        length(centered));
    float glow = dot(geom.centerGlow, vec3(0.299, 0.587, 0.114))
        * exp(-dot(centered, centered) * 5.0);
    return pow(clamp(lattice * vignette + glow, 0.0, 1.0), 1.0 / max(u_universeModifier, 0.1));
}
",
};
