use std::fmt;

/// Number of general-purpose data-channel slots exposed to shaders.
///
/// External feeds (audio analysis, telemetry, anything numeric) write into
/// these slots; the array is always uploaded whole, regardless of how many
/// slots the active shader actually reads.
pub const DATA_CHANNEL_COUNT: usize = 64;

/// The renderable 4D geometry variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryType {
    Hypercube,
    Hypersphere,
    Hypertetrahedron,
    Duocylinder,
    /// Screen-space lattice effect; flips the engine into full-screen mode
    /// (no projected solid, the lattice covers the whole viewport).
    FullScreenLattice,
}

impl GeometryType {
    pub const ALL: [GeometryType; 5] = [
        GeometryType::Hypercube,
        GeometryType::Hypersphere,
        GeometryType::Hypertetrahedron,
        GeometryType::Duocylinder,
        GeometryType::FullScreenLattice,
    ];

    /// Canonical lower-case name, used for pipeline cache keys and logs.
    pub fn name(self) -> &'static str {
        match self {
            GeometryType::Hypercube => "hypercube",
            GeometryType::Hypersphere => "hypersphere",
            GeometryType::Hypertetrahedron => "hypertetrahedron",
            GeometryType::Duocylinder => "duocylinder",
            GeometryType::FullScreenLattice => "fullscreenlattice",
        }
    }

    /// Case-insensitive lookup. Returns `None` for unregistered names;
    /// callers on the hot path fall back to the default and log instead of
    /// erroring.
    pub fn from_name(name: &str) -> Option<Self> {
        let lowered = name.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|variant| variant.name() == lowered)
    }

    pub(crate) fn index(self) -> usize {
        match self {
            GeometryType::Hypercube => 0,
            GeometryType::Hypersphere => 1,
            GeometryType::Hypertetrahedron => 2,
            GeometryType::Duocylinder => 3,
            GeometryType::FullScreenLattice => 4,
        }
    }
}

impl Default for GeometryType {
    fn default() -> Self {
        GeometryType::Hypercube
    }
}

impl fmt::Display for GeometryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How 4D points collapse into the 3D space the ray marcher walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProjectionMethod {
    Perspective,
    Orthographic,
    Stereographic,
}

impl ProjectionMethod {
    pub const ALL: [ProjectionMethod; 3] = [
        ProjectionMethod::Perspective,
        ProjectionMethod::Orthographic,
        ProjectionMethod::Stereographic,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ProjectionMethod::Perspective => "perspective",
            ProjectionMethod::Orthographic => "orthographic",
            ProjectionMethod::Stereographic => "stereographic",
        }
    }

    /// Case-insensitive lookup; `None` for unregistered names.
    pub fn from_name(name: &str) -> Option<Self> {
        let lowered = name.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|variant| variant.name() == lowered)
    }

    pub(crate) fn index(self) -> usize {
        match self {
            ProjectionMethod::Perspective => 0,
            ProjectionMethod::Orthographic => 1,
            ProjectionMethod::Stereographic => 2,
        }
    }
}

impl Default for ProjectionMethod {
    fn default() -> Self {
        ProjectionMethod::Perspective
    }
}

impl fmt::Display for ProjectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Named RGB triples consumed by every shader variant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorScheme {
    pub primary: [f32; 3],
    pub secondary: [f32; 3],
    pub background: [f32; 3],
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self {
            primary: [1.0, 0.2, 0.8],
            secondary: [0.2, 1.0, 1.0],
            background: [0.05, 0.0, 0.2],
        }
    }
}

/// Which GPU adapter class to request at device acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerProfile {
    /// Integrated/battery-friendly adapter.
    LowPower,
    /// Discrete adapter where one exists.
    HighPerformance,
}

impl Default for PowerProfile {
    fn default() -> Self {
        Self::HighPerformance
    }
}

/// Encoding requested from [`crate::Visualizer::snapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotFormat {
    Png,
    Jpeg,
    /// Raw RGBA8 bytes, row padding already stripped.
    Buffer,
}

/// A single offscreen capture request.
///
/// Width/height default to the current surface size; `quality` only applies
/// to JPEG output.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotRequest {
    pub format: SnapshotFormat,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub quality: Option<u8>,
}

impl SnapshotRequest {
    pub fn new(format: SnapshotFormat) -> Self {
        Self {
            format,
            width: None,
            height: None,
            quality: None,
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }
}

/// The product of a snapshot pass.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub width: u32,
    pub height: u32,
    pub format: SnapshotFormat,
    /// Encoded image bytes for `Png`/`Jpeg`, tightly packed RGBA8 for
    /// `Buffer`.
    pub bytes: Vec<u8>,
}

/// Immutable configuration handed to [`crate::Visualizer::new`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Initial surface size in physical pixels.
    pub surface_size: (u32, u32),
    /// Geometry selected before any update arrives.
    pub geometry: GeometryType,
    /// Projection selected before any update arrives.
    pub projection: ProjectionMethod,
    /// Optional FPS cap honored by the windowed runner; `None` renders on
    /// every host frame callback.
    pub target_fps: Option<f32>,
    /// Adapter class requested at device acquisition.
    pub power: PowerProfile,
}

impl Default for EngineConfig {
    /// 720p, hypercube under perspective projection, uncapped.
    fn default() -> Self {
        Self {
            surface_size: (1280, 720),
            geometry: GeometryType::default(),
            projection: ProjectionMethod::default(),
            target_fps: None,
            power: PowerProfile::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_names_round_trip() {
        for variant in GeometryType::ALL {
            assert_eq!(GeometryType::from_name(variant.name()), Some(variant));
        }
        assert_eq!(
            GeometryType::from_name("  HyperCube "),
            Some(GeometryType::Hypercube)
        );
        assert_eq!(GeometryType::from_name("klein-bottle"), None);
    }

    #[test]
    fn projection_names_round_trip() {
        for variant in ProjectionMethod::ALL {
            assert_eq!(ProjectionMethod::from_name(variant.name()), Some(variant));
        }
        assert_eq!(
            ProjectionMethod::from_name("STEREOGRAPHIC"),
            Some(ProjectionMethod::Stereographic)
        );
        assert_eq!(ProjectionMethod::from_name(""), None);
    }
}
