use std::path::PathBuf;

use clap::Parser;
use engine::SnapshotFormat;

#[derive(Parser, Debug)]
#[command(
    name = "polychora",
    author,
    version,
    about = "4D geometry visualizer",
    arg_required_else_help = false
)]
pub struct Cli {
    /// Geometry variant to start with (hypercube, hypersphere,
    /// hypertetrahedron, duocylinder, fullscreenlattice).
    #[arg(long, value_name = "NAME", default_value = "hypercube")]
    pub geometry: String,

    /// Projection variant to start with (perspective, orthographic,
    /// stereographic).
    #[arg(long, value_name = "NAME", default_value = "perspective")]
    pub projection: String,

    /// Window size (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub size: Option<(u32, u32)>,

    /// Optional FPS cap; omit to render on every host frame callback.
    #[arg(long, value_name = "FPS")]
    pub fps: Option<f32>,

    /// Prefer the low-power GPU adapter.
    #[arg(long)]
    pub low_power: bool,

    /// JSON file with a flat parameter object applied at startup.
    #[arg(long, value_name = "FILE")]
    pub preset: Option<PathBuf>,

    /// Capture the first frame to this path, then exit (see
    /// `--no-snapshot-exit`).
    #[arg(long, value_name = "PATH")]
    pub snapshot: Option<PathBuf>,

    /// Snapshot size; defaults to the window size.
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub snapshot_size: Option<(u32, u32)>,

    /// Snapshot encoding; inferred from the path extension when omitted.
    #[arg(long, value_name = "FORMAT", value_parser = parse_format)]
    pub snapshot_format: Option<SnapshotFormat>,

    /// JPEG quality (1-100).
    #[arg(long, value_name = "QUALITY")]
    pub snapshot_quality: Option<u8>,

    /// Keep rendering after the snapshot is written.
    #[arg(long)]
    pub no_snapshot_exit: bool,

    /// Read JSON-lines parameter objects from stdin and stream them into
    /// the running visualizer.
    #[arg(long)]
    pub stdin_stream: bool,

    /// Feed the 64 data channels with synthetic sine waves (stands in for
    /// an analytics pipeline).
    #[arg(long)]
    pub demo_stream: bool,
}

pub fn parse() -> Cli {
    Cli::parse()
}

fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got `{value}`"))?;
    let width: u32 = width
        .trim()
        .parse()
        .map_err(|err| format!("invalid width `{width}`: {err}"))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|err| format!("invalid height `{height}`: {err}"))?;
    if width == 0 || height == 0 {
        return Err("size must be non-zero".into());
    }
    Ok((width, height))
}

fn parse_format(value: &str) -> Result<SnapshotFormat, String> {
    match value.to_ascii_lowercase().as_str() {
        "png" => Ok(SnapshotFormat::Png),
        "jpeg" | "jpg" => Ok(SnapshotFormat::Jpeg),
        "buffer" | "raw" => Ok(SnapshotFormat::Buffer),
        other => Err(format!("unknown snapshot format `{other}`")),
    }
}

/// Picks a snapshot encoding from the explicit flag or the path extension,
/// defaulting to PNG.
pub fn snapshot_format(cli: &Cli, path: &std::path::Path) -> SnapshotFormat {
    if let Some(format) = cli.snapshot_format {
        return format;
    }
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => SnapshotFormat::Jpeg,
        Some("raw") | Some("rgba") => SnapshotFormat::Buffer,
        _ => SnapshotFormat::Png,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_parser_accepts_wxh() {
        assert_eq!(parse_size("1280x720"), Ok((1280, 720)));
        assert_eq!(parse_size("64X64"), Ok((64, 64)));
        assert!(parse_size("1280").is_err());
        assert!(parse_size("0x10").is_err());
    }

    #[test]
    fn format_falls_back_to_extension() {
        let cli = Cli::parse_from(["polychora"]);
        assert_eq!(
            snapshot_format(&cli, std::path::Path::new("out.jpeg")),
            SnapshotFormat::Jpeg
        );
        assert_eq!(
            snapshot_format(&cli, std::path::Path::new("out.png")),
            SnapshotFormat::Png
        );
        assert_eq!(
            snapshot_format(&cli, std::path::Path::new("out")),
            SnapshotFormat::Png
        );
    }

    #[test]
    fn explicit_format_wins_over_extension() {
        let cli = Cli::parse_from(["polychora", "--snapshot-format", "buffer"]);
        assert_eq!(
            snapshot_format(&cli, std::path::Path::new("out.png")),
            SnapshotFormat::Buffer
        );
    }
}
