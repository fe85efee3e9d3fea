use std::fs;

use anyhow::{Context, Result};
use crossbeam_channel::unbounded;
use tracing::info;
use tracing_subscriber::EnvFilter;

use engine::types::{EngineConfig, PowerProfile, SnapshotRequest};
use engine::variants::VariantRegistry;
use engine::window::{self, RunOptions, SnapshotJob};

use crate::adapter;
use crate::cli::{self, Cli};

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

pub fn run(cli: Cli) -> Result<()> {
    let registry = VariantRegistry::new();
    let geometry = registry.resolve_geometry(&cli.geometry);
    let projection = registry.resolve_projection(&cli.projection);

    let config = EngineConfig {
        surface_size: cli.size.unwrap_or((1280, 720)),
        geometry,
        projection,
        target_fps: cli.fps,
        power: if cli.low_power {
            PowerProfile::LowPower
        } else {
            PowerProfile::HighPerformance
        },
    };

    let wants_stream = cli.preset.is_some() || cli.stdin_stream || cli.demo_stream;
    let updates = if wants_stream {
        let (sender, receiver) = unbounded();
        if let Some(path) = &cli.preset {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read preset {}", path.display()))?;
            let object = serde_json::from_str(&raw)
                .with_context(|| format!("preset {} is not valid JSON", path.display()))?;
            let batch = adapter::updates_from_json(&registry, &object);
            info!(
                path = %path.display(),
                updates = batch.len(),
                "loaded parameter preset"
            );
            if !batch.is_empty() {
                let _ = sender.send(batch);
            }
        }
        if cli.stdin_stream {
            adapter::spawn_stdin_stream(sender.clone())?;
        }
        if cli.demo_stream {
            adapter::spawn_demo_stream(sender.clone())?;
        }
        Some(receiver)
    } else {
        None
    };

    let snapshot = cli.snapshot.clone().map(|path| {
        let format = cli::snapshot_format(&cli, &path);
        let mut request = SnapshotRequest::new(format);
        if let Some((width, height)) = cli.snapshot_size {
            request = request.with_size(width, height);
        }
        request.quality = cli.snapshot_quality;
        SnapshotJob {
            path,
            request,
            exit_after: !cli.no_snapshot_exit,
        }
    });

    window::run(RunOptions {
        config,
        title: "polychora".into(),
        updates,
        snapshot,
    })
}
