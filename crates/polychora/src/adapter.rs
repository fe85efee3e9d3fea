//! Inbound parameter adapters.
//!
//! The engine only accepts typed [`ParamUpdate`] batches; everything here
//! maps loosely-shaped external input (preset files, JSON-lines on stdin,
//! a synthetic demo feed) onto that surface. Unknown keys are skipped with
//! a log line so configs from newer or older producers keep working.

use std::io::BufRead;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use serde_json::Value;
use tracing::{debug, warn};

use engine::params::{ParamUpdate, ParamValue};
use engine::types::{GeometryType, ProjectionMethod, DATA_CHANNEL_COUNT};
use engine::variants::VariantRegistry;

/// Maps one flat JSON object onto typed updates.
pub fn updates_from_json(registry: &VariantRegistry, object: &Value) -> Vec<ParamUpdate> {
    let Some(map) = object.as_object() else {
        warn!("parameter object is not a JSON map; ignoring");
        return Vec::new();
    };

    let mut updates = Vec::new();
    for (key, value) in map {
        match key.as_str() {
            "time" => push_scalar(&mut updates, value, key, ParamUpdate::Time),
            "dimensions" => push_scalar(&mut updates, value, key, ParamUpdate::Dimensions),
            "morphFactor" => push_scalar(&mut updates, value, key, ParamUpdate::MorphFactor),
            "rotationSpeed" => push_scalar(&mut updates, value, key, ParamUpdate::RotationSpeed),
            "universeModifier" => {
                push_scalar(&mut updates, value, key, ParamUpdate::UniverseModifier)
            }
            "patternIntensity" => {
                push_scalar(&mut updates, value, key, ParamUpdate::PatternIntensity)
            }
            "gridDensity" => push_scalar(&mut updates, value, key, ParamUpdate::GridDensity),
            "gridDensity_lattice" | "latticeGridDensity" => {
                push_scalar(&mut updates, value, key, ParamUpdate::LatticeGridDensity)
            }
            "lineThickness" => push_scalar(&mut updates, value, key, ParamUpdate::LineThickness),
            "shellWidth" => push_scalar(&mut updates, value, key, ParamUpdate::ShellWidth),
            "tetraThickness" => push_scalar(&mut updates, value, key, ParamUpdate::TetraThickness),
            "glitchIntensity" => {
                push_scalar(&mut updates, value, key, ParamUpdate::GlitchIntensity)
            }
            "colorShift" => push_scalar(&mut updates, value, key, ParamUpdate::ColorShift),
            "geometryType" | "geometry" => {
                if let Some(name) = value.as_str() {
                    updates.push(ParamUpdate::Geometry(registry.resolve_geometry(name)));
                } else {
                    warn!(key = key.as_str(), "expected a string variant name");
                }
            }
            "projectionMethod" | "projection" => {
                if let Some(name) = value.as_str() {
                    updates.push(ParamUpdate::Projection(registry.resolve_projection(name)));
                } else {
                    warn!(key = key.as_str(), "expected a string variant name");
                }
            }
            "mouse" => {
                if let Some([x, y]) = vec2(value) {
                    updates.push(ParamUpdate::Mouse([x, y]));
                } else {
                    warn!(key = key.as_str(), "expected a 2-element number array");
                }
            }
            "primaryColor" => push_color(&mut updates, value, key, ParamUpdate::PrimaryColor),
            "secondaryColor" => push_color(&mut updates, value, key, ParamUpdate::SecondaryColor),
            "backgroundColor" => {
                push_color(&mut updates, value, key, ParamUpdate::BackgroundColor)
            }
            "dataChannels" => {
                if let Some(channels) = data_channels(value) {
                    updates.push(ParamUpdate::DataChannels(channels));
                } else {
                    warn!(key = key.as_str(), "expected a number array");
                }
            }
            other => {
                if let Some(geometry) = GeometryType::from_name(other) {
                    push_group(&mut updates, value, other, |field, value| {
                        ParamUpdate::GeometryField {
                            geometry,
                            field,
                            value,
                        }
                    });
                } else if let Some(projection) = ProjectionMethod::from_name(other) {
                    push_group(&mut updates, value, other, |field, value| {
                        ParamUpdate::ProjectionField {
                            projection,
                            field,
                            value,
                        }
                    });
                } else {
                    debug!(key = other, "ignoring unrecognized parameter key");
                }
            }
        }
    }
    updates
}

fn push_scalar(
    updates: &mut Vec<ParamUpdate>,
    value: &Value,
    key: &str,
    build: impl FnOnce(f32) -> ParamUpdate,
) {
    if let Some(number) = value.as_f64() {
        updates.push(build(number as f32));
    } else {
        warn!(key, "expected a number");
    }
}

fn push_color(
    updates: &mut Vec<ParamUpdate>,
    value: &Value,
    key: &str,
    build: impl FnOnce([f32; 3]) -> ParamUpdate,
) {
    if let Some(rgb) = vec3(value) {
        updates.push(build(rgb));
    } else {
        warn!(key, "expected a 3-element number array");
    }
}

fn push_group(
    updates: &mut Vec<ParamUpdate>,
    value: &Value,
    group: &str,
    build: impl Fn(String, ParamValue) -> ParamUpdate,
) {
    let Some(fields) = value.as_object() else {
        warn!(group, "expected an object of group fields");
        return;
    };
    for (field, value) in fields {
        if let Some(value) = param_value(value) {
            updates.push(build(field.clone(), value));
        } else {
            warn!(group, field = field.as_str(), "unsupported field value");
        }
    }
}

fn param_value(value: &Value) -> Option<ParamValue> {
    if let Some(number) = value.as_f64() {
        return Some(ParamValue::Scalar(number as f32));
    }
    if let Some([x, y]) = vec2(value) {
        return Some(ParamValue::Vec2([x, y]));
    }
    vec3(value).map(ParamValue::Vec3)
}

fn numbers(value: &Value) -> Option<Vec<f32>> {
    value.as_array().and_then(|items| {
        items
            .iter()
            .map(|item| item.as_f64().map(|number| number as f32))
            .collect()
    })
}

fn vec2(value: &Value) -> Option<[f32; 2]> {
    match numbers(value)?.as_slice() {
        &[x, y] => Some([x, y]),
        _ => None,
    }
}

fn vec3(value: &Value) -> Option<[f32; 3]> {
    match numbers(value)?.as_slice() {
        &[x, y, z] => Some([x, y, z]),
        _ => None,
    }
}

/// Fills the fixed 64-slot array; shorter inputs pad with zeros, longer
/// inputs are truncated.
fn data_channels(value: &Value) -> Option<Box<[f32; DATA_CHANNEL_COUNT]>> {
    let values = numbers(value)?;
    let mut channels = Box::new([0.0f32; DATA_CHANNEL_COUNT]);
    for (slot, value) in channels.iter_mut().zip(values) {
        *slot = value;
    }
    Some(channels)
}

/// Streams JSON-lines parameter objects from stdin until EOF.
pub fn spawn_stdin_stream(sender: Sender<Vec<ParamUpdate>>) -> anyhow::Result<()> {
    thread::Builder::new()
        .name("polychora-stdin".into())
        .spawn(move || {
            let registry = VariantRegistry::new();
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(err) => {
                        warn!(error = %err, "stdin stream closed");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<Value>(&line) {
                    Ok(object) => {
                        let updates = updates_from_json(&registry, &object);
                        if !updates.is_empty() && sender.send(updates).is_err() {
                            break;
                        }
                    }
                    Err(err) => warn!(error = %err, "skipping malformed JSON line"),
                }
            }
        })
        .map_err(|err| anyhow::anyhow!("failed to spawn stdin stream thread: {err}"))?;
    Ok(())
}

/// Synthesizes a 64-channel sine feed at ~30 Hz, standing in for a real
/// analytics pipeline while demoing.
pub fn spawn_demo_stream(sender: Sender<Vec<ParamUpdate>>) -> anyhow::Result<()> {
    thread::Builder::new()
        .name("polychora-demo".into())
        .spawn(move || {
            let origin = Instant::now();
            loop {
                let t = origin.elapsed().as_secs_f32();
                let mut channels = Box::new([0.0f32; DATA_CHANNEL_COUNT]);
                for (index, slot) in channels.iter_mut().enumerate() {
                    let frequency = 0.25 + index as f32 * 0.09;
                    let phase = index as f32 * 0.6;
                    *slot = 0.5 + 0.5 * (t * frequency + phase).sin();
                }
                if sender.send(vec![ParamUpdate::DataChannels(channels)]).is_err() {
                    break;
                }
                thread::sleep(Duration::from_millis(33));
            }
        })
        .map_err(|err| anyhow::anyhow!("failed to spawn demo stream thread: {err}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> VariantRegistry {
        VariantRegistry::new()
    }

    #[test]
    fn scalar_keys_map_to_typed_updates() {
        let updates = updates_from_json(
            &registry(),
            &json!({ "morphFactor": 0.7, "gridDensity": 10.5 }),
        );
        assert!(updates.contains(&ParamUpdate::MorphFactor(0.7)));
        assert!(updates.contains(&ParamUpdate::GridDensity(10.5)));
    }

    #[test]
    fn variant_names_resolve_case_insensitively() {
        let updates = updates_from_json(
            &registry(),
            &json!({ "geometryType": "HyperSphere", "projectionMethod": "stereographic" }),
        );
        assert!(updates.contains(&ParamUpdate::Geometry(GeometryType::Hypersphere)));
        assert!(updates.contains(&ParamUpdate::Projection(ProjectionMethod::Stereographic)));
    }

    #[test]
    fn unknown_variant_names_fall_back_to_default() {
        let updates = updates_from_json(&registry(), &json!({ "geometryType": "nonexistent" }));
        assert!(updates.contains(&ParamUpdate::Geometry(GeometryType::default())));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let updates = updates_from_json(
            &registry(),
            &json!({ "futureKnob": 1.0, "colorShift": 0.25 }),
        );
        assert_eq!(updates, vec![ParamUpdate::ColorShift(0.25)]);
    }

    #[test]
    fn short_data_channel_arrays_pad_with_zeros() {
        let updates = updates_from_json(&registry(), &json!({ "dataChannels": [1.0, 2.0] }));
        let ParamUpdate::DataChannels(channels) = &updates[0] else {
            panic!("expected a data channel update");
        };
        assert_eq!(channels[0], 1.0);
        assert_eq!(channels[1], 2.0);
        assert!(channels[2..].iter().all(|&value| value == 0.0));
    }

    #[test]
    fn nested_groups_map_to_variant_fields() {
        let updates = updates_from_json(
            &registry(),
            &json!({
                "hypercube": { "wCoordFactor1": 1.9 },
                "perspective": { "distance": 3.5 }
            }),
        );
        assert!(updates.contains(&ParamUpdate::GeometryField {
            geometry: GeometryType::Hypercube,
            field: "wCoordFactor1".into(),
            value: ParamValue::Scalar(1.9),
        }));
        assert!(updates.contains(&ParamUpdate::ProjectionField {
            projection: ProjectionMethod::Perspective,
            field: "distance".into(),
            value: ParamValue::Scalar(3.5),
        }));
    }

    #[test]
    fn colors_map_to_granular_updates() {
        let updates = updates_from_json(
            &registry(),
            &json!({ "primaryColor": [1.0, 0.5, 0.0], "backgroundColor": [0.0, 0.0, 0.0] }),
        );
        assert!(updates.contains(&ParamUpdate::PrimaryColor([1.0, 0.5, 0.0])));
        assert!(updates.contains(&ParamUpdate::BackgroundColor([0.0, 0.0, 0.0])));
    }
}
