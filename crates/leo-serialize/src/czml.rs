//! CZML export for playback in Cesium. Not part of the simulator's core
//! data model — a presentation layer consuming [`ScenarioOutputs`].

use std::path::Path;

use chrono::Duration;
use serde_json::{json, Value};

use crate::{Result, ScenarioOutputs, SerializeError};

const SYSTEM_CLOCK_MULTIPLIER: f64 = 60.0;

fn iso_at_minute(outputs: &ScenarioOutputs, t: usize) -> String {
    (outputs.epoch + Duration::minutes(t as i64))
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string()
}

fn document_packet(outputs: &ScenarioOutputs) -> Value {
    let start = iso_at_minute(outputs, 0);
    let stop = iso_at_minute(outputs, outputs.sim_period_min.saturating_sub(1));
    json!({
        "id": "document",
        "name": "leo-sim-cli scenario",
        "version": "1.0",
        "clock": {
            "interval": format!("{start}/{stop}"),
            "currentTime": start,
            "multiplier": SYSTEM_CLOCK_MULTIPLIER,
            "range": "LOOP_STOP",
            "step": "SYSTEM_CLOCK_MULTIPLIER",
        }
    })
}

fn satellite_packet(outputs: &ScenarioOutputs, sat_id: &str) -> Value {
    let record = &outputs.satellites[sat_id];
    let epoch = iso_at_minute(outputs, 0);
    let mut cartesian = Vec::with_capacity(record.track.len() * 4);
    for &(t_seconds, x, y, z) in &record.track {
        cartesian.extend_from_slice(&[t_seconds as f64, x, y, z]);
    }
    json!({
        "id": sat_id,
        "position": {
            "interpolationAlgorithm": "LAGRANGE",
            "interpolationDegree": 5,
            "referenceFrame": "INERTIAL",
            "epoch": epoch,
            "cartesian": cartesian,
        }
    })
}

fn ground_station_packet(gt_id: &str, lat_deg: f64, lon_deg: f64) -> Value {
    json!({
        "id": gt_id,
        "position": {
            "cartographicRadians": [lon_deg.to_radians(), lat_deg.to_radians(), 0.0],
        }
    })
}

/// One polyline packet per contiguous attachment run (gt stays attached to
/// the same satellite), skipping disconnected ("none") runs.
fn attachment_interval_packets(outputs: &ScenarioOutputs, gt_id: &str) -> Vec<Value> {
    let attachments = &outputs.attachments[gt_id];
    let mut packets = Vec::new();
    let mut run_start = 0usize;

    for t in 1..=attachments.len() {
        let boundary = t == attachments.len() || attachments[t] != attachments[run_start];
        if boundary {
            if let Some(sat_id) = &attachments[run_start] {
                let start = iso_at_minute(outputs, run_start);
                let end = iso_at_minute(outputs, t.min(attachments.len()) - 1);
                packets.push(json!({
                    "id": format!("attachment-{gt_id}-{run_start}"),
                    "availability": format!("{start}/{end}"),
                    "polyline": {
                        "positions": {
                            "references": [
                                format!("{gt_id}#position"),
                                format!("{sat_id}#position"),
                            ]
                        },
                        "material": { "solidColor": { "color": { "rgba": [255, 255, 0, 200] } } },
                    }
                }));
            }
            run_start = t;
        }
    }
    packets
}

fn pair_route_packets(outputs: &ScenarioOutputs) -> Vec<Value> {
    let mut packets = Vec::new();
    for ((consumer, producer), routes) in &outputs.pair_routes {
        let mut previous: Option<&Vec<String>> = None;
        for (t, route) in routes.iter().enumerate() {
            let Some(path) = route else {
                previous = None;
                continue;
            };
            if path.len() >= 2 {
                let references: Vec<String> =
                    path.iter().map(|sat| format!("{sat}#position")).collect();
                let time = iso_at_minute(outputs, t);
                let next_time = iso_at_minute(outputs, (t + 1).min(outputs.sim_period_min - 1));
                packets.push(json!({
                    "id": format!("route-{consumer}+{producer}-{t}"),
                    "availability": format!("{time}/{next_time}"),
                    "polyline": {
                        "positions": { "references": references },
                        "material": { "solidColor": { "color": { "rgba": [0, 255, 0, 200] } } },
                    }
                }));
                if let Some(prev_path) = previous {
                    if prev_path != path && prev_path.len() >= 2 {
                        let prev_references: Vec<String> = prev_path
                            .iter()
                            .map(|sat| format!("{sat}#position"))
                            .collect();
                        packets.push(json!({
                            "id": format!("route-{consumer}+{producer}-{t}-previous"),
                            "availability": format!("{time}/{next_time}"),
                            "polyline": {
                                "positions": { "references": prev_references },
                                "material": { "solidColor": { "color": { "rgba": [255, 0, 0, 200] } } },
                            }
                        }));
                    }
                }
            }
            previous = Some(path);
        }
    }
    packets
}

/// Writes the full CZML document (a JSON array of packets) to `path`.
pub fn write_document<P: AsRef<Path>>(outputs: &ScenarioOutputs, path: P) -> Result<()> {
    let path_ref = path.as_ref();
    tracing::info!(path = %path_ref.display(), "writing CZML document");

    let mut packets = vec![document_packet(outputs)];

    let mut sat_ids: Vec<&String> = outputs.satellites.keys().collect();
    sat_ids.sort();
    for sat_id in sat_ids {
        packets.push(satellite_packet(outputs, sat_id));
    }

    let mut gt_ids: Vec<&String> = outputs.ground_stations.keys().collect();
    gt_ids.sort();
    for gt_id in &gt_ids {
        let &(lat, lon) = &outputs.ground_stations[*gt_id];
        packets.push(ground_station_packet(gt_id, lat, lon));
        packets.extend(attachment_interval_packets(outputs, gt_id));
    }

    packets.extend(pair_route_packets(outputs));

    let file = std::fs::File::create(path_ref).map_err(|source| SerializeError::Io {
        path: path_ref.display().to_string(),
        source,
    })?;
    serde_json::to_writer_pretty(file, &Value::Array(packets))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SatelliteRecord;
    use chrono::NaiveDate;
    use std::collections::HashMap;

    fn sample_outputs() -> ScenarioOutputs {
        let mut satellites = HashMap::new();
        satellites.insert(
            "sat-0-0".to_string(),
            SatelliteRecord {
                orbit_index: 0,
                sat_index: 0,
                track: vec![(0, 7_000_000.0, 0.0, 0.0), (60, 7_000_000.0, 10_000.0, 0.0)],
            },
        );
        let mut ground_stations = HashMap::new();
        ground_stations.insert("city-Zurich".to_string(), (47.3769, 8.5417));

        let mut attachments = HashMap::new();
        attachments.insert(
            "city-Zurich".to_string(),
            vec![Some("sat-0-0".to_string()), Some("sat-0-0".to_string())],
        );

        ScenarioOutputs {
            epoch: NaiveDate::from_ymd_opt(2021, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            sim_period_min: 2,
            satellites,
            ground_stations,
            topology_edges: Vec::new(),
            attachments,
            pair_routes: HashMap::new(),
            cross_stats: HashMap::new(),
            global_routes: HashMap::new(),
        }
    }

    #[test]
    fn writes_valid_json_array_with_document_packet_first() {
        let outputs = sample_outputs();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenario.czml");
        write_document(&outputs, &path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let value: Value = serde_json::from_str(&contents).unwrap();
        let packets = value.as_array().unwrap();
        assert_eq!(packets[0]["id"], "document");
        assert!(packets.iter().any(|p| p["id"] == "sat-0-0"));
        assert!(packets.iter().any(|p| p["id"] == "city-Zurich"));
    }
}
