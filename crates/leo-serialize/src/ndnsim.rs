//! ndnSIM CSV export, consumed by the `ns-3`/ndnSIM-side scenario driver.
//! A presentation layer over [`ScenarioOutputs`]; never mutates it.

use std::path::Path;

use crate::{Result, ScenarioOutputs, SerializeError};

fn csv_error(path: &Path, source: csv::Error) -> SerializeError {
    SerializeError::Csv {
        path: path.display().to_string(),
        source,
    }
}

fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}

fn write_nodes(outputs: &ScenarioOutputs, dir: &Path) -> Result<()> {
    let path = dir.join("nodes.csv");
    let mut writer = csv::Writer::from_path(&path).map_err(|e| csv_error(&path, e))?;
    writer
        .write_record(["Name", "Type"])
        .map_err(|e| csv_error(&path, e))?;

    let mut sat_ids: Vec<&String> = outputs.satellites.keys().collect();
    sat_ids.sort();
    for sat_id in sat_ids {
        writer
            .write_record([sat_id.as_str(), "Satellite"])
            .map_err(|e| csv_error(&path, e))?;
    }

    let mut gt_ids: Vec<&String> = outputs.ground_stations.keys().collect();
    gt_ids.sort();
    for gt_id in gt_ids {
        writer
            .write_record([gt_id.as_str(), "Station"])
            .map_err(|e| csv_error(&path, e))?;
    }

    writer.flush().map_err(|e| SerializeError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(())
}

fn write_isls(outputs: &ScenarioOutputs, dir: &Path) -> Result<()> {
    let path = dir.join("ISLs.csv");
    let mut writer = csv::Writer::from_path(&path).map_err(|e| csv_error(&path, e))?;
    writer
        .write_record(["First", "Second"])
        .map_err(|e| csv_error(&path, e))?;
    for (a, b) in &outputs.topology_edges {
        writer
            .write_record([a.as_str(), b.as_str()])
            .map_err(|e| csv_error(&path, e))?;
    }
    writer.flush().map_err(|e| SerializeError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(())
}

/// One run-length-compressed `attachments_<gt>.csv` per ground station,
/// emitting a row only when the attachment changes. Disconnected epochs are
/// encoded as `-`.
fn write_attachments(outputs: &ScenarioOutputs, dir: &Path) -> Result<()> {
    for (gt_id, attachments) in &outputs.attachments {
        let path = dir.join(format!("attachments_{}.csv", sanitize(gt_id)));
        let mut writer = csv::Writer::from_path(&path).map_err(|e| csv_error(&path, e))?;
        writer
            .write_record(["Time", "Satellite"])
            .map_err(|e| csv_error(&path, e))?;

        let mut last: Option<&Option<String>> = None;
        for (t, sat) in attachments.iter().enumerate() {
            if last != Some(sat) {
                let cell = sat.as_deref().unwrap_or("-");
                writer
                    .write_record([t.to_string().as_str(), cell])
                    .map_err(|e| csv_error(&path, e))?;
                last = Some(sat);
            }
        }
        writer.flush().map_err(|e| SerializeError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
    }
    Ok(())
}

fn write_pairs_and_routes(outputs: &ScenarioOutputs, dir: &Path) -> Result<()> {
    let pairs_path = dir.join("pairs.csv");
    let mut pairs_writer = csv::Writer::from_path(&pairs_path).map_err(|e| csv_error(&pairs_path, e))?;
    pairs_writer
        .write_record(["Consumer", "Producer"])
        .map_err(|e| csv_error(&pairs_path, e))?;

    let mut pair_keys: Vec<&(String, String)> = outputs.pair_routes.keys().collect();
    pair_keys.sort();

    for (consumer, producer) in &pair_keys {
        pairs_writer
            .write_record([consumer.as_str(), producer.as_str()])
            .map_err(|e| csv_error(&pairs_path, e))?;

        let routes = &outputs.pair_routes[&(consumer.to_string(), producer.to_string())];
        let route_path = dir.join(format!(
            "routes_{}+{}.csv",
            sanitize(consumer),
            sanitize(producer)
        ));
        let mut route_writer =
            csv::Writer::from_path(&route_path).map_err(|e| csv_error(&route_path, e))?;
        route_writer
            .write_record(["Time", "Path"])
            .map_err(|e| csv_error(&route_path, e))?;
        for (t, route) in routes.iter().enumerate() {
            let joined = route
                .as_ref()
                .map(|path| path.join("|"))
                .unwrap_or_default();
            route_writer
                .write_record([t.to_string().as_str(), joined.as_str()])
                .map_err(|e| csv_error(&route_path, e))?;
        }
        route_writer.flush().map_err(|e| SerializeError::Io {
            path: route_path.display().to_string(),
            source: e,
        })?;
    }

    pairs_writer.flush().map_err(|e| SerializeError::Io {
        path: pairs_path.display().to_string(),
        source: e,
    })?;
    Ok(())
}

/// Writes the full ndnSIM export set into `dir`, which must already exist.
pub fn write_all<P: AsRef<Path>>(outputs: &ScenarioOutputs, dir: P) -> Result<()> {
    let dir_ref = dir.as_ref();
    tracing::info!(dir = %dir_ref.display(), "writing ndnSIM export");
    write_nodes(outputs, dir_ref)?;
    write_isls(outputs, dir_ref)?;
    write_attachments(outputs, dir_ref)?;
    write_pairs_and_routes(outputs, dir_ref)?;
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
                track: vec![(0, 0.0, 0.0, 0.0)],
            },
        );
        let mut ground_stations = HashMap::new();
        ground_stations.insert("city-Zurich".to_string(), (47.3769, 8.5417));

        let mut attachments = HashMap::new();
        attachments.insert(
            "city-Zurich".to_string(),
            vec![
                Some("sat-0-0".to_string()),
                Some("sat-0-0".to_string()),
                None,
            ],
        );

        let mut pair_routes = HashMap::new();
        pair_routes.insert(
            ("city-Zurich".to_string(), "city-Zurich".to_string()),
            vec![Some(vec!["sat-0-0".to_string()]), None, None],
        );

        ScenarioOutputs {
            epoch: NaiveDate::from_ymd_opt(2021, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            sim_period_min: 3,
            satellites,
            ground_stations,
            topology_edges: vec![("sat-0-0".to_string(), "sat-0-1".to_string())],
            attachments,
            pair_routes,
            cross_stats: HashMap::new(),
            global_routes: HashMap::new(),
        }
    }

    #[test]
    fn writes_expected_files() {
        let outputs = sample_outputs();
        let dir = tempfile::tempdir().unwrap();
        write_all(&outputs, dir.path()).unwrap();

        assert!(dir.path().join("nodes.csv").exists());
        assert!(dir.path().join("ISLs.csv").exists());
        assert!(dir.path().join("pairs.csv").exists());
        assert!(dir.path().join("attachments_city-Zurich.csv").exists());
        assert!(dir
            .path()
            .join("routes_city-Zurich+city-Zurich.csv")
            .exists());
    }

    #[test]
    fn attachments_are_run_length_compressed() {
        let outputs = sample_outputs();
        let dir = tempfile::tempdir().unwrap();
        write_all(&outputs, dir.path()).unwrap();

        let contents =
            std::fs::read_to_string(dir.path().join("attachments_city-Zurich.csv")).unwrap();
        // header + 2 rows (t=0 attach, t=2 disconnect); t=1 is compressed away.
        assert_eq!(contents.lines().count(), 3);
        assert!(contents.contains("-"));
    }
}
