//! Ground station data model and `cities.csv` loader.
//!
//! Ground stations (GTs) are plain geodetic points (latitude/longitude,
//! altitude 0) that the routing engine attaches to nearby satellites. This
//! crate owns loading and validating them from a world-cities-style CSV.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StationError {
    #[error("failed to read ground station file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: csv::Error,
    },
    #[error("no ground stations matched the requested targets")]
    NoMatches,
}

pub type Result<T> = std::result::Result<T, StationError>;

/// One row of the source CSV, matching the `Urban Agglomeration, Latitude,
/// Longitude` columns the reference simulator reads ground stations from.
#[derive(Debug, Deserialize)]
struct CityRecord {
    #[serde(rename = "Urban Agglomeration")]
    city: String,
    #[serde(rename = "Latitude")]
    lat: f64,
    #[serde(rename = "Longitude")]
    lng: f64,
}

/// A ground station: a named geodetic point used as a routing endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundStation {
    pub id: String,
    pub name: String,
    pub lat_deg: f64,
    pub lon_deg: f64,
}

fn is_valid_latitude(lat: f64) -> bool {
    (-90.0..=90.0).contains(&lat)
}

fn is_valid_longitude(lon: f64) -> bool {
    (-180.0..=180.0).contains(&lon)
}

/// Loads ground stations from a cities CSV.
///
/// `targets`, if given, restricts the result to cities whose name matches
/// (case-insensitively) one of the listed names, preserving the order of
/// `targets` rather than file order. `max_cities` caps the number of
/// stations returned after filtering, matching the reference simulator's
/// `MAX_CITIES` knob for keeping small demo runs fast.
pub fn load_cities<P: AsRef<Path>>(
    path: P,
    targets: Option<&[String]>,
    max_cities: Option<usize>,
) -> Result<Vec<GroundStation>> {
    let path_ref = path.as_ref();
    let mut reader = csv::Reader::from_path(path_ref).map_err(|source| StationError::Read {
        path: path_ref.display().to_string(),
        source,
    })?;

    let mut by_name_lower = std::collections::HashMap::new();
    let mut skipped = 0usize;

    for result in reader.deserialize::<CityRecord>() {
        let record = match result {
            Ok(r) => r,
            Err(err) => {
                tracing::warn!(%err, "skipping malformed ground station row");
                skipped += 1;
                continue;
            }
        };
        if !is_valid_latitude(record.lat) || !is_valid_longitude(record.lng) {
            tracing::warn!(
                city = %record.city,
                lat = record.lat,
                lng = record.lng,
                "skipping ground station with out-of-range coordinates"
            );
            skipped += 1;
            continue;
        }
        by_name_lower
            .entry(record.city.to_lowercase())
            .or_insert_with(|| GroundStation {
                id: format!("city-{}", record.city),
                name: record.city,
                lat_deg: record.lat,
                lon_deg: record.lng,
            });
    }

    let mut stations: Vec<GroundStation> = match targets {
        Some(names) => {
            let mut ordered = Vec::with_capacity(names.len());
            for name in names {
                if let Some(station) = by_name_lower.get(&name.to_lowercase()) {
                    ordered.push(station.clone());
                } else {
                    tracing::warn!(target = %name, "requested ground station target not found");
                }
            }
            ordered
        }
        None => {
            let mut all: Vec<GroundStation> = by_name_lower.into_values().collect();
            all.sort_by(|a, b| a.name.cmp(&b.name));
            all
        }
    };

    if let Some(max) = max_cities {
        stations.truncate(max);
    }

    tracing::info!(
        loaded = stations.len(),
        skipped,
        "loaded ground stations"
    );

    if stations.is_empty() {
        return Err(StationError::NoMatches);
    }

    Ok(stations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{contents}").unwrap();
        file
    }

    #[test]
    fn loads_all_valid_rows_sorted_by_name() {
        let file = write_csv(
            "Urban Agglomeration,Latitude,Longitude\nZurich,47.3769,8.5417\nAmsterdam,52.3676,4.9041\n",
        );
        let stations = load_cities(file.path(), None, None).unwrap();
        assert_eq!(stations.len(), 2);
        assert_eq!(stations[0].name, "Amsterdam");
        assert_eq!(stations[1].name, "Zurich");
        assert_eq!(stations[0].id, "city-Amsterdam");
    }

    #[test]
    fn skips_rows_with_invalid_coordinates() {
        let file = write_csv(
            "Urban Agglomeration,Latitude,Longitude\nBad,999.0,8.5417\nGood,10.0,10.0\n",
        );
        let stations = load_cities(file.path(), None, None).unwrap();
        assert_eq!(stations.len(), 1);
        assert_eq!(stations[0].name, "Good");
    }

    #[test]
    fn targets_restrict_and_preserve_request_order() {
        let file = write_csv(
            "Urban Agglomeration,Latitude,Longitude\nAmsterdam,52.3676,4.9041\nZurich,47.3769,8.5417\n",
        );
        let targets = vec!["Zurich".to_string(), "Amsterdam".to_string()];
        let stations = load_cities(file.path(), Some(&targets), None).unwrap();
        assert_eq!(stations[0].name, "Zurich");
        assert_eq!(stations[1].name, "Amsterdam");
    }

    #[test]
    fn max_cities_caps_result() {
        let file = write_csv(
            "Urban Agglomeration,Latitude,Longitude\nA,1.0,1.0\nB,2.0,2.0\nC,3.0,3.0\n",
        );
        let stations = load_cities(file.path(), None, Some(2)).unwrap();
        assert_eq!(stations.len(), 2);
    }

    #[test]
    fn errors_when_nothing_matches() {
        let file = write_csv("Urban Agglomeration,Latitude,Longitude\nA,1.0,1.0\n");
        let targets = vec!["Nowhere".to_string()];
        assert!(matches!(
            load_cities(file.path(), Some(&targets), None),
            Err(StationError::NoMatches)
        ));
    }
}
