//! Serialiser collaborators: CZML (for Cesium playback) and ndnSIM CSV
//! export. Both consume the same plain [`ScenarioOutputs`] snapshot and
//! never mutate it — I/O errors surface to the caller.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use thiserror::Error;

pub mod czml;
pub mod ndnsim;

#[derive(Error, Debug)]
pub enum SerializeError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to write CSV {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
}

pub type Result<T> = std::result::Result<T, SerializeError>;

/// One satellite's identity, position and precomputed track, in the shape
/// serialisers consume.
#[derive(Debug, Clone)]
pub struct SatelliteRecord {
    pub orbit_index: usize,
    pub sat_index: usize,
    /// `(t_seconds, x_m, y_m, z_m)` for every epoch in the run.
    pub track: Vec<(i64, f64, f64, f64)>,
}

/// A cross-stats record in serialisable form (satellite ids, not indices).
#[derive(Debug, Clone)]
pub struct CrossStatsRecord {
    pub hops: usize,
    pub hops_last: usize,
    pub length: usize,
    pub hops_between: usize,
    pub cur_sat: String,
    pub last_sat: String,
}

/// The complete, read-only set of core outputs a serialiser consumes. Keyed
/// entirely by string ids (satellite ids, ground-station ids, pair keys) so
/// serialisers never need to know about internal flat indices.
#[derive(Debug, Clone)]
pub struct ScenarioOutputs {
    pub epoch: NaiveDateTime,
    pub sim_period_min: usize,
    pub satellites: HashMap<String, SatelliteRecord>,
    pub ground_stations: HashMap<String, (f64, f64)>,
    pub topology_edges: Vec<(String, String)>,
    /// gt_id -> epoch -> attached satellite id, or `None` when disconnected.
    pub attachments: HashMap<String, Vec<Option<String>>>,
    /// (consumer_gt, producer_gt) -> epoch -> ordered path of satellite ids.
    pub pair_routes: HashMap<(String, String), Vec<Option<Vec<String>>>>,
    /// (consumer_gt, producer_gt) -> epoch -> cross-stats record.
    pub cross_stats: HashMap<(String, String), Vec<Option<CrossStatsRecord>>>,
    /// gt_id -> epoch -> directed predecessor edges of the shortest-path tree.
    pub global_routes: HashMap<String, Vec<Option<Vec<(String, String)>>>>,
}
