//! Constellation builder and per-epoch +Grid topology snapshots.
//!
//! Builds a regular Walker-style constellation (fixed number of orbital
//! planes, fixed satellites per plane) and the "+Grid" inter-satellite-link
//! topology: each satellite connects to its two intra-orbit ring neighbours
//! and its two same-slot neighbours in the adjacent orbital planes. Edge
//! weights (instantaneous range) vary per epoch; the node set and edge-key
//! set are fixed and shared across every epoch's snapshot.

use std::collections::{HashMap, HashSet};

use chrono::{NaiveDate, NaiveDateTime};
use leo_propagation::{OrbitalElements, Propagator, TrackPoint};
use petgraph::graph::{NodeIndex, UnGraph};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConstellationError {
    #[error("invalid constellation configuration: {0}")]
    Configuration(String),
    #[error(transparent)]
    Propagation(#[from] leo_propagation::PropagationError),
}

pub type Result<T> = std::result::Result<T, ConstellationError>;

const KEP_CONS: f64 = 3.9861e14; // m^3/s^2
const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Constellation geometry and simulation window parameters. Passed
/// explicitly into the builder — never a global — per the no-module-state
/// redesign direction.
#[derive(Debug, Clone, Copy)]
pub struct ConstellationConfig {
    pub orbit_height_km: f64,
    pub inclination_deg: f64,
    pub num_orbits: u32,
    pub sats_per_orbit: u32,
    pub min_elevation_deg: f64,
    /// Shift odd-indexed orbits by half a satellite spacing.
    pub zigzag: bool,
    /// Orbits span 180 degrees instead of 360 (pi-constellation).
    pub half: bool,
    /// Number of orbital periods to simulate.
    pub runs: u32,
}

impl Default for ConstellationConfig {
    fn default() -> Self {
        Self {
            orbit_height_km: 550.0,
            inclination_deg: 53.0,
            num_orbits: 24,
            sats_per_orbit: 66,
            min_elevation_deg: 25.0,
            zigzag: false,
            half: false,
            runs: 1,
        }
    }
}

impl ConstellationConfig {
    fn validate(&self) -> Result<()> {
        if self.num_orbits == 0 {
            return Err(ConstellationError::Configuration(
                "num_orbits must be greater than zero".into(),
            ));
        }
        if self.sats_per_orbit == 0 {
            return Err(ConstellationError::Configuration(
                "sats_per_orbit must be greater than zero".into(),
            ));
        }
        if !(self.min_elevation_deg > 0.0 && self.min_elevation_deg < 90.0) {
            return Err(ConstellationError::Configuration(format!(
                "min_elevation_deg must be in (0, 90), got {}",
                self.min_elevation_deg
            )));
        }
        if self.orbit_height_km <= 0.0 {
            return Err(ConstellationError::Configuration(
                "orbit_height_km must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Mean motion in revolutions/day from the standard Keplerian relation.
pub fn mean_motion_rev_day(orbit_height_km: f64) -> f64 {
    let orbit_height_m = orbit_height_km * 1000.0;
    let semi_major_m = orbit_height_m + EARTH_RADIUS_M;
    ((KEP_CONS.powf(1.0 / 3.0)) / semi_major_m).powf(3.0 / 2.0) * 86_400.0
        / (2.0 * std::f64::consts::PI)
}

/// Orbital period in whole minutes, floored.
pub fn orbit_period_minutes(mean_motion_rev_day: f64) -> i64 {
    (1440.0 / mean_motion_rev_day) as i64
}

/// Maximum slant range (km) at which a satellite is visible at `elevation_deg`
/// from a ground point, solved from the Earth-centre/ground/satellite
/// triangle, matching the reference implementation's construction exactly.
pub fn max_distance_km(orbit_height_km: f64, elevation_deg: f64) -> f64 {
    let r = orbit_height_km + EARTH_RADIUS_M / 1000.0;
    let h = orbit_height_km;
    let arh = (elevation_deg + 90.0) / 180.0 * std::f64::consts::PI;
    let ar = (r * arh.sin() / (r + h)).asin();
    (r + h) * (std::f64::consts::PI - arh - ar).sin() / arh.sin()
}

fn satellite_id(orbit_index: u32, sat_index: u32) -> String {
    format!("sat-{orbit_index}-{sat_index}")
}

/// The fixed SGP4 epoch used for every satellite in this simulator.
fn constellation_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2021, 1, 1)
        .expect("valid date")
        .and_hms_opt(0, 0, 0)
        .expect("valid time")
}

/// One satellite's identity and precomputed track.
pub struct Satellite {
    pub id: String,
    pub orbit_index: u32,
    pub sat_index: u32,
    track: Vec<TrackPoint>,
}

impl Satellite {
    pub fn position_at(&self, t: usize) -> leo_propagation::EciPosition {
        self.track[t].position
    }

    pub fn track(&self) -> &[TrackPoint] {
        &self.track
    }
}

/// A single epoch's weighted topology: node ids and edge keys are shared
/// across every epoch (see [`Topology`]); only `weights` differs here.
pub struct Snapshot {
    weights: Vec<f64>,
}

/// Per-epoch +Grid topology over the constellation's satellites. The node
/// id table and edge key set are built once and shared by every snapshot;
/// only the per-edge weight vector varies across epochs.
pub struct Topology {
    /// Flat index -> satellite id, shared by all snapshots.
    node_ids: Vec<String>,
    /// Shared edge key set, as flat satellite indices.
    edges: Vec<(usize, usize)>,
    snapshots: Vec<Snapshot>,
}

impl Topology {
    pub fn node_count(&self) -> usize {
        self.node_ids.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn node_ids(&self) -> &[String] {
        &self.node_ids
    }

    pub fn edges(&self) -> &[(usize, usize)] {
        &self.edges
    }

    /// Persistent ISL edge set as satellite id pairs (weights are not
    /// surfaced; see §6 `topology_edges`).
    pub fn edge_ids(&self) -> Vec<(String, String)> {
        self.edges
            .iter()
            .map(|&(a, b)| (self.node_ids[a].clone(), self.node_ids[b].clone()))
            .collect()
    }

    pub fn epoch_count(&self) -> usize {
        self.snapshots.len()
    }

    /// Builds a routable graph for epoch `t`. Node indices equal flat
    /// satellite indices (same order as [`Topology::node_ids`]).
    pub fn graph_at(&self, t: usize) -> UnGraph<(), f64> {
        let snapshot = &self.snapshots[t];
        let mut graph = UnGraph::with_capacity(self.node_ids.len(), self.edges.len());
        for _ in &self.node_ids {
            graph.add_node(());
        }
        for (edge, &weight) in self.edges.iter().zip(snapshot.weights.iter()) {
            graph.add_edge(NodeIndex::new(edge.0), NodeIndex::new(edge.1), weight);
        }
        graph
    }

    /// Weight of a specific edge at epoch `t`, mainly for tests.
    pub fn weight_at(&self, t: usize, a: usize, b: usize) -> Option<f64> {
        let key = normalize(a, b);
        self.edges
            .iter()
            .position(|&e| normalize(e.0, e.1) == key)
            .map(|idx| self.snapshots[t].weights[idx])
    }
}

fn normalize(a: usize, b: usize) -> (usize, usize) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Satellites plus derived scalars for one simulation run.
pub struct Constellation {
    pub config: ConstellationConfig,
    pub mean_motion_rev_day: f64,
    pub orbit_period_min: i64,
    pub sim_period_min: i64,
    pub max_distance_km: f64,
    epoch: NaiveDateTime,
    /// Indexed `[orbit][sat_in_orbit]`.
    satellites: Vec<Vec<Satellite>>,
    index: HashMap<String, (usize, usize)>,
    topology: Topology,
}

impl Constellation {
    pub fn build(config: ConstellationConfig) -> Result<Self> {
        config.validate()?;

        let mean_motion_rev_day = mean_motion_rev_day(config.orbit_height_km);
        let orbit_period_min = orbit_period_minutes(mean_motion_rev_day);
        let sim_period_min = config.runs as i64 * orbit_period_min;
        let max_distance_km = max_distance_km(config.orbit_height_km, config.min_elevation_deg);
        let epoch = constellation_epoch();

        let minute_offsets: Vec<i64> = (0..sim_period_min).collect();

        tracing::info!(
            num_orbits = config.num_orbits,
            sats_per_orbit = config.sats_per_orbit,
            sim_period_min,
            "building constellation"
        );

        let raan_factor = if config.half { 1.0 } else { 2.0 };
        let mut satellites = Vec::with_capacity(config.num_orbits as usize);
        let mut index = HashMap::new();

        for orbit_index in 0..config.num_orbits {
            let raan_deg = raan_factor * 180.0 * orbit_index as f64 / config.num_orbits as f64;
            let mean_anomaly_offset = if config.zigzag {
                (orbit_index % 2) as f64 / 2.0
            } else {
                0.0
            };

            let mut orbit_sats = Vec::with_capacity(config.sats_per_orbit as usize);
            for sat_index in 0..config.sats_per_orbit {
                let mean_anomaly_deg = 360.0 * (sat_index as f64 + mean_anomaly_offset)
                    / config.sats_per_orbit as f64;
                let satnum = (config.sats_per_orbit * orbit_index + sat_index) as u64;

                let elements = OrbitalElements {
                    satnum,
                    epoch,
                    eccentricity: leo_propagation::DEFAULT_ECCENTRICITY,
                    argument_of_perigee_deg: leo_propagation::DEFAULT_ARG_OF_PERIGEE_DEG,
                    inclination_deg: config.inclination_deg,
                    mean_anomaly_deg,
                    mean_motion_rev_day,
                    right_ascension_deg: raan_deg,
                };

                let propagator = Propagator::new(elements)?;
                let track = propagator.track(&minute_offsets)?;

                let id = satellite_id(orbit_index, sat_index);
                index.insert(id.clone(), (orbit_index as usize, sat_index as usize));
                orbit_sats.push(Satellite {
                    id,
                    orbit_index,
                    sat_index,
                    track,
                });
            }
            satellites.push(orbit_sats);
        }

        tracing::info!("generating +Grid topology snapshots");
        let topology = build_topology(&satellites, &config, sim_period_min as usize);

        Ok(Self {
            config,
            mean_motion_rev_day,
            orbit_period_min,
            sim_period_min,
            max_distance_km,
            epoch,
            satellites,
            index,
            topology,
        })
    }

    /// The fixed SGP4 epoch (t=0) shared by every satellite in this run.
    pub fn epoch(&self) -> NaiveDateTime {
        self.epoch
    }

    /// Wall-clock time at minute offset `t` since [`Constellation::epoch`].
    pub fn epoch_at(&self, t: usize) -> NaiveDateTime {
        self.epoch + chrono::Duration::minutes(t as i64)
    }

    pub fn sats_per_orbit(&self) -> usize {
        self.config.sats_per_orbit as usize
    }

    pub fn num_orbits(&self) -> usize {
        self.config.num_orbits as usize
    }

    pub fn satellite(&self, id: &str) -> Option<&Satellite> {
        let &(o, s) = self.index.get(id)?;
        self.satellites.get(o)?.get(s)
    }

    pub fn satellite_at(&self, orbit_index: usize, sat_index: usize) -> Option<&Satellite> {
        self.satellites.get(orbit_index)?.get(sat_index)
    }

    /// Satellite by flat index (`orbit * sats_per_orbit + sat`), matching
    /// [`Topology::node_ids`] ordering.
    pub fn satellite_by_flat(&self, flat_index: usize) -> &Satellite {
        let sats_per_orbit = self.sats_per_orbit();
        &self.satellites[flat_index / sats_per_orbit][flat_index % sats_per_orbit]
    }

    pub fn satellite_ids(&self) -> impl Iterator<Item = &str> {
        self.satellites
            .iter()
            .flat_map(|orbit| orbit.iter())
            .map(|s| s.id.as_str())
    }

    pub fn num_satellites(&self) -> usize {
        (self.config.num_orbits * self.config.sats_per_orbit) as usize
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }
}

fn build_topology(
    satellites: &[Vec<Satellite>],
    config: &ConstellationConfig,
    sim_period: usize,
) -> Topology {
    let num_orbits = config.num_orbits as usize;
    let sats_per_orbit = config.sats_per_orbit as usize;
    let flat = |o: usize, s: usize| o * sats_per_orbit + s;

    let mut node_ids = vec![String::new(); num_orbits * sats_per_orbit];
    for (o, orbit) in satellites.iter().enumerate() {
        for (s, sat) in orbit.iter().enumerate() {
            node_ids[flat(o, s)] = sat.id.clone();
        }
    }

    let mut seen = HashSet::new();
    let mut edges = Vec::new();
    let mut push_edge = |a: usize, b: usize, edges: &mut Vec<(usize, usize)>| {
        if a == b {
            return;
        }
        let key = normalize(a, b);
        if seen.insert(key) {
            edges.push((a, b));
        }
    };

    for o in 0..num_orbits {
        for s in 0..sats_per_orbit {
            let this = flat(o, s);
            // intra-orbit ring
            let ring_next = flat(o, (s + 1) % sats_per_orbit);
            push_edge(this, ring_next, &mut edges);
            // inter-orbit, same slot in the next plane (wraps)
            if num_orbits > 1 {
                let inter = flat((o + 1) % num_orbits, s);
                push_edge(this, inter, &mut edges);
            }
        }
    }

    let mut snapshots = Vec::with_capacity(sim_period);
    for t in 0..sim_period {
        let weights: Vec<f64> = edges
            .iter()
            .map(|&(a, b)| {
                let (oa, sa) = (a / sats_per_orbit, a % sats_per_orbit);
                let (ob, sb) = (b / sats_per_orbit, b % sats_per_orbit);
                let pos_a = satellites[oa][sa].position_at(t);
                let pos_b = satellites[ob][sb].position_at(t);
                pos_a.range_km(&pos_b)
            })
            .collect();
        snapshots.push(Snapshot { weights });
    }

    Topology {
        node_ids,
        edges,
        snapshots,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> ConstellationConfig {
        ConstellationConfig {
            orbit_height_km: 550.0,
            inclination_deg: 53.0,
            num_orbits: 4,
            sats_per_orbit: 6,
            min_elevation_deg: 25.0,
            zigzag: false,
            half: false,
            runs: 1,
        }
    }

    #[test]
    fn rejects_bad_elevation() {
        let mut cfg = small_config();
        cfg.min_elevation_deg = 0.0;
        assert!(matches!(
            Constellation::build(cfg),
            Err(ConstellationError::Configuration(_))
        ));
        let mut cfg = small_config();
        cfg.min_elevation_deg = 90.0;
        assert!(matches!(
            Constellation::build(cfg),
            Err(ConstellationError::Configuration(_))
        ));
    }

    #[test]
    fn rejects_zero_orbits() {
        let mut cfg = small_config();
        cfg.num_orbits = 0;
        assert!(Constellation::build(cfg).is_err());
    }

    #[test]
    fn starlink_p1_sanity_scalars() {
        let cfg = ConstellationConfig {
            orbit_height_km: 550.0,
            inclination_deg: 53.0,
            num_orbits: 24,
            sats_per_orbit: 66,
            min_elevation_deg: 25.0,
            zigzag: false,
            half: false,
            runs: 1,
        };
        assert_eq!(orbit_period_minutes(mean_motion_rev_day(cfg.orbit_height_km)), 95);
        let md = max_distance_km(cfg.orbit_height_km, cfg.min_elevation_deg);
        assert!((md - 1123.0).abs() < 20.0, "max_distance {md} not near 1123km");
    }

    #[test]
    fn every_satellite_has_degree_four() {
        let cons = Constellation::build(small_config()).unwrap();
        let topo = cons.topology();
        let mut degree = vec![0usize; topo.node_count()];
        for &(a, b) in topo.edges() {
            degree[a] += 1;
            degree[b] += 1;
        }
        assert!(degree.iter().all(|&d| d == 4));
        assert_eq!(topo.edge_count(), topo.node_count() * 2);
    }

    #[test]
    fn edge_weights_are_positive_and_symmetric() {
        let cons = Constellation::build(small_config()).unwrap();
        let topo = cons.topology();
        let graph = topo.graph_at(0);
        for edge in graph.edge_indices() {
            let w = *graph.edge_weight(edge).unwrap();
            assert!(w > 0.0);
        }
    }

    #[test]
    fn snapshot_count_matches_sim_period() {
        let cons = Constellation::build(small_config()).unwrap();
        assert_eq!(
            cons.topology().epoch_count(),
            cons.sim_period_min as usize
        );
    }

    #[test]
    fn rebuilding_with_identical_inputs_is_deterministic() {
        let a = Constellation::build(small_config()).unwrap();
        let b = Constellation::build(small_config()).unwrap();
        assert_eq!(a.topology().edges(), b.topology().edges());
        let wa = a.topology().weight_at(0, 0, 1);
        let wb = b.topology().weight_at(0, 0, 1);
        assert_eq!(wa, wb);
    }
}
