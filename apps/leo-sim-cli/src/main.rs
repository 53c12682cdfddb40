//! LEO constellation scenario driver.
//!
//! Builds a constellation, attaches a set of ground stations under a chosen
//! handover strategy, derives routing products, and writes CZML / ndnSIM
//! output. The Rust analogue of the reference simulator's demo script.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use leo_constellation::{Constellation, ConstellationConfig};
use leo_executor::Task;
use leo_ground_stations::{load_cities, GroundStation};
use leo_routing::{global_routes, pair_cross_stats, pair_routes, Attachment, HandoverStrategy, SatIndex};
use leo_serialize::{CrossStatsRecord, SatelliteRecord, ScenarioOutputs};

#[derive(Parser, Debug)]
#[command(
    name = "leo-sim",
    about = "Build a LEO constellation scenario and export CZML / ndnSIM artifacts"
)]
struct Args {
    /// Cities CSV with `Urban Agglomeration`, `Latitude`, `Longitude` columns.
    #[arg(long)]
    cities_csv: PathBuf,

    /// Restrict to these city names, in this order (comma-separated).
    #[arg(long, value_delimiter = ',')]
    targets: Option<Vec<String>>,

    /// Cap the number of ground stations after filtering.
    #[arg(long)]
    max_cities: Option<usize>,

    #[arg(long, default_value_t = 550.0)]
    orbit_height_km: f64,

    #[arg(long, default_value_t = 53.0)]
    inclination_deg: f64,

    #[arg(long, default_value_t = 24)]
    num_orbits: u32,

    #[arg(long, default_value_t = 66)]
    sats_per_orbit: u32,

    #[arg(long, default_value_t = 25.0)]
    min_elevation_deg: f64,

    #[arg(long)]
    zigzag: bool,

    #[arg(long)]
    half: bool,

    #[arg(long, default_value_t = 1)]
    runs: u32,

    #[arg(long, value_enum, default_value = "orbit-closest-lazy")]
    strategy: Strategy,

    /// Write a CZML document to this path.
    #[arg(long)]
    czml_out: Option<PathBuf>,

    /// Write ndnSIM CSV exports into this directory (created if missing).
    #[arg(long)]
    ndnsim_out: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Strategy {
    ClosestActive,
    ClosestLazy,
    OrbitClosestLazy,
}

impl From<Strategy> for HandoverStrategy {
    fn from(strategy: Strategy) -> Self {
        match strategy {
            Strategy::ClosestActive => HandoverStrategy::ClosestActive,
            Strategy::ClosestLazy => HandoverStrategy::ClosestLazy,
            Strategy::OrbitClosestLazy => HandoverStrategy::OrbitClosestLazy,
        }
    }
}

/// Computes one ground station's attachment table. Fully self-contained: it
/// borrows only read-only constellation data and owns its own station.
struct AttachmentTask<'a> {
    constellation: &'a Constellation,
    station: GroundStation,
    strategy: HandoverStrategy,
}

impl Task for AttachmentTask<'_> {
    type Key = String;
    type Output = Vec<Option<SatIndex>>;

    fn key(&self) -> Self::Key {
        self.station.id.clone()
    }

    fn run(&self) -> Self::Output {
        Attachment::compute(self.constellation, &self.station, self.strategy)
    }
}

/// Computes one ground station's global (producer-view) shortest-path-tree
/// routes. A per-GT Dijkstra sweep over every epoch, fanned out alongside
/// attachment and pair-route computation rather than run on the main thread.
struct GlobalRoutesTask<'a> {
    constellation: &'a Constellation,
    gt_id: String,
    attachment: Vec<Option<SatIndex>>,
}

impl Task for GlobalRoutesTask<'_> {
    type Key = String;
    type Output = Vec<Option<HashSet<(SatIndex, SatIndex)>>>;

    fn key(&self) -> Self::Key {
        self.gt_id.clone()
    }

    fn run(&self) -> Self::Output {
        global_routes(self.constellation, &self.attachment)
    }
}

/// Computes pair routes and cross stats for one ordered (consumer, producer)
/// ground-station pair. An unreachable target panics, which the executor
/// reports as a fatal, keyed error rather than swallowing it.
struct PairTask<'a> {
    constellation: &'a Constellation,
    consumer_id: String,
    producer_id: String,
    consumer_attachment: Vec<Option<SatIndex>>,
    producer_attachment: Vec<Option<SatIndex>>,
}

impl Task for PairTask<'_> {
    type Key = (String, String);
    type Output = (
        Vec<Option<Vec<SatIndex>>>,
        Vec<Option<leo_routing::CrossStats>>,
    );

    fn key(&self) -> Self::Key {
        (self.consumer_id.clone(), self.producer_id.clone())
    }

    fn run(&self) -> Self::Output {
        let routes = pair_routes(self.constellation, &self.consumer_attachment, &self.producer_attachment)
            .expect("pair routing is unreachable only under topology corruption");
        let stats = pair_cross_stats(self.constellation, &self.consumer_attachment, &routes)
            .expect("cross-stats path lookup is unreachable only under topology corruption");
        (routes, stats)
    }
}

fn sat_id_at(constellation: &Constellation, index: SatIndex) -> String {
    constellation.topology().node_ids()[index].clone()
}

fn path_to_ids(constellation: &Constellation, path: &[SatIndex]) -> Vec<String> {
    path.iter().map(|&i| sat_id_at(constellation, i)).collect()
}

fn build_scenario_outputs(
    constellation: &Constellation,
    stations: &[GroundStation],
    attachments: &HashMap<String, Vec<Option<SatIndex>>>,
    global_routes_results: &HashMap<String, Vec<Option<HashSet<(SatIndex, SatIndex)>>>>,
    pair_results: &HashMap<(String, String), (Vec<Option<Vec<SatIndex>>>, Vec<Option<leo_routing::CrossStats>>)>,
) -> ScenarioOutputs {
    let mut satellites = HashMap::new();
    for sat_id in constellation.satellite_ids() {
        let sat = constellation.satellite(sat_id).expect("satellite id from constellation must resolve");
        let track = sat
            .track()
            .iter()
            .map(|point| (point.t_seconds, point.position.x_m, point.position.y_m, point.position.z_m))
            .collect();
        satellites.insert(
            sat_id.to_string(),
            SatelliteRecord {
                orbit_index: sat.orbit_index as usize,
                sat_index: sat.sat_index as usize,
                track,
            },
        );
    }

    let ground_stations = stations
        .iter()
        .map(|s| (s.id.clone(), (s.lat_deg, s.lon_deg)))
        .collect();

    let topology_edges = constellation.topology().edge_ids();

    let attachments_by_id: HashMap<String, Vec<Option<String>>> = attachments
        .iter()
        .map(|(gt_id, att)| {
            let ids = att
                .iter()
                .map(|maybe_idx| maybe_idx.map(|idx| sat_id_at(constellation, idx)))
                .collect();
            (gt_id.clone(), ids)
        })
        .collect();

    let global_routes_by_id: HashMap<String, Vec<Option<Vec<(String, String)>>>> = global_routes_results
        .iter()
        .map(|(gt_id, routes)| {
            let converted = routes
                .iter()
                .map(|maybe_edges| {
                    maybe_edges.as_ref().map(|edges| {
                        edges
                            .iter()
                            .map(|&(child, parent)| {
                                (sat_id_at(constellation, child), sat_id_at(constellation, parent))
                            })
                            .collect()
                    })
                })
                .collect();
            (gt_id.clone(), converted)
        })
        .collect();

    let mut pair_routes_by_id = HashMap::new();
    let mut cross_stats_by_id = HashMap::new();
    for ((consumer, producer), (routes, stats)) in pair_results {
        let routes_ids = routes
            .iter()
            .map(|maybe_path| maybe_path.as_ref().map(|path| path_to_ids(constellation, path)))
            .collect();
        pair_routes_by_id.insert((consumer.clone(), producer.clone()), routes_ids);

        let stats_ids = stats
            .iter()
            .map(|maybe_stat| {
                maybe_stat.map(|stat| CrossStatsRecord {
                    hops: stat.hops,
                    hops_last: stat.hops_last,
                    length: stat.length,
                    hops_between: stat.hops_between,
                    cur_sat: sat_id_at(constellation, stat.cur_sat),
                    last_sat: sat_id_at(constellation, stat.last_sat),
                })
            })
            .collect();
        cross_stats_by_id.insert((consumer.clone(), producer.clone()), stats_ids);
    }

    ScenarioOutputs {
        epoch: constellation.epoch(),
        sim_period_min: constellation.sim_period_min as usize,
        satellites,
        ground_stations,
        topology_edges,
        attachments: attachments_by_id,
        pair_routes: pair_routes_by_id,
        cross_stats: cross_stats_by_id,
        global_routes: global_routes_by_id,
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("loading ground stations from {:?}", args.cities_csv);
    let stations = load_cities(&args.cities_csv, args.targets.as_deref(), args.max_cities)?;
    info!(count = stations.len(), "loaded ground stations");

    let config = ConstellationConfig {
        orbit_height_km: args.orbit_height_km,
        inclination_deg: args.inclination_deg,
        num_orbits: args.num_orbits,
        sats_per_orbit: args.sats_per_orbit,
        min_elevation_deg: args.min_elevation_deg,
        zigzag: args.zigzag,
        half: args.half,
        runs: args.runs,
    };
    info!(?config, "building constellation");
    let constellation = Constellation::build(config)?;
    info!(
        satellites = constellation.num_satellites(),
        sim_period_min = constellation.sim_period_min,
        max_distance_km = constellation.max_distance_km,
        "constellation built"
    );

    let strategy: HandoverStrategy = args.strategy.into();
    let attachment_tasks: Vec<AttachmentTask> = stations
        .iter()
        .map(|station| AttachmentTask {
            constellation: &constellation,
            station: station.clone(),
            strategy,
        })
        .collect();
    let attachments = leo_executor::run_all(attachment_tasks)
        .map_err(|e| anyhow::anyhow!("attachment computation failed: {e}"))?;

    let global_routes_tasks: Vec<GlobalRoutesTask> = stations
        .iter()
        .map(|station| GlobalRoutesTask {
            constellation: &constellation,
            gt_id: station.id.clone(),
            attachment: attachments[&station.id].clone(),
        })
        .collect();
    info!(stations = global_routes_tasks.len(), "computing global routes");
    let global_routes_results = leo_executor::run_all(global_routes_tasks)
        .map_err(|e| anyhow::anyhow!("global route computation failed: {e}"))?;

    let mut pair_tasks = Vec::new();
    for consumer in &stations {
        for producer in &stations {
            if consumer.id == producer.id {
                continue;
            }
            pair_tasks.push(PairTask {
                constellation: &constellation,
                consumer_id: consumer.id.clone(),
                producer_id: producer.id.clone(),
                consumer_attachment: attachments[&consumer.id].clone(),
                producer_attachment: attachments[&producer.id].clone(),
            });
        }
    }
    info!(pairs = pair_tasks.len(), "computing pair routes and cross stats");
    let pair_results = leo_executor::run_all(pair_tasks)
        .map_err(|e| anyhow::anyhow!("pair routing failed: {e}"))?;

    let outputs = build_scenario_outputs(
        &constellation,
        &stations,
        &attachments,
        &global_routes_results,
        &pair_results,
    );

    if let Some(path) = &args.czml_out {
        leo_serialize::czml::write_document(&outputs, path)?;
        info!(path = ?path, "wrote CZML document");
    }
    if let Some(dir) = &args.ndnsim_out {
        std::fs::create_dir_all(dir)?;
        leo_serialize::ndnsim::write_all(&outputs, dir)?;
        info!(dir = ?dir, "wrote ndnSIM export");
    }

    Ok(())
}
