//! Attachment engine and routing engine.
//!
//! Ground-station-to-satellite handover strategies, plus the three route
//! products derived from an attachment table: global routes (shortest-path
//! trees), pair routes (consumer/producer shortest paths), and cross stats
//! (how much of the old path a new path after a handover reuses).

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use leo_constellation::Constellation;
use leo_ground_stations::GroundStation;
use leo_propagation::gt_eci_position;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RoutingError {
    #[error("no path from satellite index {from} to satellite index {to} at epoch {epoch}")]
    UnreachableTarget {
        from: usize,
        to: usize,
        epoch: usize,
    },
}

pub type Result<T> = std::result::Result<T, RoutingError>;

/// Satellite index a ground station is connected to, `None` when no
/// satellite is within `max_distance`.
pub type SatIndex = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoverStrategy {
    ClosestActive,
    ClosestLazy,
    OrbitClosestLazy,
}

/// Traversal order over an orbit's satellite indices, starting adjacent to
/// `p` and expanding outward, exactly as specified (including that the
/// "otherwise" branch never revisits `N-1`). The `p == N-1` branch
/// reproduces the original's incomplete candidate list: `[satNum - 1] +
/// range(satNum - 2)` for `satNum = N-1` walks `0..=(N-4)`, permanently
/// omitting index `N-3` — preserved from the reference behaviour rather
/// than "fixed" (see `original_source/Leo.py`'s `getOrbitClosest`).
fn orbit_traversal_order(p: usize, n: usize) -> Vec<usize> {
    if n <= 1 {
        return Vec::new();
    }
    if p == 0 {
        let mut order = vec![n - 1];
        if n > 2 {
            order.extend(1..=(n - 2));
        }
        order
    } else if p == n - 1 {
        let mut order = vec![n - 2];
        if n > 3 {
            order.push(0);
            if n > 4 {
                order.extend(1..=(n - 4));
            }
        }
        order
    } else {
        let mut order = vec![p - 1];
        if p + 1 <= n - 2 {
            order.extend((p + 1)..=(n - 2));
        }
        if p >= 2 {
            order.extend(0..=(p - 2));
        }
        order
    }
}

/// Range (km) from a ground-station ECI position to a satellite at epoch `t`.
fn range_to_sat(
    constellation: &Constellation,
    gt_pos: &leo_propagation::EciPosition,
    sat_flat_index: usize,
    t: usize,
) -> f64 {
    let sat_pos = constellation.satellite_by_flat(sat_flat_index).position_at(t);
    gt_pos.range_km(&sat_pos)
}

/// Smallest-range visible candidate from `candidates`, breaking ties by
/// whichever candidate is encountered first in iteration order.
fn argmin_visible(
    constellation: &Constellation,
    gt_pos: &leo_propagation::EciPosition,
    t: usize,
    max_distance_km: f64,
    candidates: impl Iterator<Item = usize>,
) -> Option<usize> {
    let mut best: Option<(f64, usize)> = None;
    for candidate in candidates {
        let range = range_to_sat(constellation, gt_pos, candidate, t);
        if range >= max_distance_km {
            continue;
        }
        match best {
            Some((best_range, _)) if range >= best_range => {}
            _ => best = Some((range, candidate)),
        }
    }
    best.map(|(_, idx)| idx)
}

/// Ground-station-to-satellite attachment over the whole simulation window.
pub struct Attachment;

impl Attachment {
    /// Computes the attachment table for one ground station under `strategy`.
    pub fn compute(
        constellation: &Constellation,
        gt: &GroundStation,
        strategy: HandoverStrategy,
    ) -> Vec<Option<SatIndex>> {
        let sim_period = constellation.sim_period_min as usize;
        let max_distance_km = constellation.max_distance_km;
        let sats_per_orbit = constellation.sats_per_orbit();

        // Global fallback search order: satellite-id lexical order.
        let mut lexical_order: Vec<usize> = (0..constellation.num_satellites()).collect();
        let node_ids = constellation.topology().node_ids();
        lexical_order.sort_by(|&a, &b| node_ids[a].cmp(&node_ids[b]));

        let mut attachments: Vec<Option<SatIndex>> = Vec::with_capacity(sim_period);
        let mut warned_permanent_disconnect = false;

        for t in 0..sim_period {
            let gt_pos = gt_eci_position(gt.lat_deg, gt.lon_deg, constellation.epoch_at(t));

            let closest_active = || {
                argmin_visible(
                    constellation,
                    &gt_pos,
                    t,
                    max_distance_km,
                    lexical_order.iter().copied(),
                )
            };

            let chosen = if t == 0 {
                closest_active()
            } else {
                let prev = attachments[t - 1];
                match strategy {
                    HandoverStrategy::ClosestActive => closest_active(),
                    HandoverStrategy::ClosestLazy => match prev {
                        Some(p) if range_to_sat(constellation, &gt_pos, p, t) < max_distance_km => {
                            Some(p)
                        }
                        Some(_) => closest_active(),
                        None => {
                            if !warned_permanent_disconnect {
                                tracing::warn!(
                                    gt = %gt.id,
                                    epoch = t,
                                    "ground station remains disconnected under closest-lazy handover"
                                );
                                warned_permanent_disconnect = true;
                            }
                            None
                        }
                    },
                    HandoverStrategy::OrbitClosestLazy => match prev {
                        Some(p) if range_to_sat(constellation, &gt_pos, p, t) < max_distance_km => {
                            Some(p)
                        }
                        Some(p) => {
                            let orbit = p / sats_per_orbit;
                            let prev_in_orbit = p % sats_per_orbit;
                            let candidates =
                                orbit_traversal_order(prev_in_orbit, sats_per_orbit)
                                    .into_iter()
                                    .map(|s| orbit * sats_per_orbit + s);
                            argmin_visible(constellation, &gt_pos, t, max_distance_km, candidates)
                                .or_else(closest_active)
                        }
                        None => {
                            if !warned_permanent_disconnect {
                                tracing::warn!(
                                    gt = %gt.id,
                                    epoch = t,
                                    "ground station remains disconnected under orbit-closest-lazy handover"
                                );
                                warned_permanent_disconnect = true;
                            }
                            None
                        }
                    },
                }
            };
            attachments.push(chosen);
        }

        attachments
    }
}

#[derive(PartialEq)]
struct HeapState {
    cost: f64,
    node: NodeIndex,
}

impl Eq for HeapState {}

impl Ord for HeapState {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .partial_cmp(&self.cost)
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for HeapState {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Dijkstra from `root`, returning distances and a predecessor map. Used both
/// to build global shortest-path trees and to reconstruct pair paths, since
/// `petgraph::algo::dijkstra` alone only returns costs.
fn dijkstra_with_predecessors(
    graph: &UnGraph<(), f64>,
    root: NodeIndex,
) -> (HashMap<NodeIndex, f64>, HashMap<NodeIndex, NodeIndex>) {
    let mut dist = HashMap::new();
    let mut prev = HashMap::new();
    let mut heap = BinaryHeap::new();

    dist.insert(root, 0.0);
    heap.push(HeapState { cost: 0.0, node: root });

    while let Some(HeapState { cost, node }) = heap.pop() {
        if cost > *dist.get(&node).unwrap_or(&f64::INFINITY) {
            continue;
        }
        for edge in graph.edges(node) {
            let next = edge.target();
            let next_cost = cost + edge.weight();
            if next_cost < *dist.get(&next).unwrap_or(&f64::INFINITY) {
                dist.insert(next, next_cost);
                prev.insert(next, node);
                heap.push(HeapState { cost: next_cost, node: next });
            }
        }
    }

    (dist, prev)
}

fn reconstruct_path(
    prev: &HashMap<NodeIndex, NodeIndex>,
    root: NodeIndex,
    target: NodeIndex,
) -> Option<Vec<usize>> {
    if root == target {
        return Some(vec![root.index()]);
    }
    let mut path = vec![target.index()];
    let mut current = target;
    loop {
        current = *prev.get(&current)?;
        path.push(current.index());
        if current == root {
            break;
        }
    }
    path.reverse();
    Some(path)
}

fn shortest_path(
    graph: &UnGraph<(), f64>,
    from: usize,
    to: usize,
    epoch: usize,
) -> Result<Vec<usize>> {
    let root = NodeIndex::new(from);
    let target = NodeIndex::new(to);
    let (_, prev) = dijkstra_with_predecessors(graph, root);
    reconstruct_path(&prev, root, target).ok_or(RoutingError::UnreachableTarget { from, to, epoch })
}

/// Union of single-source shortest-path-tree predecessor edges, for each
/// epoch at which the ground station is attached.
pub fn global_routes(
    constellation: &Constellation,
    attachments: &[Option<SatIndex>],
) -> Vec<Option<HashSet<(usize, usize)>>> {
    let topology = constellation.topology();
    attachments
        .iter()
        .enumerate()
        .map(|(t, att)| {
            att.map(|root| {
                let graph = topology.graph_at(t);
                let (_, prev) = dijkstra_with_predecessors(&graph, NodeIndex::new(root));
                prev.into_iter()
                    .map(|(child, parent)| (child.index(), parent.index()))
                    .collect()
            })
        })
        .collect()
}

/// Shortest path from consumer's to producer's attachment at each epoch,
/// reusing the previous path verbatim when both endpoints are unchanged.
pub fn pair_routes(
    constellation: &Constellation,
    consumer: &[Option<SatIndex>],
    producer: &[Option<SatIndex>],
) -> Result<Vec<Option<Vec<usize>>>> {
    let topology = constellation.topology();
    let mut routes = Vec::with_capacity(consumer.len());
    let mut previous_pair: Option<(SatIndex, SatIndex)> = None;
    let mut previous_path: Option<Vec<usize>> = None;

    for (t, (&c, &p)) in consumer.iter().zip(producer.iter()).enumerate() {
        let route = match (c, p) {
            (Some(from), Some(to)) => {
                if previous_pair == Some((from, to)) {
                    previous_path.clone()
                } else {
                    let graph = topology.graph_at(t);
                    let path = shortest_path(&graph, from, to, t)?;
                    Some(path)
                }
            }
            _ => None,
        };
        previous_pair = match (c, p) {
            (Some(from), Some(to)) => Some((from, to)),
            _ => None,
        };
        previous_path = route.clone();
        routes.push(route);
    }

    Ok(routes)
}

/// Describes, for a consumer handover epoch, how much of the previous pair
/// route the new one shares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrossStats {
    pub hops: usize,
    pub hops_last: usize,
    pub length: usize,
    pub hops_between: usize,
    pub cur_sat: SatIndex,
    pub last_sat: SatIndex,
}

/// Per-epoch cross stats, defined only at consumer-handover epochs where
/// both the new and previous pair routes exist.
pub fn pair_cross_stats(
    constellation: &Constellation,
    consumer: &[Option<SatIndex>],
    routes: &[Option<Vec<usize>>],
) -> Result<Vec<Option<CrossStats>>> {
    let topology = constellation.topology();
    let mut result = vec![None; routes.len()];

    for t in 1..routes.len() {
        let (Some(s_prev), Some(s_cur)) = (consumer[t - 1], consumer[t]) else {
            continue;
        };
        if s_prev == s_cur {
            continue;
        }
        let (Some(p_t), Some(p_prev)) = (&routes[t], &routes[t - 1]) else {
            continue;
        };

        let mut found = None;
        'outer: for (j, &node_j) in p_t.iter().enumerate() {
            for (i, &node_i) in p_prev.iter().enumerate() {
                if node_j == node_i {
                    found = Some((j, i));
                    break 'outer;
                }
            }
        }
        let (hops, hops_last) = found.unwrap_or((p_t.len(), p_prev.len()));

        let graph = topology.graph_at(t);
        let hops_between = shortest_path(&graph, s_cur, s_prev, t)?.len() - 1;

        result[t] = Some(CrossStats {
            hops,
            hops_last,
            length: p_t.len(),
            hops_between,
            cur_sat: s_cur,
            last_sat: s_prev,
        });
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orbit_traversal_order_from_zero() {
        assert_eq!(orbit_traversal_order(0, 6), vec![5, 1, 2, 3, 4]);
    }

    #[test]
    fn orbit_traversal_order_from_last() {
        // p == N-1 case reproduces the original's incomplete candidate list:
        // [N-2] + range(N-4) for N=6, permanently omitting index N-3 (= 3).
        assert_eq!(orbit_traversal_order(5, 6), vec![4, 0, 1, 2]);
    }

    #[test]
    fn orbit_traversal_order_from_last_omits_third_from_last() {
        assert!(!orbit_traversal_order(5, 6).contains(&3));
    }

    #[test]
    fn orbit_traversal_order_middle_never_revisits_last_index() {
        let order = orbit_traversal_order(2, 6);
        assert_eq!(order, vec![1, 3, 4, 0]);
        assert!(!order.contains(&5));
    }

    fn tiny_constellation() -> Constellation {
        let config = leo_constellation::ConstellationConfig {
            orbit_height_km: 550.0,
            inclination_deg: 53.0,
            num_orbits: 4,
            sats_per_orbit: 6,
            min_elevation_deg: 25.0,
            zigzag: false,
            half: false,
            runs: 1,
        };
        Constellation::build(config).unwrap()
    }

    fn zurich() -> GroundStation {
        GroundStation {
            id: "city-Zurich".into(),
            name: "Zurich".into(),
            lat_deg: 47.3769,
            lon_deg: 8.5417,
        }
    }

    #[test]
    fn closest_active_attachment_is_always_visible_within_max_distance() {
        let cons = tiny_constellation();
        let gt = zurich();
        let attachments = Attachment::compute(&cons, &gt, HandoverStrategy::ClosestActive);
        assert_eq!(attachments.len(), cons.sim_period_min as usize);
    }

    #[test]
    fn global_routes_are_only_defined_when_attached() {
        let cons = tiny_constellation();
        let gt = zurich();
        let attachments = Attachment::compute(&cons, &gt, HandoverStrategy::ClosestActive);
        let routes = global_routes(&cons, &attachments);
        for (route, att) in routes.iter().zip(attachments.iter()) {
            assert_eq!(route.is_some(), att.is_some());
        }
    }

    #[test]
    fn pair_routes_reuse_path_when_attachments_unchanged() {
        let cons = tiny_constellation();
        let gt_a = zurich();
        let gt_b = GroundStation {
            id: "city-Amsterdam".into(),
            name: "Amsterdam".into(),
            lat_deg: 52.3676,
            lon_deg: 4.9041,
        };
        let a = Attachment::compute(&cons, &gt_a, HandoverStrategy::ClosestActive);
        let b = Attachment::compute(&cons, &gt_b, HandoverStrategy::ClosestActive);
        let routes = pair_routes(&cons, &a, &b).unwrap();
        for t in 1..routes.len() {
            if a[t] == a[t - 1] && b[t] == b[t - 1] && routes[t].is_some() && routes[t - 1].is_some()
            {
                assert_eq!(routes[t], routes[t - 1]);
            }
        }
    }

    #[test]
    fn cross_stats_only_emitted_on_consumer_handover() {
        let cons = tiny_constellation();
        let gt_a = zurich();
        let gt_b = GroundStation {
            id: "city-Amsterdam".into(),
            name: "Amsterdam".into(),
            lat_deg: 52.3676,
            lon_deg: 4.9041,
        };
        let a = Attachment::compute(&cons, &gt_a, HandoverStrategy::ClosestActive);
        let b = Attachment::compute(&cons, &gt_b, HandoverStrategy::ClosestActive);
        let routes = pair_routes(&cons, &a, &b).unwrap();
        let stats = pair_cross_stats(&cons, &a, &routes).unwrap();
        for t in 1..stats.len() {
            if stats[t].is_some() {
                assert_ne!(a[t], a[t - 1]);
            }
        }
    }
}
