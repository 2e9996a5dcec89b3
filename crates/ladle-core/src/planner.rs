//! Contention-aware routing of legs over the vehicle adjacency graph.
//!
//! The graph has one node per vehicle and is built once from each vehicle's
//! configured `connect_vehicles` list. Each planning pass recomputes which
//! nodes are occupied and runs a multi-source BFS from the free nodes that
//! touch a leg's start station to any node touching its end station.
//!
//! A leg with no free path stays un-routed and is retried on every later
//! pass. There is no backoff and no retry limit.

use crate::id::*;
use crate::registry::Registry;
use crate::splitter::TaskSplitBuffer;
use crate::station::StationRole;
use crate::task::{Leg, RoutedSegment, SegmentKind, SegmentStatus};
use slotmap::SecondaryMap;
use std::collections::VecDeque;
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Routing problems that indicate a broken topology. All are fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("vehicle {vehicle} lists unknown neighbour {neighbour}")]
    UnknownNeighbour { vehicle: String, neighbour: String },
    #[error("no vehicle can reach station {station}")]
    NoAdjacency { station: String },
    #[error("tracks {from} and {to} share no station")]
    NoSharedStation { from: String, to: String },
    #[error("station {station} is not on the track of vehicle {vehicle}")]
    StationNotOnTrack { vehicle: String, station: String },
    #[error("unknown vehicle {0}")]
    UnknownVehicle(String),
}

// ---------------------------------------------------------------------------
// Route graph
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteNode {
    pub vehicle: VehicleKey,
    pub track: TrackKey,
    /// Indices of adjacent nodes, in configuration order.
    pub neighbours: Vec<usize>,
}

/// Static vehicle adjacency graph plus the station-to-node map.
#[derive(Debug, Clone, Default)]
pub struct RouteGraph {
    nodes: Vec<RouteNode>,
    index: SecondaryMap<VehicleKey, usize>,
    station_nodes: SecondaryMap<StationKey, Vec<usize>>,
}

impl RouteGraph {
    /// Build the graph from the registry's vehicles and stations.
    pub fn build(reg: &Registry) -> Result<Self, PlanError> {
        let mut graph = RouteGraph::default();
        for (vkey, v) in reg.vehicles.iter() {
            graph.index.insert(vkey, graph.nodes.len());
            graph.nodes.push(RouteNode {
                vehicle: vkey,
                track: v.track,
                neighbours: Vec::new(),
            });
        }

        for (vkey, v) in reg.vehicles.iter() {
            let a = graph.index[vkey];
            for neighbour in &v.connect_vehicles {
                let other = reg.vehicles.key_of(neighbour).ok_or_else(|| {
                    PlanError::UnknownNeighbour {
                        vehicle: v.id.clone(),
                        neighbour: neighbour.clone(),
                    }
                })?;
                let b = graph.index[other];
                if a == b {
                    continue;
                }
                if !graph.nodes[a].neighbours.contains(&b) {
                    graph.nodes[a].neighbours.push(b);
                }
                if !graph.nodes[b].neighbours.contains(&a) {
                    graph.nodes[b].neighbours.push(a);
                }
            }
        }

        for (skey, station) in reg.stations.iter() {
            let mut adjacent = Vec::new();
            for &tk in &station.connected_tracks {
                let Some(track) = reg.tracks.get(tk) else {
                    continue;
                };
                for v in &track.vehicles {
                    if let Some(&idx) = graph.index.get(*v) {
                        if !adjacent.contains(&idx) {
                            adjacent.push(idx);
                        }
                    }
                }
            }
            graph.station_nodes.insert(skey, adjacent);
        }
        Ok(graph)
    }

    pub fn nodes(&self) -> &[RouteNode] {
        &self.nodes
    }

    pub fn node_of(&self, vehicle: VehicleKey) -> Option<usize> {
        self.index.get(vehicle).copied()
    }

    /// Nodes whose track touches `station`.
    pub fn station_nodes(&self, station: StationKey) -> &[usize] {
        self.station_nodes
            .get(station)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Occupancy for the current pass: a node is occupied when its vehicle
    /// holds a segment or any live segment names it.
    pub fn occupancy(&self, reg: &Registry) -> Vec<bool> {
        let mut occupied: Vec<bool> = self
            .nodes
            .iter()
            .map(|n| reg.vehicles.get(n.vehicle).is_some_and(|v| v.segment.is_some()))
            .collect();
        for seg in reg.segments.values().filter(|s| s.is_live()) {
            if let Some(&i) = self.index.get(seg.vehicle) {
                occupied[i] = true;
            }
        }
        occupied
    }

    /// Multi-source BFS over free nodes. Returns the node path from a start
    /// node to the first target dequeued.
    pub fn shortest_path(
        &self,
        starts: &[usize],
        targets: &[usize],
        occupied: &[bool],
    ) -> Option<Vec<usize>> {
        let mut parent: Vec<Option<usize>> = vec![None; self.nodes.len()];
        let mut visited = vec![false; self.nodes.len()];
        let mut queue = VecDeque::new();
        for &s in starts {
            if !occupied[s] && !visited[s] {
                visited[s] = true;
                queue.push_back(s);
            }
        }
        while let Some(n) = queue.pop_front() {
            if targets.contains(&n) {
                let mut path = vec![n];
                let mut cur = n;
                while let Some(p) = parent[cur] {
                    path.push(p);
                    cur = p;
                }
                path.reverse();
                return Some(path);
            }
            for &m in &self.nodes[n].neighbours {
                if !visited[m] && !occupied[m] {
                    visited[m] = true;
                    parent[m] = Some(n);
                    queue.push_back(m);
                }
            }
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Planner
// ---------------------------------------------------------------------------

/// Result of one planning pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanOutcome {
    pub routed: Vec<LegKey>,
    /// Legs left un-routed this pass.
    pub retries: usize,
}

/// One hop of a planned route before registration.
struct Hop {
    start: StationKey,
    end: StationKey,
    track: TrackKey,
    vehicle: VehicleKey,
}

#[derive(Debug, Clone)]
pub struct PathPlanner {
    graph: RouteGraph,
}

impl PathPlanner {
    pub fn new(reg: &Registry) -> Result<Self, PlanError> {
        Ok(Self {
            graph: RouteGraph::build(reg)?,
        })
    }

    pub fn graph(&self) -> &RouteGraph {
        &self.graph
    }

    /// Route every generated leg that is neither routed nor completed, in
    /// leg insertion order.
    pub fn plan(
        &self,
        reg: &mut Registry,
        splitter: &mut TaskSplitBuffer,
    ) -> Result<PlanOutcome, PlanError> {
        let mut out = PlanOutcome::default();
        let mut occupied = self.graph.occupancy(reg);

        for leg_key in reg.legs.keys() {
            let Some(leg) = reg.legs.get(leg_key) else {
                continue;
            };
            if leg.routed || leg.completed {
                continue;
            }
            let starts = self.adjacency(reg, leg.start)?;
            let ends = self.adjacency(reg, leg.end)?;

            let Some(path) = self.graph.shortest_path(starts, ends, &occupied) else {
                debug!(order = %leg.order_no, leg = %leg.kind, "no free route, retrying next tick");
                out.retries += 1;
                continue;
            };
            let Some(hops) = self.hops(reg, leg, &path)? else {
                debug!(order = %leg.order_no, leg = %leg.kind, "route track does not span leg");
                out.retries += 1;
                continue;
            };

            let (order_no, kind) = (leg.order_no, leg.kind);
            let mut segments = Vec::with_capacity(hops.len());
            for (i, hop) in hops.into_iter().enumerate() {
                let seg_kind = SegmentKind::Transport(kind);
                let seg = RoutedSegment {
                    order_no,
                    leg: Some(leg_key),
                    kind: seg_kind,
                    start: hop.start,
                    end: hop.end,
                    track: hop.track,
                    vehicle: hop.vehicle,
                    status: SegmentStatus::Pending,
                    unloaded: false,
                    hop: i,
                };
                let name = RoutedSegment::name_for(order_no, seg_kind, i);
                if let Some(sk) = reg.segments.register(name, seg) {
                    segments.push(sk);
                }
            }
            for &n in &path {
                occupied[n] = true;
            }
            if let Some(leg) = reg.legs.get_mut(leg_key) {
                leg.segments = segments;
                leg.routed = true;
            }
            splitter.mark_routed(order_no, kind);
            info!(order = %order_no, leg = %kind, hops = path.len(), "leg routed");
            out.routed.push(leg_key);
        }
        Ok(out)
    }

    fn adjacency<'a>(
        &'a self,
        reg: &Registry,
        station: StationKey,
    ) -> Result<&'a [usize], PlanError> {
        let nodes = self.graph.station_nodes(station);
        if nodes.is_empty() {
            return Err(PlanError::NoAdjacency {
                station: reg.station_name(station).to_string(),
            });
        }
        Ok(nodes)
    }

    /// Split a node path into per-vehicle hops. `Ok(None)` means a
    /// single-node path whose track does not service both leg stations.
    fn hops(
        &self,
        reg: &Registry,
        leg: &Leg,
        path: &[usize],
    ) -> Result<Option<Vec<Hop>>, PlanError> {
        let node = |i: usize| {
            let n = &self.graph.nodes[path[i]];
            (n.track, n.vehicle)
        };
        if let [only] = path {
            let n = &self.graph.nodes[*only];
            let spans = reg
                .tracks
                .get(n.track)
                .is_some_and(|t| t.services(leg.start) && t.services(leg.end));
            if !spans {
                return Ok(None);
            }
            return Ok(Some(vec![Hop {
                start: leg.start,
                end: leg.end,
                track: n.track,
                vehicle: n.vehicle,
            }]));
        }

        let mut bounds = vec![leg.start];
        for i in 0..path.len() - 1 {
            let (a, b) = (node(i).0, node(i + 1).0);
            let shared = match (reg.tracks.get(a), reg.tracks.get(b)) {
                (Some(ta), Some(tb)) => hand_off_station(reg, &ta.stations, |s| tb.services(s)),
                _ => None,
            };
            let shared = shared.ok_or_else(|| PlanError::NoSharedStation {
                from: reg.track_name(a).to_string(),
                to: reg.track_name(b).to_string(),
            })?;
            bounds.push(shared);
        }
        bounds.push(leg.end);

        Ok(Some(
            (0..path.len())
                .map(|i| Hop {
                    start: bounds[i],
                    end: bounds[i + 1],
                    track: node(i).0,
                    vehicle: node(i).1,
                })
                .collect(),
        ))
    }
}

/// Pick the station where a ladle changes vehicle between two tracks:
/// the first shared interaction station, else the first shared station.
fn hand_off_station(
    reg: &Registry,
    stations: &[StationKey],
    shared: impl Fn(StationKey) -> bool,
) -> Option<StationKey> {
    let candidates: Vec<StationKey> = stations.iter().copied().filter(|&s| shared(s)).collect();
    candidates
        .iter()
        .copied()
        .find(|&s| {
            reg.stations
                .get(s)
                .is_some_and(|ws| ws.role == StationRole::Interaction)
        })
        .or_else(|| candidates.first().copied())
}

/// Queue a cargo-free repositioning move for `vehicle` to `station`, on
/// behalf of `order`. The move occupies the vehicle's route node until it
/// completes.
pub fn request_avoid(
    reg: &mut Registry,
    vehicle: VehicleKey,
    station: StationKey,
    order: OrderNo,
) -> Result<SegmentKey, PlanError> {
    let track = reg
        .vehicles
        .get(vehicle)
        .map(|v| v.track)
        .ok_or_else(|| PlanError::UnknownVehicle(format!("{vehicle:?}")))?;
    if !reg.tracks.get(track).is_some_and(|t| t.services(station)) {
        return Err(PlanError::StationNotOnTrack {
            vehicle: reg.vehicle_name(vehicle).to_string(),
            station: reg.station_name(station).to_string(),
        });
    }
    let mut hop = 0;
    loop {
        let seg = RoutedSegment {
            order_no: order,
            leg: None,
            kind: SegmentKind::Avoid,
            start: station,
            end: station,
            track,
            vehicle,
            status: SegmentStatus::Pending,
            unloaded: false,
            hop,
        };
        if let Some(key) = reg
            .segments
            .register(RoutedSegment::name_for(order, SegmentKind::Avoid, hop), seg)
        {
            return Ok(key);
        }
        hop += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::build_registry;
    use crate::test_utils::*;

    #[test]
    fn graph_edges_are_bidirectional_and_deduplicated() {
        let reg = build_registry(&hub_topology()).unwrap();
        let graph = RouteGraph::build(&reg).unwrap();
        let c1 = graph.node_of(reg.vehicles.key_of("C1").unwrap()).unwrap();
        let v1 = graph.node_of(reg.vehicles.key_of("V1").unwrap()).unwrap();
        assert!(graph.nodes()[c1].neighbours.contains(&v1));
        assert!(graph.nodes()[v1].neighbours.contains(&c1));
        let count = graph.nodes()[v1].neighbours.iter().filter(|&&n| n == c1).count();
        assert_eq!(count, 1);
    }

    #[test]
    fn unknown_neighbour_is_fatal() {
        let mut topo = hub_topology();
        topo.vehicles[0].connect_vehicles.push("ghost".into());
        let reg = build_registry(&topo).unwrap();
        assert!(matches!(
            RouteGraph::build(&reg),
            Err(PlanError::UnknownNeighbour { .. })
        ));
    }

    #[test]
    fn station_nodes_follow_connected_tracks() {
        let reg = build_registry(&hub_topology()).unwrap();
        let graph = RouteGraph::build(&reg).unwrap();
        let x1 = reg.stations.key_of("X1").unwrap();
        assert_eq!(graph.station_nodes(x1).len(), 2);
    }

    #[test]
    fn bfs_skips_occupied_nodes() {
        let reg = build_registry(&hub_topology()).unwrap();
        let graph = RouteGraph::build(&reg).unwrap();
        let c1 = graph.node_of(reg.vehicles.key_of("C1").unwrap()).unwrap();
        let v1 = graph.node_of(reg.vehicles.key_of("V1").unwrap()).unwrap();
        let mut occupied = vec![false; graph.nodes().len()];
        assert_eq!(graph.shortest_path(&[c1], &[v1], &occupied), Some(vec![c1, v1]));
        occupied[v1] = true;
        assert_eq!(graph.shortest_path(&[c1], &[v1], &occupied), None);
    }

    #[test]
    fn start_node_that_is_also_target_gives_single_hop() {
        let reg = build_registry(&line_topology()).unwrap();
        let graph = RouteGraph::build(&reg).unwrap();
        let c1 = graph.node_of(reg.vehicles.key_of("C1").unwrap()).unwrap();
        let occupied = vec![false; graph.nodes().len()];
        assert_eq!(graph.shortest_path(&[c1], &[c1], &occupied), Some(vec![c1]));
    }

    #[test]
    fn multi_hop_route_splits_at_shared_station() {
        let mut reg = build_registry(&hub_topology()).unwrap();
        let mut engine_split = TaskSplitBuffer::new();
        release_and_split(&mut reg, &mut engine_split, vec![hub_order(1, "1LD")]);
        let planner = PathPlanner::new(&reg).unwrap();

        let out = planner.plan(&mut reg, &mut engine_split).unwrap();
        assert_eq!(out.routed.len(), 1);
        let leg = reg.legs.get(out.routed[0]).unwrap();
        assert_eq!(leg.segments.len(), 2);
        let x1 = reg.stations.key_of("X1").unwrap();
        let first = reg.segments.get(leg.segments[0]).unwrap();
        let second = reg.segments.get(leg.segments[1]).unwrap();
        assert_eq!(first.end, x1);
        assert_eq!(second.start, x1);
        assert_eq!(first.status, SegmentStatus::Pending);
        assert!(engine_split.status(OrderNo(1), leg.kind).routed);
    }

    #[test]
    fn hand_off_prefers_interaction_over_caster() {
        let mut topo = shared_caster_topology();
        let mut x1 = topo.workstations[1].clone();
        x1.id = "X1".into();
        x1.role = Some(StationRole::Interaction);
        topo.workstations.push(x1);
        let mut reg = build_registry(&topo).unwrap();
        let mut split = TaskSplitBuffer::new();
        release_and_split(&mut reg, &mut split, vec![lf_order(1, "00:00:00")]);
        let planner = PathPlanner::new(&reg).unwrap();

        let out = planner.plan(&mut reg, &mut split).unwrap();
        let leg = reg.legs.get(out.routed[0]).unwrap();
        let first = reg.segments.get(leg.segments[0]).unwrap();
        assert_eq!(first.end, reg.stations.key_of("X1").unwrap());
    }

    #[test]
    fn caster_is_hand_off_when_nothing_else_is_shared() {
        let mut reg = build_registry(&shared_caster_topology()).unwrap();
        let mut split = TaskSplitBuffer::new();
        release_and_split(&mut reg, &mut split, vec![lf_order(1, "00:00:00")]);
        let planner = PathPlanner::new(&reg).unwrap();

        let out = planner.plan(&mut reg, &mut split).unwrap();
        let leg = reg.legs.get(out.routed[0]).unwrap();
        assert_eq!(leg.segments.len(), 2);
        let first = reg.segments.get(leg.segments[0]).unwrap();
        assert_eq!(first.end, reg.stations.key_of("2CC").unwrap());
    }

    #[test]
    fn claimed_nodes_block_later_legs_in_same_pass() {
        let mut reg = build_registry(&hub_topology()).unwrap();
        let mut split = TaskSplitBuffer::new();
        release_and_split(
            &mut reg,
            &mut split,
            vec![hub_order(1, "1LD"), hub_order(2, "2LD")],
        );
        let planner = PathPlanner::new(&reg).unwrap();
        let out = planner.plan(&mut reg, &mut split).unwrap();
        assert_eq!(out.routed.len(), 1);
        assert_eq!(out.retries, 1);
    }

    #[test]
    fn missing_adjacency_is_fatal() {
        let mut topo = line_topology();
        topo.workstations[1].connected_tracks.clear();
        let mut reg = build_registry(&topo).unwrap();
        let mut split = TaskSplitBuffer::new();
        release_and_split(&mut reg, &mut split, vec![lf_order(1, "00:00:00")]);
        let planner = PathPlanner::new(&reg).unwrap();
        assert!(matches!(
            planner.plan(&mut reg, &mut split),
            Err(PlanError::NoAdjacency { station }) if station == "1LF"
        ));
    }

    #[test]
    fn disjoint_tracks_are_fatal() {
        let mut topo = hub_topology();
        // Drop the hand-off station so T1 and T3 share nothing.
        topo.workstations.retain(|w| w.id != "X1");
        let mut reg = build_registry(&topo).unwrap();
        let mut split = TaskSplitBuffer::new();
        release_and_split(&mut reg, &mut split, vec![hub_order(1, "1LD")]);
        let planner = PathPlanner::new(&reg).unwrap();
        assert!(matches!(
            planner.plan(&mut reg, &mut split),
            Err(PlanError::NoSharedStation { .. })
        ));
    }

    #[test]
    fn avoid_requires_station_on_track() {
        let mut reg = build_registry(&hub_topology()).unwrap();
        let c1 = reg.vehicles.key_of("C1").unwrap();
        let lf = reg.stations.key_of("1LF").unwrap();
        let x1 = reg.stations.key_of("X1").unwrap();
        assert!(matches!(
            request_avoid(&mut reg, c1, lf, OrderNo(1)),
            Err(PlanError::StationNotOnTrack { .. })
        ));
        let a = request_avoid(&mut reg, c1, x1, OrderNo(1)).unwrap();
        let b = request_avoid(&mut reg, c1, x1, OrderNo(1)).unwrap();
        assert_ne!(a, b);
        assert_eq!(reg.segments.get(b).unwrap().hop, 1);
    }
}
