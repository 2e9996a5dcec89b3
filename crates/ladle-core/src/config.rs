//! Topology and order documents, and building a [`Registry`] from them.
//!
//! These are plain serde structs; any format with a serde implementation can
//! feed them. Positions are `[x, y]` pairs and stage times are `HH:MM:SS`
//! strings, matching the plant's planning exports.

use crate::id::OrderNo;
use crate::order::{
    LegDurations, OrderError, ProductionOrder, RefineVariant, StageProgress, StageSchedule,
};
use crate::registry::Registry;
use crate::sim::{ClockParseError, Ticks, parse_clock};
use crate::station::{StationRole, Workstation};
use crate::track::{Axis, MAX_VEHICLES_PER_TRACK, Position, Track};
use crate::vehicle::{Vehicle, VehicleKind};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors found while turning configuration into simulation state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("duplicate {kind} id: {id}")]
    DuplicateId { kind: &'static str, id: String },
    #[error("{owner} references unknown track {track}")]
    UnknownTrack { owner: String, track: String },
    #[error("track {track} hosts {count} vehicles, at most {max} allowed", max = MAX_VEHICLES_PER_TRACK)]
    TooManyVehicles { track: String, count: usize },
    #[error("order {order}: {source}")]
    Clock {
        order: OrderNo,
        #[source]
        source: ClockParseError,
    },
    #[error(transparent)]
    InvalidOrder(#[from] OrderError),
    #[error("duplicate order number: {0}")]
    DuplicateOrder(OrderNo),
}

// ---------------------------------------------------------------------------
// Topology document
// ---------------------------------------------------------------------------

fn default_safety_distance() -> i32 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackConfig {
    pub id: String,
    #[serde(rename = "type")]
    pub axis: Axis,
    pub start_pos: [i32; 2],
    pub end_pos: [i32; 2],
    #[serde(default = "default_safety_distance")]
    pub safety_distance: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleConfig {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: VehicleKind,
    pub init_pos: [i32; 2],
    pub track: String,
    #[serde(default)]
    pub connect_vehicles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkstationConfig {
    pub id: String,
    pub pos: [i32; 2],
    /// Declared role; processing stations are reclassified by id.
    #[serde(rename = "type", default)]
    pub role: Option<StationRole>,
    #[serde(default)]
    pub connected_tracks: Vec<String>,
}

/// The static plant layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyConfig {
    #[serde(default)]
    pub tracks: Vec<TrackConfig>,
    #[serde(default)]
    pub vehicles: Vec<VehicleConfig>,
    #[serde(default)]
    pub workstations: Vec<WorkstationConfig>,
}

fn pos([x, y]: [i32; 2]) -> Position {
    Position::new(x, y)
}

/// Register every track, vehicle and workstation of `topology`.
pub fn build_registry(topology: &TopologyConfig) -> Result<Registry, ConfigError> {
    let mut reg = Registry::new();

    for tc in &topology.tracks {
        let mut track = Track::new(&tc.id, tc.axis, pos(tc.start_pos), pos(tc.end_pos));
        track.safety_distance = tc.safety_distance;
        reg.tracks
            .register(&tc.id, track)
            .ok_or_else(|| ConfigError::DuplicateId {
                kind: "track",
                id: tc.id.clone(),
            })?;
    }

    for vc in &topology.vehicles {
        let track_key = reg
            .tracks
            .key_of(&vc.track)
            .ok_or_else(|| ConfigError::UnknownTrack {
                owner: vc.id.clone(),
                track: vc.track.clone(),
            })?;
        let mut vehicle = Vehicle::new(&vc.id, vc.kind, track_key, pos(vc.init_pos));
        vehicle.connect_vehicles = vc.connect_vehicles.clone();
        let vkey = reg
            .vehicles
            .register(&vc.id, vehicle)
            .ok_or_else(|| ConfigError::DuplicateId {
                kind: "vehicle",
                id: vc.id.clone(),
            })?;
        if let Some(track) = reg.tracks.get_mut(track_key) {
            track.vehicles.push(vkey);
            if track.vehicles.len() > MAX_VEHICLES_PER_TRACK {
                return Err(ConfigError::TooManyVehicles {
                    track: track.id.clone(),
                    count: track.vehicles.len(),
                });
            }
        }
    }

    for wc in &topology.workstations {
        let role = StationRole::resolve(wc.role, &wc.id);
        let mut station = Workstation::new(&wc.id, pos(wc.pos), role);
        for track_id in &wc.connected_tracks {
            let tk = reg
                .tracks
                .key_of(track_id)
                .ok_or_else(|| ConfigError::UnknownTrack {
                    owner: wc.id.clone(),
                    track: track_id.clone(),
                })?;
            if !station.connected_tracks.contains(&tk) {
                station.connected_tracks.push(tk);
            }
        }
        let connected = station.connected_tracks.clone();
        let skey = reg
            .stations
            .register(&wc.id, station)
            .ok_or_else(|| ConfigError::DuplicateId {
                kind: "workstation",
                id: wc.id.clone(),
            })?;
        for tk in connected {
            if let Some(track) = reg.tracks.get_mut(tk) {
                track.stations.push(skey);
            }
        }
    }

    Ok(reg)
}

// ---------------------------------------------------------------------------
// Order document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeInfo {
    pub task_start: String,
    pub task_end: String,
    #[serde(default)]
    pub lf_start: Option<String>,
    #[serde(default)]
    pub lf_end: Option<String>,
    #[serde(default)]
    pub rh_start: Option<String>,
    #[serde(default)]
    pub rh_end: Option<String>,
}

/// Processing minutes at the refining stations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationInfo {
    #[serde(default)]
    pub lf_duration: Option<u32>,
    #[serde(default)]
    pub rh_duration: Option<u32>,
}

/// Transit minutes per leg.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportInfo {
    #[serde(default)]
    pub ld_to_lf: Option<u32>,
    #[serde(default)]
    pub ld_to_rh: Option<u32>,
    #[serde(default)]
    pub lf_to_rh: Option<u32>,
    #[serde(default)]
    pub lf_to_cc: Option<u32>,
    #[serde(default)]
    pub rh_to_cc: Option<u32>,
}

/// One order as it appears in an order document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub pono: u32,
    pub start_ld: String,
    pub end_cc: String,
    pub refine_process: RefineVariant,
    #[serde(default)]
    pub lf_station: Option<String>,
    #[serde(default)]
    pub rh_station: Option<String>,
    pub time_info: TimeInfo,
    #[serde(default)]
    pub duration_info: DurationInfo,
    #[serde(default)]
    pub transport_info: TransportInfo,
}

impl OrderRecord {
    /// Parse stage times and validate the result.
    pub fn into_order(self) -> Result<ProductionOrder, ConfigError> {
        let order_no = OrderNo(self.pono);
        let clock = |s: &str| -> Result<Ticks, ConfigError> {
            parse_clock(s).map_err(|source| ConfigError::Clock {
                order: order_no,
                source,
            })
        };
        let optional = |s: &Option<String>| -> Result<Option<Ticks>, ConfigError> {
            match s.as_deref() {
                Some(s) if !s.trim().is_empty() => clock(s).map(Some),
                _ => Ok(None),
            }
        };
        let ti = &self.time_info;
        let schedule = StageSchedule {
            task_start: clock(&ti.task_start)?,
            task_end: clock(&ti.task_end)?,
            lf_start: optional(&ti.lf_start)?,
            lf_end: optional(&ti.lf_end)?,
            rh_start: optional(&ti.rh_start)?,
            rh_end: optional(&ti.rh_end)?,
        };
        let tr = self.transport_info;
        let order = ProductionOrder {
            order_no,
            origin: self.start_ld,
            terminal: self.end_cc,
            variant: self.refine_process,
            lf_station: self.lf_station.filter(|s| !s.is_empty()),
            rh_station: self.rh_station.filter(|s| !s.is_empty()),
            schedule,
            durations: LegDurations {
                ld_to_lf: tr.ld_to_lf,
                ld_to_rh: tr.ld_to_rh,
                lf_to_rh: tr.lf_to_rh,
                lf_to_cc: tr.lf_to_cc,
                rh_to_cc: tr.rh_to_cc,
                lf_process: self.duration_info.lf_duration,
                rh_process: self.duration_info.rh_duration,
            },
            progress: StageProgress::default(),
        };
        order.validate()?;
        Ok(order)
    }
}

/// An order document: either a bare list of records or a table with an
/// `orders` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OrderDocument {
    List(Vec<OrderRecord>),
    Table { orders: Vec<OrderRecord> },
}

impl OrderDocument {
    pub fn into_records(self) -> Vec<OrderRecord> {
        match self {
            OrderDocument::List(records) | OrderDocument::Table { orders: records } => records,
        }
    }
}

/// Convert every record, stopping at the first invalid one.
pub fn orders_from_records(records: Vec<OrderRecord>) -> Result<Vec<ProductionOrder>, ConfigError> {
    records.into_iter().map(OrderRecord::into_order).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> TopologyConfig {
        TopologyConfig {
            tracks: vec![TrackConfig {
                id: "T1".into(),
                axis: Axis::Horizontal,
                start_pos: [0, 0],
                end_pos: [20, 0],
                safety_distance: 1,
            }],
            vehicles: vec![VehicleConfig {
                id: "C1".into(),
                kind: VehicleKind::Crane,
                init_pos: [0, 0],
                track: "T1".into(),
                connect_vehicles: vec![],
            }],
            workstations: vec![
                WorkstationConfig {
                    id: "1LD".into(),
                    pos: [0, 0],
                    role: Some(StationRole::Processing),
                    connected_tracks: vec!["T1".into()],
                },
                WorkstationConfig {
                    id: "1CC".into(),
                    pos: [20, 0],
                    role: None,
                    connected_tracks: vec!["T1".into(), "T1".into()],
                },
            ],
        }
    }

    #[test]
    fn build_registry_wires_relations() {
        let reg = build_registry(&layout()).unwrap();
        let t1 = reg.tracks.key_of("T1").unwrap();
        let track = reg.tracks.get(t1).unwrap();
        assert_eq!(track.vehicles.len(), 1);
        assert_eq!(track.stations.len(), 2);

        let ld = reg.stations.get_by_name("1LD").unwrap();
        assert_eq!(ld.role, StationRole::Origin);
        let cc = reg.stations.get_by_name("1CC").unwrap();
        assert_eq!(cc.role, StationRole::Terminal);
        assert_eq!(cc.connected_tracks, vec![t1]);
    }

    #[test]
    fn third_vehicle_on_a_track_is_rejected() {
        let mut topo = layout();
        for id in ["C2", "C3"] {
            topo.vehicles.push(VehicleConfig {
                id: id.into(),
                kind: VehicleKind::Crane,
                init_pos: [5, 0],
                track: "T1".into(),
                connect_vehicles: vec![],
            });
        }
        assert!(matches!(
            build_registry(&topo),
            Err(ConfigError::TooManyVehicles { count: 3, .. })
        ));
    }

    #[test]
    fn unknown_track_reference_is_rejected() {
        let mut topo = layout();
        topo.workstations[0].connected_tracks.push("T9".into());
        assert!(matches!(
            build_registry(&topo),
            Err(ConfigError::UnknownTrack { track, .. }) if track == "T9"
        ));
    }

    #[test]
    fn duplicate_track_id_is_rejected() {
        let mut topo = layout();
        let dup = topo.tracks[0].clone();
        topo.tracks.push(dup);
        assert!(matches!(
            build_registry(&topo),
            Err(ConfigError::DuplicateId { kind: "track", .. })
        ));
    }

    #[test]
    fn topology_parses_with_defaults() {
        let json = r#"{
            "tracks": [{"id": "T1", "type": "vertical", "start_pos": [0, 0], "end_pos": [0, 9]}],
            "vehicles": [{"id": "V1", "type": "trolley", "init_pos": [0, 0], "track": "T1"}],
            "workstations": [{"id": "X1", "pos": [0, 4], "type": "interaction", "connected_tracks": ["T1"]}]
        }"#;
        let topo: TopologyConfig = serde_json::from_str(json).unwrap();
        assert_eq!(topo.tracks[0].safety_distance, 1);
        assert!(topo.vehicles[0].connect_vehicles.is_empty());
        assert_eq!(topo.workstations[0].role, Some(StationRole::Interaction));
    }

    #[test]
    fn order_record_converts_clock_strings() {
        let json = r#"{
            "pono": 1, "start_ld": "1LD", "end_cc": "1CC", "refine_process": "LF",
            "lf_station": "1LF", "rh_station": null,
            "time_info": {"task_start": "00:00:00", "task_end": "02:00:00",
                          "lf_start": "00:10:00", "lf_end": "01:10:00",
                          "rh_start": null, "rh_end": ""},
            "duration_info": {"lf_duration": 60, "rh_duration": null},
            "transport_info": {"ld_to_lf": 5, "lf_to_cc": 8}
        }"#;
        let record: OrderRecord = serde_json::from_str(json).unwrap();
        let order = record.into_order().unwrap();
        assert_eq!(order.schedule.task_end, 7200);
        assert_eq!(order.schedule.lf_end, Some(4200));
        assert_eq!(order.schedule.rh_end, None);
        assert_eq!(order.durations.lf_process, Some(60));
    }

    #[test]
    fn order_document_accepts_list_or_table() {
        let record = r#"{"pono": 1, "start_ld": "1LD", "end_cc": "1CC",
            "refine_process": "RH", "rh_station": "1RH",
            "time_info": {"task_start": "00:00:00", "task_end": "01:00:00", "rh_end": "00:40:00"}}"#;
        let list: OrderDocument = serde_json::from_str(&format!("[{record}]")).unwrap();
        let table: OrderDocument =
            serde_json::from_str(&format!(r#"{{"orders": [{record}]}}"#)).unwrap();
        assert_eq!(list.into_records(), table.into_records());
    }

    #[test]
    fn order_record_with_bad_clock_is_rejected() {
        let record = OrderRecord {
            pono: 2,
            start_ld: "1LD".into(),
            end_cc: "1CC".into(),
            refine_process: RefineVariant::Lf,
            lf_station: Some("1LF".into()),
            rh_station: None,
            time_info: TimeInfo {
                task_start: "25:00:00".into(),
                task_end: "01:00:00".into(),
                ..Default::default()
            },
            duration_info: DurationInfo::default(),
            transport_info: TransportInfo::default(),
        };
        assert!(matches!(
            record.into_order(),
            Err(ConfigError::Clock { order: OrderNo(2), .. })
        ));
    }
}
