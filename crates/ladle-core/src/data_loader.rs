//! Loading plant layouts and order lists from JSON.
//!
//! Feature-gated behind `data-loader`. Documents deserialize into the plain
//! structs in [`crate::config`] and are then validated the same way as
//! hand-built configuration.

use crate::config::{ConfigError, OrderDocument, TopologyConfig, orders_from_records};
use crate::engine::{Engine, SimError};
use crate::order::ProductionOrder;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur during data loading.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("simulation setup error: {0}")]
    Sim(#[from] SimError),
}

// ---------------------------------------------------------------------------
// Loaders
// ---------------------------------------------------------------------------

/// Parse a topology document.
pub fn load_topology_json(json: &str) -> Result<TopologyConfig, DataLoadError> {
    Ok(serde_json::from_str(json)?)
}

/// Parse an order document and convert its clock strings.
pub fn load_orders_json(json: &str) -> Result<Vec<ProductionOrder>, DataLoadError> {
    let doc: OrderDocument = serde_json::from_str(json)?;
    Ok(orders_from_records(doc.into_records())?)
}

/// Parse both documents and build a ready-to-run engine.
pub fn load_engine_json(topology: &str, orders: &str) -> Result<Engine, DataLoadError> {
    let topology = load_topology_json(topology)?;
    let orders = load_orders_json(orders)?;
    Ok(Engine::new(&topology, orders)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOPOLOGY: &str = r#"{
        "tracks": [{"id": "T1", "type": "horizontal", "start_pos": [0, 0], "end_pos": [12, 0]}],
        "vehicles": [{"id": "C1", "type": "crane", "init_pos": [0, 0], "track": "T1"}],
        "workstations": [
            {"id": "1LD", "pos": [0, 0], "type": "processing", "connected_tracks": ["T1"]},
            {"id": "1LF", "pos": [6, 0], "connected_tracks": ["T1"]},
            {"id": "1CC", "pos": [12, 0], "connected_tracks": ["T1"]}
        ]
    }"#;

    const ORDERS: &str = r#"[{
        "pono": 11, "start_ld": "1LD", "end_cc": "1CC", "refine_process": "LF",
        "lf_station": "1LF",
        "time_info": {"task_start": "08:00:00", "task_end": "10:00:00",
                      "lf_start": "08:05:00", "lf_end": "08:50:00"},
        "transport_info": {"ld_to_lf": 3, "lf_to_cc": 3}
    }]"#;

    #[test]
    fn load_topology() {
        let topo = load_topology_json(TOPOLOGY).unwrap();
        assert_eq!(topo.tracks.len(), 1);
        assert_eq!(topo.workstations.len(), 3);
    }

    #[test]
    fn load_orders_converts_times() {
        let orders = load_orders_json(ORDERS).unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].schedule.task_start, 8 * 3600);
    }

    #[test]
    fn load_engine_builds_plant() {
        let engine = load_engine_json(TOPOLOGY, ORDERS).unwrap();
        assert_eq!(engine.registry.stations.len(), 3);
        assert_eq!(engine.dispatcher().all_orders().len(), 1);
    }

    #[test]
    fn load_invalid_json_fails() {
        assert!(matches!(
            load_topology_json("{not json"),
            Err(DataLoadError::JsonParse(_))
        ));
    }

    #[test]
    fn load_order_missing_lf_station_fails() {
        let json = ORDERS.replace(r#""lf_station": "1LF","#, "");
        assert!(matches!(
            load_orders_json(&json),
            Err(DataLoadError::Config(ConfigError::InvalidOrder(_)))
        ));
    }

    #[test]
    fn unknown_track_reference_fails_engine_build() {
        let topo = TOPOLOGY.replace(r#""track": "T1""#, r#""track": "T7""#);
        assert!(matches!(
            load_engine_json(&topo, ORDERS),
            Err(DataLoadError::Sim(SimError::Config(ConfigError::UnknownTrack { .. })))
        ));
    }
}
