//! Scenario loading: finds the data files in a directory, deserializes them
//! by extension and builds an engine.
//!
//! A scenario directory holds `topology.{ron,toml,json}`,
//! `orders.{ron,toml,json}` and optionally `run.{ron,toml,json}`.

use crate::schema::RunConfig;
use ladle_core::config::{ConfigError, OrderRecord, TopologyConfig, orders_from_records};
use ladle_core::engine::{Engine, SimError};
use ladle_core::order::ProductionOrder;
use ladle_core::sim::ClockParseError;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::info;

// ===========================================================================
// Errors
// ===========================================================================

/// Errors that can occur during scenario loading.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    /// A required data file was not found in the given directory.
    #[error("required file '{file}' not found in {dir}")]
    MissingRequired { file: String, dir: PathBuf },

    /// The file has an extension we don't support.
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// Two files with the same base name but different formats exist.
    #[error("conflicting formats: {a} and {b}")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    /// A deserialization error occurred.
    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// The documents parsed but describe an invalid plant or order.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The run file names a start clock that is not `HH:MM:SS`.
    #[error("invalid start clock: {0}")]
    Clock(#[from] ClockParseError),

    /// The engine could not be built from the loaded documents.
    #[error(transparent)]
    Sim(#[from] SimError),

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

/// Supported data file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

/// Detect the format of a file based on its extension.
pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(DataLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

// ===========================================================================
// File discovery
// ===========================================================================

/// Scan a directory for a data file with the given base name.
///
/// Returns `Ok(None)` if no file is found, or `Err(ConflictingFormats)` if
/// more than one format exists for the same base name.
pub fn find_data_file(dir: &Path, base_name: &str) -> Result<Option<PathBuf>, DataLoadError> {
    let mut found: Option<PathBuf> = None;
    for ext in ["ron", "toml", "json"] {
        let candidate = dir.join(format!("{base_name}.{ext}"));
        if !candidate.exists() {
            continue;
        }
        if let Some(existing) = &found {
            return Err(DataLoadError::ConflictingFormats {
                a: existing.clone(),
                b: candidate,
            });
        }
        found = Some(candidate);
    }
    Ok(found)
}

/// Like [`find_data_file`], but returns an error if no file is found.
pub fn require_data_file(dir: &Path, base_name: &str) -> Result<PathBuf, DataLoadError> {
    find_data_file(dir, base_name)?.ok_or_else(|| DataLoadError::MissingRequired {
        file: base_name.to_string(),
        dir: dir.to_path_buf(),
    })
}

// ===========================================================================
// Deserialization
// ===========================================================================

fn parse_error(path: &Path, e: impl std::fmt::Display) -> DataLoadError {
    DataLoadError::Parse {
        file: path.to_path_buf(),
        detail: e.to_string(),
    }
}

/// Read a file and deserialize it according to its extension.
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    match format {
        Format::Ron => ron::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Json => serde_json::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Toml => toml::from_str(&content).map_err(|e| parse_error(path, e)),
    }
}

/// Deserialize a list from a file. TOML cannot hold a top-level array, so
/// the list is read from the array at `toml_key`; RON and JSON files hold
/// the list directly.
pub fn deserialize_list<T: DeserializeOwned>(
    path: &Path,
    toml_key: &str,
) -> Result<Vec<T>, DataLoadError> {
    if detect_format(path)? != Format::Toml {
        return deserialize_file(path);
    }
    let content = std::fs::read_to_string(path)?;
    let table: toml::Table = toml::from_str(&content).map_err(|e| parse_error(path, e))?;
    let array = table
        .get(toml_key)
        .cloned()
        .ok_or_else(|| parse_error(path, format!("missing key '{toml_key}' in TOML file")))?;
    array
        .try_into()
        .map_err(|e: toml::de::Error| parse_error(path, e))
}

// ===========================================================================
// Scenario
// ===========================================================================

/// Everything needed to run one simulation.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub topology: TopologyConfig,
    pub orders: Vec<ProductionOrder>,
    pub run: RunConfig,
}

impl Scenario {
    /// Build the engine, applying the configured start clock.
    pub fn build_engine(&self) -> Result<Engine, DataLoadError> {
        let mut engine = Engine::new(&self.topology, self.orders.clone())?;
        if let Some(start) = self.run.start_clock()? {
            engine.registry.set_clock(start);
        }
        Ok(engine)
    }
}

/// Load the topology, order and optional run files from `dir`.
pub fn load_scenario(dir: &Path) -> Result<Scenario, DataLoadError> {
    let topology_path = require_data_file(dir, "topology")?;
    let topology: TopologyConfig = deserialize_file(&topology_path)?;

    let orders_path = require_data_file(dir, "orders")?;
    let records: Vec<OrderRecord> = deserialize_list(&orders_path, "orders")?;
    let orders = orders_from_records(records)?;

    let run = match find_data_file(dir, "run")? {
        Some(path) => deserialize_file(&path)?,
        None => RunConfig::default(),
    };

    info!(
        dir = %dir.display(),
        tracks = topology.tracks.len(),
        vehicles = topology.vehicles.len(),
        workstations = topology.workstations.len(),
        orders = orders.len(),
        "scenario loaded"
    );
    Ok(Scenario {
        topology,
        orders,
        run,
    })
}

// ===========================================================================
// Tests
// ===========================================================================
