//! File-based scenario loading and a headless runner for `ladle-core`.
//!
//! A scenario directory holds a plant layout (`topology.*`), an order book
//! (`orders.*`) and optional run settings (`run.*`), each in RON, TOML or
//! JSON. [`load_scenario`] reads them, [`Scenario::build_engine`] builds the
//! engine, and [`run_headless`] steps it to completion.

pub mod loader;
pub mod runner;
pub mod schema;

pub use loader::{DataLoadError, Scenario, load_scenario};
pub use runner::{RunLimits, RunSummary, StopReason, run_headless};
pub use schema::RunConfig;
