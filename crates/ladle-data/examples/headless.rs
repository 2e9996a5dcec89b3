//! Load a scenario directory and run it to completion without rendering.
//!
//! ```text
//! cargo run -p ladle-data --example headless -- crates/ladle-data/data/two_bay
//! RUST_LOG=debug cargo run -p ladle-data --example headless
//! ```

use ladle_data::{load_scenario, run_headless};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data/two_bay"));

    let scenario = load_scenario(&dir)?;
    let mut engine = scenario.build_engine()?;
    let summary = run_headless(&mut engine, scenario.run.limits())?;
    println!("{summary}");
    Ok(())
}
