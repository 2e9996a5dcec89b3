//! Ladle Core -- a deterministic, tick-based simulation of ladle logistics
//! in a steel plant.
//!
//! Production orders carry one ladle of steel (a *goods* item) from a
//! converter (`LD`) through one or two refining furnaces (`LF`, `RH`) to a
//! caster (`CC`). Cranes and trolleys move along fixed one-axis tracks and
//! hand ladles to each other at shared stations.
//!
//! # Tick Pipeline
//!
//! Each call to [`engine::Engine::step`] advances the clock by
//! [`sim::TICK_STEP`] seconds through the following stages:
//!
//! 1. **Dispatch** -- Release orders whose start time has passed.
//! 2. **Split** -- Generate the next leg of each order once its predecessor
//!    is done and its scheduled start has come.
//! 3. **Plan** -- Route legs over the vehicle adjacency graph.
//! 4. **Allocate** -- Queue routed segments on their tracks.
//! 5. **Tracks** -- Bind queued segments to idle vehicles, detect conflicts.
//! 6. **Vehicles** -- Move one unit, load or unload.
//! 7. **Stations** -- Casters consume delivered goods.
//! 8. **Scan** -- Roll finished segments up into finished legs.
//! 9. **Bookkeeping** -- Advance the clock and compute the state hash.
//!
//! # Key Types
//!
//! - [`engine::Engine`] -- Owns the registry and runs the pipeline.
//! - [`registry::Registry`] -- Typed arenas for every entity kind, with
//!   name lookup and insertion-ordered iteration.
//! - [`order::ProductionOrder`] / [`order::Goods`] -- Input orders and the
//!   ladles they create.
//! - [`task::Leg`] / [`task::RoutedSegment`] -- Station-to-station moves and
//!   their single-vehicle pieces.
//! - [`planner::PathPlanner`] -- Breadth-first routing over vehicles.
//! - [`config`] -- Serde documents for plant layout and orders.

pub mod allocator;
pub mod config;
#[cfg(feature = "data-loader")]
pub mod data_loader;
pub mod dispatcher;
pub mod engine;
pub mod id;
pub mod order;
pub mod planner;
pub mod query;
pub mod registry;
pub mod scanner;
pub mod sim;
pub mod splitter;
pub mod station;
pub mod task;
pub mod track;
pub mod validation;
pub mod vehicle;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
