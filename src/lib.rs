//! Coin-operated track simulator.
//!
//! - `component_a`: the coin device. Counts coins per chute and sends `START_TRACK_<n>` commands.
//! - `component_b`: the simulation server. Runs one vehicle over the requested track.
//! - `utils`: configuration, errors and run exports shared by both binaries.

pub mod component_a;
pub mod component_b;
pub mod utils;
