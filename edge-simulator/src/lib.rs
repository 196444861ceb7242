//! Trace-driven simulator for edge-content caching strategies.

pub mod belady;
pub mod generator;
pub mod instruction;
pub mod resources;
pub mod runner;
pub mod stats;
pub mod strategy;
pub mod trace;

pub use runner::{RunSummary, SimError, StrategyRunner};
