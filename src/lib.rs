#[cfg(test)]
use rstest_reuse;

pub mod api;
pub mod config;
pub mod model;
pub mod orchestrator;
pub mod session;
pub mod settlement;
pub mod store;
pub mod webhook;
