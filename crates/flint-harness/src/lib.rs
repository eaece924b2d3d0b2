#![forbid(unsafe_code)]
//! End-to-end scenarios for FlintFTL.
//!
//! Each scenario drives a [`flint_sim::SimTest`] through a scripted workload
//! and checks the observable contract: returned values, success/failure
//! boundaries, and physical erase/write counts. Scenarios are plain library
//! functions so integration tests and the CLI share them.

pub mod scenarios;

pub use scenarios::{run_scenario, Scenario, ScenarioError};
