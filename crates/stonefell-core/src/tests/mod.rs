//! Integration-level tests for the world loop.
//!
//! - `scenarios.rs`: End-to-end sessions exercising movement validation,
//!   region churn and packet fan-out through the public API
//! - `properties.rs`: Property tests for the engine's standing invariants
//! - `helpers.rs`: Test map and session factory functions

mod helpers;

pub use helpers::*;
