//! Core types and data models for two-arm experiment analysis
//!
//! This crate provides the observation model consumed by the inference core
//! and the result value objects it hands back to reporting collaborators.

pub mod experiments;
pub mod metrics;
pub mod errors;

pub use errors::{DataError, Result};
pub use experiments::{Device, ExperimentData, Group, Observation, TrafficSource};
pub use metrics::{GroupSummary, IntervalEstimate, TestResult};
