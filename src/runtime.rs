//! Runtime glue that wires configuration, telemetry, the service assembly and
//! runner orchestration.

pub mod config;
pub mod runner;
pub mod service;
pub mod telemetry;
