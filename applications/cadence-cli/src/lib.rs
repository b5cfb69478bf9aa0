//! Cadence CLI Library
//!
//! Command line host for the sync core: configuration loading and the wiring
//! of store, backend client, engine, migration and projections.
//!
//! This library exposes the core components for testing purposes.

pub mod app;
pub mod config;

pub use app::{App, StatusReport};
pub use config::{AppConfig, ConfigError};
