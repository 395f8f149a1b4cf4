//! Configuration for leasekeeper.
//!
//! Loads flow-control and lease tuning from TOML/JSON files or environment
//! variables, validates the result, and installs the tracing subscriber.

pub mod loader;
pub mod telemetry;
pub mod validation;

pub use loader::{LeaserConfig, LeaserConfigSource};
pub use telemetry::init_tracing;
pub use validation::ConfigValidationError;
