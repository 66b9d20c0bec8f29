//! mockwire API
//!
//! Configuration, runtime wiring and the process-wide entry points used by
//! the CLI.

pub mod config;
pub mod mock_api;
pub mod runtime;

pub use config::{RuntimeConfig, CHECK_TIMEOUT_ENV, STORAGE_PATH_ENV};
pub use runtime::MockRuntime;
