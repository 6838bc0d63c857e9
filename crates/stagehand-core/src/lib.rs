//! Stagehand Core - configuration and error types
//!
//! This crate holds the pieces shared by the task engine and the CLI: the
//! configuration file format (task pipeline, test suite, dev server and watch
//! bindings), its defaults, loading and validation, and the error types used
//! to report configuration problems.

pub mod config;
pub mod error;

pub use config::{Config, StepConfig, TaskConfig};
pub use error::{ConfigError, Result, StagehandError};
