//! Core execution engine for Garden.
//!
//! This crate ties the registry and runtime together: the `Orchestrator` fans
//! out one thread per resolved module, drives each through
//! build → start → wait → logs against a shared `RuntimeClient`, and collects
//! exactly one `ContainerResult` per module in completion order. Results are
//! handed to a `ReportSink` as they arrive. It also holds the TOML-backed
//! `GardenConfig`.

pub mod config;
pub mod orchestrator;
pub mod report;

pub use config::GardenConfig;
pub use orchestrator::{ContainerResult, Orchestrator, PreparedUnit, RunOptions, RUN_VERSION};
pub use report::{report_dir_name, write_report, FsReportSink, ReportSink};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("registry error: {0}")]
    Registry(#[from] garden_registry::RegistryError),
    #[error("module argument error: {0}")]
    Schema(#[from] garden_schema::SchemaError),
    #[error("runtime error: {0}")]
    Runtime(#[from] garden_runtime::RuntimeError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Config(String),
    #[error("reports path '{}' is not a directory", .0.display())]
    InvalidReportDir(PathBuf),
}
