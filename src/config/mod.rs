// src/config/mod.rs

//! Configuration loading and validation for sitepipe.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate invariants like DAG correctness and glob syntax (`validate.rs`).
//! - Resolve logical roots into concrete paths (`paths.rs`).

pub mod loader;
pub mod model;
pub mod paths;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, load_or_default};
pub use model::{
    BuildSection, ConfigFile, PathsSection, RawConfigFile, ServerSection, TaskConfig, TaskKind,
};
pub use paths::PathConfig;
