//! Jobharvest Core - Foundation crate for the job listing harvester.
//!
//! This crate provides the record shape, configuration, and error types that
//! the browser, pipeline and CLI crates depend on.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration with XDG paths and env overrides
//! - [`types`] - Shared record and enum types (`JobRecord`, `JobField`, `Region`)
//!
//! # Example
//!
//! ```rust
//! use jobharvest_core::{HarvestingConfiguration, Region};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = HarvestingConfiguration::default();
//! config.region = Region::Uk;
//! config.validate()?;
//! assert_eq!(config.region.base_domain(), "uk.linkedin.com");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{
    BrowserConfig, ExtractionConfig, FetchConfig, HarvestingConfiguration, IdentityConfig,
    OrchestrationConfig, PacingConfig, ScoringWeights, ValidationConfig,
};
pub use error::{ConfigError, ConfigResult, HarvestError, Result};
pub use types::{ExtractionMethod, JobField, JobRecord, Region};
