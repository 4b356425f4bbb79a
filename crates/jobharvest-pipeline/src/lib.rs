//! Jobharvest Pipeline - Paced, identity-rotating harvest of job listings.
//!
//! This crate turns a search query into validated, scored and deduplicated
//! [`JobRecord`](jobharvest_core::JobRecord)s. A run walks result pages
//! through fetch, extraction and validation with bounded concurrency, and
//! always ends in a [`HarvestReport`] whether it completed, aborted on a
//! blocked page, or was cancelled.
//!
//! # Features
//!
//! - Pacing with progressive slowdown and periodic rest breaks
//! - Retry with exponential backoff and identity rotation between attempts
//! - Blocked / not-found / transient / malformed fetch classification
//! - Optional headless-browser fetch path behind the same [`Fetcher`] trait
//! - JSON-LD, CSS selector and loose-pattern extraction, in that order
//! - Configurable quality scoring and atomic-snapshot deduplication
//!
//! # Example
//!
//! ```rust,ignore
//! use jobharvest_pipeline::{BackoffState, FetchLayer, HarvestOrchestrator, SearchQuery};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! let rotator = Arc::new(IdentityRotator::from_config(&config.identity)?);
//! let backoff = Arc::new(BackoffState::new());
//! let fetcher = FetchLayer::from_config(&config, rotator.clone(), backoff.clone())?;
//!
//! let orchestrator = HarvestOrchestrator::new(config, Arc::new(fetcher))?
//!     .with_rotator(rotator)
//!     .with_backoff_state(backoff);
//!
//! let report = orchestrator
//!     .run(&SearchQuery::new("rust engineer", "Berlin"), 5, CancellationToken::new())
//!     .await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod browser_source;
pub mod clean;
pub mod dedup;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod filter;
pub mod http;
pub mod orchestrator;
pub mod pacing;
pub mod summary;
pub mod url_builder;
pub mod validate;

// Re-export commonly used types
pub use browser_source::BrowserSource;
pub use dedup::{merge, MergeOutcome};
pub use error::{FetchError, FetchErrorKind, PipelineError, Result, ValidationRejected};
pub use extract::{
    ExtractedField, ExtractionIncomplete, ExtractionPipeline, FieldValue, Listing, RawRecord,
    SelectorSet,
};
pub use fetch::{
    classify_body, AttemptError, BackoffSnapshot, BackoffState, FetchLayer, Fetcher, Page,
    PageSource, RetryPolicy, RetryingFetcher,
};
pub use filter::{DatePosted, ExperienceLevel, JobType, SearchFilters, WorkType};
pub use http::HttpSource;
pub use orchestrator::{AbortReason, HarvestOrchestrator, HarvestReport, Terminal};
pub use pacing::{PacingController, Pause};
pub use summary::{
    HarvestSession, HarvestSummary, PageReport, PageStatus, PageTally, QualityDistribution,
};
pub use url_builder::{build_search_url, SearchQuery};
pub use validate::{canonicalize_url, Validator};
