//! Client identities and headless browser sessions.
//!
//! Provides the rotating pool of browser-like client identities used by every
//! fetch, and a scoped Chromium session for the secondary fetch path.

pub mod actions;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod rotator;

pub use actions::BrowserActions;
pub use engine::{BrowserSession, BrowserSessionConfig};
pub use error::{BrowserError, Result};
pub use fingerprint::{identity_pool, BrowserProfile, Identity, Viewport};
pub use rotator::IdentityRotator;
