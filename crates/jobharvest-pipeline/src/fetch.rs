//! Fetch layer: retry, backoff, classification and path selection.
//!
//! A [`PageSource`] performs exactly one attempt over some transport. The
//! [`RetryingFetcher`] wraps a source with the retry policy and turns raw
//! outcomes into the [`FetchError`] taxonomy. [`FetchLayer`] composes the
//! primary HTTP path with the optional browser path behind the same
//! [`Fetcher`] interface, so callers never branch on which path served a page.

use crate::error::FetchError;
use async_trait::async_trait;
use jobharvest_browser::{Identity, IdentityRotator};
use jobharvest_core::FetchConfig;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Final URL fragments that mean the site redirected us to a login wall.
const BLOCKED_URL_MARKERS: [&str; 5] = [
    "/authwall",
    "/login",
    "/checkpoint",
    "/uas/login",
    "/signup",
];

/// Body fragments that mean the site served a challenge instead of content.
const BLOCKED_BODY_MARKERS: [&str; 6] = [
    "g-recaptcha",
    "captcha-internal",
    "h-captcha",
    "challenge-form",
    "security verification",
    "please verify you are a human",
];

/// A fetched page, whatever its HTTP status.
#[derive(Debug, Clone)]
pub struct Page {
    /// URL as requested
    pub url: String,
    /// URL after redirects
    pub final_url: String,
    /// HTTP status code
    pub status: u16,
    /// `Content-Type` header, if sent
    pub content_type: Option<String>,
    /// Response body as text
    pub body: String,
    /// Server-requested wait from a `Retry-After` header
    pub retry_after: Option<Duration>,
}

impl Page {
    /// A 200 `text/html` page; mostly useful for tests and the browser path.
    #[must_use]
    pub fn html(url: impl Into<String>, body: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            final_url: url.clone(),
            url,
            status: 200,
            content_type: Some("text/html; charset=utf-8".to_string()),
            body: body.into(),
            retry_after: None,
        }
    }
}

/// Transport-level outcome of a single attempt that produced no response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptError {
    /// No response within the timeout
    Timeout,
    /// Connect, DNS or reset failure
    Connection(String),
    /// The browser failed to render the page
    Browser(String),
}

impl std::fmt::Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => f.write_str("request timed out"),
            Self::Connection(reason) => write!(f, "connection error: {reason}"),
            Self::Browser(reason) => write!(f, "browser error: {reason}"),
        }
    }
}

/// One attempt at retrieving a URL over some transport.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Make exactly one attempt, presenting `identity`.
    async fn fetch_once(
        &self,
        url: &str,
        identity: &Identity,
    ) -> std::result::Result<Page, AttemptError>;
}

/// Retrieves a page, with whatever retry and fallback policy the implementor carries.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `url`, starting with `identity`.
    async fn fetch(&self, url: &str, identity: &Identity) -> Result<Page, FetchError>;
}

/// Counters shared by every concurrent fetch of a run.
#[derive(Debug, Default)]
pub struct BackoffState {
    attempts: AtomicU64,
    retries: AtomicU64,
    backoff_wait_ms: AtomicU64,
    blocked: AtomicU64,
    secondary_fallbacks: AtomicU64,
}

/// Point-in-time copy of [`BackoffState`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BackoffSnapshot {
    /// Attempts made across every page
    pub attempts: u64,
    /// Attempts that were followed by a backoff and another try
    pub retries: u64,
    /// Total time spent in backoff
    pub backoff_wait_ms: u64,
    /// Fetches that ended blocked
    pub blocked: u64,
    /// Pages handed to the secondary fetcher
    pub secondary_fallbacks: u64,
}

impl BackoffState {
    /// Zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::cast_possible_truncation)]
    fn record_backoff(&self, delay: Duration) {
        self.retries.fetch_add(1, Ordering::Relaxed);
        self.backoff_wait_ms
            .fetch_add(delay.as_millis() as u64, Ordering::Relaxed);
    }

    /// Copy of the counters as they stand.
    pub fn snapshot(&self) -> BackoffSnapshot {
        BackoffSnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            backoff_wait_ms: self.backoff_wait_ms.load(Ordering::Relaxed),
            blocked: self.blocked.load(Ordering::Relaxed),
            secondary_fallbacks: self.secondary_fallbacks.load(Ordering::Relaxed),
        }
    }
}

/// Attempt ceiling and exponential backoff parameters.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts per page, including the first
    pub max_attempts: u32,
    /// Wait after the first failed attempt
    pub base_backoff: Duration,
    /// Growth factor per further attempt
    pub multiplier: f64,
    /// Ceiling on a single wait
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Wait after failed attempt `attempt` (1-based), before the next one.
    #[must_use]
    pub fn backoff(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let scaled = self.base_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        let delay = Duration::try_from_secs_f64(scaled).unwrap_or(self.max_backoff);
        (delay.min(self.max_backoff) + retry_after.unwrap_or_default()).min(self.max_backoff)
    }
}

impl From<&FetchConfig> for RetryPolicy {
    fn from(config: &FetchConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_backoff: Duration::from_millis(config.backoff_base_ms),
            multiplier: config.backoff_multiplier,
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

/// Look for login walls, challenges and unusable bodies in a 2xx page.
#[must_use]
pub fn classify_body(page: &Page) -> Option<FetchError> {
    let final_path = url::Url::parse(&page.final_url)
        .map(|u| u.path().to_ascii_lowercase())
        .unwrap_or_default();
    if let Some(marker) = BLOCKED_URL_MARKERS
        .iter()
        .find(|m| final_path.starts_with(*m))
    {
        return Some(FetchError::Blocked {
            url: page.url.clone(),
            reason: format!("redirected to {marker}"),
            slot: None,
        });
    }

    if let Some(content_type) = &page.content_type {
        if !content_type.to_ascii_lowercase().contains("html") {
            return Some(FetchError::Malformed {
                url: page.url.clone(),
                reason: format!("unexpected content type {content_type}"),
            });
        }
    }

    if page.body.trim().is_empty() {
        return Some(FetchError::Malformed {
            url: page.url.clone(),
            reason: "empty body".to_string(),
        });
    }

    let lowered = page.body.to_ascii_lowercase();
    if let Some(marker) = BLOCKED_BODY_MARKERS.iter().find(|m| lowered.contains(*m)) {
        return Some(FetchError::Blocked {
            url: page.url.clone(),
            reason: format!("challenge marker '{marker}' in body"),
            slot: None,
        });
    }

    if lowered.contains("<html") && !lowered.contains("</html>") {
        return Some(FetchError::Malformed {
            url: page.url.clone(),
            reason: "truncated body".to_string(),
        });
    }

    None
}

enum Outcome {
    Done(Page),
    Retry(FetchError, Option<Duration>),
    Fail(FetchError),
}

fn classify(url: &str, attempt: u32, result: std::result::Result<Page, AttemptError>) -> Outcome {
    let transient = |reason: String| FetchError::Transient {
        url: url.to_string(),
        attempts: attempt,
        reason,
    };

    let page = match result {
        Ok(page) => page,
        Err(e) => return Outcome::Retry(transient(e.to_string()), None),
    };

    match page.status {
        401 | 403 | 999 => Outcome::Fail(FetchError::Blocked {
            url: url.to_string(),
            reason: format!("HTTP {}", page.status),
            slot: None,
        }),
        404 | 410 => Outcome::Fail(FetchError::NotFound {
            url: url.to_string(),
            status: page.status,
        }),
        429 => Outcome::Retry(transient("HTTP 429".to_string()), page.retry_after),
        500..=599 => Outcome::Retry(transient(format!("HTTP {}", page.status)), None),
        200..=299 => match classify_body(&page) {
            Some(e @ FetchError::Malformed { .. }) => Outcome::Retry(e, None),
            Some(e) => Outcome::Fail(e),
            None => Outcome::Done(page),
        },
        status => Outcome::Fail(FetchError::Malformed {
            url: url.to_string(),
            reason: format!("unexpected HTTP {status}"),
        }),
    }
}

/// Applies the retry policy around a single-attempt [`PageSource`].
///
/// Timeouts, connection errors, 429, 5xx and malformed bodies are retried.
/// Between attempts the identity is rotated when a rotator is attached.
/// Blocked responses are reported to the rotator and returned immediately,
/// tagged with the slot of the identity that was refused.
pub struct RetryingFetcher {
    source: Arc<dyn PageSource>,
    policy: RetryPolicy,
    rotator: Option<Arc<IdentityRotator>>,
    state: Arc<BackoffState>,
}

impl RetryingFetcher {
    /// Retry `source` under `policy`, without identity rotation.
    pub fn new(source: Arc<dyn PageSource>, policy: RetryPolicy) -> Self {
        Self {
            source,
            policy,
            rotator: None,
            state: Arc::new(BackoffState::new()),
        }
    }

    /// Rotate identities between attempts and report blocks to `rotator`.
    #[must_use]
    pub fn with_rotator(mut self, rotator: Arc<IdentityRotator>) -> Self {
        self.rotator = Some(rotator);
        self
    }

    /// Count attempts and backoff into shared counters.
    #[must_use]
    pub fn with_state(mut self, state: Arc<BackoffState>) -> Self {
        self.state = state;
        self
    }

    /// Counters this fetcher writes to.
    pub fn state(&self) -> &Arc<BackoffState> {
        &self.state
    }
}

#[async_trait]
impl Fetcher for RetryingFetcher {
    async fn fetch(&self, url: &str, identity: &Identity) -> Result<Page, FetchError> {
        let mut identity = identity.clone();
        let mut last_error = None;

        for attempt in 1..=self.policy.max_attempts {
            self.state.attempts.fetch_add(1, Ordering::Relaxed);
            let result = self.source.fetch_once(url, &identity).await;

            match classify(url, attempt, result) {
                Outcome::Done(page) => {
                    if let Some(rotator) = &self.rotator {
                        rotator.report_success();
                    }
                    tracing::debug!(
                        url,
                        attempt,
                        source = self.source.name(),
                        status = page.status,
                        "Fetched page"
                    );
                    return Ok(page);
                }
                Outcome::Fail(FetchError::Blocked { url, reason, .. }) => {
                    self.state.blocked.fetch_add(1, Ordering::Relaxed);
                    if let Some(rotator) = &self.rotator {
                        rotator.report_blocked(&identity);
                    }
                    tracing::warn!(%url, attempt, slot = identity.slot, reason = %reason, "Fetch blocked");
                    return Err(FetchError::Blocked {
                        url,
                        reason,
                        slot: Some(identity.slot),
                    });
                }
                Outcome::Fail(error) => return Err(error),
                Outcome::Retry(error, retry_after) => {
                    if attempt < self.policy.max_attempts {
                        let delay = self.policy.backoff(attempt, retry_after);
                        self.state.record_backoff(delay);
                        tracing::warn!(
                            url,
                            attempt,
                            max_attempts = self.policy.max_attempts,
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            "Fetch failed: {}, retrying",
                            error
                        );
                        tokio::time::sleep(delay).await;
                        if let Some(rotator) = &self.rotator {
                            rotator.rotate_now();
                            identity = rotator.next_identity();
                        }
                    }
                    last_error = Some(error);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| FetchError::Transient {
            url: url.to_string(),
            attempts: 0,
            reason: "no attempts made".to_string(),
        }))
    }
}

/// Primary HTTP path plus optional browser path behind one [`Fetcher`].
///
/// The secondary path serves a page only when the primary path is disabled
/// or returned `malformed`.
pub struct FetchLayer {
    primary: Arc<dyn Fetcher>,
    primary_enabled: bool,
    secondary: Option<Arc<dyn Fetcher>>,
    state: Arc<BackoffState>,
}

impl FetchLayer {
    /// Layer over `primary`; a disabled primary is never called.
    pub fn new(primary: Arc<dyn Fetcher>, primary_enabled: bool) -> Self {
        Self {
            primary,
            primary_enabled,
            secondary: None,
            state: Arc::new(BackoffState::new()),
        }
    }

    /// Browser or other fallback path.
    #[must_use]
    pub fn with_secondary(mut self, secondary: Arc<dyn Fetcher>) -> Self {
        self.secondary = Some(secondary);
        self
    }

    /// Count secondary fallbacks into shared counters.
    #[must_use]
    pub fn with_state(mut self, state: Arc<BackoffState>) -> Self {
        self.state = state;
        self
    }

    /// Build both paths from configuration, sharing `rotator` and `state`.
    pub fn from_config(
        config: &jobharvest_core::HarvestingConfiguration,
        rotator: Arc<IdentityRotator>,
        state: Arc<BackoffState>,
    ) -> crate::error::Result<Self> {
        let policy = RetryPolicy::from(&config.fetch);

        let http = crate::http::HttpSource::new(&config.fetch)?;
        let primary = RetryingFetcher::new(Arc::new(http), policy.clone())
            .with_rotator(Arc::clone(&rotator))
            .with_state(Arc::clone(&state));

        let mut layer = Self::new(Arc::new(primary), config.fetch.primary_enabled)
            .with_state(Arc::clone(&state));

        if config.fetch.browser_fallback {
            let browser = crate::browser_source::BrowserSource::new(&config.browser);
            let secondary = RetryingFetcher::new(Arc::new(browser), policy)
                .with_rotator(rotator)
                .with_state(state);
            layer = layer.with_secondary(Arc::new(secondary));
        }

        Ok(layer)
    }
}

#[async_trait]
impl Fetcher for FetchLayer {
    async fn fetch(&self, url: &str, identity: &Identity) -> Result<Page, FetchError> {
        if !self.primary_enabled {
            return match &self.secondary {
                Some(secondary) => secondary.fetch(url, identity).await,
                None => Err(FetchError::Malformed {
                    url: url.to_string(),
                    reason: "no fetch path enabled".to_string(),
                }),
            };
        }

        match (self.primary.fetch(url, identity).await, &self.secondary) {
            (Err(FetchError::Malformed { reason, .. }), Some(secondary)) => {
                self.state.secondary_fallbacks.fetch_add(1, Ordering::Relaxed);
                tracing::info!(url, reason = %reason, "Primary fetch malformed, using browser path");
                secondary.fetch(url, identity).await
            }
            (result, _) => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(status: u16, body: &str) -> Page {
        Page {
            status,
            ..Page::html("https://www.linkedin.com/jobs/search?keywords=rust", body)
        }
    }

    #[test]
    fn test_classify_body_clean_page() {
        assert!(classify_body(&page(200, "<html><body>jobs</body></html>")).is_none());
    }

    #[test]
    fn test_classify_body_authwall_redirect() {
        let mut p = page(200, "<html></html>");
        p.final_url = "https://www.linkedin.com/authwall?trk=abc".to_string();
        assert!(matches!(classify_body(&p), Some(FetchError::Blocked { .. })));
    }

    #[test]
    fn test_classify_body_captcha() {
        let p = page(200, r#"<html><div class="g-recaptcha"></div></html>"#);
        assert!(matches!(classify_body(&p), Some(FetchError::Blocked { .. })));
    }

    #[test]
    fn test_classify_body_non_html() {
        let mut p = page(200, "{}");
        p.content_type = Some("application/json".to_string());
        assert!(matches!(classify_body(&p), Some(FetchError::Malformed { .. })));
    }

    #[test]
    fn test_classify_body_truncated() {
        let p = page(200, "<html><body><div class=\"base-card\">");
        assert!(matches!(classify_body(&p), Some(FetchError::Malformed { .. })));
    }

    #[test]
    fn test_status_classification() {
        let url = "https://www.linkedin.com/jobs/view/1";
        assert!(matches!(
            classify(url, 1, Ok(page(403, ""))),
            Outcome::Fail(FetchError::Blocked { .. })
        ));
        assert!(matches!(
            classify(url, 1, Ok(page(999, ""))),
            Outcome::Fail(FetchError::Blocked { .. })
        ));
        assert!(matches!(
            classify(url, 1, Ok(page(410, ""))),
            Outcome::Fail(FetchError::NotFound { status: 410, .. })
        ));
        assert!(matches!(
            classify(url, 1, Ok(page(503, ""))),
            Outcome::Retry(FetchError::Transient { .. }, None)
        ));
        assert!(matches!(
            classify(url, 1, Ok(page(302, ""))),
            Outcome::Fail(FetchError::Malformed { .. })
        ));
        assert!(matches!(
            classify(url, 2, Err(AttemptError::Timeout)),
            Outcome::Retry(FetchError::Transient { attempts: 2, .. }, None)
        ));
    }

    #[test]
    fn test_retry_after_passed_through() {
        let mut p = page(429, "");
        p.retry_after = Some(Duration::from_secs(7));
        assert!(matches!(
            classify("https://x.test/", 1, Ok(p)),
            Outcome::Retry(_, Some(d)) if d == Duration::from_secs(7)
        ));
    }

    #[test]
    fn test_backoff_growth_and_cap() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_backoff: Duration::from_secs(2),
            multiplier: 2.0,
            max_backoff: Duration::from_secs(10),
        };
        assert_eq!(policy.backoff(1, None), Duration::from_secs(2));
        assert_eq!(policy.backoff(2, None), Duration::from_secs(4));
        assert_eq!(policy.backoff(3, None), Duration::from_secs(8));
        assert_eq!(policy.backoff(4, None), Duration::from_secs(10));
        assert_eq!(
            policy.backoff(1, Some(Duration::from_secs(3))),
            Duration::from_secs(5)
        );
        assert_eq!(
            policy.backoff(1, Some(Duration::from_secs(300))),
            Duration::from_secs(10)
        );
    }
}
