//! Secondary fetch path through a headless browser.
//!
//! Every attempt launches its own session and closes it before returning.
//! If the attempt future is dropped mid-flight the session's `Drop` kills
//! the browser, so no process outlives a cancelled run.

use crate::fetch::{AttemptError, Page, PageSource};
use async_trait::async_trait;
use jobharvest_browser::{BrowserActions, BrowserError, BrowserSession, BrowserSessionConfig, Identity};

/// Page source that renders through a fresh headless browser per attempt.
pub struct BrowserSource {
    session_config: BrowserSessionConfig,
    ready_selector: Option<String>,
}

impl BrowserSource {
    /// Source for the configured browser settings.
    #[must_use]
    pub fn new(config: &jobharvest_core::BrowserConfig) -> Self {
        Self {
            session_config: BrowserSessionConfig::from(config),
            ready_selector: config.ready_selector.clone(),
        }
    }

    async fn render(&self, session: &BrowserSession, url: &str) -> Result<(String, String), BrowserError> {
        session.navigate(url).await?;

        if let Some(selector) = &self.ready_selector {
            let timeout_ms =
                u64::try_from(self.session_config.navigation_timeout.as_millis()).unwrap_or(u64::MAX);
            // A missing anchor is left for body classification to judge.
            if let Err(e) = session.wait_for_selector(selector, timeout_ms).await {
                tracing::debug!(url, "Ready selector did not appear: {}", e);
            }
        }

        let body = session.content().await?;
        let final_url = session.current_url().await?;
        Ok((body, final_url))
    }
}

#[async_trait]
impl PageSource for BrowserSource {
    fn name(&self) -> &'static str {
        "browser"
    }

    async fn fetch_once(
        &self,
        url: &str,
        identity: &Identity,
    ) -> std::result::Result<Page, AttemptError> {
        let session = BrowserSession::launch(&self.session_config, identity)
            .await
            .map_err(|e| AttemptError::Browser(e.to_string()))?;

        let rendered = self.render(&session, url).await;

        if let Err(e) = session.close().await {
            tracing::warn!("Failed to close browser session: {}", e);
        }

        let (body, final_url) = rendered.map_err(|e| match e {
            BrowserError::Timeout(_) => AttemptError::Timeout,
            other => AttemptError::Browser(other.to_string()),
        })?;

        // The driver does not expose the HTTP status; a rendered page counts as 200.
        Ok(Page {
            final_url: if final_url.is_empty() {
                url.to_string()
            } else {
                final_url
            },
            ..Page::html(url, body)
        })
    }
}
