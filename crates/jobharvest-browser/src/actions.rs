use crate::error::Result;

/// Page-level operations the secondary fetch path needs from a browser.
#[async_trait::async_trait]
pub trait BrowserActions {
    /// Navigate to a URL and wait for the load to settle
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Wait for a selector to appear
    async fn wait_for_selector(&self, selector: &str, timeout_ms: u64) -> Result<()>;

    /// Rendered HTML of the current page
    async fn content(&self) -> Result<String>;

    /// URL after redirects
    async fn current_url(&self) -> Result<String>;
}
