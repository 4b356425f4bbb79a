//! Scoped headless Chromium session.
//!
//! A session owns one browser process, its CDP event-handler task and a single
//! page. Closing it explicitly is preferred; dropping an unclosed session
//! kills the process and aborts the handler so nothing outlives its scope.

use crate::actions::BrowserActions;
use crate::error::{BrowserError, Result};
use crate::fingerprint::Identity;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures_util::stream::StreamExt;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Launch parameters for a [`BrowserSession`].
#[derive(Debug, Clone)]
pub struct BrowserSessionConfig {
    pub headless: bool,
    pub navigation_timeout: Duration,
}

impl Default for BrowserSessionConfig {
    fn default() -> Self {
        Self {
            headless: true,
            navigation_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&jobharvest_core::BrowserConfig> for BrowserSessionConfig {
    fn from(config: &jobharvest_core::BrowserConfig) -> Self {
        Self {
            headless: config.headless,
            navigation_timeout: Duration::from_secs(config.navigation_timeout_secs),
        }
    }
}

/// One browser process presenting a single identity.
pub struct BrowserSession {
    browser: Option<Browser>,
    page: Page,
    handler: JoinHandle<()>,
    navigation_timeout: Duration,
}

impl BrowserSession {
    /// Launch Chromium with the identity's user agent, language and viewport.
    pub async fn launch(config: &BrowserSessionConfig, identity: &Identity) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(identity.viewport.width, identity.viewport.height)
            .request_timeout(config.navigation_timeout)
            .arg(format!("--user-agent={}", identity.user_agent))
            .arg(format!(
                "--lang={}",
                identity
                    .accept_language
                    .split(',')
                    .next()
                    .unwrap_or("en-US")
            ))
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-blink-features=AutomationControlled");

        if !config.headless {
            builder = builder.with_head();
        }

        let browser_config = builder.build().map_err(BrowserError::ChromiumError)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;

        // Spawn browser handler
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler.abort();
                return Err(BrowserError::ChromiumError(e.to_string()));
            }
        };

        tracing::debug!(profile = %identity.profile_name, "Browser session launched");

        Ok(Self {
            browser: Some(browser),
            page,
            handler,
            navigation_timeout: config.navigation_timeout,
        })
    }

    /// Close the page and the browser process, waiting for it to exit.
    pub async fn close(mut self) -> Result<()> {
        let result = self.shutdown().await;
        self.handler.abort();
        result
    }

    async fn shutdown(&mut self) -> Result<()> {
        let Some(mut browser) = self.browser.take() else {
            return Ok(());
        };
        if let Err(e) = self.page.clone().close().await {
            tracing::debug!("Failed to close page: {}", e);
        }
        browser
            .close()
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;
        browser
            .wait()
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;
        tracing::debug!("Browser session closed");
        Ok(())
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.handler.abort();
        if let Some(mut browser) = self.browser.take() {
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    runtime.spawn(async move {
                        if let Some(Err(e)) = browser.kill().await {
                            tracing::warn!("Failed to kill unclosed browser: {}", e);
                        }
                    });
                }
                // Browser's own Drop kills the child process.
                Err(_) => drop(browser),
            }
        }
    }
}

#[async_trait::async_trait]
impl BrowserActions for BrowserSession {
    async fn navigate(&self, url: &str) -> Result<()> {
        match tokio::time::timeout(self.navigation_timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => {
                let _ = self.page.wait_for_navigation().await;
                Ok(())
            }
            Ok(Err(e)) => Err(BrowserError::NavigationError(e.to_string())),
            Err(_) => Err(BrowserError::Timeout(format!(
                "navigation to {url} after {:?}",
                self.navigation_timeout
            ))),
        }
    }

    async fn wait_for_selector(&self, selector: &str, timeout_ms: u64) -> Result<()> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::SelectorNotFound(selector.to_string()));
            }
            tokio::time::sleep(SELECTOR_POLL_INTERVAL).await;
        }
    }

    async fn content(&self) -> Result<String> {
        self.page
            .content()
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))
    }

    async fn current_url(&self) -> Result<String> {
        let url = self
            .page
            .url()
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?
            .map(|u| u.to_string())
            .unwrap_or_default();
        Ok(url)
    }
}
