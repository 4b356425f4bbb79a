//! Primary fetch path over plain HTTP.

use crate::error::Result;
use crate::fetch::{AttemptError, Page, PageSource};
use async_trait::async_trait;
use jobharvest_browser::Identity;
use jobharvest_core::FetchConfig;
use reqwest::header::{CONTENT_TYPE, RETRY_AFTER, USER_AGENT};
use std::time::Duration;

/// Single-attempt HTTP source presenting the identity's headers.
pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    /// Build the client with the configured timeouts.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.timeout_secs.min(10)))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        Ok(Self { client })
    }
}

fn attempt_error(e: &reqwest::Error) -> AttemptError {
    if e.is_timeout() {
        AttemptError::Timeout
    } else {
        AttemptError::Connection(e.to_string())
    }
}

#[async_trait]
impl PageSource for HttpSource {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn fetch_once(
        &self,
        url: &str,
        identity: &Identity,
    ) -> std::result::Result<Page, AttemptError> {
        let mut request = self.client.get(url).header(USER_AGENT, &identity.user_agent);
        for (name, value) in &identity.headers {
            // reqwest negotiates and decodes compression itself
            if name.eq_ignore_ascii_case("accept-encoding") {
                continue;
            }
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(|e| attempt_error(&e))?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);

        let body = response.text().await.map_err(|e| attempt_error(&e))?;

        Ok(Page {
            url: url.to_string(),
            final_url,
            status,
            content_type,
            body,
            retry_after,
        })
    }
}
