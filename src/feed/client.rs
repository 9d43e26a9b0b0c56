//! HTTP access to the traffic feed.
//!
//! Direct access is attempted first; on failure the configured relay
//! routes are tried once each, starting from the index that last
//! succeeded. Sticky relay affinity avoids re-probing dead relays on
//! every call.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};

use crate::error::{AppError, Result};
use crate::models::FeedConfig;

use super::{EndpointKind, FeedSource};

/// Client for the traffic feed with relay fallback.
pub struct FeedClient {
    client: Client,
    base_url: String,
    relays: Vec<String>,
    last_good_relay: AtomicUsize,
}

impl FeedClient {
    /// Create a new feed client from configuration.
    pub fn new(config: &FeedConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            relays: config.relays.clone(),
            last_good_relay: AtomicUsize::new(0),
        })
    }

    fn endpoint_url(&self, endpoint: EndpointKind) -> String {
        format!("{}{}", self.base_url, endpoint.path())
    }

    async fn fetch_direct(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .header(header::ACCEPT, "application/xml, text/xml, */*")
            .header(header::CACHE_CONTROL, "no-cache")
            .send()
            .await?
            .error_for_status()?;
        Ok(response.text().await?)
    }

    async fn fetch_via_relay(&self, relay: &str, url: &str) -> Result<String> {
        let relayed = format!("{}{}", relay, urlencoding::encode(url));
        let response = self
            .client
            .get(&relayed)
            .header(header::ACCEPT, "application/xml, text/xml, */*")
            .send()
            .await?
            .error_for_status()?;
        Ok(response.text().await?)
    }

    #[cfg(test)]
    fn sticky_relay(&self) -> usize {
        self.last_good_relay.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl FeedSource for FeedClient {
    async fn fetch(&self, endpoint: EndpointKind) -> Result<String> {
        let url = self.endpoint_url(endpoint);

        let mut last_error = match self.fetch_direct(&url).await {
            Ok(text) => {
                log::debug!("Fetched {} directly", endpoint);
                return Ok(text);
            }
            Err(error) => {
                log::warn!("Direct fetch failed for {}: {}", endpoint, error);
                error
            }
        };

        let start = self.last_good_relay.load(Ordering::Relaxed);
        for offset in 0..self.relays.len() {
            let index = (start + offset) % self.relays.len();
            match self.fetch_via_relay(&self.relays[index], &url).await {
                Ok(text) => {
                    self.last_good_relay.store(index, Ordering::Relaxed);
                    log::debug!("Fetched {} via relay {}", endpoint, index + 1);
                    return Ok(text);
                }
                Err(error) => {
                    log::warn!("Relay {} failed for {}: {}", index + 1, endpoint, error);
                    last_error = error;
                }
            }
        }

        Err(AppError::fetch(endpoint.path(), last_error))
    }
}
