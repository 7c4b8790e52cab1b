//! Ahead-of-time fetching of the next visual item

use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Warms whatever cache the renderer reads media through
#[async_trait]
pub trait Preloader: Send + Sync {
    async fn preload(&self, url: &str) -> Result<()>;
}

/// Preloader that does nothing (preloading disabled)
pub struct NoopPreloader;

#[async_trait]
impl Preloader for NoopPreloader {
    async fn preload(&self, _url: &str) -> Result<()> {
        Ok(())
    }
}

/// Fetches over HTTP into a small in-memory cache
///
/// Only the last few bodies are kept; the cache exists so the next
/// transition does not wait on the network, not to hold the playlist.
pub struct HttpPreloader {
    http_client: reqwest::Client,
    cache: Mutex<VecDeque<(String, Bytes)>>,
    capacity: usize,
}

impl HttpPreloader {
    pub fn new(capacity: usize) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http_client,
            cache: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        })
    }

    /// Cached body for `url`
    pub async fn cached(&self, url: &str) -> Option<Bytes> {
        self.cache
            .lock()
            .await
            .iter()
            .find(|(cached, _)| cached == url)
            .map(|(_, body)| body.clone())
    }
}

#[async_trait]
impl Preloader for HttpPreloader {
    async fn preload(&self, url: &str) -> Result<()> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            debug!("Not preloading non-HTTP url {}", url);
            return Ok(());
        }
        if self.cached(url).await.is_some() {
            return Ok(());
        }

        let response = self.http_client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(Error::Remote(format!(
                "Preload of {} returned {}",
                url,
                response.status()
            )));
        }
        let body = response.bytes().await?;
        debug!("Preloaded {} ({} bytes)", url, body.len());

        let mut cache = self.cache.lock().await;
        cache.push_back((url.to_string(), body));
        while cache.len() > self.capacity {
            cache.pop_front();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_relative_urls_are_skipped() {
        let preloader = HttpPreloader::new(2).unwrap();
        preloader.preload("/static/a.png").await.unwrap();
        assert!(preloader.cached("/static/a.png").await.is_none());
    }
}
