// HTTP thumbnail probe
//
// A tier "exists" when the host answers 2xx with a body that does not start
// with a known placeholder prefix (the host serves a grey image for missing
// tiers instead of a 404).

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::downloader::config::DownloaderConfig;
use crate::downloader::errors::FetchError;
use crate::downloader::traits::ThumbnailProbe;

pub struct HttpThumbnailProbe {
    client: reqwest::Client,
    config: Arc<DownloaderConfig>,
}

impl HttpThumbnailProbe {
    pub fn new(config: Arc<DownloaderConfig>) -> Self {
        let builder = reqwest::Client::builder().timeout(config.probe_timeout());
        let builder = match config.proxy.as_deref().map(reqwest::Proxy::all) {
            Some(Ok(proxy)) => builder.proxy(proxy),
            Some(Err(e)) => {
                tracing::warn!("[Thumbnails] Invalid proxy URL, using direct connection: {}", e);
                builder
            }
            None => builder,
        };
        let client = builder.build().unwrap_or_else(|e| {
            tracing::warn!("[Thumbnails] Failed to build HTTP client: {}", e);
            reqwest::Client::new()
        });
        Self { client, config }
    }

    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        if !response.status().is_success() {
            return Err(FetchError::Network(format!("HTTP {} for {}", response.status(), url)));
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        Ok(body.to_vec())
    }
}

/// Whether `body` starts like one of the host's placeholder images
pub fn is_placeholder(body: &[u8], prefixes: &[Vec<u8>]) -> bool {
    body.is_empty()
        || prefixes
            .iter()
            .any(|p| !p.is_empty() && body.starts_with(p))
}

#[async_trait]
impl ThumbnailProbe for HttpThumbnailProbe {
    async fn exists(&self, url: &str) -> bool {
        match self.get(url).await {
            Ok(body) => !is_placeholder(&body, &self.config.placeholder_prefixes),
            Err(e) => {
                tracing::debug!("[Thumbnails] {} unavailable: {}", url, e);
                false
            }
        }
    }

    async fn fetch(&self, url: &str, destination: &Path) -> Result<(), FetchError> {
        let body = self.get(url).await?;
        tokio::fs::write(destination, &body)
            .await
            .map_err(|e| FetchError::disk(destination, e))?;
        tracing::info!("[Thumbnails] Saved {} ({} bytes)", destination.display(), body.len());
        Ok(())
    }
}
