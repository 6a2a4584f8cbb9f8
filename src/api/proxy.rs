//! Image proxy downloads for exports.

use crate::error::{AuraError, Result};
use async_trait::async_trait;
use bytes::Bytes;

/// Source of original image bytes for an asset.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, user_id: &str, file_name: &str) -> Result<Bytes>;
}

/// Fetches originals through the vendor's image proxy:
/// `GET {base}/{user_id}/{file_name}`.
pub struct ProxyImageFetcher {
    http: reqwest::Client,
    base_url: String,
}

impl ProxyImageFetcher {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ImageFetcher for ProxyImageFetcher {
    async fn fetch(&self, user_id: &str, file_name: &str) -> Result<Bytes> {
        let url = format!("{}/{}/{}", self.base_url, user_id, file_name);
        let response = self.http.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuraError::from_status(
                status.as_u16(),
                format!("image proxy rejected {file_name}"),
            ));
        }
        Ok(response.bytes().await?)
    }
}
