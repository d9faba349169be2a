//! Downloading and merging the configured JWKS documents.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::FetchError;

use super::key::parse_key_set;
use super::store::Snapshot;

/// Fetches every configured JWKS URL and assembles a fresh snapshot.
pub(crate) struct JwksFetcher {
    client: reqwest::Client,
    urls: Vec<String>,
    timeout: Duration,
}

impl JwksFetcher {
    pub fn new(client: reqwest::Client, urls: Vec<String>, timeout: Duration) -> Self {
        Self {
            client,
            urls,
            timeout,
        }
    }

    /// Download all configured URLs and build a new snapshot.
    ///
    /// Any per-URL failure fails the whole refresh so a transient outage
    /// can never silently drop keys; the caller keeps the previous
    /// snapshot in place. Merging follows the configured URL order, later
    /// URLs overwriting earlier entries with the same kid.
    pub async fn fetch_all(&self, cancel: &CancellationToken) -> Result<Snapshot, FetchError> {
        let mut merged = Snapshot::new();
        for url in &self.urls {
            let body = self.fetch_one(url, cancel).await?;
            let entries = parse_key_set(&body).map_err(|source| FetchError::Decode {
                url: url.clone(),
                source,
            })?;
            debug!(url = %url, keys = entries.len(), "parsed JWK Set document");
            for entry in entries {
                merged.insert(entry.kid().to_owned(), Arc::new(entry));
            }
        }
        info!(
            keys = merged.len(),
            urls = self.urls.len(),
            "assembled JWK Set snapshot"
        );
        Ok(merged)
    }

    async fn fetch_one(&self, url: &str, cancel: &CancellationToken) -> Result<String, FetchError> {
        let send = self.client.get(url).timeout(self.timeout).send();
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            result = send => result.map_err(|source| FetchError::Http {
                url: url.to_owned(),
                source,
            })?,
        };
        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_owned(),
                status: response.status(),
            });
        }
        let body = tokio::select! {
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            result = response.text() => result.map_err(|source| FetchError::Http {
                url: url.to_owned(),
                source,
            })?,
        };
        Ok(body)
    }
}
