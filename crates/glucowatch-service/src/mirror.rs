//! HTTP remote mirror.
//!
//! Records live at `{base_url}/{collection}/{id}`. Reads are `GET` (404 means
//! no record), writes are `PATCH` with a JSON body of the fields to merge.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::debug;

use glucowatch_core::{Error, RemoteMirror, Result};

use crate::config::MirrorConfig;

/// Remote mirror reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpMirror {
    client: Client,
    base_url: String,
}

impl HttpMirror {
    /// Create a mirror client for `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::mirror(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Build a mirror from configuration, or `None` when no URL is set.
    pub fn from_config(config: &MirrorConfig) -> Result<Option<Self>> {
        config
            .url
            .as_deref()
            .map(|url| Self::new(url, Duration::from_secs(config.timeout_secs)))
            .transpose()
    }

    fn record_url(&self, collection: &str, id: &str) -> String {
        format!("{}/{}/{}", self.base_url, collection, id)
    }
}

#[async_trait]
impl RemoteMirror for HttpMirror {
    async fn read_record(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        let url = self.record_url(collection, id);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::mirror(e.to_string()))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let record = response
            .error_for_status()
            .map_err(|e| Error::mirror(e.to_string()))?
            .json::<Value>()
            .await
            .map_err(|e| Error::mirror(e.to_string()))?;
        Ok(Some(record))
    }

    async fn update_record(&self, collection: &str, id: &str, fields: Value) -> Result<()> {
        let url = self.record_url(collection, id);
        debug!("PATCH {}", url);

        self.client
            .patch(&url)
            .json(&fields)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| Error::mirror(e.to_string()))?;
        Ok(())
    }
}
