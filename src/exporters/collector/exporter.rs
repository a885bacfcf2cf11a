// SPDX-License-Identifier: Apache-2.0

use std::io::Write;
use std::time::Duration;

use bytes::Bytes;
use flate2::Compression;
use flate2::write::GzEncoder;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Method, Request};
use http_body_util::Full;
use tokio::time::Instant;
use tower::{BoxError, ServiceExt};
use tracing::{info, warn};

use crate::exporters::collector::client::{CollectorService, build_service};
use crate::exporters::collector::error::ExportError;
use crate::exporters::collector::response::CollectorResponse;
use crate::receivers::gamelog::parser::Record;

const APP_ID_HEADER: &str = "appid";
const COMPRESS_HEADER: &str = "compress";

#[derive(Debug, Clone)]
pub struct CollectorExporterConfig {
    pub endpoint: String,
    pub app_id: String,
    /// Deadline for a single request
    pub timeout: Duration,
    /// Total tries per batch, including the first
    pub max_attempts: u32,
    /// Fixed delay between tries
    pub retry_backoff: Duration,
}

impl Default for CollectorExporterConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            app_id: String::new(),
            timeout: Duration::from_secs(3),
            max_attempts: 3,
            retry_backoff: Duration::from_secs(1),
        }
    }
}

impl CollectorExporterConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.endpoint.is_empty() {
            return Err("Collector endpoint must be specified".to_string());
        }
        if self.endpoint.parse::<http::Uri>().is_err() {
            return Err(format!("Invalid collector endpoint: {}", self.endpoint));
        }
        if self.app_id.is_empty() {
            return Err("Collector app id must be specified".to_string());
        }
        if HeaderValue::from_str(&self.app_id).is_err() {
            return Err("Collector app id is not a valid header value".to_string());
        }
        if self.max_attempts == 0 {
            return Err("Collector max attempts must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Ships parsed records to the analytics collector as gzip-compressed JSON
#[derive(Clone)]
pub struct CollectorExporter {
    config: CollectorExporterConfig,
    service: CollectorService,
}

impl CollectorExporter {
    /// Exporter over the hyper transport
    pub fn build(config: CollectorExporterConfig) -> Result<Self, BoxError> {
        config.validate()?;
        let service = build_service(&config.endpoint, config.timeout)?;
        Ok(Self::new(config, service))
    }

    pub fn new(config: CollectorExporterConfig, service: CollectorService) -> Self {
        Self { config, service }
    }

    pub fn config(&self) -> &CollectorExporterConfig {
        &self.config
    }

    /// POST `records` for `event`, retrying transport faults up to
    /// `max_attempts` tries in total. Collector codes are never retried.
    pub async fn export(&self, event: &str, records: &[Record]) -> Result<(), ExportError> {
        if records.is_empty() {
            return Ok(());
        }

        let body = encode_payload(records)?;
        let mut attempt = 1;
        loop {
            let start = Instant::now();
            match self.send(body.clone()).await {
                Ok(()) => {
                    info!(
                        event,
                        rows = records.len(),
                        compressed_bytes = body.len(),
                        duration = ?start.elapsed(),
                        attempt,
                        "Shipped records to collector"
                    );
                    return Ok(());
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) if attempt >= self.config.max_attempts => {
                    return Err(ExportError::RetriesExhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                Err(e) => {
                    warn!(
                        event,
                        attempt,
                        error = %e,
                        backoff = ?self.config.retry_backoff,
                        "Collector request failed, retrying"
                    );
                    tokio::time::sleep(self.config.retry_backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn send(&self, body: Bytes) -> Result<(), ExportError> {
        let request = Request::builder()
            .method(Method::POST)
            .uri(self.config.endpoint.as_str())
            .header(CONTENT_TYPE, "application/json")
            .header(APP_ID_HEADER, self.config.app_id.as_str())
            .header(COMPRESS_HEADER, "gzip")
            .body(Full::new(body))
            .map_err(|e| ExportError::Payload(e.to_string()))?;

        let response = self
            .service
            .clone()
            .oneshot(request)
            .await
            .map_err(ExportError::from_transport)?;

        if !response.status().is_success() {
            return Err(ExportError::Status(response.status()));
        }

        CollectorResponse::decode(response.body())?.into_result()
    }
}

/// JSON array of `records`, gzip-compressed
pub fn encode_payload(records: &[Record]) -> Result<Bytes, ExportError> {
    let json = serde_json::to_vec(records).map_err(|e| ExportError::Payload(e.to_string()))?;

    let mut encoder = GzEncoder::new(Vec::with_capacity(json.len() / 4), Compression::default());
    encoder
        .write_all(&json)
        .map_err(|e| ExportError::Payload(format!("gzip failed: {}", e)))?;
    let compressed = encoder
        .finish()
        .map_err(|e| ExportError::Payload(format!("gzip failed: {}", e)))?;

    Ok(Bytes::from(compressed))
}
