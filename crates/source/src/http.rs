//! HTTP client for an upstream telemetry service.
//!
//! The upstream speaks plain JSON over HTTP:
//!
//! | Request | Response |
//! |---|---|
//! | `GET blocks/latest` | `BlockInfo` |
//! | `GET blocks?from=&limit=` | `[BlockSummary]` |
//! | `GET transfers?limit=&anchor=&offset=` | `{ items: [EthTransfer], next }` |
//! | `GET timeseries/{KEY}?scale=&from=&to=&anchor=&offset=` | `{ items: [TimeseriesPoint], next }` |
//!
//! where `next` is `{ anchor, offset }` or `null`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};
use url::Url;

use pulse_core::error::{SourceError, SourceResult};
use pulse_core::models::{BlockInfo, BlockSummary, EthTransfer, MetricKey, TimeseriesPoint};
use pulse_core::ports::{Page, PageCursor, TelemetrySource, TimeseriesQuery};

/// Configuration for the HTTP source.
#[derive(Debug, Clone)]
pub struct HttpSourceConfig {
    /// Base URL of the upstream service (e.g., "http://indexer:8080/api/").
    pub base_url: Url,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Largest block range requested in one call.
    pub max_range: u32,
}

impl HttpSourceConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            timeout: Duration::from_secs(10),
            max_range: 5_000,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireCursor {
    anchor: u64,
    offset: u64,
}

#[derive(Debug, Deserialize)]
struct WirePage<T> {
    items: Vec<T>,
    next: Option<WireCursor>,
}

impl<T> From<WirePage<T>> for Page<T> {
    fn from(page: WirePage<T>) -> Self {
        Page::new(
            page.items,
            page.next.map(|c| PageCursor::new(c.anchor, c.offset)),
        )
    }
}

/// Upstream adapter implementing the [`TelemetrySource`] port.
pub struct HttpSource {
    client: Client,
    config: HttpSourceConfig,
    high_water: AtomicU64,
}

impl HttpSource {
    /// Build a client for `config.base_url`. Does not contact the upstream.
    pub fn new(mut config: HttpSourceConfig) -> SourceResult<Self> {
        // `Url::join` replaces the last segment unless the base ends with '/'.
        if !config.base_url.path().ends_with('/') {
            let path = format!("{}/", config.base_url.path());
            config.base_url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SourceError::UpstreamUnavailable(e.to_string()))?;

        Ok(Self {
            client,
            config,
            high_water: AtomicU64::new(0),
        })
    }

    fn endpoint(&self, path: &str) -> SourceResult<Url> {
        self.config
            .base_url
            .join(path)
            .map_err(|e| SourceError::InvalidResponse(format!("bad endpoint {}: {}", path, e)))
    }

    /// Send `request` and decode a JSON body.
    ///
    /// `on_client_error` maps a 4xx status to a domain error.
    async fn fetch<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        on_client_error: impl FnOnce(StatusCode) -> SourceError,
    ) -> SourceResult<T> {
        let response = request.send().await.map_err(|e| {
            warn!(error = %e, "⚠️  Upstream request failed");
            SourceError::UpstreamUnavailable(e.to_string())
        })?;

        let status = response.status();
        if status.is_server_error() {
            return Err(SourceError::UpstreamUnavailable(format!(
                "upstream returned {}",
                status
            )));
        }
        if status.is_client_error() {
            return Err(on_client_error(status));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| SourceError::InvalidResponse(e.to_string()))
    }
}

fn unexpected(status: StatusCode) -> SourceError {
    SourceError::InvalidResponse(format!("upstream returned {}", status))
}

fn cursor_params(cursor: Option<PageCursor>) -> Vec<(&'static str, String)> {
    cursor
        .map(|c| vec![("anchor", c.anchor.to_string()), ("offset", c.offset.to_string())])
        .unwrap_or_default()
}

#[async_trait]
impl TelemetrySource for HttpSource {
    #[instrument(skip(self))]
    async fn latest_block_info(&self) -> SourceResult<BlockInfo> {
        let url = self.endpoint("blocks/latest")?;
        let mut info: BlockInfo = self.fetch(self.client.get(url), unexpected).await?;

        // A lagging replica must not make the head go backwards.
        let previous = self.high_water.fetch_max(info.number, Ordering::SeqCst);
        if info.number < previous {
            debug!(upstream = info.number, reported = previous, "Stale upstream head");
            info.number = previous;
        }
        Ok(info)
    }

    #[instrument(skip(self))]
    async fn blocks_by_range(&self, from_block: u64, limit: u32) -> SourceResult<Vec<BlockSummary>> {
        if limit == 0 || limit > self.config.max_range {
            return Err(SourceError::InvalidRange(format!(
                "limit must be between 1 and {}",
                self.config.max_range
            )));
        }

        let url = self.endpoint("blocks")?;
        let request = self
            .client
            .get(url)
            .query(&[("from", from_block.to_string()), ("limit", limit.to_string())]);

        let blocks: Vec<BlockSummary> = self
            .fetch(request, |status| match status {
                StatusCode::BAD_REQUEST => {
                    SourceError::InvalidRange(format!("upstream rejected range from {}", from_block))
                }
                other => unexpected(other),
            })
            .await?;

        // No silent truncation.
        if blocks.len() != limit as usize {
            return Err(SourceError::InvalidResponse(format!(
                "expected {} blocks, upstream returned {}",
                limit,
                blocks.len()
            )));
        }
        // Nor gaps, duplicates or reordering.
        for (i, block) in blocks.iter().enumerate() {
            let expected = from_block.checked_add(i as u64);
            if expected != Some(block.number) {
                return Err(SourceError::InvalidResponse(format!(
                    "block {} of the range from {} has height {}",
                    i, from_block, block.number
                )));
            }
        }
        Ok(blocks)
    }

    #[instrument(skip(self))]
    async fn transfers(
        &self,
        limit: u32,
        cursor: Option<PageCursor>,
    ) -> SourceResult<Page<EthTransfer>> {
        let url = self.endpoint("transfers")?;
        let request = self
            .client
            .get(url)
            .query(&[("limit", limit.to_string())])
            .query(&cursor_params(cursor));

        let page: WirePage<EthTransfer> = self
            .fetch(request, |status| match status {
                StatusCode::BAD_REQUEST if cursor.is_some() => {
                    SourceError::InvalidCursor("upstream rejected the cursor".into())
                }
                other => unexpected(other),
            })
            .await?;
        Ok(page.into())
    }

    #[instrument(skip(self))]
    async fn timeseries(
        &self,
        key: MetricKey,
        query: TimeseriesQuery,
    ) -> SourceResult<Page<TimeseriesPoint>> {
        let url = self.endpoint(&format!("timeseries/{}", key))?;

        let mut params = vec![("scale", query.scale.as_str().to_string())];
        if let Some(from_t) = query.from_t {
            params.push(("from", from_t.to_string()));
        }
        if let Some(to_t) = query.to_t {
            params.push(("to", to_t.to_string()));
        }
        params.extend(cursor_params(query.cursor));

        let page: WirePage<TimeseriesPoint> = self
            .fetch(self.client.get(url).query(&params), |status| match status {
                StatusCode::NOT_FOUND => SourceError::UnknownMetric(key.to_string()),
                other => unexpected(other),
            })
            .await?;
        Ok(page.into())
    }
}
