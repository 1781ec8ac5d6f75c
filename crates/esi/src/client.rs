//! ESI HTTP client.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use sync_core::{EntityKind, EntityRecord, Error, Killmail, Result, UpstreamErrorCode};
use telemetry::{health, metrics};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::EsiConfig;
use crate::dto::{entity_from_json, killmail_from_json};
use crate::limiter::RateLimiter;

/// Upstream operations the pipeline needs.
///
/// `fetch_*` failures carry an upstream error code: `ESI_001` (not found)
/// is terminal, every other code is retryable.
#[async_trait]
pub trait EsiApi: Send + Sync {
    /// Every id of a listable kind. Dependent kinds are not listable upstream.
    async fn list_ids(&self, kind: EntityKind) -> Result<Vec<i64>>;

    async fn fetch_entity(&self, kind: EntityKind, id: i64) -> Result<EntityRecord>;

    async fn fetch_killmail(&self, killmail_id: i64, hash: &str) -> Result<Killmail>;
}

/// List endpoint for a kind, if ESI has one.
pub fn list_path(kind: EntityKind) -> Option<&'static str> {
    match kind {
        EntityKind::Category => Some("/universe/categories/"),
        EntityKind::Group => Some("/universe/groups/"),
        EntityKind::Type => Some("/universe/types/"),
        EntityKind::Region => Some("/universe/regions/"),
        EntityKind::Constellation => Some("/universe/constellations/"),
        EntityKind::SolarSystem => Some("/universe/systems/"),
        EntityKind::Alliance => Some("/alliances/"),
        EntityKind::Corporation | EntityKind::Character => None,
    }
}

pub fn entity_path(kind: EntityKind, id: i64) -> String {
    let collection = match kind {
        EntityKind::Category => "universe/categories",
        EntityKind::Group => "universe/groups",
        EntityKind::Type => "universe/types",
        EntityKind::Region => "universe/regions",
        EntityKind::Constellation => "universe/constellations",
        EntityKind::SolarSystem => "universe/systems",
        EntityKind::Alliance => "alliances",
        EntityKind::Corporation => "corporations",
        EntityKind::Character => "characters",
    };
    format!("/{}/{}/", collection, id)
}

/// A successful response body plus the paging header.
struct Page {
    body: Vec<u8>,
    pages: u32,
}

/// Rate-limited ESI client.
#[derive(Clone)]
pub struct EsiClient {
    config: EsiConfig,
    http: reqwest::Client,
    limiter: Arc<RateLimiter>,
}

impl EsiClient {
    pub fn new(config: EsiConfig) -> Result<Self> {
        let limiter = Arc::new(RateLimiter::new(config.limiter()));
        Self::with_limiter(config, limiter)
    }

    /// Share a limiter with other clients hitting the same upstream.
    pub fn with_limiter(config: EsiConfig, limiter: Arc<RateLimiter>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::config(format!("failed to build ESI client: {}", e)))?;

        Ok(Self {
            config,
            http,
            limiter,
        })
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    fn url(&self, path: &str, page: Option<u32>) -> String {
        let mut url = format!(
            "{}{}?datasource={}",
            self.config.base_url.trim_end_matches('/'),
            path,
            self.config.datasource
        );
        if let Some(page) = page {
            url.push_str(&format!("&page={}", page));
        }
        url
    }

    async fn get(&self, path: &str, page: Option<u32>) -> Result<Page> {
        let url = self.url(path, page);
        self.limiter.execute(|| self.send(url)).await
    }

    async fn send(&self, url: String) -> Result<Page> {
        metrics().upstream_requests.inc();
        let start = std::time::Instant::now();

        let response = self.http.get(&url).send().await.map_err(|e| {
            metrics().upstream_errors.inc();
            Error::upstream(
                UpstreamErrorCode::Transport,
                format!("GET {} failed: {}", url, e),
                None,
            )
        })?;

        self.observe_error_limit(response.headers());

        let status = response.status();
        metrics()
            .upstream_latency_ms
            .observe(start.elapsed().as_millis() as u64);

        if status == reqwest::StatusCode::NOT_FOUND {
            metrics().upstream_not_found.inc();
            return Err(Error::not_found(format!("GET {} returned 404", url)));
        }

        if !status.is_success() {
            metrics().upstream_errors.inc();
            let code = match status.as_u16() {
                420 | 429 => UpstreamErrorCode::RateLimited,
                _ => UpstreamErrorCode::Server,
            };
            let body = response.text().await.unwrap_or_default();
            warn!(url = %url, status = %status, body = %body, "ESI returned error");
            return Err(Error::upstream(
                code,
                format!("GET {} returned {}", url, status),
                Some(status.as_u16()),
            ));
        }

        let pages = header_value::<u32>(response.headers(), "x-pages").unwrap_or(1);
        let body = response.bytes().await.map_err(|e| {
            metrics().upstream_errors.inc();
            Error::upstream(
                UpstreamErrorCode::Transport,
                format!("reading {} failed: {}", url, e),
                Some(status.as_u16()),
            )
        })?;

        health().esi.set_healthy();
        Ok(Page {
            body: body.to_vec(),
            pages,
        })
    }

    /// Pause the limiter when the shared error budget is nearly spent.
    fn observe_error_limit(&self, headers: &reqwest::header::HeaderMap) {
        let remain = header_value::<i64>(headers, "x-esi-error-limit-remain");
        let reset = header_value::<u64>(headers, "x-esi-error-limit-reset");
        if let (Some(remain), Some(reset)) = (remain, reset) {
            if remain < self.config.error_limit_floor {
                health()
                    .esi
                    .set_unhealthy(format!("error limit at {}, reset in {}s", remain, reset));
                self.limiter
                    .pause_until(Instant::now() + Duration::from_secs(reset));
            }
        }
    }

    /// Check `/status/`.
    pub async fn check_status(&self) -> bool {
        match self.get("/status/", None).await {
            Ok(_) => true,
            Err(e) => {
                health().esi.set_unhealthy(e.to_string());
                false
            }
        }
    }
}

fn header_value<T: std::str::FromStr>(headers: &reqwest::header::HeaderMap, name: &str) -> Option<T> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

#[async_trait]
impl EsiApi for EsiClient {
    async fn list_ids(&self, kind: EntityKind) -> Result<Vec<i64>> {
        let path = list_path(kind).ok_or_else(|| {
            Error::config(format!("{} ids are enumerated from local killmails", kind))
        })?;

        let first = self.get(path, Some(1)).await?;
        let mut ids: Vec<i64> = parse_ids(kind, &first.body)?;
        for page in 2..=first.pages {
            let next = self.get(path, Some(page)).await?;
            ids.extend(parse_ids(kind, &next.body)?);
        }

        debug!(kind = %kind, count = ids.len(), pages = first.pages, "Listed upstream ids");
        Ok(ids)
    }

    async fn fetch_entity(&self, kind: EntityKind, id: i64) -> Result<EntityRecord> {
        let page = self.get(&entity_path(kind, id), None).await?;
        entity_from_json(kind, id, &page.body)
    }

    async fn fetch_killmail(&self, killmail_id: i64, hash: &str) -> Result<Killmail> {
        let path = format!("/killmails/{}/{}/", killmail_id, hash);
        let page = self.get(&path, None).await?;
        killmail_from_json(killmail_id, hash, &page.body)
    }
}

fn parse_ids(kind: EntityKind, body: &[u8]) -> Result<Vec<i64>> {
    serde_json::from_slice(body).map_err(|e| {
        Error::upstream(
            UpstreamErrorCode::Decode,
            format!("{} id list: {}", kind, e),
            None,
        )
    })
}
