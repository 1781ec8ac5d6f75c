//! zKillboard RedisQ feed.
//!
//! `listen.php` long-polls for up to `ttw` seconds and returns either
//! `{"package": null}` (nothing new) or one package naming a killmail id
//! and hash.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use sync_core::{source, Error, KillmailRef, Result, UpstreamErrorCode};
use tracing::debug;
use url::Url;

use crate::config::RedisQConfig;

/// A source of killmail references.
#[async_trait]
pub trait KillmailFeed: Send + Sync {
    /// Wait for the next reference. `None` is a normal idle poll.
    async fn next(&self) -> Result<Option<KillmailRef>>;
}

#[derive(Debug, Deserialize)]
struct Envelope {
    package: Option<Package>,
}

#[derive(Debug, Deserialize)]
struct Package {
    #[serde(rename = "killID")]
    kill_id: i64,
    zkb: Zkb,
}

#[derive(Debug, Deserialize)]
struct Zkb {
    hash: String,
}

/// Parse one RedisQ response body.
pub fn parse_package(body: &[u8]) -> Result<Option<KillmailRef>> {
    let envelope: Envelope = serde_json::from_slice(body).map_err(|e| {
        Error::upstream(
            UpstreamErrorCode::Decode,
            format!("unexpected RedisQ body: {}", e),
            None,
        )
    })?;
    Ok(envelope
        .package
        .map(|p| KillmailRef::new(p.kill_id, p.zkb.hash, source::REDISQ)))
}

pub struct RedisQClient {
    http: reqwest::Client,
    url: Url,
}

impl RedisQClient {
    pub fn new(config: &RedisQConfig) -> Result<Self> {
        let mut url = Url::parse(&config.url)
            .map_err(|e| Error::config(format!("invalid RedisQ url {}: {}", config.url, e)))?;
        url.query_pairs_mut()
            .append_pair("queueID", &config.queue_id)
            .append_pair("ttw", &config.ttw.to_string());

        // Leave headroom past the server-side wait.
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.ttw + 10))
            .build()
            .map_err(|e| Error::config(format!("failed to build RedisQ client: {}", e)))?;

        Ok(Self { http, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl KillmailFeed for RedisQClient {
    async fn next(&self) -> Result<Option<KillmailRef>> {
        let response = self.http.get(self.url.clone()).send().await.map_err(|e| {
            Error::upstream(
                UpstreamErrorCode::Transport,
                format!("RedisQ poll failed: {}", e),
                None,
            )
        })?;

        let status = response.status();
        if !status.is_success() {
            let code = if status.as_u16() == 429 {
                UpstreamErrorCode::RateLimited
            } else {
                UpstreamErrorCode::Server
            };
            return Err(Error::upstream(
                code,
                format!("RedisQ returned {}", status),
                Some(status.as_u16()),
            ));
        }

        let body = response.bytes().await.map_err(|e| {
            Error::upstream(
                UpstreamErrorCode::Transport,
                format!("reading RedisQ body failed: {}", e),
                None,
            )
        })?;

        let next = parse_package(&body)?;
        if let Some(ref r) = next {
            debug!(killmail_id = r.killmail_id, "RedisQ package received");
        }
        Ok(next)
    }
}
