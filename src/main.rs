//! Killboard sync
//!
//! Keeps the local killboard store in step with upstream:
//! - entity sync workers, one queue per entity kind
//! - killmail ingestion fed by the RedisQ listener
//! - scheduled projection refreshes and reconciliation
//! - operational HTTP surface
//!
//! `killboard-sync publish <kind|all>` queues every ID of a kind and exits.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use api::{router, AppState, QueryService};
use cache::{CacheConfig, QueryCache};
use esi::{EsiApi, EsiClient, EsiConfig, KillmailFeed, RedisQClient, RedisQConfig};
use postgres_store::{PostgresConfig, PostgresStore};
use redpanda::{Producer, QueuePublisher, RedpandaConfig};
use sync_core::{EntityKind, Store};
use telemetry::{health, init_tracing_from_env, spawn_metrics_logger};
use worker::{
    retry_with_backoff, RedpandaConnector, Role, SyncProducer, WorkerConfig, WorkerDeps,
    WorkerScheduler,
};

const METRICS_LOG_INTERVAL: Duration = Duration::from_secs(60);

/// Application configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Config {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,

    #[serde(default)]
    redpanda: RedpandaConfig,

    #[serde(default)]
    postgres: PostgresConfig,

    #[serde(default)]
    esi: EsiConfig,

    #[serde(default)]
    redisq: RedisQConfig,

    #[serde(default)]
    cache: CacheConfig,

    #[serde(default)]
    worker: WorkerConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            redpanda: RedpandaConfig::default(),
            postgres: PostgresConfig::default(),
            esi: EsiConfig::default(),
            redisq: RedisQConfig::default(),
            cache: CacheConfig::default(),
            worker: WorkerConfig::default(),
        }
    }
}

/// What the process was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    /// Run the configured roles until shutdown.
    Run,
    /// Queue every ID of the given kinds, then exit.
    Publish(Vec<EntityKind>),
}

fn parse_command(args: &[String]) -> Result<Command> {
    match args {
        [] => Ok(Command::Run),
        [cmd, kind] if cmd == "publish" => {
            if kind == "all" {
                return Ok(Command::Publish(EntityKind::ALL.to_vec()));
            }
            let kind = kind
                .parse::<EntityKind>()
                .map_err(|e| anyhow!("{}", e))?;
            Ok(Command::Publish(vec![kind]))
        }
        _ => bail!("usage: killboard-sync [publish <kind|all>]"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // rustls 0.23+ requires explicit crypto provider selection
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    dotenvy::dotenv().ok();

    init_tracing_from_env();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = parse_command(&args)?;

    info!("Starting killboard sync v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;

    info!(
        brokers = ?config.redpanda.brokers,
        topic_prefix = %config.redpanda.topic_prefix,
        roles = ?config.worker.roles,
        "Loaded configuration"
    );

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);
    {
        let tx = shutdown_tx.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            let _ = tx.send(true);
        });
    }

    // Connect with backoff; the broker and database may still be starting.
    let producer = Arc::new(Producer::new(config.redpanda.clone()));
    retry_with_backoff(
        "redpanda",
        config.worker.startup_backoff(),
        &mut shutdown_rx,
        || producer.connect(),
    )
    .await
    .context("Failed to connect to Redpanda")?;

    let postgres = retry_with_backoff(
        "postgres",
        config.worker.startup_backoff(),
        &mut shutdown_rx,
        || PostgresStore::connect(config.postgres.clone()),
    )
    .await
    .context("Failed to connect to Postgres")?;
    let postgres = Arc::new(postgres);

    let esi_client = Arc::new(EsiClient::new(config.esi.clone()).context("Failed to create ESI client")?);

    check_health(&config, &postgres, &esi_client).await;

    let store: Arc<dyn Store> = postgres.clone();
    let publisher: Arc<dyn QueuePublisher> = producer.clone();
    let esi: Arc<dyn EsiApi> = esi_client.clone();
    let topic_prefix = config.redpanda.topic_prefix.clone();

    if let Command::Publish(kinds) = command {
        return publish(kinds, esi, store, publisher, &topic_prefix).await;
    }

    let _metrics_handle = spawn_metrics_logger(METRICS_LOG_INTERVAL);

    let feed: Option<Arc<dyn KillmailFeed>> = if config.worker.runs(Role::Feed) {
        let client = RedisQClient::new(&config.redisq).context("Failed to create RedisQ client")?;
        Some(Arc::new(client))
    } else {
        None
    };

    let deps = WorkerDeps {
        esi,
        store: store.clone(),
        publisher: publisher.clone(),
        connector: Arc::new(RedpandaConnector::new(producer.clone())),
        feed,
    };
    let scheduler = WorkerScheduler::new(config.worker.clone(), topic_prefix.clone(), deps);
    let handles = scheduler
        .start(shutdown_rx.clone())
        .await
        .context("Failed to start workers")?;

    if config.worker.runs(Role::Api) {
        let queries = QueryService::new(
            store.clone(),
            publisher.clone(),
            QueryCache::new(config.cache.clone()),
            topic_prefix.clone(),
        );
        let state = AppState::new(store, publisher, queries, topic_prefix);
        let app = router(state);

        let addr: SocketAddr = format!("{}:{}", config.host, config.port)
            .parse()
            .context("Invalid server address")?;

        info!("Listening on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .context("Failed to bind to address")?;

        let mut rx = shutdown_rx.clone();
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.wait_for(|stop| *stop).await;
            })
            .await;
        if let Err(e) = served {
            error!("Server error: {}", e);
        }
    } else {
        let _ = shutdown_rx.wait_for(|stop| *stop).await;
    }

    info!("Shutting down...");
    let _ = shutdown_tx.send(true);

    for handle in handles {
        if let Err(e) = handle.await {
            error!("Worker task failed: {}", e);
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Run the sync producer once for each kind.
async fn publish(
    kinds: Vec<EntityKind>,
    esi: Arc<dyn EsiApi>,
    store: Arc<dyn Store>,
    publisher: Arc<dyn QueuePublisher>,
    topic_prefix: &str,
) -> Result<()> {
    let producer = SyncProducer::new(esi, store, publisher, topic_prefix);
    let mut failed_kinds = 0;

    for kind in kinds {
        match producer.publish_all(kind).await {
            Ok(summary) => {
                info!(
                    kind = %kind,
                    requested = summary.requested,
                    published = summary.published,
                    failed = summary.failed,
                    "Publish finished"
                );
            }
            Err(e) => {
                failed_kinds += 1;
                error!(kind = %kind, error = %e, "Publish aborted");
            }
        }
    }

    if failed_kinds > 0 {
        bail!("{} kind(s) could not be enumerated", failed_kinds);
    }
    Ok(())
}

/// Load configuration from files and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        .add_source(config::Config::try_from(&Config::default())?)
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("KILLBOARD")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    // Nested parsing doesn't work reliably with underscored field names
    if let Ok(brokers) = std::env::var("KILLBOARD_REDPANDA_BROKERS") {
        config.redpanda.brokers = brokers.split(',').map(|s| s.trim().to_string()).collect();
    }
    if let Ok(username) = std::env::var("KILLBOARD_REDPANDA_SASL_USERNAME") {
        config.redpanda.sasl_username = Some(username);
    }
    if let Ok(password) = std::env::var("KILLBOARD_REDPANDA_SASL_PASSWORD") {
        config.redpanda.sasl_password = Some(password);
    }
    if let Ok(prefix) = std::env::var("KILLBOARD_REDPANDA_TOPIC_PREFIX") {
        config.redpanda.topic_prefix = prefix;
    }

    if let Ok(url) = std::env::var("KILLBOARD_POSTGRES_URL") {
        config.postgres.url = url;
    }

    if let Ok(user_agent) = std::env::var("KILLBOARD_ESI_USER_AGENT") {
        config.esi.user_agent = user_agent;
    }
    if let Ok(queue_id) = std::env::var("KILLBOARD_REDISQ_QUEUE_ID") {
        config.redisq.queue_id = queue_id;
    }

    if let Ok(roles) = std::env::var("KILLBOARD_ROLES") {
        config.worker.roles = roles
            .split(',')
            .filter(|r| !r.trim().is_empty())
            .map(|r| r.parse::<Role>().map_err(|e| anyhow!("{}", e)))
            .collect::<Result<Vec<_>>>()?;
    }

    Ok(config)
}

/// Check component health on startup.
async fn check_health(config: &Config, postgres: &PostgresStore, esi: &EsiClient) {
    if redpanda::health::check_connection(&config.redpanda).await {
        health().redpanda.set_healthy();
        info!("Redpanda connection: healthy");
    } else {
        health().redpanda.set_unhealthy("Connection failed");
        error!("Redpanda connection: unhealthy");
    }

    if postgres_store::health::check_connection(postgres).await {
        health().postgres.set_healthy();
        info!("Postgres connection: healthy");
    } else {
        health().postgres.set_unhealthy("Connection failed");
        error!("Postgres connection: unhealthy");
    }

    // Upstream outages are common and recover on their own.
    if esi.check_status().await {
        health().esi.set_healthy();
        info!("ESI status: healthy");
    } else {
        health().esi.set_unhealthy("Status check failed");
        warn!("ESI status: unhealthy");
    }
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
