//! Broker connection setup.

use rskafka::client::{Client, ClientBuilder, Credentials, SaslConfig};
use std::sync::Arc;
use sync_core::{Error, QueueErrorCode, Result};

use crate::config::RedpandaConfig;

/// Creates a TLS configuration for Redpanda Cloud.
fn create_tls_config() -> Arc<rustls::ClientConfig> {
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Arc::new(config)
}

/// Connect to the cluster, with TLS + SCRAM when credentials are set.
pub async fn connect(config: &RedpandaConfig) -> Result<Client> {
    let mut builder = ClientBuilder::new(config.brokers.clone());

    if let (Some(username), Some(password)) = (&config.sasl_username, &config.sasl_password) {
        builder = builder
            .tls_config(create_tls_config())
            .sasl_config(SaslConfig::ScramSha256(Credentials::new(
                username.clone(),
                password.clone(),
            )));
    }

    builder.build().await.map_err(|e| {
        Error::queue(
            QueueErrorCode::Unavailable,
            format!("failed to connect to Redpanda at {}: {}", config.broker_string(), e),
        )
    })
}
