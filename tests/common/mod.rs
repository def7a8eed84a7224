//! Shared utilities for integration tests.

use std::sync::Arc;

use http_ingress::{Ingress, IngressConfig, SummaryProcessor};

/// Defaults bound to an ephemeral local port with a short grace period.
pub fn test_config() -> IngressConfig {
    let mut config = IngressConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.timeouts.shutdown_grace_secs = 1;
    config
}

/// Start an ingress answering every request with its JSON summary.
pub async fn start_ingress(config: IngressConfig) -> Ingress {
    http_ingress::start(&config, Arc::new(SummaryProcessor))
        .await
        .expect("ingress should start")
}

pub fn base_url(ingress: &Ingress) -> String {
    format!("http://{}", ingress.local_addr())
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .expect("client should build")
}
