use std::sync::Arc;

use anyhow::Context;

use stratus_gateway::app::{build_app, services::build_services};
use stratus_gateway::auth::AuthService;
use stratus_gateway::backoff::Backoff;
use stratus_gateway::bootstrap::bootstrap_admin;
use stratus_gateway::config::{self, GatewayConfig};
use stratus_gateway::oidc::HttpOidcProvider;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logging first, so configuration warnings are not lost.
    let log_format = std::env::var(config::LOG_FORMAT)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or_default();
    stratus_observability::init(log_format);
    let config = GatewayConfig::from_env().context("invalid gateway configuration")?;

    let http = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()
        .context("failed to build http client")?;
    let provider = Backoff::new(
        config.oidc.discovery_initial_delay,
        config.oidc.discovery_retries,
    )
    .retry("oidc discovery", || {
        HttpOidcProvider::discover(http.clone(), config.oidc.clone())
    })
    .await
    .context("identity provider discovery failed")?;

    let auth = AuthService::new(
        Arc::new(provider),
        &config.keys,
        &config.issuer,
        config.api_token_validity,
        config.kubernetes_token_validity,
    )
    .context("failed to load signing keys")?;
    let services = Arc::new(build_services(Arc::new(auth), config.component.clone()));

    match &config.bootstrap_admin_email {
        Some(email) => {
            bootstrap_admin(&services, email)
                .await
                .context("failed to bootstrap admin")?;
        }
        None => tracing::warn!("no bootstrap admin configured; nobody can manage users"),
    }

    let app = build_app(services);
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;

    tracing::info!(
        addr = %listener.local_addr()?,
        issuer = %config.issuer,
        component = %config.component.name,
        version = %config.component.version,
        "listening"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
