use porter_access::{IdentityProvider, OidcProvider, ProviderRegistry};
use porter_server::{app, auth::AppState, config::ServerConfig, logging};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let config = ServerConfig::load().expect("failed to load configuration");
    logging::init(&config.log_level, config.log_format);
    tracing::info!(
        path = %config.path,
        cookie_name = %config.cookie_name,
        rules = config.rules.len(),
        "Loaded configuration"
    );

    if config.insecure_cookie {
        tracing::warn!("insecure_cookie is set; cookies will be sent over plain http");
    }

    tracing::info!("Discovering OIDC provider...");
    let provider = OidcProvider::new(config.providers.oidc.clone(), config.provider_timeout())
        .expect("failed to create OIDC provider");
    let providers: Vec<Box<dyn IdentityProvider>> = vec![Box::new(provider)];
    let providers = ProviderRegistry::setup(providers)
        .await
        .expect("failed to set up identity providers");

    let listen_addr = config.listen_addr.clone();
    let state = Arc::new(AppState::new(config, providers).expect("failed to build state"));
    let app = app::router(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .expect("failed to bind to address");

    tracing::info!("listening on http://{}", listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
