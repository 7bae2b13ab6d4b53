use anyhow::Result;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use snaplink::analytics::VisitRecorder;
use snaplink::api::{self, AppState, JsonRenderer};
use snaplink::auth::AuthService;
use snaplink::config::Config;
use snaplink::redirect::{self, RedirectState};
use snaplink::service::LinkService;
use snaplink::shortener::RandomCodeGenerator;
use snaplink::storage::{self, LinkStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(snaplink::DEFAULT_LOG_FILTER)),
        )
        .init();

    let config = Config::from_env()?;
    info!("Loaded configuration");

    info!(backend = ?config.database.backend, "Connecting to link store");
    let store = storage::connect(&config.database).await?;
    store.init().await?;
    info!("Link store initialized");

    let recorder = Arc::new(VisitRecorder::new(
        Arc::clone(&store),
        config.analytics.workers,
        config.analytics.buffer_size,
    ));
    let generator = Arc::new(RandomCodeGenerator::new(config.short_code.length));
    let service = Arc::new(
        LinkService::new(
            Arc::clone(&store),
            generator,
            Arc::clone(&recorder),
            config.short_code.max_attempts,
        )
        .with_owner_only_analytics(config.analytics.require_owner),
    );
    let auth = Arc::new(AuthService::new(&config.auth));

    if config.analytics.require_owner {
        info!("Analytics reads restricted to link owners");
    }

    let api_router = api::create_api_router(Arc::new(AppState {
        service: Arc::clone(&service),
        auth,
        renderer: Arc::new(JsonRenderer),
        redirect_base_url: config.redirect_base_url.clone(),
    }));
    let redirect_router = redirect::create_redirect_router(Arc::new(RedirectState {
        service,
        analytics_config: config.analytics.clone(),
    }));

    let api_addr = format!("{}:{}", config.api_server.host, config.api_server.port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr).await?;
    info!("API server listening on http://{}", api_addr);

    let redirect_addr = format!(
        "{}:{}",
        config.redirect_server.host, config.redirect_server.port
    );
    let redirect_listener = tokio::net::TcpListener::bind(&redirect_addr).await?;
    info!(
        "Redirect server listening on http://{} (short links as {}/<code>)",
        redirect_addr, config.redirect_base_url
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
        }
        let _ = shutdown_tx.send(true);
    });

    tokio::try_join!(
        axum::serve(
            api_listener,
            api_router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(wait_for_shutdown(shutdown_rx.clone()))
        .into_future(),
        axum::serve(
            redirect_listener,
            redirect_router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(wait_for_shutdown(shutdown_rx))
        .into_future(),
    )?;

    info!("Draining queued visits");
    recorder.shutdown().await;

    Ok(())
}

async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}
