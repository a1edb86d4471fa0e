use std::sync::{Arc, Mutex};

use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use vitalink_service::{
    DefaultAppState, config::Config, create_app, db, fetch::ReqwestFetcher,
};

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("vitalink_service=debug,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::from_env().unwrap_or_else(|err| {
        error!(error = %err, "Invalid configuration");
        std::process::exit(1);
    });

    let connection = db::establish_connection(&config.database_url).unwrap_or_else(|err| {
        error!(database_url = %config.database_url, error = %err, "Failed to open database");
        std::process::exit(1);
    });
    info!(database_url = %config.database_url, "Connected to database");

    if let Err(err) = tokio::fs::create_dir_all(&config.assets_dir).await {
        warn!(dir = %config.assets_dir.display(), error = %err, "Could not create image directory");
    }

    let fetcher = ReqwestFetcher::new(config.http_timeout).unwrap_or_else(|err| {
        error!(error = %err, "Failed to build HTTP client");
        std::process::exit(1);
    });

    let app_state = DefaultAppState::new(
        Arc::new(Mutex::new(connection)),
        Arc::new(fetcher),
        &config,
    );

    let app = create_app(app_state, &config).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(TimeoutLayer::new(config.request_timeout)),
    );

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .unwrap_or_else(|err| {
            error!(bind_address = %config.bind_address, error = %err, "Failed to bind to address");
            std::process::exit(1);
        });

    info!(bind_address = %config.bind_address, "Server running");

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());

    if let Err(err) = server.await {
        error!(error = %err, "Server error");
        std::process::exit(1);
    }

    info!("Server stopped");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining in-flight requests");
}
