use disco_extract::api::AppState;
use disco_extract::config::Config;
use disco_extract::server;
use disco_extract::warehouse::auth::Credentials;
use disco_extract::warehouse::bigquery::BigQueryClient;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "disco_extract=info,tower_http=info";

/// Interval between sweeps of idle rate-limit clients.
const RATE_LIMIT_CLEANUP_SECS: u64 = 60;

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let json = std::env::var("DISCO_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    // Load configuration
    let config_path = std::env::args().nth(1);
    let mut config = Config::load(config_path.as_deref().map(std::path::Path::new));

    if config.secret_key.is_empty() {
        config.secret_key = uuid::Uuid::new_v4().to_string();
        tracing::warn!(
            "No DISCO_SECRET_KEY set, using a random key. Open forms will expire on restart."
        );
    }

    let credentials = match Credentials::load(&config.credential_source()) {
        Ok(credentials) => credentials,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load BigQuery credentials");
            std::process::exit(1);
        }
    };

    let project_id = match config
        .project_id
        .clone()
        .or_else(|| credentials.project_id().map(String::from))
    {
        Some(project) => project,
        None => match credentials.metadata_project_id().await {
            Ok(project) => project,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    "No project configured; set DISCO_PROJECT_ID"
                );
                std::process::exit(1);
            }
        },
    };

    let credential_kind = credentials.kind();
    let mut client = BigQueryClient::new(credentials, project_id);
    if let Some(url) = &config.bigquery_api_url {
        client = client.with_base_url(url);
    }

    tracing::info!(
        host = %config.host,
        port = config.port,
        credentials = credential_kind,
        project = %client.project_id(),
        "Starting disco-extract"
    );

    let warehouse = Arc::new(client);
    let state = Arc::new(AppState::new(&config, warehouse));

    // Periodically drop idle rate-limit clients
    let rate_limits = state.rate_limits.clone();
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(RATE_LIMIT_CLEANUP_SECS));
        loop {
            interval.tick().await;
            rate_limits.cleanup();
            tracing::debug!(
                clients = rate_limits.tracked_clients(),
                "Rate limit clients swept"
            );
        }
    });

    let app = server::build_router(state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {addr}: {e}"));

    tracing::info!(addr = %addr, "Listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Server error");
}
