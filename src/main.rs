use std::sync::Arc;

use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use storefront_api as api;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(&cfg.log_level, cfg.log_json);

    let db = api::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db = Arc::new(db);

    let (event_sender, event_rx) = api::events::channel(1024);
    tokio::spawn(api::events::process_events(event_rx));

    // Gateway selection is a deployment concern; the mock stands in until a
    // real PSP integration is wired up.
    let gateway: Arc<dyn api::gateway::PaymentGateway> =
        Arc::new(api::gateway::MockGateway::succeeding());

    let services = api::AppServices::new(db.clone(), event_sender.clone(), gateway);

    let state = api::AppState {
        db,
        config: cfg.clone(),
        event_sender,
        services,
    };

    let app = api::handlers::routes(state).layer(TraceLayer::new_for_http());

    let addr = cfg.server_addr();
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
