use std::sync::Arc;

use forgeerp_gateway::config::GatewayConfig;
use forgeerp_gateway::{build_router, GatewayState};

#[tokio::main]
async fn main() {
    forgeerp_observability::init();

    let config = match GatewayConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "gateway configuration failed");
            std::process::exit(1);
        }
    };

    tracing::info!(
        listen_addr = %config.listen_addr,
        targets = ?config.targets,
        "starting forgeerp-gateway"
    );

    let listen_addr = config.listen_addr.clone();
    let state = Arc::new(GatewayState::new(config));
    let app = build_router(state);

    let listener = match tokio::net::TcpListener::bind(&listen_addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(error = %e, addr = %listen_addr, "failed to bind gateway listener");
            std::process::exit(1);
        }
    };

    tracing::info!("gateway listening on {}", listener.local_addr().unwrap());

    let serve = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal());

    if let Err(e) = serve.await {
        tracing::error!(error = %e, "gateway server error");
        std::process::exit(1);
    }

    tracing::info!("gateway shut down gracefully");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received, draining in-flight requests");
}
