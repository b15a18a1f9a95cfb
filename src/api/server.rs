use std::net::SocketAddr;

use tokio::signal;

use super::{context::Context, routes::routes};
use crate::{
    config::Config,
    error::{Error, ErrorKind},
};

/// Connects to the database, then serves until Ctrl+C or SIGTERM.
pub async fn serve(config: Config) -> Result<(), Error> {
    config.warn_on_defaults();

    let ctx = Context::new(config).await?;
    let addr = SocketAddr::from(([0, 0, 0, 0], ctx.config.port));
    log::info!("Serving media from {}", ctx.media.root().display());

    let (addr, server) = warp::serve(routes(ctx))
        .try_bind_with_graceful_shutdown(addr, shutdown_signal())
        .map_err(|e| {
            log::error!("Failed to bind {addr}: {e}");
            ErrorKind::Internal.new("Failed to bind server address")
        })?;

    log::info!("Listening on http://{addr}");
    server.await;
    log::info!("Server shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                log::error!("Failed to listen for SIGTERM: {e}");
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
    log::info!("Shutdown signal received");
}
