use tokio_util::sync::CancellationToken;

/// Cancellation token wired to SIGINT and SIGTERM.
///
/// Every long-lived loop in the process selects on this token. Shutdown is
/// abrupt by design: in-flight tests are not drained, and the health
/// machinery of surviving peers is what recovers their work.
pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        let terminate = async {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};
                match signal(SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        sigterm.recv().await;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "SIGTERM handler unavailable");
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            std::future::pending::<()>().await;
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => tracing::info!("Received SIGINT, shutting down"),
            _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
        }
        trigger.cancel();
    });

    token
}
