use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Cancel a root token on SIGTERM or SIGINT.
///
/// Registration, heartbeats, allocation polling and every running allocation
/// hang off the returned token. A second signal while tasks are being torn
/// down exits the process immediately.
pub fn install_shutdown_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                (Err(e), _) | (_, Err(e)) => {
                    tracing::error!(error = %e, "Failed to install signal handlers");
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => tracing::info!("Received SIGTERM, stopping agent"),
            _ = sigint.recv() => tracing::info!("Received SIGINT, stopping agent"),
        }
        trigger.cancel();

        tokio::select! {
            _ = sigterm.recv() => {}
            _ = sigint.recv() => {}
        }
        tracing::warn!("Received second signal, exiting immediately");
        std::process::exit(1);
    });

    token
}
