use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Cancel `token` on the first Ctrl-C.
///
/// In-flight creations observe the token and compensate before returning, so
/// the process should keep running until they do.
pub fn cancel_on_ctrl_c(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                match signal {
                    Ok(()) => {
                        info!("Interrupt received, cancelling in-flight project creation");
                        token.cancel();
                    }
                    Err(e) => warn!(error = %e, "Failed to listen for interrupt signal"),
                }
            }
            _ = token.cancelled() => {}
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_listener_exits_when_token_cancelled_elsewhere() {
        let token = CancellationToken::new();
        let handle = cancel_on_ctrl_c(token.clone());

        token.cancel();
        handle.await.unwrap();
    }
}
