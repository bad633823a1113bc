//! Process termination signals for the long-running daemon.

use crate::Result;

/// Listens for Ctrl-C and, on unix, SIGTERM.
///
/// The SIGTERM handler is registered in [`ShutdownSignal::install`], so a
/// signal delivered before [`ShutdownSignal::recv`] is polled is not lost.
pub struct ShutdownSignal {
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl ShutdownSignal {
    pub fn install() -> Result<Self> {
        Ok(Self {
            #[cfg(unix)]
            terminate: tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?,
        })
    }

    /// Resolves with the name of the first signal received.
    pub async fn recv(&mut self) -> Result<&'static str> {
        #[cfg(unix)]
        let terminate = async {
            self.terminate.recv().await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                Ok("SIGINT")
            }
            () = terminate => Ok("SIGTERM"),
        }
    }
}
