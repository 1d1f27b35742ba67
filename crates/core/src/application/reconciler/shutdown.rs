// Shutdown signalling for background loops

use tokio::sync::watch;

/// Cloneable shutdown signal observed by background loops and servers
#[derive(Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown is requested (immediately if it already was).
    /// A dropped sender counts as shutdown.
    pub async fn cancelled(&mut self) {
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}

/// Owning side of the shutdown channel
pub struct ShutdownSender {
    tx: watch::Sender<bool>,
}

impl ShutdownSender {
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }

    /// Another token for a late-started task
    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            rx: self.tx.subscribe(),
        }
    }
}

pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let (tx, rx) = watch::channel(false);
    (ShutdownSender { tx }, ShutdownToken { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancelled_after_signal() {
        let (tx, mut token) = shutdown_channel();
        assert!(!token.is_shutdown());

        tx.shutdown();
        token.cancelled().await;
        assert!(token.is_shutdown());

        // Late subscribers see the current value
        let mut late = tx.token();
        assert!(late.is_shutdown());
        late.cancelled().await;
    }

    #[tokio::test]
    async fn test_dropped_sender_releases_waiters() {
        let (tx, mut token) = shutdown_channel();
        drop(tx);
        token.cancelled().await;
    }
}
