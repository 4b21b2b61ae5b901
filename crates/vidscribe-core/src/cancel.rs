//! Cooperative cancellation for in-flight submissions.

use std::sync::Arc;

use tokio::sync::watch;

/// A token checked by the pipeline at every suspension point.
#[derive(Clone)]
pub struct CancellationToken {
    tx: Arc<watch::Sender<bool>>,
}

impl CancellationToken {
    /// Creates a new token and the handle that triggers it.
    ///
    /// ```ignore
    /// let (token, handle) = CancellationToken::new();
    /// tokio::spawn(async move {
    ///     tokio::signal::ctrl_c().await.ok();
    ///     handle.cancel();
    /// });
    /// pipeline.submit(Some(&media), None, &token, |_| {}).await?;
    /// ```
    pub fn new() -> (Self, CancellationHandle) {
        let tx = Arc::new(watch::Sender::new(false));
        (Self { tx: tx.clone() }, CancellationHandle { tx })
    }

    /// Creates a token that is never cancelled.
    pub fn never() -> Self {
        Self::new().0
    }

    /// Checks if cancellation has been requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once cancellation is requested.
    pub async fn cancelled(&self) {
        // The token owns a sender, so the channel cannot close under us.
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::never()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// A handle that can trigger cancellation.
#[derive(Clone)]
pub struct CancellationHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancellationHandle {
    /// Signals cancellation to all associated tokens.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl std::fmt::Debug for CancellationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_new_token_not_cancelled() {
        let (token, _handle) = CancellationToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cloned_tokens_share_state() {
        let (token1, handle) = CancellationToken::new();
        let token2 = token1.clone();

        handle.cancel();
        handle.cancel();

        assert!(token1.is_cancelled());
        assert!(token2.is_cancelled());
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_resolves_after_cancel() {
        let (token, handle) = CancellationToken::new();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.cancel();
        });

        tokio::time::timeout(Duration::from_secs(2), token.cancelled())
            .await
            .expect("token should resolve once cancelled");
    }

    #[tokio::test]
    async fn test_never_token_pends() {
        let token = CancellationToken::never();
        let result = tokio::time::timeout(Duration::from_millis(30), token.cancelled()).await;
        assert!(result.is_err());
    }
}
