use std::{future::Future, time::Duration};

use tokio::sync::watch;

use crate::{
    clock::Clock,
    error::{SyntheticsError, SyntheticsResult},
};

/// Trigger side of an [`AbortSignal`].
#[derive(Debug)]
pub struct AbortHandle {
    sender: watch::Sender<bool>,
}

impl AbortHandle {
    pub fn abort(&self) {
        self.sender.send_replace(true);
    }
}

/// Cooperative cancellation of a run. Cloning yields another observer of
/// the same signal.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    receiver: watch::Receiver<bool>,
}

impl AbortSignal {
    pub fn new() -> (AbortHandle, AbortSignal) {
        let (sender, receiver) = watch::channel(false);
        (AbortHandle { sender }, AbortSignal { receiver })
    }

    /// A signal that never fires.
    pub fn never() -> AbortSignal {
        let (_, signal) = Self::new();
        signal
    }

    pub fn is_aborted(&self) -> bool {
        *self.receiver.borrow()
    }

    pub fn check(&self) -> SyntheticsResult<()> {
        if self.is_aborted() {
            Err(SyntheticsError::Aborted)
        } else {
            Ok(())
        }
    }

    /// Resolves once the signal fires.
    pub async fn aborted(&self) {
        let mut receiver = self.receiver.clone();
        loop {
            if *receiver.borrow_and_update() {
                return;
            }
            if receiver.changed().await.is_err() {
                // handle dropped without aborting
                std::future::pending::<()>().await;
            }
        }
    }

    /// Runs `future` unless the signal fires first.
    pub async fn guard<T, F>(&self, future: F) -> SyntheticsResult<T>
    where
        F: Future<Output = SyntheticsResult<T>>,
    {
        self.check()?;
        tokio::select! {
            result = future => result,
            _ = self.aborted() => Err(SyntheticsError::Aborted),
        }
    }

    pub async fn sleep(&self, clock: &dyn Clock, duration: Duration) -> SyntheticsResult<()> {
        self.guard(async {
            clock.sleep(duration).await;
            Ok(())
        })
        .await
    }
}

impl Default for AbortSignal {
    fn default() -> Self {
        Self::never()
    }
}
