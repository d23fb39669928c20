//! Abort signals for in-flight requests.
//!
//! A [`CancelHandle`] is held by whoever may cancel, the paired
//! [`CancelToken`] travels with the request. A token may also carry a
//! deadline; whichever fires first aborts the guarded future.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::Abort;

#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
    deadline: Option<Instant>,
}

/// Creates a linked handle/token pair with no deadline.
pub fn pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx, deadline: None })
}

impl CancelToken {
    /// A token that is never cancelled by a handle.
    pub fn never() -> Self {
        let (_handle, token) = pair();
        token
    }

    /// Same token, additionally aborted once `timeout` elapses from now.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Drives `fut` until it completes, the handle cancels, or the deadline
    /// passes.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, Abort> {
        let mut rx = self.rx.clone();
        let deadline = self.deadline;

        tokio::select! {
            biased;
            _ = wait_cancelled(&mut rx) => Err(Abort::Cancelled),
            _ = wait_deadline(deadline) => Err(Abort::TimedOut),
            out = fut => Ok(out),
        }
    }
}

async fn wait_cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        // Handle dropped without cancelling: never fires.
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}
