use crate::processing::Error;
use std::future::Future;
use std::time::Duration;
use tokio::select;
use tokio::sync::watch;
use tokio::time::Instant;

/// Cancellation signal and optional deadline for one reconciliation pass.
///
/// The signal is a `watch` channel that flips to `true` when the caller wants
/// the pass abandoned, which is exactly what pingora's `ShutdownWatch` does.
#[derive(Clone, Debug)]
pub struct Context {
    cancel: watch::Receiver<bool>,
    deadline: Option<Instant>,
}

impl Context {
    pub fn new(cancel: watch::Receiver<bool>) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self::new(rx)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Drives `fut` until it completes, the signal fires or the deadline
    /// passes, whichever happens first.
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, Error>
    where
        F: Future,
    {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let mut cancel = self.cancel.clone();
        let cancelled = async move {
            // A dropped sender can never cancel.
            if cancel.wait_for(|c| *c).await.is_err() {
                std::future::pending::<()>().await;
            }
        };
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        select! {
            biased;
            _ = cancelled => Err(Error::Cancelled),
            _ = expired => Err(Error::DeadlineExceeded),
            out = fut => Ok(out),
        }
    }
}
