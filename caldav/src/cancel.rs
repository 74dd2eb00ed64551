// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Cancellation and deadlines for in-flight requests.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::CalDavError;

/// Owner side of a cancellation signal.
///
/// Dropping the handle without calling [`CancelHandle::cancel`] leaves the
/// signal uncancelled.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Creates a handle and the signal it controls.
    #[must_use]
    pub fn new() -> (Self, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        let signal = CancelSignal {
            flag: Some(rx),
            deadline: None,
        };
        (Self { tx: Arc::new(tx) }, signal)
    }

    /// Cancels every operation observing the signal.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Observer side of a cancellation signal, optionally with a deadline.
///
/// The default signal is never cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    flag: Option<watch::Receiver<bool>>,
    deadline: Option<Instant>,
}

impl CancelSignal {
    /// Adds a deadline, keeping the earlier one if a deadline is already set.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(self.deadline.map_or(deadline, |d| d.min(deadline)));
        self
    }

    /// Adds a deadline `timeout` from now.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Whether the signal has fired or the deadline has passed.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.as_ref().is_some_and(|rx| *rx.borrow())
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Completes once the signal fires or the deadline passes.
    pub async fn cancelled(&self) {
        let flag = async {
            match self.flag.clone() {
                Some(mut rx) => {
                    let closed = rx.wait_for(|cancelled| *cancelled).await.is_err();
                    if closed {
                        std::future::pending::<()>().await;
                    }
                }
                None => std::future::pending::<()>().await,
            }
        };
        let deadline = async {
            match self.deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            () = flag => {}
            () = deadline => {}
        }
    }

    /// Runs `fut` unless the signal fires first.
    ///
    /// # Errors
    ///
    /// Returns [`CalDavError::Cancelled`] if the signal fires before `fut`
    /// completes, otherwise whatever `fut` returns.
    pub async fn guard<F, T>(&self, fut: F) -> Result<T, CalDavError>
    where
        F: Future<Output = Result<T, CalDavError>>,
    {
        if self.is_cancelled() {
            return Err(CalDavError::Cancelled);
        }

        tokio::select! {
            biased;
            () = self.cancelled() => Err(CalDavError::Cancelled),
            res = fut => res,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_default_signal_never_fires() {
        let signal = CancelSignal::default();
        assert!(!signal.is_cancelled());
    }

    #[test]
    fn cancel_handle_fires_all_clones() {
        let (handle, signal) = CancelHandle::new();
        let other = signal.clone();
        assert!(!signal.is_cancelled());

        handle.cancel();
        assert!(signal.is_cancelled());
        assert!(other.is_cancelled());
    }

    #[tokio::test]
    async fn cancel_guard_rejects_when_already_cancelled() {
        let (handle, signal) = CancelHandle::new();
        handle.cancel();

        let res = signal.guard(async { Ok(1) }).await;
        assert!(matches!(res, Err(CalDavError::Cancelled)));
    }

    #[tokio::test]
    async fn cancel_guard_times_out_pending_future() {
        let signal = CancelSignal::default().with_timeout(Duration::from_millis(10));

        let res: Result<(), _> = signal.guard(std::future::pending()).await;
        assert!(matches!(res, Err(CalDavError::Cancelled)));
    }

    #[tokio::test]
    async fn cancel_guard_passes_through_result() {
        let (_handle, signal) = CancelHandle::new();

        let res = signal.guard(async { Ok("done") }).await;
        assert_eq!(res.unwrap(), "done");
    }

    #[test]
    fn cancel_keeps_earliest_deadline() {
        let now = Instant::now();
        let signal = CancelSignal::default()
            .with_deadline(now + Duration::from_secs(60))
            .with_deadline(now);
        assert!(signal.is_cancelled());
    }
}
