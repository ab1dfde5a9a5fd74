//! # Subscriptions
//!
//! Handle returned by anything that keeps calling back (auth changes,
//! ticket watches). Dropping the handle cancels the underlying work.

use tokio::task::JoinHandle;

type CancelFn = Box<dyn FnOnce() + Send + Sync>;

/// Cancellable registration. Cancels on drop.
#[must_use = "dropping a Subscription cancels it immediately"]
pub struct Subscription {
    cancel: Option<CancelFn>,
}

impl Subscription {
    /// Wraps an arbitrary cancel action.
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Subscription {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Cancels by aborting a background task.
    pub fn from_task(handle: JoinHandle<()>) -> Self {
        Subscription::new(move || handle.abort())
    }

    /// A subscription with nothing to cancel.
    pub fn noop() -> Self {
        Subscription { cancel: None }
    }

    /// Cancels now. Same as dropping.
    pub fn cancel(mut self) {
        self.run_cancel();
    }

    fn run_cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run_cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_drop_cancels_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let sub = Subscription::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        drop(sub);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_task_aborted_on_cancel() {
        let handle = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        });
        let abort = handle.abort_handle();
        Subscription::from_task(handle).cancel();
        tokio::task::yield_now().await;
        assert!(abort.is_finished());
    }
}
