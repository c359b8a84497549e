//! Trailing-edge debouncer for rapid-fire inputs.
//!
//! Search-as-you-type and numeric field edits must not fire a request
//! per keystroke: each push supersedes the pending one, and only the
//! last value within a quiet window reaches the action. Dropping the
//! debouncer cancels whatever is still pending, the way an unmounted
//! input abandons its timer.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub struct Debouncer<T: Send + 'static> {
    tx: mpsc::UnboundedSender<T>,
    worker: JoinHandle<()>,
}

impl<T: Send + 'static> Debouncer<T> {
    /// `action` runs with the newest value once `window` elapses with no
    /// newer push.
    pub fn new<F>(window: Duration, action: F) -> Self
    where
        F: Fn(T) + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<T>();
        let worker = tokio::spawn(async move {
            while let Some(mut last) = rx.recv().await {
                loop {
                    match tokio::time::timeout(window, rx.recv()).await {
                        // Newer value within the window: supersede.
                        Ok(Some(newer)) => last = newer,
                        // Sender dropped: pending value is cancelled.
                        Ok(None) => return,
                        // Quiet window elapsed: fire with the last value.
                        Err(_) => {
                            action(last);
                            break;
                        }
                    }
                }
            }
        });
        Self { tx, worker }
    }

    /// Push a new value, superseding any pending one.
    pub fn push(&self, value: T) {
        let _ = self.tx.send(value);
    }
}

impl<T: Send + 'static> Drop for Debouncer<T> {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[tokio::test(start_paused = true)]
    async fn rapid_pushes_fire_once_with_last_value() {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let calls = Arc::new(AtomicUsize::new(0));
        let debouncer = {
            let fired = fired.clone();
            let calls = calls.clone();
            Debouncer::new(Duration::from_millis(500), move |value: String| {
                calls.fetch_add(1, Ordering::SeqCst);
                fired.lock().unwrap().push(value);
            })
        };

        for value in ["5", "50", "500"] {
            debouncer.push(value.to_string());
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        tokio::time::sleep(Duration::from_millis(600)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(fired.lock().unwrap().as_slice(), ["500".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn separate_quiet_periods_fire_separately() {
        let calls = Arc::new(AtomicUsize::new(0));
        let debouncer = {
            let calls = calls.clone();
            Debouncer::new(Duration::from_millis(200), move |_: i64| {
                calls.fetch_add(1, Ordering::SeqCst);
            })
        };

        debouncer.push(1);
        tokio::time::sleep(Duration::from_millis(300)).await;
        debouncer.push(2);
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_cancels_pending_value() {
        let calls = Arc::new(AtomicUsize::new(0));
        let debouncer = {
            let calls = calls.clone();
            Debouncer::new(Duration::from_millis(200), move |_: i64| {
                calls.fetch_add(1, Ordering::SeqCst);
            })
        };

        debouncer.push(1);
        drop(debouncer);
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
