//! Debounced write-behind for high-frequency values.
//!
//! A [`Debouncer`] holds at most one pending value. Each
//! [`submit`](Debouncer::submit) replaces the pending value and restarts the
//! quiet window; when the window elapses the sink runs once with the final
//! value. Teardown (drop or explicit [`flush`](Debouncer::flush))
//! deterministically commits any pending value instead of leaking a timer.

use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};

enum Msg<T> {
    Submit(T),
    Flush(oneshot::Sender<()>),
}

/// The async callback a [`Debouncer`] drives. Receives the final value of a
/// quiet window.
pub type DebounceSink<T> = Box<dyn Fn(T) -> BoxFuture<'static, ()> + Send + Sync>;

/// Collapses rapid repeated submissions into a single sink invocation per
/// quiet window.
pub struct Debouncer<T: Send + 'static> {
    tx: mpsc::UnboundedSender<Msg<T>>,
}

impl<T: Send + 'static> Debouncer<T> {
    /// Spawn the debounce task. The sink runs on the runtime, never inline
    /// with `submit`.
    pub fn new(window: Duration, sink: DebounceSink<T>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(rx, window, sink));
        Self { tx }
    }

    /// Replace the pending value and restart the quiet window.
    ///
    /// Never blocks. Submissions after teardown are silently dropped.
    pub fn submit(&self, value: T) {
        let _ = self.tx.send(Msg::Submit(value));
    }

    /// Commit any pending value immediately and wait for the sink to finish.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Msg::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }
}

/// Dropping the last handle closes the channel; the task commits any pending
/// value and exits.
async fn run<T>(mut rx: mpsc::UnboundedReceiver<Msg<T>>, window: Duration, sink: DebounceSink<T>) {
    let mut pending: Option<T> = None;
    loop {
        if pending.is_some() {
            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(Msg::Submit(value)) => pending = Some(value),
                    Some(Msg::Flush(ack)) => {
                        if let Some(value) = pending.take() {
                            sink(value).await;
                        }
                        let _ = ack.send(());
                    }
                    None => {
                        if let Some(value) = pending.take() {
                            sink(value).await;
                        }
                        return;
                    }
                },
                () = tokio::time::sleep(window) => {
                    if let Some(value) = pending.take() {
                        sink(value).await;
                    }
                }
            }
        } else {
            match rx.recv().await {
                Some(Msg::Submit(value)) => pending = Some(value),
                Some(Msg::Flush(ack)) => {
                    let _ = ack.send(());
                }
                None => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{Arc, Mutex};

    use futures::FutureExt;

    fn recording_sink(writes: Arc<Mutex<Vec<f64>>>) -> DebounceSink<f64> {
        Box::new(move |value| {
            let writes = Arc::clone(&writes);
            async move {
                writes.lock().unwrap().push(value);
            }
            .boxed()
        })
    }

    #[tokio::test]
    async fn collapses_burst_to_single_write_with_last_value() {
        let writes = Arc::new(Mutex::new(Vec::new()));
        let debouncer = Debouncer::new(Duration::from_millis(50), recording_sink(writes.clone()));

        debouncer.submit(1.0);
        debouncer.submit(2.0);
        debouncer.submit(3.0);

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(*writes.lock().unwrap(), vec![3.0]);
    }

    #[tokio::test]
    async fn separate_windows_write_separately() {
        let writes = Arc::new(Mutex::new(Vec::new()));
        let debouncer = Debouncer::new(Duration::from_millis(30), recording_sink(writes.clone()));

        debouncer.submit(1.0);
        tokio::time::sleep(Duration::from_millis(80)).await;
        debouncer.submit(2.0);
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert_eq!(*writes.lock().unwrap(), vec![1.0, 2.0]);
    }

    #[tokio::test]
    async fn flush_commits_pending_immediately() {
        let writes = Arc::new(Mutex::new(Vec::new()));
        let debouncer = Debouncer::new(Duration::from_secs(60), recording_sink(writes.clone()));

        debouncer.submit(7.5);
        debouncer.flush().await;

        assert_eq!(*writes.lock().unwrap(), vec![7.5]);
    }

    #[tokio::test]
    async fn flush_with_nothing_pending_is_a_no_op() {
        let writes = Arc::new(Mutex::new(Vec::new()));
        let debouncer = Debouncer::new(Duration::from_millis(10), recording_sink(writes.clone()));

        debouncer.flush().await;
        assert!(writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn drop_flushes_pending_value() {
        let writes = Arc::new(Mutex::new(Vec::new()));
        let debouncer = Debouncer::new(Duration::from_secs(60), recording_sink(writes.clone()));

        debouncer.submit(9.0);
        drop(debouncer);

        // The task observes the closed channel and commits the pending value.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*writes.lock().unwrap(), vec![9.0]);
    }
}
