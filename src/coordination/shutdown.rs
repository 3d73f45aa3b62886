//! Stop signalling for session workers and OS signal handling.
//!
//! Every session worker owns a [`StopSignal`]; the registry keeps the matching
//! [`StopHandle`]. Workers check the signal at iteration boundaries and race it
//! against every suspension point (fetch, idle sleep, backoff).

use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

/// Create a connected stop handle / signal pair
pub fn stop_pair() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (
        StopHandle { tx },
        StopSignal {
            rx,
            _keepalive: None,
        },
    )
}

/// Owner side of a session stop signal
#[derive(Debug)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopHandle {
    /// Request the worker to stop after its current cycle
    pub fn stop(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Worker side of a session stop signal
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
    _keepalive: Option<Arc<watch::Sender<bool>>>,
}

impl StopSignal {
    /// A signal that never fires (tests, one-off dispatches)
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            rx,
            _keepalive: Some(Arc::new(tx)),
        }
    }

    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once stop is requested. A dropped handle counts as stop.
    pub async fn stopped(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Sleep for `duration` unless stopped first.
    ///
    /// Returns `true` when the sleep was cut short by a stop request.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        if self.is_stopped() {
            return true;
        }
        let interrupted = tokio::select! {
            _ = self.stopped() => true,
            _ = tokio::time::sleep(duration) => false,
        };
        interrupted || self.is_stopped()
    }
}

/// Resolve on SIGINT / SIGTERM (Ctrl+C on non-unix)
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stop_interrupts_sleep() {
        let (handle, mut signal) = stop_pair();
        assert!(!signal.is_stopped());

        let sleeper = tokio::spawn(async move { signal.sleep(Duration::from_secs(30)).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.stop();

        let interrupted = tokio::time::timeout(Duration::from_secs(1), sleeper)
            .await
            .expect("sleep should be interrupted")
            .unwrap();
        assert!(interrupted);
        assert!(handle.is_stopped());
    }

    #[tokio::test]
    async fn test_sleep_completes_without_stop() {
        let (_handle, mut signal) = stop_pair();
        assert!(!signal.sleep(Duration::from_millis(5)).await);
    }

    #[tokio::test]
    async fn test_dropped_handle_counts_as_stop() {
        let (handle, mut signal) = stop_pair();
        drop(handle);
        tokio::time::timeout(Duration::from_secs(1), signal.stopped())
            .await
            .expect("dropped handle should resolve stopped()");
    }

    #[test]
    fn test_never_signal() {
        assert!(!StopSignal::never().is_stopped());
    }
}
