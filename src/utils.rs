//! Time and cancellation plumbing shared by the executor and the strategies.

use std::fmt::Debug;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{info, warn};

/// Source of elapsed time and sleeps.
#[async_trait]
pub trait Clock: Send + Sync + Debug {
    /// Time since the clock was created.
    fn elapsed(&self) -> Duration;

    /// Suspend for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by tokio's timer.
#[derive(Debug, Clone)]
pub struct TokioClock {
    start: tokio::time::Instant,
}

impl TokioClock {
    /// Start a clock now.
    pub fn new() -> Self {
        Self {
            start: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for TokioClock {
    fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug, Default)]
struct ManualState {
    now: Duration,
    sleeps: Vec<Duration>,
}

/// Virtual clock: `sleep` advances time instantly and is recorded.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    state: Arc<Mutex<ManualState>>,
}

impl ManualClock {
    /// Clock at virtual time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Move virtual time forward without sleeping.
    pub fn advance(&self, by: Duration) {
        self.with_state(|s| s.now += by);
    }

    /// Every sleep requested so far.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.with_state(|s| s.sleeps.clone())
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut ManualState) -> T) -> T {
        let mut guard = self.state.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut guard)
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn elapsed(&self) -> Duration {
        self.with_state(|s| s.now)
    }

    async fn sleep(&self, duration: Duration) {
        self.with_state(|s| {
            s.now += duration;
            s.sleeps.push(duration);
        });
        tokio::task::yield_now().await;
    }
}

/// Receiving side of a cancellation request.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

/// Sending side of a cancellation request.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl CancelSignal {
    /// Linked handle and signal.
    pub fn channel() -> (CancelHandle, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, CancelSignal { rx })
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        Self::channel().1
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation is requested; pending forever if it never can be.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Signal that fires on Ctrl-C.
pub fn shutdown_signal() -> CancelSignal {
    let (handle, signal) = CancelSignal::channel();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, stopping");
                handle.cancel();
            }
            Err(e) => warn!(error = %e, "Could not install Ctrl-C handler"),
        }
    });
    signal
}
