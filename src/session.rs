//! Per-consumer acquisition sessions.
//!
//! A session polls one project through the [`SourceResolver`]: once right
//! away, then on a fixed interval. Acquisitions never overlap; ticks that come
//! due while a request is running are dropped. The consumer owns the
//! [`SessionHandle`] and stopping or dropping it ends the session. A response
//! that arrives after teardown is discarded.

use crate::error::{AcquireError, ErrorKind};
use crate::resolver::SourceResolver;
use crate::telemetry::{EntityTelemetryConfig, SourceKind, StaticFallback, TelemetryReading};
use futures::FutureExt;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveSnapshot {
    pub entity_id: String,
    pub reading: Option<TelemetryReading>,
    pub error: Option<ErrorKind>,
    pub is_loading: bool,
    pub source_kind: Option<SourceKind>,
    /// Consecutive failed acquisitions; back to zero on success.
    pub attempt_count: u32,
    pub static_fallback: Option<StaticFallback>,
    /// Number of completed acquisitions.
    pub generation: u64,
}

/// What a consumer should render for a snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Displayed<'a> {
    Loading,
    Live(&'a TelemetryReading),
    /// Last good reading, kept after a failed poll.
    Stale(&'a TelemetryReading),
    Fallback(StaticFallback),
    NoLiveData,
}

impl LiveSnapshot {
    pub fn new(config: &EntityTelemetryConfig) -> Self {
        Self {
            entity_id: config.entity_id.clone(),
            reading: None,
            error: None,
            is_loading: false,
            source_kind: None,
            attempt_count: 0,
            static_fallback: config.static_fallback,
            generation: 0,
        }
    }

    /// Snapshot of a single out-of-session acquisition.
    pub fn from_outcome(
        config: &EntityTelemetryConfig,
        outcome: Result<TelemetryReading, AcquireError>,
    ) -> Self {
        let mut snapshot = Self::new(config);
        snapshot.record(outcome.map_err(|err| err.kind()));
        snapshot
    }

    fn record(&mut self, outcome: Result<TelemetryReading, ErrorKind>) {
        self.is_loading = false;
        self.generation += 1;
        match outcome {
            Ok(reading) => {
                self.source_kind = Some(reading.source_kind());
                self.reading = Some(reading);
                self.error = None;
                self.attempt_count = 0;
            }
            Err(kind) => {
                self.error = Some(kind);
                self.attempt_count = self.attempt_count.saturating_add(1);
            }
        }
    }

    pub fn displayed(&self) -> Displayed<'_> {
        match (&self.reading, self.error) {
            (Some(reading), None) => Displayed::Live(reading),
            (Some(reading), Some(_)) => Displayed::Stale(reading),
            (None, None) if self.is_loading || self.generation == 0 => Displayed::Loading,
            (None, _) => match self.static_fallback {
                Some(fallback) => Displayed::Fallback(fallback),
                None => Displayed::NoLiveData,
            },
        }
    }
}

pub struct SessionHandle {
    entity_id: String,
    state: watch::Receiver<LiveSnapshot>,
    refresh: Arc<Notify>,
    in_flight: Arc<AtomicBool>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn snapshot(&self) -> LiveSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LiveSnapshot> {
        self.state.clone()
    }

    /// Waits for the next published change. `None` once the session is gone.
    pub async fn changed(&mut self) -> Option<LiveSnapshot> {
        self.state.changed().await.ok()?;
        Some(self.state.borrow_and_update().clone())
    }

    /// Requests an acquisition outside the timer. Returns `false` when one is
    /// already in flight or the session has ended.
    pub fn refresh_now(&self) -> bool {
        if self.cancel.is_cancelled() || self.in_flight.load(Ordering::SeqCst) {
            return false;
        }
        self.refresh.notify_one();
        true
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    pub fn stop(&mut self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
        tracing::debug!(entity = %self.entity_id, "live session stopped");
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Starts observing a project. Must be called inside a Tokio runtime. A zero
/// interval performs the first acquisition only; `refresh_now` still works.
pub fn observe(
    resolver: Arc<SourceResolver>,
    config: EntityTelemetryConfig,
    interval: Duration,
) -> SessionHandle {
    let mut initial = LiveSnapshot::new(&config);
    initial.is_loading = true;
    let (state_tx, state_rx) = watch::channel(initial);
    let refresh = Arc::new(Notify::new());
    let in_flight = Arc::new(AtomicBool::new(false));
    let cancel = CancellationToken::new();
    let entity_id = config.entity_id.clone();

    tracing::debug!(
        entity = %entity_id,
        interval_ms = interval.as_millis() as u64,
        "live session started"
    );

    let task = SessionTask {
        resolver,
        config,
        state_tx,
        in_flight: in_flight.clone(),
        cancel: cancel.clone(),
    };
    let task = tokio::spawn(task.run(interval, refresh.clone()));

    SessionHandle {
        entity_id,
        state: state_rx,
        refresh,
        in_flight,
        cancel,
        task: Some(task),
    }
}

struct SessionTask {
    resolver: Arc<SourceResolver>,
    config: EntityTelemetryConfig,
    state_tx: watch::Sender<LiveSnapshot>,
    in_flight: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl SessionTask {
    async fn run(self, interval: Duration, refresh: Arc<Notify>) {
        let mut ticker = (!interval.is_zero()).then(|| {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker
        });

        loop {
            if !self.acquire().await {
                break;
            }
            if let Some(ticker) = ticker.as_mut() {
                if ticker.tick().now_or_never().is_some() {
                    tracing::trace!(entity = %self.config.entity_id, "skipped tick while in flight");
                }
            }
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = next_tick(&mut ticker) => {}
                _ = refresh.notified() => {
                    tracing::debug!(entity = %self.config.entity_id, "out-of-band refresh");
                }
            }
        }
    }

    /// Runs one acquisition. Returns `false` once the session is torn down.
    async fn acquire(&self) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.in_flight.store(true, Ordering::SeqCst);
        self.state_tx.send_modify(|snapshot| snapshot.is_loading = true);

        let outcome = tokio::select! {
            _ = self.cancel.cancelled() => None,
            outcome = self.resolver.resolve(&self.config) => Some(outcome),
        };
        self.in_flight.store(false, Ordering::SeqCst);

        let Some(outcome) = outcome else {
            return false;
        };
        if self.cancel.is_cancelled() {
            return false;
        }

        let previous_error = self.state_tx.borrow().error;
        let outcome = match outcome {
            Ok(reading) => {
                if previous_error.is_some() {
                    tracing::info!(
                        entity = %self.config.entity_id,
                        source = reading.source_kind().as_str(),
                        "live data recovered"
                    );
                }
                Ok(reading)
            }
            Err(err) => {
                let kind = err.kind();
                if previous_error != Some(kind) {
                    tracing::warn!(
                        entity = %self.config.entity_id,
                        error = %err,
                        kind = kind.as_str(),
                        "live acquisition failed"
                    );
                } else {
                    tracing::debug!(entity = %self.config.entity_id, error = %err, "live acquisition still failing");
                }
                Err(kind)
            }
        };
        self.state_tx.send_modify(|snapshot| snapshot.record(outcome));
        true
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
