//! Generic periodic JSON fetcher.
//!
//! Polls one source on a fixed interval and retries failures right away using
//! the bounded [`backoff`](crate::backoff) table. Used for feeds that are not
//! tied to a single project reading.

use crate::backoff::RetryState;
use crate::pull::fetch_json;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait JsonSource: Send + Sync + 'static {
    fn label(&self) -> &str;

    async fn fetch(&self) -> anyhow::Result<JsonValue>;
}

pub struct HttpJsonSource {
    client: Client,
    url: String,
}

impl HttpJsonSource {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl JsonSource for HttpJsonSource {
    fn label(&self) -> &str {
        &self.url
    }

    async fn fetch(&self) -> anyhow::Result<JsonValue> {
        fetch_json(&self.client, &self.url).await
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchState {
    pub data: Option<JsonValue>,
    pub loading: bool,
    pub error: Option<String>,
    pub retry_count: u32,
}

pub struct FetcherHandle {
    state: watch::Receiver<FetchState>,
    refetch_tx: mpsc::Sender<()>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl FetcherHandle {
    pub fn state(&self) -> FetchState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FetchState> {
        self.state.clone()
    }

    /// Fetches again now with a fresh retry budget. A request made while a
    /// fetch is running is served right after it.
    pub fn refetch(&self) {
        let _ = self.refetch_tx.try_send(());
    }

    pub fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for FetcherHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

pub fn spawn_http_fetcher(client: Client, url: impl Into<String>, interval: Duration) -> FetcherHandle {
    spawn_fetcher(HttpJsonSource::new(client, url), interval)
}

/// Fetches once immediately, then every `interval`. A zero interval means a
/// single fetch (plus its retries) and no timer.
pub fn spawn_fetcher<S: JsonSource>(source: S, interval: Duration) -> FetcherHandle {
    let (state_tx, state_rx) = watch::channel(FetchState {
        loading: true,
        ..FetchState::default()
    });
    let (refetch_tx, refetch_rx) = mpsc::channel(1);
    let cancel = CancellationToken::new();
    let task = tokio::spawn(run_fetcher(
        source,
        interval,
        state_tx,
        refetch_rx,
        cancel.clone(),
    ));
    FetcherHandle {
        state: state_rx,
        refetch_tx,
        cancel,
        task: Some(task),
    }
}

async fn run_fetcher<S: JsonSource>(
    source: S,
    interval: Duration,
    state_tx: watch::Sender<FetchState>,
    mut refetch_rx: mpsc::Receiver<()>,
    cancel: CancellationToken,
) {
    let mut ticker = (!interval.is_zero()).then(|| {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker
    });
    let mut retry = RetryState::new();

    loop {
        state_tx.send_modify(|state| {
            state.loading = true;
            state.error = None;
        });

        let outcome = tokio::select! {
            _ = cancel.cancelled() => break,
            outcome = source.fetch() => outcome,
        };

        let retry_at = match outcome {
            Ok(data) => {
                retry.reset();
                state_tx.send_modify(|state| {
                    state.loading = false;
                    state.retry_count = 0;
                    if state.data.as_ref() != Some(&data) {
                        state.data = Some(data);
                    }
                });
                None
            }
            Err(err) => {
                let message = format!("{err:#}");
                let retry_at = match retry.record_failure() {
                    Some(delay) => {
                        tracing::warn!(
                            source = source.label(),
                            error = %message,
                            retry_in_ms = delay.as_millis() as u64,
                            attempt = retry.attempts(),
                            "fetch failed; retrying"
                        );
                        Some(Instant::now() + delay)
                    }
                    None => {
                        tracing::warn!(
                            source = source.label(),
                            error = %message,
                            "fetch failed; retries exhausted"
                        );
                        None
                    }
                };
                state_tx.send_modify(|state| {
                    state.loading = false;
                    state.error = Some(message);
                    state.retry_count = retry.attempts();
                });
                retry_at
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = next_tick(&mut ticker) => {}
            _ = wait_until(retry_at) => {}
            request = refetch_rx.recv() => match request {
                Some(()) => retry.reset(),
                None => break,
            },
        }
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

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
