use crate::error::ErrorKind;
use crate::resolver::SourceResolver;
use crate::session::{observe, Displayed, LiveSnapshot, SessionHandle};
use crate::store::ProjectStore;
use crate::telemetry::{EntityTelemetryConfig, PowerUnit, SourceKind, StaticFallback, TelemetryReading};
use crate::units::{cars_equivalent, to_megawatts, CARS_PER_MW_100_KMH};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::{Json, Router};
use futures::stream::{self, Stream};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct HttpState {
    pub store: Arc<dyn ProjectStore>,
    pub resolver: Arc<SourceResolver>,
    pub poll_interval: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveStatus {
    Loading,
    Live,
    Stale,
    Fallback,
    NoData,
}

/// Snapshot rendered for the map popup, live badge and embed page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveView {
    pub entity_id: String,
    pub status: LiveStatus,
    pub reading: Option<TelemetryReading>,
    pub fallback: Option<StaticFallback>,
    pub error: Option<ErrorKind>,
    pub self_heals: bool,
    pub source_kind: Option<SourceKind>,
    pub is_loading: bool,
    pub value_mw: Option<f64>,
    pub cars_equivalent: Option<i64>,
}

impl LiveView {
    pub fn from_snapshot(snapshot: &LiveSnapshot) -> Self {
        let (status, shown): (LiveStatus, Option<(f64, PowerUnit)>) = match snapshot.displayed() {
            Displayed::Loading => (LiveStatus::Loading, None),
            Displayed::Live(reading) => (LiveStatus::Live, Some((reading.value(), reading.unit()))),
            Displayed::Stale(reading) => (LiveStatus::Stale, Some((reading.value(), reading.unit()))),
            Displayed::Fallback(fallback) => {
                (LiveStatus::Fallback, Some((fallback.value, fallback.unit)))
            }
            Displayed::NoLiveData => (LiveStatus::NoData, None),
        };

        Self {
            entity_id: snapshot.entity_id.clone(),
            status,
            reading: snapshot.reading.clone(),
            fallback: snapshot.static_fallback,
            error: snapshot.error,
            self_heals: snapshot.error.map_or(true, ErrorKind::self_heals),
            source_kind: snapshot.source_kind,
            is_loading: snapshot.is_loading,
            value_mw: shown.and_then(|(value, unit)| to_megawatts(value, unit)),
            cars_equivalent: shown
                .and_then(|(value, unit)| cars_equivalent(value, unit, CARS_PER_MW_100_KMH)),
        }
    }
}

type ApiError = (StatusCode, String);

async fn healthz() -> &'static str {
    "ok"
}

async fn load_config(state: &HttpState, entity_id: &str) -> Result<EntityTelemetryConfig, ApiError> {
    match state.store.telemetry_config(entity_id).await {
        Ok(Some(config)) => Ok(config),
        Ok(None) => Err((StatusCode::NOT_FOUND, "Project not found".to_string())),
        Err(err) => {
            tracing::error!(entity = %entity_id, error = %format!("{err:#}"), "project lookup failed");
            Err((
                StatusCode::SERVICE_UNAVAILABLE,
                "Project store unavailable".to_string(),
            ))
        }
    }
}

async fn get_live(
    State(state): State<HttpState>,
    Path(entity_id): Path<String>,
) -> Result<Json<LiveView>, ApiError> {
    let config = load_config(&state, &entity_id).await?;
    let outcome = state.resolver.resolve(&config).await;
    let snapshot = LiveSnapshot::from_outcome(&config, outcome);
    Ok(Json(LiveView::from_snapshot(&snapshot)))
}

async fn stream_live(
    State(state): State<HttpState>,
    Path(entity_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let config = load_config(&state, &entity_id).await?;
    let session = observe(state.resolver.clone(), config, state.poll_interval);
    Ok(Sse::new(snapshot_events(session)).keep_alive(KeepAlive::default()))
}

/// One event for the current snapshot, then one per change. The stream owns
/// the session, so a disconnecting client tears it down.
fn snapshot_events(session: SessionHandle) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold((session, true), |(mut session, first)| async move {
        let snapshot = if first {
            session.snapshot()
        } else {
            session.changed().await?
        };
        Some((Ok(snapshot_event(&snapshot)), (session, false)))
    })
}

fn snapshot_event(snapshot: &LiveSnapshot) -> Event {
    let view = LiveView::from_snapshot(snapshot);
    Event::default()
        .event("snapshot")
        .json_data(&view)
        .unwrap_or_else(|err| {
            tracing::warn!(entity = %snapshot.entity_id, error = %err, "failed to encode snapshot");
            Event::default().comment("snapshot unavailable")
        })
}

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/projects/{id}/live", get(get_live))
        .route("/v1/projects/{id}/live/stream", get(stream_live))
        .with_state(state)
}
