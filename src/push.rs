use crate::error::AcquireError;
use crate::telemetry::{PowerUnit, RawReading};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::types::Json as SqlJson;
use sqlx::PgPool;

#[async_trait]
pub trait PushSource: Send + Sync {
    /// Latest pushed reading for a project. `Ok(None)` when the project has no
    /// push integration (no row); errors only for store failures.
    async fn latest(&self, entity_id: &str) -> Result<Option<RawReading>, AcquireError>;
}

/// Reads the `live_data_latest` projection written by the client push kit.
#[derive(Clone)]
pub struct PgPushReader {
    pool: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct LatestRow {
    pub(crate) value: Option<f64>,
    pub(crate) unit: Option<String>,
    pub(crate) timestamp: Option<DateTime<Utc>>,
    pub(crate) metadata: Option<SqlJson<JsonValue>>,
}

impl PgPushReader {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PushSource for PgPushReader {
    async fn latest(&self, entity_id: &str) -> Result<Option<RawReading>, AcquireError> {
        let row: Option<LatestRow> = sqlx::query_as(
            r#"
            SELECT
                value::double precision AS value,
                unit,
                "timestamp",
                metadata
            FROM live_data_latest
            WHERE project_id::text = $1
            ORDER BY "timestamp" DESC NULLS LAST
            LIMIT 1
            "#,
        )
        .bind(entity_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AcquireError::source_unavailable)?;

        let Some(row) = row else {
            return Ok(None);
        };
        row_to_reading(entity_id, row, Utc::now())
    }
}

pub(crate) fn row_to_reading(
    entity_id: &str,
    row: LatestRow,
    acquired_at: DateTime<Utc>,
) -> Result<Option<RawReading>, AcquireError> {
    let Some(value) = row.value.filter(|value| value.is_finite()) else {
        tracing::debug!(entity = %entity_id, "push row has no usable value");
        return Ok(None);
    };

    let unit = match row.unit.as_deref().map(str::trim) {
        None | Some("") => PowerUnit::Kw,
        Some(raw) => PowerUnit::parse(raw).ok_or_else(|| {
            AcquireError::source_unavailable(format!("push row has unsupported unit {raw:?}"))
        })?,
    };

    Ok(Some(RawReading {
        value,
        unit,
        timestamp: row.timestamp.unwrap_or(acquired_at),
        metadata: row
            .metadata
            .map(|metadata| metadata.0)
            .filter(|metadata| !metadata.is_null()),
    }))
}
