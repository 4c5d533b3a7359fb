use crate::telemetry::{EntityTelemetryConfig, PowerUnit, StaticFallback};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;

/// Read-only access to the live-data settings of project records.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn telemetry_config(&self, entity_id: &str) -> Result<Option<EntityTelemetryConfig>>;
}

#[derive(Clone)]
pub struct PgProjectStore {
    pool: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ProjectRow {
    pub(crate) id: String,
    pub(crate) live_data_url: Option<String>,
    pub(crate) live_data_path: Option<String>,
    pub(crate) actual_power: Option<f64>,
    pub(crate) actual_power_unit: Option<String>,
}

impl PgProjectStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProjectStore for PgProjectStore {
    async fn telemetry_config(&self, entity_id: &str) -> Result<Option<EntityTelemetryConfig>> {
        let row: Option<ProjectRow> = sqlx::query_as(
            r#"
            SELECT
                id::text AS id,
                live_data_url,
                live_data_path,
                actual_power::double precision AS actual_power,
                actual_power_unit
            FROM projects
            WHERE id::text = $1
            "#,
        )
        .bind(entity_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("failed to load project {entity_id}"))?;

        Ok(row.map(config_from_row))
    }
}

pub(crate) fn config_from_row(row: ProjectRow) -> EntityTelemetryConfig {
    let static_fallback = row
        .actual_power
        .filter(|value| value.is_finite())
        .and_then(|value| {
            let unit = match row.actual_power_unit.as_deref().map(str::trim) {
                None | Some("") => Some(PowerUnit::Mw),
                Some(raw) => PowerUnit::parse(raw),
            };
            if unit.is_none() {
                tracing::warn!(
                    project = %row.id,
                    unit = ?row.actual_power_unit,
                    "ignoring static power with unknown unit"
                );
            }
            unit.map(|unit| StaticFallback { value, unit })
        });

    EntityTelemetryConfig {
        entity_id: row.id,
        pull_url: non_blank(row.live_data_url),
        pull_path: non_blank(row.live_data_path),
        static_fallback,
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
