use crate::push::{PgPushReader, PushSource};
use crate::store::{PgProjectStore, ProjectStore};
use crate::telemetry::{PowerUnit, StaticFallback};
use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::env;

async fn setup_test_pool(database_url: &str, schema: &str) -> Result<PgPool> {
    let admin_pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(database_url)
        .await?;
    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", schema))
        .execute(&admin_pool)
        .await?;
    drop(admin_pool);

    let schema_name = schema.to_string();
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .after_connect(move |conn, _meta| {
            let schema = schema_name.clone();
            Box::pin(async move {
                sqlx::query(&format!("SET search_path TO {}", schema))
                    .execute(conn)
                    .await?;
                Ok(())
            })
        })
        .connect(database_url)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            id text primary key,
            live_data_url text null,
            live_data_path text null,
            actual_power numeric null,
            actual_power_unit text null
        )
        "#,
    )
    .execute(&pool)
    .await?;
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS live_data_latest (
            project_id text not null,
            value numeric null,
            unit text null,
            "timestamp" timestamptz null,
            metadata jsonb null
        )
        "#,
    )
    .execute(&pool)
    .await?;

    Ok(pool)
}

async fn drop_schema(database_url: &str, schema: &str) -> Result<()> {
    let admin_pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(database_url)
        .await?;
    let _ = sqlx::query(&format!("DROP SCHEMA IF EXISTS {} CASCADE", schema))
        .execute(&admin_pool)
        .await;
    Ok(())
}

fn integration_database_url() -> Option<String> {
    if env::var("LIVE_INTEGRATION_TEST").ok().as_deref() != Some("1") {
        return None;
    }
    env::var("LIVE_TEST_DATABASE_URL").ok()
}

#[tokio::test]
async fn push_reader_returns_newest_row() -> Result<()> {
    let Some(database_url) = integration_database_url() else {
        return Ok(());
    };
    let schema = format!("live_power_test_push_{}", std::process::id());
    let pool = setup_test_pool(&database_url, &schema).await?;

    let now = Utc::now();
    for (value, unit, ts) in [
        (3.5, "MW", now - ChronoDuration::minutes(5)),
        (4200.0, "kW", now),
    ] {
        sqlx::query(
            r#"INSERT INTO live_data_latest (project_id, value, unit, "timestamp", metadata) VALUES ($1, $2, $3, $4, '{"source":"scada"}'::jsonb)"#,
        )
        .bind("E2")
        .bind(value)
        .bind(unit)
        .bind(ts)
        .execute(&pool)
        .await?;
    }

    let reader = PgPushReader::new(pool.clone());
    let reading = reader.latest("E2").await?.expect("row present");
    assert_eq!(reading.value, 4200.0);
    assert_eq!(reading.unit, PowerUnit::Kw);
    assert_eq!(
        reading.metadata.as_ref().and_then(|m| m.get("source")).and_then(|v| v.as_str()),
        Some("scada")
    );
    assert!(reader.latest("E1").await?.is_none());

    drop(pool);
    drop_schema(&database_url, &schema).await
}

#[tokio::test]
async fn project_store_reads_live_data_settings() -> Result<()> {
    let Some(database_url) = integration_database_url() else {
        return Ok(());
    };
    let schema = format!("live_power_test_projects_{}", std::process::id());
    let pool = setup_test_pool(&database_url, &schema).await?;

    sqlx::query(
        "INSERT INTO projects (id, live_data_url, live_data_path, actual_power, actual_power_unit) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind("p1")
    .bind("https://api.example.com/plant")
    .bind("data.power")
    .bind(10.12_f64)
    .bind(Option::<String>::None)
    .execute(&pool)
    .await?;

    let store = PgProjectStore::new(pool.clone());
    let config = store.telemetry_config("p1").await?.expect("project present");
    assert_eq!(config.pull_url(), Some("https://api.example.com/plant"));
    assert_eq!(config.pull_path_or("value"), "data.power");
    assert_eq!(
        config.static_fallback,
        Some(StaticFallback {
            value: 10.12,
            unit: PowerUnit::Mw
        })
    );
    assert!(store.telemetry_config("missing").await?.is_none());

    drop(pool);
    drop_schema(&database_url, &schema).await
}
