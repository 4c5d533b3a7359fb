use crate::error::AcquireError;
use crate::pull::{parse_pull_url, PullSource};
use crate::push::PushSource;
use crate::telemetry::{EntityTelemetryConfig, SourceKind, TelemetryReading, DEFAULT_PULL_PATH};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_PUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Picks the live reading for a project: the push table first, the project's
/// pull endpoint second. The two are never queried concurrently.
///
/// A push query that outlives the push timeout counts as a store failure and
/// the pull endpoint is still tried.
///
/// When nothing produced a reading the last failure is returned rather than a
/// blanket [`AcquireError::NoSourceAvailable`]. A bad pull URL wins over a pull failure, which
/// wins over a push store failure. Only when no step failed is the result
/// `NoSourceAvailable`.
#[derive(Clone)]
pub struct SourceResolver {
    push: Arc<dyn PushSource>,
    pull: Arc<dyn PullSource>,
    default_pull_path: &'static str,
    push_timeout: Duration,
}

impl SourceResolver {
    pub fn new(push: Arc<dyn PushSource>, pull: Arc<dyn PullSource>) -> Self {
        Self {
            push,
            pull,
            default_pull_path: DEFAULT_PULL_PATH,
            push_timeout: DEFAULT_PUSH_TIMEOUT,
        }
    }

    pub fn with_push_timeout(mut self, timeout: Duration) -> Self {
        self.push_timeout = timeout;
        self
    }

    pub fn with_default_pull_path(mut self, path: &'static str) -> Self {
        self.default_pull_path = path;
        self
    }

    pub async fn resolve(
        &self,
        config: &EntityTelemetryConfig,
    ) -> Result<TelemetryReading, AcquireError> {
        let entity_id = config.entity_id.as_str();
        let mut failure: Option<AcquireError> = None;

        let push = tokio::time::timeout(self.push_timeout, self.push.latest(entity_id))
            .await
            .unwrap_or_else(|_| {
                Err(AcquireError::source_unavailable(format!(
                    "push query timed out after {}ms",
                    self.push_timeout.as_millis()
                )))
            });
        match push {
            Ok(Some(raw)) => return Ok(TelemetryReading::from_raw(raw, SourceKind::Push)),
            Ok(None) => {
                tracing::trace!(entity = %entity_id, "no push row");
            }
            Err(err) => {
                tracing::debug!(entity = %entity_id, error = %err, "push read failed");
                failure = Some(err);
            }
        }

        if let Some(raw_url) = config.pull_url() {
            match parse_pull_url(raw_url) {
                Ok(url) => {
                    let path = config.pull_path_or(self.default_pull_path);
                    match self.pull.poll(&url, path).await {
                        Ok(raw) => return Ok(TelemetryReading::from_raw(raw, SourceKind::Pull)),
                        Err(err) => {
                            tracing::debug!(entity = %entity_id, error = %err, "pull failed");
                            failure = Some(err);
                        }
                    }
                }
                Err(err) => {
                    tracing::debug!(entity = %entity_id, error = %err, "skipping pull");
                    failure = Some(err);
                }
            }
        }

        Err(failure.unwrap_or(AcquireError::NoSourceAvailable))
    }
}
