//! Live power acquisition for renewable-energy projects.
//!
//! A project's current output comes from the push table when the operator's
//! own system reports into it, otherwise from a third-party JSON endpoint
//! polled on an interval, and finally from the static capacity figure on the
//! project record.

pub mod backoff;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod http;
pub mod json_path;
pub mod pull;
pub mod push;
pub mod resolver;
pub mod session;
pub mod store;
pub mod telemetry;
pub mod units;

#[cfg(test)]
mod pg_tests;

pub use error::{AcquireError, ErrorKind};
pub use resolver::SourceResolver;
pub use session::{observe, Displayed, LiveSnapshot, SessionHandle};
pub use telemetry::{EntityTelemetryConfig, PowerUnit, SourceKind, StaticFallback, TelemetryReading};
