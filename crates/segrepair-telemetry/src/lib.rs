//! Logging and metrics for the segment repairer.
//!
//! ```rust,ignore
//! use segrepair_telemetry::{TelemetryConfig, init_telemetry};
//!
//! init_telemetry(TelemetryConfig::new("repairer").with_json_logs(false))?;
//! tracing::info!(segment = %id, "repairing");
//! ```

#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

mod logging;
pub mod metrics;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logging::init_logging;

/// Telemetry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Name attached to the startup log line.
    pub service_name: String,

    /// Filter used when `RUST_LOG` is not set (e.g. "info", "segrepair_ec=debug").
    pub log_level: String,

    /// Emit JSON lines instead of human-readable output.
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "segrepair".to_string(),
            log_level: "info".to_string(),
            json_logs: true,
        }
    }
}

impl TelemetryConfig {
    #[must_use]
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    #[must_use]
    pub const fn with_json_logs(mut self, enabled: bool) -> Self {
        self.json_logs = enabled;
        self
    }
}

/// Telemetry setup errors.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global subscriber was already installed, or the filter is invalid.
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),
}

/// Install logging and describe the repair metrics.
///
/// Call once at startup.
///
/// # Errors
///
/// Returns an error if a global subscriber is already set.
pub fn init_telemetry(config: TelemetryConfig) -> Result<(), TelemetryError> {
    init_logging(&config)?;
    crate::metrics::init_metrics();
    Ok(())
}
