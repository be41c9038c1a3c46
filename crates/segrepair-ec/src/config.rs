//! Repairer configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tuning knobs for [`EcRepairer`](crate::EcRepairer).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EcRepairerConfig {
    /// Budget for one piece download, dial included.
    ///
    /// Default: 5 minutes
    #[serde(with = "duration_secs")]
    pub download_timeout: Duration,

    /// Buffer downloaded pieces in memory instead of temporary files.
    ///
    /// Default: false
    pub in_memory_repair: bool,

    /// Erasure shares buffered per piece stream by the built-in codec.
    ///
    /// Default: 32
    pub piece_stream_buffer: usize,
}

impl Default for EcRepairerConfig {
    fn default() -> Self {
        Self {
            download_timeout: Duration::from_secs(5 * 60),
            in_memory_repair: false,
            piece_stream_buffer: segrepair_erasure::DEFAULT_BUFFER_SHARES,
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
