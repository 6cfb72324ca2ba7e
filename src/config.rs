use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path, time::Duration};

use crate::{priority_queue::DEFAULT_PRIORITY, EmitterError, EmitterResult};

/// Unlimited listeners per event.
pub const UNLIMITED_LISTENERS: i64 = -1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmitterConfig {
    /// Soft limit of listeners per event; exceeding it only logs a warning.
    #[serde(default = "default_max_listeners")]
    pub max_listeners: i64,

    #[serde(default = "default_type_tag")]
    pub type_tag: String,

    #[serde(default = "default_priority")]
    pub default_priority: i32,

    /// Delay before a deferred listener or notice runs.
    #[serde(default = "default_async_delay", with = "duration_ms")]
    pub async_delay: Duration,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            max_listeners: default_max_listeners(),
            type_tag: default_type_tag(),
            default_priority: default_priority(),
            async_delay: default_async_delay(),
        }
    }
}

impl EmitterConfig {
    // JSONファイルから設定を読み込む
    pub fn from_file<P: AsRef<Path>>(path: P) -> EmitterResult<Self> {
        let file = File::open(path)
            .map_err(|e| EmitterError::Config(format!("Failed to open config file: {}", e)))?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader)
            .map_err(|e| EmitterError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn from_json(s: &str) -> EmitterResult<Self> {
        serde_json::from_str(s)
            .map_err(|e| EmitterError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Whether an event already holding `current` listeners is at the limit.
    pub fn limit_reached(&self, current: usize) -> bool {
        self.max_listeners >= 0 && current as i64 >= self.max_listeners
    }
}

fn default_max_listeners() -> i64 {
    10
}
fn default_type_tag() -> String {
    "emitter".to_string()
}
fn default_priority() -> i32 {
    DEFAULT_PRIORITY
}
fn default_async_delay() -> Duration {
    Duration::from_millis(0)
}

pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
