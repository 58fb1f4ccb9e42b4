use crate::error::CoreError;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::time::Duration as StdDuration;

/// Tunables for the presence tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// First retry delay after a calendar source I/O failure, in milliseconds.
    pub backoff_base_ms: u64,
    /// The retry delay doubles at most this many times.
    pub backoff_max_doublings: u32,
    /// Meetings shorter than this are never scheduled.
    pub min_meeting_secs: i64,
    /// Delay between the end of a recurring instance and scheduling the next.
    pub follow_up_ms: i64,
    /// Interval of the periodic presence re-evaluation.
    pub evaluation_interval_secs: i64,
    /// Calendar folder to track; asked from the source when unset.
    pub default_folder_id: Option<String>,
    /// IANA zone used when an item names no zone; UTC when unset.
    pub default_timezone: Option<String>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            backoff_base_ms: 1_000,
            backoff_max_doublings: 8,
            min_meeting_secs: 10,
            follow_up_ms: 1_000,
            evaluation_interval_secs: 5 * 60,
            default_folder_id: None,
            default_timezone: None,
        }
    }
}

impl TrackerConfig {
    pub fn backoff_base(&self) -> StdDuration {
        StdDuration::from_millis(self.backoff_base_ms)
    }

    pub fn min_meeting_duration(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.min_meeting_secs)
    }

    pub fn follow_up_delay(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.follow_up_ms)
    }

    pub fn evaluation_interval(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.evaluation_interval_secs.max(1))
    }

    pub fn default_zone(&self) -> Result<Tz, CoreError> {
        match &self.default_timezone {
            None => Ok(chrono_tz::UTC),
            Some(name) => name
                .parse::<Tz>()
                .map_err(|_| CoreError::InvalidTimezone(name.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TrackerConfig::default();
        assert_eq!(config.backoff_base(), StdDuration::from_secs(1));
        assert_eq!(config.min_meeting_duration(), chrono::Duration::seconds(10));
        assert_eq!(config.follow_up_delay(), chrono::Duration::seconds(1));
        assert_eq!(config.evaluation_interval(), chrono::Duration::minutes(5));
    }

    #[test]
    fn test_partial_deserialize_keeps_defaults() {
        let config: TrackerConfig = serde_json::from_str(r#"{"min_meeting_secs": 30}"#).unwrap();
        assert_eq!(config.min_meeting_secs, 30);
        assert_eq!(config.backoff_max_doublings, 8);
    }

    #[test]
    fn test_default_zone() {
        let mut config = TrackerConfig::default();
        assert_eq!(config.default_zone().unwrap(), chrono_tz::UTC);
        config.default_timezone = Some("Europe/Berlin".into());
        assert_eq!(config.default_zone().unwrap(), chrono_tz::Europe::Berlin);
        config.default_timezone = Some("Mars/Olympus".into());
        assert!(matches!(config.default_zone(), Err(CoreError::InvalidTimezone(_))));
    }
}
