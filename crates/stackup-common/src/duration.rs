//! Duration (de)serialization for configuration files.
//!
//! Durations may be written as plain seconds (`5`, `0.5`) or as strings with a
//! unit suffix: `"250ms"`, `"5s"`, `"2m"`. Use with
//! `#[serde(with = "stackup_common::duration::serde_duration")]`.

use std::time::Duration;

/// Parses a duration string such as `"500ms"`, `"5s"` or `"2m"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    // Check for "ms" BEFORE "s" since "ms" ends with 's'
    if let Some(num) = s.strip_suffix("ms") {
        let millis: u64 = num
            .trim()
            .parse()
            .map_err(|_| format!("Invalid duration: {}", s))?;
        Ok(Duration::from_millis(millis))
    } else if let Some(num) = s.strip_suffix('s') {
        let secs: f64 = num
            .trim()
            .parse()
            .map_err(|_| format!("Invalid duration: {}", s))?;
        seconds(secs).ok_or_else(|| format!("Invalid duration: {}", s))
    } else if let Some(num) = s.strip_suffix('m') {
        let mins: u64 = num
            .trim()
            .parse()
            .map_err(|_| format!("Invalid duration: {}", s))?;
        mins.checked_mul(60)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("Invalid duration: {}", s))
    } else if let Ok(secs) = s.parse::<f64>() {
        seconds(secs).ok_or_else(|| format!("Invalid duration: {}", s))
    } else {
        Err(format!("Duration must be seconds or end with 'ms', 's' or 'm': {}", s))
    }
}

/// Formats a duration the way [`parse_duration`] reads it back.
pub fn format_duration(duration: &Duration) -> String {
    if duration.subsec_millis() != 0 || duration.as_secs() == 0 {
        format!("{}ms", duration.as_millis())
    } else {
        format!("{}s", duration.as_secs())
    }
}

fn seconds(secs: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(secs).ok()
}

pub mod serde_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawDuration {
        Seconds(u64),
        Fractional(f64),
        Text(String),
    }

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_duration(duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match RawDuration::deserialize(deserializer)? {
            RawDuration::Seconds(secs) => Ok(Duration::from_secs(secs)),
            RawDuration::Fractional(secs) => super::seconds(secs)
                .ok_or_else(|| serde::de::Error::custom(format!("Invalid duration: {}", secs))),
            RawDuration::Text(s) => super::parse_duration(&s).map_err(serde::de::Error::custom),
        }
    }
}
