//! Serde helper: `Duration` as whole milliseconds.
//!
//! Use with `#[serde(with = "drawhall_protocol::duration_ms")]`. Config
//! files read better as `"draw_interval": 4000` than as
//! `{"secs": 4, "nanos": 0}`.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Wrapper {
        #[serde(with = "crate::duration_ms")]
        grace: Duration,
    }

    #[test]
    fn test_duration_written_as_millis() {
        let w = Wrapper {
            grace: Duration::from_secs(30),
        };
        assert_eq!(serde_json::to_string(&w).unwrap(), r#"{"grace":30000}"#);
    }

    #[test]
    fn test_duration_read_from_millis() {
        let w: Wrapper = serde_json::from_str(r#"{"grace":1500}"#).unwrap();
        assert_eq!(w.grace, Duration::from_millis(1500));
    }
}
