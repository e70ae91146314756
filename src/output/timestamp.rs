//! Unix-epoch timestamps as masscan writes them in its XML report

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Layout used when a timestamp is shown to a person
pub const HUMAN_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A second-resolution point in time stored in the report as decimal
/// Unix seconds (`start="1700000000"`).
///
/// Formatting with `Display` gives back the decimal string, so a value read
/// from a report writes out identically. Parsing accepts only that canonical
/// form (no sign, no leading zeros); surrounding whitespace is ignored. Values that fail to parse are kept
/// as the zero timestamp (the Unix epoch) instead of failing the decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(DateTime<Utc>);

/// Returned by `Timestamp::from_str` for values that are not Unix seconds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTimestamp(pub String);

impl fmt::Display for InvalidTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid unix timestamp: {:?}", self.0)
    }
}

impl std::error::Error for InvalidTimestamp {}

impl Timestamp {
    /// Build from whole Unix seconds; out-of-range values give the zero timestamp
    pub fn from_unix(secs: i64) -> Self {
        DateTime::<Utc>::from_timestamp(secs, 0).map(Self).unwrap_or_default()
    }

    /// Parse, falling back to the zero timestamp on malformed input
    pub fn parse_lossy(value: &str) -> Self {
        value.parse().unwrap_or_default()
    }

    pub fn unix(&self) -> i64 {
        self.0.timestamp()
    }

    pub fn is_zero(&self) -> bool {
        self.unix() == 0
    }

    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Local-time rendering, e.g. `2023-11-14 22:13:20`
    pub fn human(&self) -> String {
        self.0.with_timezone(&Local).format(HUMAN_FORMAT).to_string()
    }
}

impl FromStr for Timestamp {
    type Err = InvalidTimestamp;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim();
        let secs: i64 = digits
            .parse()
            .map_err(|_| InvalidTimestamp(s.to_string()))?;
        // Only the canonical decimal form, so Display gives the same digits back
        if secs.to_string() != digits {
            return Err(InvalidTimestamp(s.to_string()));
        }
        DateTime::<Utc>::from_timestamp(secs, 0)
            .map(Self)
            .ok_or_else(|| InvalidTimestamp(s.to_string()))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.unix())
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::from_unix(dt.timestamp())
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse_lossy(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_decimal_string() {
        let ts: Timestamp = "1700000000".parse().unwrap();
        assert_eq!(ts.unix(), 1_700_000_000);
        assert_eq!(ts.to_string(), "1700000000");
    }

    #[test]
    fn test_malformed_is_zero() {
        assert!("yesterday".parse::<Timestamp>().is_err());
        assert!(Timestamp::parse_lossy("yesterday").is_zero());
        assert!(Timestamp::parse_lossy("").is_zero());
        assert_eq!(Timestamp::parse_lossy("12.5").to_string(), "0");
    }

    #[test]
    fn test_non_canonical_digits_rejected() {
        assert!("01700000000".parse::<Timestamp>().is_err());
        assert!("+1700000000".parse::<Timestamp>().is_err());
        assert!("-0".parse::<Timestamp>().is_err());
        assert_eq!("0".parse::<Timestamp>().unwrap().to_string(), "0");
        assert!(Timestamp::parse_lossy("01700000000").is_zero());
    }

    #[test]
    fn test_surrounding_whitespace_tolerated() {
        assert_eq!(Timestamp::parse_lossy(" 1700000000 ").unix(), 1_700_000_000);
    }

    #[test]
    fn test_serde_uses_decimal_string() {
        let ts = Timestamp::from_unix(1_700_000_000);
        assert_eq!(serde_json::to_string(&ts).unwrap(), "\"1700000000\"");

        let back: Timestamp = serde_json::from_str("\"1700000000\"").unwrap();
        assert_eq!(back, ts);

        let bad: Timestamp = serde_json::from_str("\"not-a-time\"").unwrap();
        assert!(bad.is_zero());
    }

    #[test]
    fn test_human_format_shape() {
        let rendered = Timestamp::from_unix(1_700_000_000).human();
        assert_eq!(rendered.len(), "2023-11-14 22:13:20".len());
        assert!(rendered.starts_with("2023-11-1"));
    }
}
