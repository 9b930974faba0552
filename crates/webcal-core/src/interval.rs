//! ISO-8601 refresh interval parsing.
//!
//! Subscription refresh rates arrive as ISO-8601 durations (`P1D`,
//! `PT1H30M`, `P2W`). [`RefreshInterval`] validates the text once and keeps
//! both the canonical string (for storage round-trips) and the resolved
//! [`chrono::Duration`].

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::Duration;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a refresh interval fails to parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid ISO-8601 duration: {input:?}")]
pub struct IntervalParseError {
    /// The rejected input.
    pub input: String,
}

/// A validated ISO-8601 refresh interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RefreshInterval {
    canonical: String,
    seconds: i64,
}

fn duration_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^P(?:(?P<weeks>\d+)W|(?:(?P<days>\d+)D)?(?:T(?:(?P<hours>\d+)H)?(?:(?P<minutes>\d+)M)?(?:(?P<seconds>\d+)S)?)?)$",
        )
        .expect("duration pattern is valid")
    })
}

impl RefreshInterval {
    /// The default refresh interval for new subscriptions: one week.
    pub const DEFAULT: &'static str = "P1W";

    /// Parses an ISO-8601 duration string.
    ///
    /// # Errors
    ///
    /// Returns [`IntervalParseError`] if the input is not a valid duration
    /// or resolves to zero (a zero interval would refresh continuously).
    pub fn parse(input: &str) -> Result<Self, IntervalParseError> {
        let reject = || IntervalParseError {
            input: input.to_string(),
        };

        let captures = duration_pattern().captures(input).ok_or_else(reject)?;

        let field = |name: &str| -> i64 {
            captures
                .name(name)
                .and_then(|m| m.as_str().parse::<i64>().ok())
                .unwrap_or(0)
        };

        let seconds = field("weeks") * 7 * 86_400
            + field("days") * 86_400
            + field("hours") * 3_600
            + field("minutes") * 60
            + field("seconds");

        if seconds == 0 {
            return Err(reject());
        }

        Ok(Self {
            canonical: input.to_string(),
            seconds,
        })
    }

    /// Returns the interval as a [`chrono::Duration`].
    pub fn as_duration(&self) -> Duration {
        Duration::seconds(self.seconds)
    }

    /// Returns the canonical ISO-8601 text.
    pub fn as_str(&self) -> &str {
        &self.canonical
    }
}

impl Default for RefreshInterval {
    fn default() -> Self {
        Self::parse(Self::DEFAULT).expect("default interval is valid")
    }
}

impl fmt::Display for RefreshInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl FromStr for RefreshInterval {
    type Err = IntervalParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RefreshInterval {
    type Error = IntervalParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RefreshInterval> for String {
    fn from(value: RefreshInterval) -> Self {
        value.canonical
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_durations() {
        assert_eq!(
            RefreshInterval::parse("P1D").unwrap().as_duration(),
            Duration::days(1)
        );
        assert_eq!(
            RefreshInterval::parse("PT1H").unwrap().as_duration(),
            Duration::hours(1)
        );
        assert_eq!(
            RefreshInterval::parse("P1W").unwrap().as_duration(),
            Duration::weeks(1)
        );
    }

    #[test]
    fn parses_compound_duration() {
        let interval = RefreshInterval::parse("P2DT3H30M15S").unwrap();
        let expected =
            Duration::days(2) + Duration::hours(3) + Duration::minutes(30) + Duration::seconds(15);
        assert_eq!(interval.as_duration(), expected);
    }

    #[test]
    fn rejects_garbage() {
        assert!(RefreshInterval::parse("").is_err());
        assert!(RefreshInterval::parse("1 week").is_err());
        assert!(RefreshInterval::parse("P").is_err());
        assert!(RefreshInterval::parse("PT").is_err());
        assert!(RefreshInterval::parse("P1X").is_err());
        // Weeks cannot combine with other designators.
        assert!(RefreshInterval::parse("P1W1D").is_err());
    }

    #[test]
    fn rejects_zero() {
        assert!(RefreshInterval::parse("PT0S").is_err());
        assert!(RefreshInterval::parse("P0D").is_err());
    }

    #[test]
    fn display_round_trips() {
        let interval = RefreshInterval::parse("PT1H30M").unwrap();
        assert_eq!(interval.to_string(), "PT1H30M");
        assert_eq!(
            RefreshInterval::parse(&interval.to_string()).unwrap(),
            interval
        );
    }

    #[test]
    fn default_is_one_week() {
        let interval = RefreshInterval::default();
        assert_eq!(interval.as_str(), "P1W");
        assert_eq!(interval.as_duration(), Duration::weeks(1));
    }

    #[test]
    fn serde_round_trips_as_string() {
        let interval = RefreshInterval::parse("P3D").unwrap();
        let json = serde_json::to_string(&interval).unwrap();
        assert_eq!(json, "\"P3D\"");
        let parsed: RefreshInterval = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, interval);
    }

    #[test]
    fn serde_rejects_invalid_string() {
        let result: Result<RefreshInterval, _> = serde_json::from_str("\"tomorrow\"");
        assert!(result.is_err());
    }
}
