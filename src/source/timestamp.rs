use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TimestampError {
    #[error("unsupported log format '{0}'")]
    UnsupportedFormat(String),

    #[error("failed to parse timestamp '{value}' with format '{format}': {source}")]
    ParseError {
        value: String,
        format: LogFormat,
        #[source]
        source: chrono::ParseError,
    },

    #[error("am/pm marker must be lowercase in '{value}'")]
    MeridiemCase { value: String },
}

/// The timestamp grammars a configured file can be tagged with.
///
/// Each variant owns one fixed layout. Adding a grammar means adding a
/// variant, its tag in [`LogFormat::from_tag`] and its layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// `Feb 1, 2018 at 3:04:05pm (UTC)`
    FirstFormat,
    /// `2018-02-01T15:04:05Z`
    SecondFormat,
}

impl LogFormat {
    pub const ALL: [LogFormat; 2] = [LogFormat::FirstFormat, LogFormat::SecondFormat];

    /// Resolve a configured format tag
    pub fn from_tag(tag: &str) -> Result<Self, TimestampError> {
        match tag {
            "first_format" => Ok(LogFormat::FirstFormat),
            "second_format" => Ok(LogFormat::SecondFormat),
            other => Err(TimestampError::UnsupportedFormat(other.to_string())),
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            LogFormat::FirstFormat => "first_format",
            LogFormat::SecondFormat => "second_format",
        }
    }

    /// strftime layout used for both parsing and rendering
    pub fn layout(&self) -> &'static str {
        match self {
            LogFormat::FirstFormat => "%b %-d, %Y at %-I:%M:%S%P (UTC)",
            LogFormat::SecondFormat => "%Y-%m-%dT%H:%M:%SZ",
        }
    }

    /// Parse a timestamp field strictly under this layout.
    ///
    /// Both layouts describe UTC wall-clock time, so the naive value is
    /// pinned to UTC. Trailing input and out-of-range fields are rejected.
    pub fn parse(&self, value: &str) -> Result<DateTime<Utc>, TimestampError> {
        if *self == LogFormat::FirstFormat {
            check_meridiem_case(value)?;
        }

        NaiveDateTime::parse_from_str(value, self.layout())
            .map(|ndt| Utc.from_utc_datetime(&ndt))
            .map_err(|e| TimestampError::ParseError {
                value: value.to_string(),
                format: *self,
                source: e,
            })
    }

    pub fn render(&self, timestamp: &DateTime<Utc>) -> String {
        timestamp.format(self.layout()).to_string()
    }
}

/// chrono matches `%P` case-insensitively; the layout only allows `am`/`pm`
fn check_meridiem_case(value: &str) -> Result<(), TimestampError> {
    let marker = value
        .strip_suffix(" (UTC)")
        .and_then(|head| head.get(head.len().saturating_sub(2)..));

    match marker {
        Some(m) if m.eq_ignore_ascii_case("am") || m.eq_ignore_ascii_case("pm") => {
            if m == "am" || m == "pm" {
                Ok(())
            } else {
                Err(TimestampError::MeridiemCase {
                    value: value.to_string(),
                })
            }
        }
        _ => Ok(()),
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}
