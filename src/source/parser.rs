use crate::source::record::Record;
use crate::source::timestamp::{LogFormat, TimestampError};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Separator between the timestamp field and the message
pub const FIELD_SEPARATOR: &str = " | ";

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{}: line {line_number} has no ' | ' separator: {line:?}", .path.display())]
    MalformedLine {
        path: PathBuf,
        line_number: u64,
        line: String,
    },

    #[error("unsupported log format '{0}'")]
    UnsupportedFormat(String),

    #[error(transparent)]
    TimeParse(TimestampError),
}

impl From<TimestampError> for ParseError {
    fn from(err: TimestampError) -> Self {
        match err {
            TimestampError::UnsupportedFormat(tag) => ParseError::UnsupportedFormat(tag),
            other => ParseError::TimeParse(other),
        }
    }
}

/// Parse one raw line from `source_file` into a [`Record`].
///
/// The line is `<timestamp> | <message>`. Everything after the first
/// separator is the message, so separators inside the message survive.
/// The format tag is resolved for every line; an unknown tag fails the line
/// rather than the watcher.
pub fn parse_line(
    source_file: &Path,
    raw_line: &str,
    format_tag: &str,
    line_number: u64,
) -> Result<Record, ParseError> {
    let Some((timestamp_field, message)) = raw_line.split_once(FIELD_SEPARATOR) else {
        return Err(ParseError::MalformedLine {
            path: source_file.to_path_buf(),
            line_number,
            line: raw_line.to_string(),
        });
    };

    let format = LogFormat::from_tag(format_tag)?;
    let timestamp = format.parse(timestamp_field)?;

    Ok(Record {
        timestamp,
        message: message.to_string(),
        source_file: source_file.to_path_buf(),
        format,
    })
}
