//! Line grammar of benchmark timing logs.
//!
//! Each line is `key:value[ trailing text]`. The key `count` carries the
//! number of benchmark cases the process completed; any other key names a
//! timing metric whose value is the first whitespace-delimited token after
//! the colon, e.g. `Average encrypt: 1834 microseconds`. Only an exact
//! `count` key counts cases; `count :5` is a metric like any other.

use std::fmt;

pub const COUNT_KEY: &str = "count";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogLine<'a> {
    Blank,
    Count(u64),
    Metric { name: &'a str, value: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineError {
    MissingSeparator,
    EmptyKey,
    MissingValue,
    InvalidInteger(String),
    InvalidUtf8,
}

impl fmt::Display for LineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineError::MissingSeparator => write!(f, "missing ':' separator"),
            LineError::EmptyKey => write!(f, "empty metric name"),
            LineError::MissingValue => write!(f, "missing value after ':'"),
            LineError::InvalidInteger(token) => {
                write!(f, "{token:?} is not a non-negative integer")
            }
            LineError::InvalidUtf8 => write!(f, "line is not valid UTF-8"),
        }
    }
}

impl std::error::Error for LineError {}

/// Classify one line. The line is split on its first `:`.
pub fn parse_line(line: &str) -> Result<LogLine<'_>, LineError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(LogLine::Blank);
    }

    let (raw_key, rest) = line.split_once(':').ok_or(LineError::MissingSeparator)?;
    let key = raw_key.trim();
    if key.is_empty() {
        return Err(LineError::EmptyKey);
    }

    if raw_key == COUNT_KEY {
        let value = rest.trim();
        if value.is_empty() {
            return Err(LineError::MissingValue);
        }
        return parse_integer(value).map(LogLine::Count);
    }

    let token = rest.split_whitespace().next().ok_or(LineError::MissingValue)?;
    let value = parse_integer(token)?;
    Ok(LogLine::Metric { name: key, value })
}

fn parse_integer(token: &str) -> Result<u64, LineError> {
    token
        .parse()
        .map_err(|_| LineError::InvalidInteger(token.to_string()))
}
