//! Heuristic parser for heterogeneous telecom log lines.
//!
//! A line is matched against an ordered list of vendor formats; the first
//! matcher that accepts the line decides its decomposition into timestamp,
//! level, component, and message. Lines no format accepts become a
//! [`LogRecord`] carrying only the message, so parsing never fails.
//!
//! # Formats (priority order)
//!
//! | Name | Shape |
//! |------|-------|
//! | `ericsson` | `2024-03-01 10:00:00 INFO com.ericsson.rnc.Cell message` |
//! | `iso` | `2024-03-01T10:00:00Z ERROR [SCTP] message` |
//! | `nokia` | `2024/03/01 10:00:00 WARN [bts-7] message` |
//! | `huawei` | `Mar  1 2024 10:00:00 RNC01 %%01SHELL/5/LOGIN(s): message` |
//! | `cisco` | `*Mar  1 10:00:00.123: %LINK-3-UPDOWN: message` |
//! | `syslog` | `Mar  1 10:00:00 gw-2 message` |
//!
//! The formats are anchored and structurally distinct, so in practice at
//! most one accepts a given line; the order only settles the rare overlap
//! between `ericsson` and `iso`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::models::LogRecord;

const LEVELS: &str =
    "TRACE|DEBUG|INFO|NOTICE|WARNING|WARN|ERROR|ERR|CRITICAL|CRIT|FATAL|ALERT|EMERG|MAJOR|MINOR";

static ERICSSON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}(?:[.,]\d+)?)\s+([A-Z]+)\s+([A-Za-z_]\w*(?:\.\w+)+)\s+(.*)$",
    )
    .expect("static regex")
});

static ISO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^(\d{{4}}-\d{{2}}-\d{{2}}[T ]\d{{2}}:\d{{2}}:\d{{2}}(?:[.,]\d+)?(?:Z|[+-]\d{{2}}:?\d{{2}})?)(?:\s+(?:({LEVELS}):?\s+)?(?:\[([^\]]+)\]:?\s*)?(.*))?$"
    ))
    .expect("static regex")
});

static NOKIA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^(\d{{4}}/\d{{2}}/\d{{2}}\s+\d{{2}}:\d{{2}}:\d{{2}}(?:\.\d+)?)(?:\s+(?:({LEVELS}):?\s+)?(?:\[([\w-]+)\]:?\s*)?(.*))?$"
    ))
    .expect("static regex")
});

static HUAWEI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^([A-Z][a-z]{2}\s+\d{1,2}\s+\d{4}\s+\d{2}:\d{2}:\d{2}(?:\.\d+)?)\s+\S+\s+%%\d{2}([A-Z0-9_]+)/(\d)/[A-Za-z0-9_]+[^:]*:\s*(.*)$",
    )
    .expect("static regex")
});

static CISCO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\*?([A-Z][a-z]{2}\s+\d{1,2}\s+\d{2}:\d{2}:\d{2}(?:\.\d+)?):?\s+(?:\S+:?\s+)??%([A-Z0-9_]+)-(\d)-[A-Z0-9_]+:\s*(.*)$",
    )
    .expect("static regex")
});

static SYSLOG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Z][a-z]{2}\s+\d{1,2}\s+\d{2}:\d{2}:\d{2}(?:\.\d+)?)\s+(\S+?):?\s+(.*)$")
        .expect("static regex")
});

/// Timestamp token anywhere in a line (used by the validator).
static TIMESTAMP_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d{4}[-/]\d{2}[-/]\d{2}[T ]\d{2}:\d{2}:\d{2}|[A-Za-z]+\s+\d+\s+\d{2}:\d{2}:\d{2}")
        .expect("static regex")
});

/// Timestamp at the start of a line (used by the segmenter).
static LEADING_TIMESTAMP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*\*?(?:\d{4}[-/]\d{2}[-/]\d{2}[T ]\d{2}:\d{2}:\d{2}|[A-Z][a-z]{2}\s+\d{1,2}\s+(?:\d{4}\s+)?\d{2}:\d{2}:\d{2})",
    )
    .expect("static regex")
});

/// Fields a format matcher extracted from one line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Fields {
    pub timestamp: Option<String>,
    pub level: Option<String>,
    pub component: Option<String>,
    pub message: String,
}

/// Outcome of matching one line against the format list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineMatch<'a> {
    Matched { format: &'static str, fields: Fields },
    Unmatched { raw: &'a str },
}

/// A named, pure line matcher.
pub struct LogFormat {
    pub name: &'static str,
    pub matcher: fn(&str) -> Option<Fields>,
}

/// All known formats, in priority order.
pub static FORMATS: &[LogFormat] = &[
    LogFormat {
        name: "ericsson",
        matcher: match_ericsson,
    },
    LogFormat {
        name: "iso",
        matcher: match_iso,
    },
    LogFormat {
        name: "nokia",
        matcher: match_nokia,
    },
    LogFormat {
        name: "huawei",
        matcher: match_huawei,
    },
    LogFormat {
        name: "cisco",
        matcher: match_cisco,
    },
    LogFormat {
        name: "syslog",
        matcher: match_syslog,
    },
];

fn group(caps: &regex::Captures<'_>, i: usize) -> Option<String> {
    caps.get(i)
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn message(caps: &regex::Captures<'_>, i: usize) -> String {
    caps.get(i)
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

/// Map a syslog severity digit to a level name.
fn syslog_level(digit: &str) -> Option<String> {
    let name = match digit {
        "0" => "EMERG",
        "1" => "ALERT",
        "2" => "CRIT",
        "3" => "ERROR",
        "4" => "WARNING",
        "5" => "NOTICE",
        "6" => "INFO",
        "7" => "DEBUG",
        _ => return None,
    };
    Some(name.to_string())
}

fn match_ericsson(line: &str) -> Option<Fields> {
    let caps = ERICSSON.captures(line)?;
    Some(Fields {
        timestamp: group(&caps, 1),
        level: group(&caps, 2),
        component: group(&caps, 3),
        message: message(&caps, 4),
    })
}

fn match_iso(line: &str) -> Option<Fields> {
    let caps = ISO.captures(line)?;
    Some(Fields {
        timestamp: group(&caps, 1),
        level: group(&caps, 2),
        component: group(&caps, 3),
        message: message(&caps, 4),
    })
}

fn match_nokia(line: &str) -> Option<Fields> {
    let caps = NOKIA.captures(line)?;
    Some(Fields {
        timestamp: group(&caps, 1),
        level: group(&caps, 2),
        component: group(&caps, 3),
        message: message(&caps, 4),
    })
}

fn match_huawei(line: &str) -> Option<Fields> {
    let caps = HUAWEI.captures(line)?;
    Some(Fields {
        timestamp: group(&caps, 1),
        level: caps.get(3).and_then(|m| syslog_level(m.as_str())),
        component: group(&caps, 2),
        message: message(&caps, 4),
    })
}

fn match_cisco(line: &str) -> Option<Fields> {
    let caps = CISCO.captures(line)?;
    Some(Fields {
        timestamp: group(&caps, 1),
        level: caps.get(3).and_then(|m| syslog_level(m.as_str())),
        component: group(&caps, 2),
        message: message(&caps, 4),
    })
}

fn match_syslog(line: &str) -> Option<Fields> {
    let caps = SYSLOG.captures(line)?;
    Some(Fields {
        timestamp: group(&caps, 1),
        level: None,
        component: group(&caps, 2),
        message: message(&caps, 3),
    })
}

/// Match `line` against [`FORMATS`]; the first accepting format wins.
pub fn match_line(line: &str) -> LineMatch<'_> {
    for format in FORMATS {
        if let Some(fields) = (format.matcher)(line) {
            return LineMatch::Matched {
                format: format.name,
                fields,
            };
        }
    }
    LineMatch::Unmatched { raw: line }
}

/// Parse one line into a [`LogRecord`]. Never fails.
///
/// The message is the original line whenever no format matches or the
/// matched format leaves the message empty, so it is non-empty for every
/// non-empty input.
pub fn parse_line(line: &str) -> LogRecord {
    match match_line(line) {
        LineMatch::Matched { format, fields } => {
            let message = if fields.message.is_empty() {
                line.to_string()
            } else {
                fields.message
            };
            LogRecord {
                text: line.to_string(),
                timestamp: fields.timestamp,
                level: fields.level,
                component: fields.component,
                message,
                format: Some(format),
            }
        }
        LineMatch::Unmatched { raw } => LogRecord {
            text: raw.to_string(),
            timestamp: None,
            level: None,
            component: None,
            message: raw.to_string(),
            format: None,
        },
    }
}

/// Parse every non-blank line of `content`.
pub fn parse_log(content: &str) -> Vec<LogRecord> {
    content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(parse_line)
        .collect()
}

/// A line together with the timestamp its format extracted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimestampedLine {
    pub timestamp: String,
    pub line: String,
}

/// Collect the timestamp of every line whose format yields one.
pub fn extract_timestamps(content: &str) -> Vec<TimestampedLine> {
    content
        .lines()
        .filter_map(|line| match match_line(line) {
            LineMatch::Matched { fields, .. } => fields.timestamp.map(|timestamp| TimestampedLine {
                timestamp,
                line: line.to_string(),
            }),
            LineMatch::Unmatched { .. } => None,
        })
        .collect()
}

/// Whether `line` contains a recognizable timestamp token anywhere.
pub fn has_timestamp(line: &str) -> bool {
    TIMESTAMP_TOKEN.is_match(line)
}

/// Whether `line` begins with a timestamp, i.e. starts a new log record.
pub fn starts_with_timestamp(line: &str) -> bool {
    LEADING_TIMESTAMP.is_match(line)
}
