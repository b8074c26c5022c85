/// Time layouts for timed hash fields
///
/// Values are written as RFC 3339 in UTC (`Z` suffix, fractional seconds
/// only when non-zero). Readers choose how strictly to parse them.
///
/// Layouts written against Go's reference time (`2006-01-02T15:04:05Z07:00`)
/// are not `strftime` formats. Convert them with [`TimeLayout::from_go`]
/// before parsing.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};

/// How to parse a stored timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeLayout {
    /// Any RFC 3339 timestamp
    Rfc3339,

    /// A chrono `strftime` format
    ///
    /// Formats without an offset specifier are read as UTC. A Go reference
    /// layout placed here is matched literally and fails to parse.
    Format(String),
}

/// Go reference-time tokens and their `strftime` equivalents
///
/// Ordered so that a token always precedes any token it starts with.
const GO_TOKENS: &[(&str, &str)] = &[
    ("January", "%B"),
    ("Jan", "%b"),
    ("Monday", "%A"),
    ("Mon", "%a"),
    ("2006", "%Y"),
    ("Z07:00", "%:z"),
    ("Z0700", "%z"),
    ("-07:00", "%:z"),
    ("-0700", "%z"),
    (".000000000", "%.9f"),
    (".000000", "%.6f"),
    (".000", "%.3f"),
    (".999999999", "%.f"),
    (".999999", "%.f"),
    (".999", "%.f"),
    ("15", "%H"),
    ("01", "%m"),
    ("02", "%d"),
    ("_2", "%e"),
    ("03", "%I"),
    ("04", "%M"),
    ("05", "%S"),
    ("06", "%y"),
    ("PM", "%p"),
];

const GO_RFC3339: &str = "2006-01-02T15:04:05Z07:00";
const GO_RFC3339_NANO: &str = "2006-01-02T15:04:05.999999999Z07:00";

impl TimeLayout {
    /// Layout from a `strftime` format string
    pub fn format(fmt: impl Into<String>) -> Self {
        TimeLayout::Format(fmt.into())
    }

    /// Layout from a Go reference-time layout
    ///
    /// Go's RFC 3339 layouts map to [`TimeLayout::Rfc3339`]. Elsewhere a
    /// `Z07:00` offset becomes `%:z`, which requires a numeric offset. Text
    /// that is not a known token, including a lone `Z`, is kept literally.
    pub fn from_go(layout: &str) -> Self {
        if layout == GO_RFC3339 || layout == GO_RFC3339_NANO {
            return TimeLayout::Rfc3339;
        }

        let mut fmt = String::with_capacity(layout.len() + 8);
        let mut rest = layout;
        while let Some(c) = rest.chars().next() {
            match GO_TOKENS.iter().find(|(go, _)| rest.starts_with(go)) {
                Some((go, spec)) => {
                    fmt.push_str(spec);
                    rest = &rest[go.len()..];
                }
                None => {
                    if c == '%' {
                        fmt.push_str("%%");
                    } else {
                        fmt.push(c);
                    }
                    rest = &rest[c.len_utf8()..];
                }
            }
        }
        TimeLayout::Format(fmt)
    }

    /// Parses `value` under this layout
    pub fn parse(&self, value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        match self {
            TimeLayout::Rfc3339 => {
                DateTime::parse_from_rfc3339(value).map(|t| t.with_timezone(&Utc))
            }
            TimeLayout::Format(fmt) => match DateTime::parse_from_str(value, fmt) {
                Ok(t) => Ok(t.with_timezone(&Utc)),
                Err(_) => NaiveDateTime::parse_from_str(value, fmt)
                    .map(|naive| Utc.from_utc_datetime(&naive)),
            },
        }
    }
}

/// Text form written to the store
pub fn format_timestamp(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
