//! Date handling shared by the codecs
//!
//! Spreadsheets store dates as serial day numbers and mark them through a
//! number format. This module converts serials to and from
//! `chrono::NaiveDateTime`, recognises date number formats, and translates
//! the `yyyy-MM-dd HH:mm:ss` style patterns accepted by the writer into
//! Excel format codes and `chrono` strftime strings.

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

/// Pattern used when a date is written without an explicit one
pub const DEFAULT_DATE_PATTERN: &str = "yyyy-MM-dd HH:mm:ss";

const MILLIS_PER_DAY: f64 = 86_400_000.0;
/// Serial of 9999-12-31, the last date Excel can display
const MAX_SERIAL: f64 = 2_958_466.0;

fn epoch(date1904: bool) -> NaiveDateTime {
    let (y, m, d) = if date1904 { (1904, 1, 1) } else { (1899, 12, 30) };
    NaiveDate::from_ymd_opt(y, m, d)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Convert a date to its serial number.
///
/// In the 1900 system serials below 61 are shifted by one day because
/// Excel counts the nonexistent 1900-02-29.
pub fn to_serial(value: NaiveDateTime, date1904: bool) -> f64 {
    let millis = (value - epoch(date1904)).num_milliseconds() as f64;
    let serial = millis / MILLIS_PER_DAY;
    if !date1904 && serial < 61.0 {
        serial - 1.0
    } else {
        serial
    }
}

/// Convert a serial number back to a date, rounding to the millisecond
pub fn from_serial(serial: f64, date1904: bool) -> Option<NaiveDateTime> {
    if !serial.is_finite() || !(0.0..=MAX_SERIAL).contains(&serial) {
        return None;
    }
    let serial = if !date1904 && serial < 61.0 {
        serial + 1.0
    } else {
        serial
    };
    let millis = (serial * MILLIS_PER_DAY).round() as i64;
    epoch(date1904).checked_add_signed(TimeDelta::milliseconds(millis))
}

/// Parse an ISO 8601 date or date-time as found in `t="d"` cells
pub fn parse_iso(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim().trim_end_matches('Z');
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Built-in number format ids that display dates or times
pub fn is_builtin_date_format(id: u32) -> bool {
    matches!(id, 14..=22 | 27..=36 | 45..=47 | 50..=58)
}

/// Whether a number format code displays a date or time.
///
/// Only the first section is inspected. Quoted text, escaped characters,
/// and bracketed colours or locales are skipped, while elapsed-time
/// brackets such as `[h]` count as time.
pub fn is_date_format_code(code: &str) -> bool {
    let mut chars = code.chars();
    let mut in_quote = false;
    while let Some(c) = chars.next() {
        if in_quote {
            if c == '"' {
                in_quote = false;
            }
            continue;
        }
        match c {
            '"' => in_quote = true,
            '\\' | '_' | '*' => {
                chars.next();
            }
            ';' => return false,
            '[' => {
                let inner: String = chars.by_ref().take_while(|&c| c != ']').collect();
                let lower = inner.to_ascii_lowercase();
                if !lower.is_empty() && lower.chars().all(|c| matches!(c, 'h' | 'm' | 's')) {
                    return true;
                }
            }
            'd' | 'D' | 'm' | 'M' | 'y' | 'Y' | 'h' | 'H' | 's' | 'S' => return true,
            _ => {}
        }
    }
    false
}

/// One run of a date pattern
#[derive(Debug, Clone, PartialEq)]
enum Run {
    Field(char, usize),
    Literal(String),
}

/// Split a pattern into letter runs and literal text; `'...'` quotes
/// literal text and `''` is a single quote.
fn pattern_runs(pattern: &str) -> Vec<Run> {
    let mut runs = Vec::new();
    let mut literal = String::new();
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\'' {
            if chars.peek() == Some(&'\'') {
                chars.next();
                literal.push('\'');
                continue;
            }
            for q in chars.by_ref() {
                if q == '\'' {
                    break;
                }
                literal.push(q);
            }
        } else if c.is_ascii_alphabetic() {
            let mut count = 1;
            while chars.peek() == Some(&c) {
                chars.next();
                count += 1;
            }
            if !literal.is_empty() {
                runs.push(Run::Literal(std::mem::take(&mut literal)));
            }
            runs.push(Run::Field(c, count));
        } else {
            literal.push(c);
        }
    }
    if !literal.is_empty() {
        runs.push(Run::Literal(literal));
    }
    runs
}

/// Translate a date pattern into a `chrono` format string
pub fn to_strftime(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() * 2);
    for run in pattern_runs(pattern) {
        match run {
            Run::Literal(text) => out.push_str(&text.replace('%', "%%")),
            Run::Field(c, n) => {
                let spec = match (c, n) {
                    ('y', 2) => "%y",
                    ('y', _) => "%Y",
                    ('M', 1) => "%-m",
                    ('M', 2) => "%m",
                    ('M', 3) => "%b",
                    ('M', _) => "%B",
                    ('d', 1) => "%-d",
                    ('d', _) => "%d",
                    ('H', 1) => "%-H",
                    ('H', _) => "%H",
                    ('h', 1) => "%-I",
                    ('h', _) => "%I",
                    ('m', 1) => "%-M",
                    ('m', _) => "%M",
                    ('s', 1) => "%-S",
                    ('s', _) => "%S",
                    ('S', 1..=3) => "%3f",
                    ('S', 4..=6) => "%6f",
                    ('S', _) => "%9f",
                    ('a', _) => "%p",
                    ('E', 1..=3) => "%a",
                    ('E', _) => "%A",
                    _ => {
                        for _ in 0..n {
                            out.push(c);
                        }
                        continue;
                    }
                };
                out.push_str(spec);
            }
        }
    }
    out
}

/// Translate a date pattern into an Excel number format code
pub fn to_excel_format(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    for run in pattern_runs(pattern) {
        match run {
            Run::Literal(text) => {
                let plain = text
                    .chars()
                    .all(|c| matches!(c, '-' | '/' | ':' | ' ' | '.' | ',' | '(' | ')'));
                if plain {
                    out.push_str(&text);
                } else {
                    out.push('"');
                    out.push_str(&text.replace('"', ""));
                    out.push('"');
                }
            }
            Run::Field(c, n) => match c {
                'y' => out.push_str(if n == 2 { "yy" } else { "yyyy" }),
                'M' | 'm' => out.push_str(&"m".repeat(n.min(if c == 'M' { 4 } else { 2 }))),
                'd' => out.push_str(&"d".repeat(n.min(2))),
                'H' | 'h' => out.push_str(&"h".repeat(n.min(2))),
                's' => out.push_str(&"s".repeat(n.min(2))),
                'S' => out.push_str(&"0".repeat(n.min(3))),
                'a' => out.push_str("AM/PM"),
                'E' => out.push_str(if n <= 3 { "ddd" } else { "dddd" }),
                other => {
                    out.push('"');
                    out.extend(std::iter::repeat(other).take(n));
                    out.push('"');
                }
            },
        }
    }
    out
}

/// Format a date for text output such as CSV
pub fn format_date(value: &NaiveDateTime, pattern: &str) -> String {
    value.format(&to_strftime(pattern)).to_string()
}
