//! Normalization of locale time strings into canonical 24-hour `HH:MM:SS`.
//!
//! Kiosk databases store the time of day as whatever the Windows locale produced
//! when the row was written: `9:32:18 p. m.`, `12:15 p.m.`, `21:32`, and so on.
//! Each candidate format is an explicit parse attempt; the first success wins and
//! exhausting the list yields [`TimeParse::Unparsed`].

use chrono::{NaiveTime, Timelike};

/// Substrings stripped before parsing, in the order they are removed.
const MERIDIEM_MARKERS: [&str; 5] = ["p.", "m.", "a.", "am", "pm"];

/// Formats tried in order. 12-hour parsing reuses these and range-checks the hour.
const TIME_FORMATS: [&str; 2] = ["%H:%M:%S", "%H:%M"];

const CANONICAL_FORMAT: &str = "%H:%M:%S";

/// Meridiem marker detected in a time string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Meridiem {
    Am,
    Pm,
}

/// Result of parsing a time string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeParse {
    /// The string matched one of the known formats.
    Parsed(NaiveTime),
    /// No candidate format matched.
    Unparsed,
}

/// Normalizes a time string to `HH:MM:SS`.
///
/// Returns `None` for missing or blank input. Input that cannot be parsed is
/// returned verbatim so the backend rejects it with a visible value.
pub fn normalize_time(input: Option<&str>) -> Option<String> {
    let raw = input?;
    if raw.trim().is_empty() {
        return None;
    }
    match parse_time(raw) {
        TimeParse::Parsed(time) => Some(time.format(CANONICAL_FORMAT).to_string()),
        TimeParse::Unparsed => Some(raw.to_string()),
    }
}

/// Parses a 12-hour or 24-hour time string.
pub fn parse_time(raw: &str) -> TimeParse {
    let lowered = raw.trim().to_lowercase();
    let meridiem = detect_meridiem(&lowered);
    let digits = strip_meridiem(&lowered);

    TIME_FORMATS
        .iter()
        .find_map(|format| attempt(&digits, format, meridiem))
        .map_or(TimeParse::Unparsed, TimeParse::Parsed)
}

/// Detects a meridiem marker. `None` means the string is treated as 24-hour.
pub fn detect_meridiem(lowered: &str) -> Option<Meridiem> {
    if lowered.contains("p.") && lowered.contains("m.") {
        Some(Meridiem::Pm)
    } else if lowered.contains("a.") && lowered.contains("m.") {
        Some(Meridiem::Am)
    } else if lowered.contains("pm") {
        Some(Meridiem::Pm)
    } else if lowered.contains("am") {
        Some(Meridiem::Am)
    } else {
        None
    }
}

fn strip_meridiem(lowered: &str) -> String {
    MERIDIEM_MARKERS
        .iter()
        .fold(lowered.to_string(), |acc, marker| acc.replace(marker, ""))
        .trim()
        .to_string()
}

/// One parse attempt. `None` means "try the next format".
fn attempt(digits: &str, format: &str, meridiem: Option<Meridiem>) -> Option<NaiveTime> {
    let parsed = NaiveTime::parse_from_str(digits, format).ok()?;
    let Some(meridiem) = meridiem else {
        return Some(parsed);
    };

    // 12-hour clock: hours run 1..=12
    let hour = parsed.hour();
    if !(1..=12).contains(&hour) {
        return None;
    }
    let adjusted = match (meridiem, hour) {
        (Meridiem::Pm, 12) => 12,
        (Meridiem::Pm, h) => h + 12,
        (Meridiem::Am, 12) => 0,
        (Meridiem::Am, h) => h,
    };
    parsed.with_hour(adjusted)
}
