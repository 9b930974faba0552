//! iCalendar (RFC 5545) text parsing and serialization.
//!
//! The parser lifts iCalendar text into the canonical
//! [`CalendarDocument`](crate::model::CalendarDocument); the serializer
//! writes any document back out as iCalendar text. Together they make the
//! iCalendar→iCalendar path an identity transform on the component set.

mod parse;
mod serialize;

pub use parse::parse_ical;
pub use serialize::{PRODID, serialize_ical};

use thiserror::Error;

/// An error produced while parsing iCalendar text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IcalParseError {
    /// The input does not start with `BEGIN:VCALENDAR`.
    #[error("not a calendar: missing BEGIN:VCALENDAR")]
    MissingCalendar,

    /// A content line did not match the NAME;PARAMS:VALUE grammar.
    #[error("line {line}: malformed content line")]
    MalformedLine {
        /// 1-based logical line number (after unfolding).
        line: usize,
    },

    /// An END line closed a component that was not open.
    #[error("line {line}: unexpected END:{found}, expected END:{expected}")]
    MismatchedEnd {
        /// 1-based logical line number.
        line: usize,
        /// The component the END line names.
        found: String,
        /// The component that was open.
        expected: String,
    },

    /// The input ended inside an open component.
    #[error("unexpected end of input inside {component}")]
    UnexpectedEof {
        /// The component still open at EOF.
        component: String,
    },
}

/// Escapes a logical text value into iCalendar raw form.
///
/// Backslash, semicolon, comma and newline get backslash escapes.
pub fn escape_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            _ => out.push(ch),
        }
    }
    out
}

/// Unescapes iCalendar raw text into its logical form.
pub fn unescape_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
