//! Format normalization.
//!
//! Whatever wire format a feed arrives in, the cache only ever stores
//! iCalendar text. [`normalize_feed`] parses the payload according to its
//! declared format, applies the subscription's strip rules and
//! re-serializes.

use tracing::debug;
use webcal_core::StripRules;

use crate::error::NormalizeError;
use crate::ical::{parse_ical, serialize_ical};
use crate::jcal::parse_jcal;
use crate::model::CalendarDocument;
use crate::xcal::parse_xcal;

/// The wire format of a fetched feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedFormat {
    /// `text/calendar` (RFC 5545).
    ICalendar,
    /// `application/calendar+json` (RFC 7265).
    JCal,
    /// `application/calendar+xml` (RFC 6321).
    XCal,
}

impl FeedFormat {
    /// Selects the format from a `Content-Type` header value.
    ///
    /// Matching is by media-type prefix, so charset and other parameters
    /// are ignored. Unknown types fall back to iCalendar, which keeps
    /// feeds served as `text/plain` or `application/octet-stream`
    /// working.
    pub fn from_content_type(content_type: &str) -> Self {
        let media_type = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();

        match media_type.as_str() {
            "application/calendar+json" => Self::JCal,
            "application/calendar+xml" => Self::XCal,
            _ => Self::ICalendar,
        }
    }

    /// Returns the canonical media type.
    pub fn media_type(&self) -> &'static str {
        match self {
            Self::ICalendar => "text/calendar",
            Self::JCal => "application/calendar+json",
            Self::XCal => "application/calendar+xml",
        }
    }
}

/// The result of normalizing one fetched feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedFeed {
    /// The iCalendar serialization to store.
    pub calendar_data: String,
    /// The format the payload arrived in.
    pub source_format: FeedFormat,
    /// Number of event/todo/journal components after stripping.
    pub component_count: usize,
}

impl NormalizedFeed {
    /// Returns true when stripping left no calendar instances.
    pub fn is_empty(&self) -> bool {
        self.component_count == 0
    }
}

/// Parses `body` as `format`, applies `rules` and serializes to
/// iCalendar text.
///
/// There is no cross-format fallback: a payload that does not parse as
/// its declared format is an error, and the caller keeps the previously
/// cached objects.
///
/// # Errors
///
/// Returns the format-specific [`NormalizeError`].
pub fn normalize_feed(
    body: &str,
    format: FeedFormat,
    rules: &StripRules,
) -> Result<NormalizedFeed, NormalizeError> {
    let mut doc: CalendarDocument = match format {
        FeedFormat::ICalendar => parse_ical(body)?,
        FeedFormat::JCal => parse_jcal(body)?,
        FeedFormat::XCal => parse_xcal(body)?,
    };

    crate::strip::apply_strip_rules(&mut doc, rules);

    let component_count = doc.instance_count();
    debug!(
        format = ?format,
        components = component_count,
        "Normalized feed"
    );

    Ok(NormalizedFeed {
        calendar_data: serialize_ical(&doc),
        source_format: format,
        component_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ICAL: &str = "BEGIN:VCALENDAR\r\n\
        VERSION:2.0\r\n\
        PRODID:-//Test//Feed//EN\r\n\
        BEGIN:VEVENT\r\n\
        UID:12345\r\n\
        DTSTAMP:20250201T090000Z\r\n\
        DTSTART:20250205T100000Z\r\n\
        SUMMARY:Team Meeting\r\n\
        END:VEVENT\r\n\
        BEGIN:VTODO\r\n\
        UID:todo-1\r\n\
        SUMMARY:Prepare slides\r\n\
        END:VTODO\r\n\
        END:VCALENDAR\r\n";

    #[test]
    fn format_selection_ignores_parameters() {
        assert_eq!(
            FeedFormat::from_content_type("text/calendar; charset=utf-8"),
            FeedFormat::ICalendar
        );
        assert_eq!(
            FeedFormat::from_content_type("application/calendar+json"),
            FeedFormat::JCal
        );
        assert_eq!(
            FeedFormat::from_content_type("APPLICATION/CALENDAR+XML; charset=utf-8"),
            FeedFormat::XCal
        );
    }

    #[test]
    fn unknown_content_types_fall_back_to_icalendar() {
        assert_eq!(
            FeedFormat::from_content_type("text/plain"),
            FeedFormat::ICalendar
        );
        assert_eq!(FeedFormat::from_content_type(""), FeedFormat::ICalendar);
    }

    #[test]
    fn icalendar_input_round_trips() {
        let feed =
            normalize_feed(ICAL, FeedFormat::ICalendar, &StripRules::default()).unwrap();
        assert_eq!(feed.calendar_data, ICAL);
        assert_eq!(feed.component_count, 2);
        assert!(!feed.is_empty());
    }

    #[test]
    fn strip_rules_apply_to_every_format() {
        let rules = StripRules::default().with_todos(true);
        let feed = normalize_feed(ICAL, FeedFormat::ICalendar, &rules).unwrap();
        assert_eq!(feed.component_count, 1);
        assert!(!feed.calendar_data.contains("VTODO"));
    }

    #[test]
    fn stripping_everything_yields_empty_feed() {
        let input = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//T//T//EN\r\n\
            BEGIN:VTODO\r\nUID:t\r\nEND:VTODO\r\nEND:VCALENDAR\r\n";
        let rules = StripRules::default().with_todos(true);
        let feed = normalize_feed(input, FeedFormat::ICalendar, &rules).unwrap();
        assert!(feed.is_empty());
        assert_eq!(feed.component_count, 0);
    }

    #[test]
    fn jcal_input_normalizes_to_icalendar() {
        let body = json!([
            "vcalendar",
            [
                ["version", {}, "text", "2.0"],
                ["prodid", {}, "text", "-//Test//Feed//EN"]
            ],
            [["vevent",
                [
                    ["uid", {}, "text", "12345"],
                    ["dtstart", {}, "date-time", "2025-02-05T10:00:00Z"],
                    ["summary", {}, "text", "Team Meeting"]
                ],
                []]]
        ])
        .to_string();

        let feed = normalize_feed(&body, FeedFormat::JCal, &StripRules::default()).unwrap();
        assert_eq!(feed.source_format, FeedFormat::JCal);
        let text = feed.calendar_data.replace("\r\n", "\n");
        insta::assert_snapshot!(
            text.trim_end(),
            @r"
        BEGIN:VCALENDAR
        VERSION:2.0
        PRODID:-//Test//Feed//EN
        BEGIN:VEVENT
        UID:12345
        DTSTART:20250205T100000Z
        SUMMARY:Team Meeting
        END:VEVENT
        END:VCALENDAR
        "
        );
    }

    #[test]
    fn xcal_input_normalizes_to_icalendar() {
        let body = "<icalendar xmlns=\"urn:ietf:params:xml:ns:icalendar-2.0\">\
            <vcalendar>\
            <properties>\
            <version><text>2.0</text></version>\
            <prodid><text>-//Test//Feed//EN</text></prodid>\
            </properties>\
            <components><vevent><properties>\
            <uid><text>12345</text></uid>\
            <dtstart><date-time>2025-02-05T10:00:00Z</date-time></dtstart>\
            <summary><text>Team Meeting</text></summary>\
            </properties></vevent></components>\
            </vcalendar></icalendar>";

        let feed = normalize_feed(body, FeedFormat::XCal, &StripRules::default()).unwrap();
        assert_eq!(feed.component_count, 1);
        assert!(feed.calendar_data.contains("DTSTART:20250205T100000Z\r\n"));
        assert!(feed.calendar_data.contains("SUMMARY:Team Meeting\r\n"));
    }

    #[test]
    fn no_cross_format_fallback() {
        // Valid iCalendar declared as jCal fails as jCal.
        assert!(matches!(
            normalize_feed(ICAL, FeedFormat::JCal, &StripRules::default()).unwrap_err(),
            NormalizeError::JcalJson(_)
        ));

        // Valid JSON declared as iCalendar fails as iCalendar.
        assert!(normalize_feed("[]", FeedFormat::ICalendar, &StripRules::default()).is_err());
    }

    #[test]
    fn same_payload_same_output() {
        let a = normalize_feed(ICAL, FeedFormat::ICalendar, &StripRules::default()).unwrap();
        let b = normalize_feed(ICAL, FeedFormat::ICalendar, &StripRules::default()).unwrap();
        assert_eq!(a, b);
    }
}
