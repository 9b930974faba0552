//! iCalendar text serialization.

use crate::model::{
    Alarm, CalendarDocument, Component, ComponentBody, DateTimeValue, PeriodEnd, Property,
    TimezoneComponent, Value,
};

/// PRODID stamped on serialized calendars that lack one.
pub const PRODID: &str = "-//webcal//feed normalizer//EN";

/// Maximum octets per physical line before folding (RFC 5545 §3.1).
const FOLD_WIDTH: usize = 75;

/// Serializes a [`CalendarDocument`] as iCalendar text.
///
/// `VERSION:2.0` and a PRODID are injected when the document carries
/// neither, so the output is always a valid VCALENDAR stream. Lines are
/// folded at 75 octets and terminated with CRLF.
pub fn serialize_ical(doc: &CalendarDocument) -> String {
    let mut out = String::new();

    push_line(&mut out, "BEGIN:VCALENDAR");

    if doc.property("VERSION").is_none() {
        push_line(&mut out, "VERSION:2.0");
    }
    if doc.property("PRODID").is_none() {
        push_line(&mut out, &format!("PRODID:{}", PRODID));
    }

    for property in &doc.properties {
        write_property(&mut out, property);
    }

    for component in &doc.components {
        write_component(&mut out, component);
    }

    push_line(&mut out, "END:VCALENDAR");
    out
}

fn write_component(out: &mut String, component: &Component) {
    let name = component.wire_name();
    push_line(out, &format!("BEGIN:{}", name));

    match component {
        Component::Event(body) | Component::Todo(body) | Component::Journal(body) => {
            write_body(out, body);
        }
        Component::Timezone(tz) => write_timezone(out, tz),
    }

    push_line(out, &format!("END:{}", name));
}

fn write_body(out: &mut String, body: &ComponentBody) {
    for property in &body.properties {
        write_property(out, property);
    }
    for alarm in &body.alarms {
        write_alarm(out, alarm);
    }
}

fn write_alarm(out: &mut String, alarm: &Alarm) {
    push_line(out, "BEGIN:VALARM");
    for property in &alarm.properties {
        write_property(out, property);
    }
    push_line(out, "END:VALARM");
}

fn write_timezone(out: &mut String, tz: &TimezoneComponent) {
    for property in &tz.properties {
        write_property(out, property);
    }
    for rule in &tz.rules {
        let name = rule.kind.wire_name();
        push_line(out, &format!("BEGIN:{}", name));
        for property in &rule.properties {
            write_property(out, property);
        }
        push_line(out, &format!("END:{}", name));
    }
}

fn write_property(out: &mut String, property: &Property) {
    let mut line = property.name.clone();

    for param in &property.params {
        line.push(';');
        line.push_str(&param.name);
        line.push('=');
        for (i, value) in param.values.iter().enumerate() {
            if i > 0 {
                line.push(',');
            }
            line.push_str(&quote_param_value(value));
        }
    }

    line.push(':');
    line.push_str(&format_value(&property.value));

    push_line(out, &line);
}

/// Quotes a parameter value when it contains characters that would be
/// read as separators.
fn quote_param_value(value: &str) -> String {
    if value.contains([':', ';', ',']) {
        format!("\"{}\"", value)
    } else {
        value.to_string()
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Text(raw) | Value::Binary(raw) => raw.clone(),
        Value::Date(date) => date.format("%Y%m%d").to_string(),
        Value::DateTime(dt) => format_date_time(dt),
        Value::Period { start, end } => {
            let end = match end {
                PeriodEnd::Until(dt) => format_date_time(dt),
                PeriodEnd::Duration(d) => d.clone(),
            };
            format!("{}/{}", format_date_time(start), end)
        }
    }
}

fn format_date_time(dt: &DateTimeValue) -> String {
    let mut s = dt.time.format("%Y%m%dT%H%M%S").to_string();
    if dt.utc {
        s.push('Z');
    }
    s
}

/// Appends a logical line, folding at [`FOLD_WIDTH`] octets with a
/// CRLF-plus-space continuation. Folds land on char boundaries so
/// multi-byte text is never split mid-character.
fn push_line(out: &mut String, line: &str) {
    let mut remaining = line;
    let mut width = FOLD_WIDTH;

    loop {
        if remaining.len() <= width {
            out.push_str(remaining);
            out.push_str("\r\n");
            return;
        }

        let mut cut = width;
        while !remaining.is_char_boundary(cut) {
            cut -= 1;
        }

        out.push_str(&remaining[..cut]);
        out.push_str("\r\n ");
        remaining = &remaining[cut..];
        // Continuation lines spend one octet on the leading space.
        width = FOLD_WIDTH - 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ical::parse_ical;
    use crate::model::Param;

    #[test]
    fn injects_version_and_prodid() {
        let out = serialize_ical(&CalendarDocument::new());
        assert!(out.starts_with("BEGIN:VCALENDAR\r\n"));
        assert!(out.contains("VERSION:2.0\r\n"));
        assert!(out.contains(&format!("PRODID:{}\r\n", PRODID)));
        assert!(out.ends_with("END:VCALENDAR\r\n"));
    }

    #[test]
    fn keeps_existing_version_and_prodid() {
        let doc = CalendarDocument {
            properties: vec![
                Property::text("VERSION", "2.0"),
                Property::text("PRODID", "-//Acme//Cal//EN"),
            ],
            components: Vec::new(),
        };
        let out = serialize_ical(&doc);
        assert!(out.contains("PRODID:-//Acme//Cal//EN\r\n"));
        assert!(!out.contains(PRODID));
    }

    #[test]
    fn quotes_param_values_with_separators() {
        let doc = CalendarDocument {
            properties: Vec::new(),
            components: vec![Component::Event(ComponentBody {
                properties: vec![
                    Property::text("UID", "q"),
                    Property::text("ATTENDEE", "mailto:john@example.com")
                        .with_param(Param::new("CN", "Doe; John")),
                ],
                alarms: Vec::new(),
            })],
        };
        let out = serialize_ical(&doc);
        assert!(out.contains("ATTENDEE;CN=\"Doe; John\":mailto:john@example.com\r\n"));
    }

    #[test]
    fn folds_long_lines() {
        let long = "x".repeat(200);
        let doc = CalendarDocument {
            properties: Vec::new(),
            components: vec![Component::Event(ComponentBody {
                properties: vec![
                    Property::text("UID", "fold"),
                    Property::text("DESCRIPTION", long.as_str()),
                ],
                alarms: Vec::new(),
            })],
        };
        let out = serialize_ical(&doc);

        for physical in out.split("\r\n") {
            assert!(physical.len() <= FOLD_WIDTH, "line too long: {}", physical);
        }

        // Unfolding restores the original value.
        let reparsed = parse_ical(&out).unwrap();
        let body = reparsed.components[0].body().unwrap();
        assert_eq!(body.property("DESCRIPTION").unwrap().value.as_text(), Some(long.as_str()));
    }

    #[test]
    fn ical_round_trip_is_identity() {
        let input = "BEGIN:VCALENDAR\r\n\
            VERSION:2.0\r\n\
            PRODID:-//Test//Feed//EN\r\n\
            BEGIN:VTIMEZONE\r\n\
            TZID:Europe/Berlin\r\n\
            BEGIN:DAYLIGHT\r\n\
            TZOFFSETFROM:+0100\r\n\
            TZOFFSETTO:+0200\r\n\
            DTSTART:19700329T020000\r\n\
            END:DAYLIGHT\r\n\
            END:VTIMEZONE\r\n\
            BEGIN:VEVENT\r\n\
            UID:12345\r\n\
            DTSTAMP:20250201T090000Z\r\n\
            DTSTART;TZID=Europe/Berlin:20250205T100000\r\n\
            SUMMARY:Team Meeting\\, weekly\r\n\
            RRULE:FREQ=WEEKLY;BYDAY=WE\r\n\
            BEGIN:VALARM\r\n\
            ACTION:DISPLAY\r\n\
            TRIGGER:-PT15M\r\n\
            END:VALARM\r\n\
            END:VEVENT\r\n\
            END:VCALENDAR\r\n";

        let once = serialize_ical(&parse_ical(input).unwrap());
        assert_eq!(once, input);

        let twice = serialize_ical(&parse_ical(&once).unwrap());
        assert_eq!(twice, once);
    }

    #[test]
    fn all_day_dates_serialize_without_time() {
        let input = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//T//T//EN\r\nBEGIN:VEVENT\r\nUID:d\r\nDTSTART;VALUE=DATE:20250210\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";
        let out = serialize_ical(&parse_ical(input).unwrap());
        assert!(out.contains("DTSTART;VALUE=DATE:20250210\r\n"));
    }
}
