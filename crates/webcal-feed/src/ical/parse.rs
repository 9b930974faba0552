//! iCalendar text parser.

use chrono::{NaiveDate, NaiveDateTime};
use tracing::debug;

use crate::model::{
    Alarm, CalendarDocument, Component, ComponentBody, DateTimeValue, Param, PeriodEnd, Property,
    TimezoneComponent, TimezoneRule, TimezoneRuleKind, Value,
};

use super::IcalParseError;

/// Properties whose untyped values default to DATE-TIME (RFC 5545 §3.8).
const DATE_TIME_PROPERTIES: &[&str] = &[
    "DTSTART",
    "DTEND",
    "DUE",
    "DTSTAMP",
    "COMPLETED",
    "CREATED",
    "LAST-MODIFIED",
    "RECURRENCE-ID",
];

/// Parses iCalendar text into a [`CalendarDocument`].
///
/// Unknown component types (VFREEBUSY, vendor extensions) are skipped
/// with a debug log; everything else is preserved, including unknown
/// properties and their parameters.
///
/// # Errors
///
/// Returns [`IcalParseError`] when the input is not a VCALENDAR stream or
/// a content line is malformed.
pub fn parse_ical(input: &str) -> Result<CalendarDocument, IcalParseError> {
    let lines = unfold(input);
    let mut parser = Parser { lines, pos: 0 };
    parser.parse_document()
}

/// One logical (unfolded) content line.
struct Line {
    /// 1-based position in the unfolded stream.
    number: usize,
    text: String,
}

struct Parser {
    lines: Vec<Line>,
    pos: usize,
}

impl Parser {
    fn next_line(&mut self) -> Option<&Line> {
        let line = self.lines.get(self.pos);
        if line.is_some() {
            self.pos += 1;
        }
        line
    }

    fn parse_document(&mut self) -> Result<CalendarDocument, IcalParseError> {
        match self.next_line() {
            Some(line) if line.text.eq_ignore_ascii_case("BEGIN:VCALENDAR") => {}
            _ => return Err(IcalParseError::MissingCalendar),
        }

        let mut doc = CalendarDocument::new();

        loop {
            let (number, text) = match self.next_line() {
                Some(line) => (line.number, line.text.clone()),
                None => {
                    return Err(IcalParseError::UnexpectedEof {
                        component: "VCALENDAR".to_string(),
                    });
                }
            };

            if let Some(name) = begin_name(&text) {
                match name.as_str() {
                    "VEVENT" => {
                        let body = self.parse_body("VEVENT")?;
                        doc.components.push(Component::Event(body));
                    }
                    "VTODO" => {
                        let body = self.parse_body("VTODO")?;
                        doc.components.push(Component::Todo(body));
                    }
                    "VJOURNAL" => {
                        let body = self.parse_body("VJOURNAL")?;
                        doc.components.push(Component::Journal(body));
                    }
                    "VTIMEZONE" => {
                        let tz = self.parse_timezone()?;
                        doc.components.push(Component::Timezone(tz));
                    }
                    other => {
                        debug!(component = %other, "Skipping unsupported component");
                        self.skip_component(other)?;
                    }
                }
                continue;
            }

            if let Some(name) = end_name(&text) {
                if name == "VCALENDAR" {
                    return Ok(doc);
                }
                return Err(IcalParseError::MismatchedEnd {
                    line: number,
                    found: name,
                    expected: "VCALENDAR".to_string(),
                });
            }

            doc.properties.push(parse_property(&text, number)?);
        }
    }

    fn parse_body(&mut self, kind: &str) -> Result<ComponentBody, IcalParseError> {
        let mut body = ComponentBody::default();

        loop {
            let (number, text) = match self.next_line() {
                Some(line) => (line.number, line.text.clone()),
                None => {
                    return Err(IcalParseError::UnexpectedEof {
                        component: kind.to_string(),
                    });
                }
            };

            if let Some(name) = begin_name(&text) {
                if name == "VALARM" {
                    body.alarms.push(self.parse_alarm()?);
                } else {
                    debug!(component = %name, parent = %kind, "Skipping nested component");
                    self.skip_component(&name)?;
                }
                continue;
            }

            if let Some(name) = end_name(&text) {
                if name == kind {
                    return Ok(body);
                }
                return Err(IcalParseError::MismatchedEnd {
                    line: number,
                    found: name,
                    expected: kind.to_string(),
                });
            }

            body.properties.push(parse_property(&text, number)?);
        }
    }

    fn parse_alarm(&mut self) -> Result<Alarm, IcalParseError> {
        let mut alarm = Alarm::default();

        loop {
            let (number, text) = match self.next_line() {
                Some(line) => (line.number, line.text.clone()),
                None => {
                    return Err(IcalParseError::UnexpectedEof {
                        component: "VALARM".to_string(),
                    });
                }
            };

            if let Some(name) = begin_name(&text) {
                self.skip_component(&name)?;
                continue;
            }

            if let Some(name) = end_name(&text) {
                if name == "VALARM" {
                    return Ok(alarm);
                }
                return Err(IcalParseError::MismatchedEnd {
                    line: number,
                    found: name,
                    expected: "VALARM".to_string(),
                });
            }

            alarm.properties.push(parse_property(&text, number)?);
        }
    }

    fn parse_timezone(&mut self) -> Result<TimezoneComponent, IcalParseError> {
        let mut tz = TimezoneComponent::default();

        loop {
            let (number, text) = match self.next_line() {
                Some(line) => (line.number, line.text.clone()),
                None => {
                    return Err(IcalParseError::UnexpectedEof {
                        component: "VTIMEZONE".to_string(),
                    });
                }
            };

            if let Some(name) = begin_name(&text) {
                match name.as_str() {
                    "STANDARD" => {
                        let properties = self.parse_rule_properties("STANDARD")?;
                        tz.rules.push(TimezoneRule {
                            kind: TimezoneRuleKind::Standard,
                            properties,
                        });
                    }
                    "DAYLIGHT" => {
                        let properties = self.parse_rule_properties("DAYLIGHT")?;
                        tz.rules.push(TimezoneRule {
                            kind: TimezoneRuleKind::Daylight,
                            properties,
                        });
                    }
                    other => {
                        self.skip_component(other)?;
                    }
                }
                continue;
            }

            if let Some(name) = end_name(&text) {
                if name == "VTIMEZONE" {
                    return Ok(tz);
                }
                return Err(IcalParseError::MismatchedEnd {
                    line: number,
                    found: name,
                    expected: "VTIMEZONE".to_string(),
                });
            }

            tz.properties.push(parse_property(&text, number)?);
        }
    }

    fn parse_rule_properties(&mut self, kind: &str) -> Result<Vec<Property>, IcalParseError> {
        let mut properties = Vec::new();

        loop {
            let (number, text) = match self.next_line() {
                Some(line) => (line.number, line.text.clone()),
                None => {
                    return Err(IcalParseError::UnexpectedEof {
                        component: kind.to_string(),
                    });
                }
            };

            if let Some(name) = begin_name(&text) {
                self.skip_component(&name)?;
                continue;
            }

            if let Some(name) = end_name(&text) {
                if name == kind {
                    return Ok(properties);
                }
                return Err(IcalParseError::MismatchedEnd {
                    line: number,
                    found: name,
                    expected: kind.to_string(),
                });
            }

            properties.push(parse_property(&text, number)?);
        }
    }

    /// Consumes lines until the END matching an already-consumed BEGIN.
    fn skip_component(&mut self, name: &str) -> Result<(), IcalParseError> {
        let mut depth = 0usize;

        loop {
            let text = match self.next_line() {
                Some(line) => line.text.clone(),
                None => {
                    return Err(IcalParseError::UnexpectedEof {
                        component: name.to_string(),
                    });
                }
            };

            if begin_name(&text).is_some() {
                depth += 1;
            } else if let Some(end) = end_name(&text) {
                if depth == 0 && end == name {
                    return Ok(());
                }
                depth = depth.saturating_sub(1);
            }
        }
    }
}

/// Unfolds the input into logical lines: a line starting with space or
/// tab continues the previous one. Blank lines are dropped.
fn unfold(input: &str) -> Vec<Line> {
    let mut lines: Vec<Line> = Vec::new();
    let mut number = 0usize;

    for raw in input.lines() {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        if let Some(rest) = raw.strip_prefix([' ', '\t']) {
            if let Some(last) = lines.last_mut() {
                last.text.push_str(rest);
                continue;
            }
        }
        if raw.is_empty() {
            continue;
        }
        number += 1;
        lines.push(Line {
            number,
            text: raw.to_string(),
        });
    }

    lines
}

fn begin_name(line: &str) -> Option<String> {
    line.strip_prefix("BEGIN:")
        .or_else(|| line.strip_prefix("begin:"))
        .map(|s| s.trim().to_ascii_uppercase())
}

fn end_name(line: &str) -> Option<String> {
    line.strip_prefix("END:")
        .or_else(|| line.strip_prefix("end:"))
        .map(|s| s.trim().to_ascii_uppercase())
}

/// Parses one content line into a [`Property`].
fn parse_property(line: &str, number: usize) -> Result<Property, IcalParseError> {
    let malformed = || IcalParseError::MalformedLine { line: number };

    // Find the value separator, honoring quoted parameter values.
    let mut in_quotes = false;
    let mut value_at = None;
    for (idx, ch) in line.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ':' if !in_quotes => {
                value_at = Some(idx);
                break;
            }
            _ => {}
        }
    }
    let value_at = value_at.ok_or_else(malformed)?;
    let (head, rest) = line.split_at(value_at);
    let raw_value = &rest[1..];

    let mut segments = split_unquoted(head, ';');
    if segments.is_empty() {
        return Err(malformed());
    }
    let name = segments.remove(0).trim().to_ascii_uppercase();
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(malformed());
    }

    let mut params = Vec::new();
    for segment in segments {
        let (param_name, param_value) = segment.split_once('=').ok_or_else(malformed)?;
        let values = split_unquoted(param_value, ',')
            .into_iter()
            .map(|v| v.trim_matches('"').to_string())
            .collect();
        params.push(Param {
            name: param_name.trim().to_ascii_uppercase(),
            values,
        });
    }

    let value = classify_value(&name, &params, raw_value);

    Ok(Property {
        name,
        params,
        value,
    })
}

/// Splits on a separator, ignoring separators inside double quotes.
fn split_unquoted(input: &str, separator: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in input.chars() {
        if ch == '"' {
            in_quotes = !in_quotes;
            current.push(ch);
        } else if ch == separator && !in_quotes {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(ch);
        }
    }
    parts.push(current);
    parts
}

/// Picks the typed value kind for a property.
///
/// Honors an explicit VALUE parameter first, then the default value type
/// of the property name. Anything that fails to parse as its declared
/// kind, and any multi-valued temporal list, stays raw text so it
/// round-trips untouched.
fn classify_value(name: &str, params: &[Param], raw: &str) -> Value {
    let declared = params
        .iter()
        .find(|p| p.name == "VALUE")
        .and_then(|p| p.values.first())
        .map(|v| v.to_ascii_uppercase());

    let base64 = params
        .iter()
        .find(|p| p.name == "ENCODING")
        .and_then(|p| p.values.first())
        .is_some_and(|v| v.eq_ignore_ascii_case("BASE64"));

    if base64 || declared.as_deref() == Some("BINARY") {
        return Value::Binary(raw.to_string());
    }

    let multi_valued = raw.contains(',');

    match declared.as_deref() {
        Some("DATE") if !multi_valued => {
            return parse_date(raw).map(Value::Date).unwrap_or_else(|| text(raw));
        }
        Some("DATE-TIME") if !multi_valued => {
            return parse_date_time(raw)
                .map(Value::DateTime)
                .unwrap_or_else(|| text(raw));
        }
        Some("PERIOD") if !multi_valued => {
            return parse_period(raw).unwrap_or_else(|| text(raw));
        }
        Some(_) => return text(raw),
        None => {}
    }

    if DATE_TIME_PROPERTIES.contains(&name) && !multi_valued {
        if let Some(dt) = parse_date_time(raw) {
            return Value::DateTime(dt);
        }
        if let Some(date) = parse_date(raw) {
            return Value::Date(date);
        }
    }

    text(raw)
}

fn text(raw: &str) -> Value {
    Value::Text(raw.to_string())
}

/// Parses `YYYYMMDD`.
pub(crate) fn parse_date(raw: &str) -> Option<NaiveDate> {
    if raw.len() != 8 {
        return None;
    }
    NaiveDate::parse_from_str(raw, "%Y%m%d").ok()
}

/// Parses `YYYYMMDDTHHMMSS` with an optional `Z` suffix.
pub(crate) fn parse_date_time(raw: &str) -> Option<DateTimeValue> {
    let (body, utc) = match raw.strip_suffix('Z') {
        Some(body) => (body, true),
        None => (raw, false),
    };
    let time = NaiveDateTime::parse_from_str(body, "%Y%m%dT%H%M%S").ok()?;
    Some(DateTimeValue { time, utc })
}

/// Parses `start/end` or `start/duration`.
pub(crate) fn parse_period(raw: &str) -> Option<Value> {
    let (start, end) = raw.split_once('/')?;
    let start = parse_date_time(start)?;

    let end = if end.starts_with('P') || end.starts_with("+P") || end.starts_with("-P") {
        PeriodEnd::Duration(end.to_string())
    } else {
        PeriodEnd::Until(parse_date_time(end)?)
    };

    Some(Value::Period { start, end })
}
