//! xCal (RFC 6321) reader.
//!
//! Parses `application/calendar+xml` payloads into the canonical
//! [`CalendarDocument`]. The XML is first lifted into a small element
//! tree, then interpreted; xCal is an input format only.

use chrono::{NaiveDate, NaiveDateTime};
use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::debug;

use crate::error::NormalizeError;
use crate::ical::escape_text;
use crate::model::{
    Alarm, CalendarDocument, Component, ComponentBody, DateTimeValue, Param, PeriodEnd, Property,
    TimezoneComponent, TimezoneRule, TimezoneRuleKind, Value,
};

/// Parses an xCal document.
///
/// # Errors
///
/// Returns [`NormalizeError::XcalXml`] when the body is not well-formed
/// XML and [`NormalizeError::XcalStructure`] when the XML does not follow
/// the `icalendar/vcalendar/properties+components` shape.
pub fn parse_xcal(body: &str) -> Result<CalendarDocument, NormalizeError> {
    let root = parse_tree(body)?;

    let vcalendar = match root.name.as_str() {
        "vcalendar" => &root,
        "icalendar" => root
            .child("vcalendar")
            .ok_or_else(|| structure("icalendar element without vcalendar"))?,
        other => {
            return Err(structure(format!(
                "root element is <{}>, expected <icalendar>",
                other
            )));
        }
    };

    let mut doc = CalendarDocument::new();

    if let Some(properties) = vcalendar.child("properties") {
        for prop in &properties.children {
            doc.properties.push(parse_property(prop)?);
        }
    }

    if let Some(components) = vcalendar.child("components") {
        for comp in &components.children {
            match comp.name.as_str() {
                "vevent" => doc.components.push(Component::Event(parse_body(comp)?)),
                "vtodo" => doc.components.push(Component::Todo(parse_body(comp)?)),
                "vjournal" => doc.components.push(Component::Journal(parse_body(comp)?)),
                "vtimezone" => doc
                    .components
                    .push(Component::Timezone(parse_timezone(comp)?)),
                other => {
                    debug!(component = %other, "Skipping unsupported xCal component");
                }
            }
        }
    }

    Ok(doc)
}

fn structure(message: impl Into<String>) -> NormalizeError {
    NormalizeError::XcalStructure(message.into())
}

/// One XML element: lowercase local name, concatenated text, children.
#[derive(Debug, Default)]
struct XmlElement {
    name: String,
    text: String,
    children: Vec<XmlElement>,
}

impl XmlElement {
    fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }
}

/// Reads the XML into an element tree. Namespace prefixes are dropped;
/// xCal element names are matched by local name only.
fn parse_tree(body: &str) -> Result<XmlElement, NormalizeError> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = local_name(e.name().as_ref());
                stack.push(XmlElement {
                    name,
                    ..XmlElement::default()
                });
            }
            Event::Empty(e) => {
                let element = XmlElement {
                    name: local_name(e.name().as_ref()),
                    ..XmlElement::default()
                };
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| structure("unbalanced closing tag"))?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(t) => {
                let text = t
                    .unescape()
                    .map_err(|e| structure(format!("bad character data: {}", e)))?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text);
                }
            }
            Event::CData(t) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&t));
                }
            }
            Event::Eof => break,
            // Declarations, comments and processing instructions.
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(structure("unexpected end of document"));
    }

    root.ok_or_else(|| structure("empty document"))
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<(), NormalizeError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
    } else if root.is_none() {
        *root = Some(element);
    } else {
        return Err(structure("multiple root elements"));
    }
    Ok(())
}

fn local_name(raw: &[u8]) -> String {
    let raw = String::from_utf8_lossy(raw);
    match raw.rsplit_once(':') {
        Some((_, local)) => local.to_ascii_lowercase(),
        None => raw.to_ascii_lowercase(),
    }
}

fn parse_body(comp: &XmlElement) -> Result<ComponentBody, NormalizeError> {
    let mut body = ComponentBody::default();

    if let Some(properties) = comp.child("properties") {
        for prop in &properties.children {
            body.properties.push(parse_property(prop)?);
        }
    }

    if let Some(components) = comp.child("components") {
        for sub in &components.children {
            if sub.name == "valarm" {
                let mut alarm = Alarm::default();
                if let Some(properties) = sub.child("properties") {
                    for prop in &properties.children {
                        alarm.properties.push(parse_property(prop)?);
                    }
                }
                body.alarms.push(alarm);
            } else {
                debug!(component = %sub.name, "Skipping unsupported xCal subcomponent");
            }
        }
    }

    Ok(body)
}

fn parse_timezone(comp: &XmlElement) -> Result<TimezoneComponent, NormalizeError> {
    let mut tz = TimezoneComponent::default();

    if let Some(properties) = comp.child("properties") {
        for prop in &properties.children {
            tz.properties.push(parse_property(prop)?);
        }
    }

    if let Some(components) = comp.child("components") {
        for sub in &components.children {
            let kind = match sub.name.as_str() {
                "standard" => TimezoneRuleKind::Standard,
                "daylight" => TimezoneRuleKind::Daylight,
                other => {
                    debug!(component = %other, "Skipping unsupported timezone rule");
                    continue;
                }
            };

            let mut properties = Vec::new();
            if let Some(props) = sub.child("properties") {
                for prop in &props.children {
                    properties.push(parse_property(prop)?);
                }
            }
            tz.rules.push(TimezoneRule { kind, properties });
        }
    }

    Ok(tz)
}

/// Parses one property element: optional `<parameters>` child followed by
/// one or more typed value elements.
fn parse_property(prop: &XmlElement) -> Result<Property, NormalizeError> {
    let name = prop.name.to_ascii_uppercase();

    let mut params = Vec::new();
    let mut values: Vec<&XmlElement> = Vec::new();

    for child in &prop.children {
        if child.name == "parameters" {
            for param in &child.children {
                params.push(parse_param(param));
            }
        } else {
            values.push(child);
        }
    }

    let value_type = values
        .first()
        .map(|v| v.name.clone())
        .ok_or_else(|| structure(format!("{}: property without a value element", name)))?;
    let value = parse_value(&name, &value_type, &values)?;

    if let Some(tag) = nondefault_value_tag(&name, &value_type) {
        params.push(Param::new("VALUE", tag));
    }

    Ok(Property {
        name,
        params,
        value,
    })
}

/// A parameter element wraps its values in typed children, e.g.
/// `<tzid><text>Europe/Berlin</text></tzid>`.
fn parse_param(param: &XmlElement) -> Param {
    let values = if param.children.is_empty() {
        vec![param.text.clone()]
    } else {
        param.children.iter().map(|c| c.text.clone()).collect()
    };
    Param {
        name: param.name.to_ascii_uppercase(),
        values,
    }
}

/// The xCal value element name a property defaults to.
fn default_type(name: &str) -> &'static str {
    match name {
        "DTSTART" | "DTEND" | "DUE" | "DTSTAMP" | "COMPLETED" | "CREATED" | "LAST-MODIFIED"
        | "RECURRENCE-ID" | "EXDATE" | "RDATE" => "date-time",
        "FREEBUSY" => "period",
        "ATTACH" | "URL" | "SOURCE" => "uri",
        "DURATION" | "TRIGGER" => "duration",
        "RRULE" => "recur",
        "GEO" => "float",
        "PERCENT-COMPLETE" | "PRIORITY" | "REPEAT" | "SEQUENCE" => "integer",
        "TZOFFSETFROM" | "TZOFFSETTO" => "utc-offset",
        "ATTENDEE" | "ORGANIZER" => "cal-address",
        _ => "text",
    }
}

/// Returns the `VALUE=` tag to attach when the value element is not the
/// property's default type, so the distinction survives into iCalendar.
fn nondefault_value_tag(name: &str, value_type: &str) -> Option<&'static str> {
    if value_type == default_type(name) {
        return None;
    }
    match value_type {
        "date" => Some("DATE"),
        "date-time" => Some("DATE-TIME"),
        "period" => Some("PERIOD"),
        "binary" => Some("BINARY"),
        "duration" => Some("DURATION"),
        "uri" => Some("URI"),
        _ => None,
    }
}

fn parse_value(
    name: &str,
    value_type: &str,
    values: &[&XmlElement],
) -> Result<Value, NormalizeError> {
    match value_type {
        "text" => {
            let parts: Vec<String> = values.iter().map(|v| escape_text(&v.text)).collect();
            Ok(Value::Text(parts.join(",")))
        }
        "date" if values.len() == 1 => {
            let raw = values[0].text.as_str();
            let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map_err(|e| structure(format!("{}: bad date {:?}: {}", name, raw, e)))?;
            Ok(Value::Date(date))
        }
        "date-time" if values.len() == 1 => {
            Ok(Value::DateTime(parse_date_time(name, &values[0].text)?))
        }
        "period" if values.len() == 1 => parse_period(name, values[0]),
        "binary" => Ok(Value::Binary(values[0].text.clone())),
        "recur" => Ok(Value::Text(recur_to_text(values[0]))),
        // Multi-valued temporal lists and every remaining scalar type
        // pass through as raw text.
        _ => {
            let parts: Vec<String> = values
                .iter()
                .map(|v| xcal_temporal_to_ical(value_type, &v.text))
                .collect();
            Ok(Value::Text(parts.join(",")))
        }
    }
}

fn parse_date_time(name: &str, raw: &str) -> Result<DateTimeValue, NormalizeError> {
    let (body, utc) = match raw.strip_suffix('Z') {
        Some(body) => (body, true),
        None => (raw, false),
    };
    let time = NaiveDateTime::parse_from_str(body, "%Y-%m-%dT%H:%M:%S")
        .map_err(|e| structure(format!("{}: bad date-time {:?}: {}", name, raw, e)))?;
    Ok(DateTimeValue { time, utc })
}

/// A period element carries `<start>` plus either `<end>` or
/// `<duration>`.
fn parse_period(name: &str, period: &XmlElement) -> Result<Value, NormalizeError> {
    let start = period
        .child("start")
        .ok_or_else(|| structure(format!("{}: period without start", name)))?;
    let start = parse_date_time(name, &start.text)?;

    let end = if let Some(end) = period.child("end") {
        PeriodEnd::Until(parse_date_time(name, &end.text)?)
    } else if let Some(duration) = period.child("duration") {
        PeriodEnd::Duration(duration.text.clone())
    } else {
        return Err(structure(format!(
            "{}: period without end or duration",
            name
        )));
    };

    Ok(Value::Period { start, end })
}

/// Converts an xCal extended-format temporal string back to the compact
/// iCalendar form for raw pass-through values.
fn xcal_temporal_to_ical(value_type: &str, raw: &str) -> String {
    match value_type {
        "date" => raw.replace('-', ""),
        "date-time" => raw.replace(['-', ':'], ""),
        _ => raw.to_string(),
    }
}

/// Renders a `<recur>` element as RRULE text. Repeated children (BYDAY)
/// collapse into one comma-joined part.
fn recur_to_text(recur: &XmlElement) -> String {
    let mut parts: Vec<(String, String)> = Vec::new();

    for child in &recur.children {
        let key = child.name.to_ascii_uppercase();
        match parts.iter_mut().find(|(k, _)| *k == key) {
            Some((_, rendered)) => {
                rendered.push(',');
                rendered.push_str(&child.text);
            }
            None => parts.push((key, child.text.clone())),
        }
    }

    parts
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(";")
}

#[cfg(test)]
mod tests {
    use super::*;

    const NS: &str = "urn:ietf:params:xml:ns:icalendar-2.0";

    fn event_doc(props: &str) -> CalendarDocument {
        let body = format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
             <icalendar xmlns=\"{}\"><vcalendar>\
             <properties><version><text>2.0</text></version></properties>\
             <components><vevent><properties>{}</properties></vevent></components>\
             </vcalendar></icalendar>",
            NS, props
        );
        parse_xcal(&body).unwrap()
    }

    #[test]
    fn parses_basic_event() {
        let doc = event_doc(
            "<uid><text>12345</text></uid>\
             <dtstart><date-time>2025-02-05T10:00:00Z</date-time></dtstart>\
             <summary><text>Team Meeting</text></summary>",
        );

        assert_eq!(doc.uids(), vec!["12345"]);
        assert_eq!(doc.property("VERSION").unwrap().value.as_text(), Some("2.0"));

        let body = doc.components[0].body().unwrap();
        match &body.property("DTSTART").unwrap().value {
            Value::DateTime(dt) => {
                assert!(dt.utc);
                assert_eq!(dt.time.to_string(), "2025-02-05 10:00:00");
            }
            other => panic!("expected DateTime, got {:?}", other),
        }
    }

    #[test]
    fn text_values_are_escaped_on_entry() {
        let doc = event_doc(
            "<uid><text>e</text></uid>\
             <summary><text>Lunch, then sync; maybe</text></summary>",
        );
        let body = doc.components[0].body().unwrap();
        assert_eq!(
            body.property("SUMMARY").unwrap().value.as_text(),
            Some("Lunch\\, then sync\\; maybe")
        );
    }

    #[test]
    fn date_values_get_value_param() {
        let doc = event_doc(
            "<uid><text>d</text></uid>\
             <dtstart><date>2025-02-10</date></dtstart>",
        );
        let body = doc.components[0].body().unwrap();
        let start = body.property("DTSTART").unwrap();
        assert_eq!(start.param("VALUE").unwrap().value(), Some("DATE"));
        match &start.value {
            Value::Date(date) => assert_eq!(date.to_string(), "2025-02-10"),
            other => panic!("expected Date, got {:?}", other),
        }
    }

    #[test]
    fn tzid_param_survives() {
        let doc = event_doc(
            "<uid><text>tz</text></uid>\
             <dtstart><parameters><tzid><text>Europe/Berlin</text></tzid></parameters>\
             <date-time>2025-02-05T10:00:00</date-time></dtstart>",
        );
        let body = doc.components[0].body().unwrap();
        let start = body.property("DTSTART").unwrap();
        assert_eq!(start.tzid(), Some("Europe/Berlin"));
        match &start.value {
            Value::DateTime(dt) => assert!(!dt.utc),
            other => panic!("expected DateTime, got {:?}", other),
        }
    }

    #[test]
    fn recur_element_becomes_rrule_text() {
        let doc = event_doc(
            "<uid><text>r</text></uid>\
             <rrule><recur><freq>WEEKLY</freq><byday>MO</byday><byday>WE</byday>\
             <count>10</count></recur></rrule>",
        );
        let body = doc.components[0].body().unwrap();
        let rrule = body.property("RRULE").unwrap().value.as_text().unwrap();
        assert!(rrule.contains("FREQ=WEEKLY"));
        assert!(rrule.contains("BYDAY=MO,WE"));
        assert!(rrule.contains("COUNT=10"));
    }

    #[test]
    fn period_with_duration() {
        let doc = event_doc(
            "<uid><text>p</text></uid>\
             <freebusy><period><start>1997-01-01T18:00:00Z</start>\
             <duration>PT5H30M</duration></period></freebusy>",
        );
        let body = doc.components[0].body().unwrap();
        match &body.property("FREEBUSY").unwrap().value {
            Value::Period { start, end } => {
                assert!(start.utc);
                assert_eq!(end, &PeriodEnd::Duration("PT5H30M".to_string()));
            }
            other => panic!("expected Period, got {:?}", other),
        }
    }

    #[test]
    fn alarms_and_timezones_parse() {
        let body = format!(
            "<icalendar xmlns=\"{}\"><vcalendar><properties/>\
             <components>\
             <vtimezone><properties><tzid><text>Europe/Berlin</text></tzid></properties>\
             <components><daylight><properties>\
             <tzoffsetfrom><utc-offset>+01:00</utc-offset></tzoffsetfrom>\
             <tzoffsetto><utc-offset>+02:00</utc-offset></tzoffsetto>\
             </properties></daylight></components></vtimezone>\
             <vevent><properties><uid><text>a</text></uid></properties>\
             <components><valarm><properties>\
             <action><text>DISPLAY</text></action>\
             <trigger><duration>-PT15M</duration></trigger>\
             </properties></valarm></components></vevent>\
             </components></vcalendar></icalendar>",
            NS
        );
        let doc = parse_xcal(&body).unwrap();
        assert_eq!(doc.components.len(), 2);

        match &doc.components[0] {
            Component::Timezone(tz) => {
                assert_eq!(tz.tzid(), Some("Europe/Berlin"));
                assert_eq!(tz.rules[0].kind, TimezoneRuleKind::Daylight);
            }
            other => panic!("expected Timezone, got {:?}", other),
        }

        let body = doc.components[1].body().unwrap();
        assert_eq!(body.alarms.len(), 1);
    }

    #[test]
    fn rejects_non_xml() {
        assert!(parse_xcal("BEGIN:VCALENDAR").is_err());
        assert!(parse_xcal("").is_err());
    }

    #[test]
    fn rejects_wrong_root() {
        let err = parse_xcal("<vcard/>").unwrap_err();
        assert!(matches!(err, NormalizeError::XcalStructure(_)));
    }

    #[test]
    fn unknown_components_are_skipped() {
        let body = format!(
            "<icalendar xmlns=\"{}\"><vcalendar><properties/>\
             <components>\
             <vfreebusy><properties><uid><text>fb</text></uid></properties></vfreebusy>\
             <vevent><properties><uid><text>kept</text></uid></properties></vevent>\
             </components></vcalendar></icalendar>",
            NS
        );
        let doc = parse_xcal(&body).unwrap();
        assert_eq!(doc.uids(), vec!["kept"]);
    }
}
