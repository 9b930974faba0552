//! jCal (RFC 7265) reader.
//!
//! Parses `application/calendar+json` payloads into the canonical
//! [`CalendarDocument`]. jCal is an input format only; normalized
//! output is always iCalendar text.

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value as Json;
use tracing::debug;

use crate::error::NormalizeError;
use crate::ical::escape_text;
use crate::model::{
    Alarm, CalendarDocument, Component, ComponentBody, DateTimeValue, Param, PeriodEnd, Property,
    TimezoneComponent, TimezoneRule, TimezoneRuleKind, Value,
};

/// Parses a jCal document.
///
/// # Errors
///
/// Returns [`NormalizeError::JcalJson`] when the body is not JSON and
/// [`NormalizeError::JcalStructure`] when the JSON does not follow the
/// `["vcalendar", props, components]` shape.
pub fn parse_jcal(body: &str) -> Result<CalendarDocument, NormalizeError> {
    let json: Json = serde_json::from_str(body)?;
    let (name, properties, components) = split_component(&json)?;

    if !name.eq_ignore_ascii_case("vcalendar") {
        return Err(structure(format!(
            "top-level component is {:?}, expected vcalendar",
            name
        )));
    }

    let mut doc = CalendarDocument::new();

    for prop in properties {
        doc.properties.push(parse_property(prop)?);
    }

    for comp in components {
        let (name, props, subcomps) = split_component(comp)?;
        match name.to_ascii_lowercase().as_str() {
            "vevent" => doc
                .components
                .push(Component::Event(parse_body(props, subcomps)?)),
            "vtodo" => doc
                .components
                .push(Component::Todo(parse_body(props, subcomps)?)),
            "vjournal" => doc
                .components
                .push(Component::Journal(parse_body(props, subcomps)?)),
            "vtimezone" => doc
                .components
                .push(Component::Timezone(parse_timezone(props, subcomps)?)),
            other => {
                debug!(component = %other, "Skipping unsupported jCal component");
            }
        }
    }

    Ok(doc)
}

fn structure(message: impl Into<String>) -> NormalizeError {
    NormalizeError::JcalStructure(message.into())
}

/// Splits a `[name, props, components]` triple.
fn split_component(json: &Json) -> Result<(&str, &[Json], &[Json]), NormalizeError> {
    let arr = json
        .as_array()
        .ok_or_else(|| structure("component is not an array"))?;
    if arr.len() != 3 {
        return Err(structure(format!(
            "component array has {} elements, expected 3",
            arr.len()
        )));
    }

    let name = arr[0]
        .as_str()
        .ok_or_else(|| structure("component name is not a string"))?;
    let props = arr[1]
        .as_array()
        .ok_or_else(|| structure("component properties is not an array"))?;
    let comps = arr[2]
        .as_array()
        .ok_or_else(|| structure("component list is not an array"))?;

    Ok((name, props, comps))
}

fn parse_body(props: &[Json], subcomps: &[Json]) -> Result<ComponentBody, NormalizeError> {
    let mut body = ComponentBody::default();

    for prop in props {
        body.properties.push(parse_property(prop)?);
    }

    for comp in subcomps {
        let (name, props, _) = split_component(comp)?;
        if name.eq_ignore_ascii_case("valarm") {
            let mut alarm = Alarm::default();
            for prop in props {
                alarm.properties.push(parse_property(prop)?);
            }
            body.alarms.push(alarm);
        } else {
            debug!(component = %name, "Skipping unsupported jCal subcomponent");
        }
    }

    Ok(body)
}

fn parse_timezone(props: &[Json], subcomps: &[Json]) -> Result<TimezoneComponent, NormalizeError> {
    let mut tz = TimezoneComponent::default();

    for prop in props {
        tz.properties.push(parse_property(prop)?);
    }

    for comp in subcomps {
        let (name, props, _) = split_component(comp)?;
        let kind = match name.to_ascii_lowercase().as_str() {
            "standard" => TimezoneRuleKind::Standard,
            "daylight" => TimezoneRuleKind::Daylight,
            other => {
                debug!(component = %other, "Skipping unsupported timezone rule");
                continue;
            }
        };

        let mut properties = Vec::new();
        for prop in props {
            properties.push(parse_property(prop)?);
        }
        tz.rules.push(TimezoneRule { kind, properties });
    }

    Ok(tz)
}

/// Parses one `[name, params, type, value...]` property array.
fn parse_property(json: &Json) -> Result<Property, NormalizeError> {
    let arr = json
        .as_array()
        .ok_or_else(|| structure("property is not an array"))?;
    if arr.len() < 4 {
        return Err(structure(format!(
            "property array has {} elements, expected at least 4",
            arr.len()
        )));
    }

    let name = arr[0]
        .as_str()
        .ok_or_else(|| structure("property name is not a string"))?
        .to_ascii_uppercase();

    let params = parse_params(&arr[1])?;

    let value_type = arr[2]
        .as_str()
        .ok_or_else(|| structure("property type is not a string"))?
        .to_ascii_lowercase();

    let values = &arr[3..];
    let value = parse_value(&name, &value_type, values)?;

    let mut params = params;
    if let Some(tag) = nondefault_value_tag(&name, &value_type) {
        params.push(Param::new("VALUE", tag));
    }

    Ok(Property {
        name,
        params,
        value,
    })
}

fn parse_params(json: &Json) -> Result<Vec<Param>, NormalizeError> {
    let obj = json
        .as_object()
        .ok_or_else(|| structure("property parameters is not an object"))?;

    let mut params = Vec::new();
    for (name, value) in obj {
        let values = match value {
            Json::String(s) => vec![s.clone()],
            Json::Array(items) => items
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| structure("parameter value is not a string"))
                })
                .collect::<Result<Vec<_>, _>>()?,
            other => vec![json_scalar_to_string(other)?],
        };
        params.push(Param {
            name: name.to_ascii_uppercase(),
            values,
        });
    }
    Ok(params)
}

/// The default jCal type of a property, per RFC 5545 value-type defaults.
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

/// Returns the `VALUE=` tag to attach when the jCal type is not the
/// property's default, so the distinction survives into iCalendar.
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

fn parse_value(name: &str, value_type: &str, values: &[Json]) -> Result<Value, NormalizeError> {
    match value_type {
        "text" => {
            // Multiple text values (CATEGORIES) fold into one raw
            // comma-separated value, each escaped on entry.
            let parts = values
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(escape_text)
                        .ok_or_else(|| structure(format!("{}: text value is not a string", name)))
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Text(parts.join(",")))
        }
        "date" if values.len() == 1 => {
            let raw = expect_str(name, &values[0])?;
            let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map_err(|e| structure(format!("{}: bad date {:?}: {}", name, raw, e)))?;
            Ok(Value::Date(date))
        }
        "date-time" if values.len() == 1 => {
            let raw = expect_str(name, &values[0])?;
            Ok(Value::DateTime(parse_date_time(name, raw)?))
        }
        "period" if values.len() == 1 => {
            let raw = expect_str(name, &values[0])?;
            let (start, end) = raw
                .split_once('/')
                .ok_or_else(|| structure(format!("{}: period without '/': {:?}", name, raw)))?;
            let start = parse_date_time(name, start)?;
            let end = if end.starts_with('P') || end.starts_with("+P") || end.starts_with("-P") {
                PeriodEnd::Duration(end.to_string())
            } else {
                PeriodEnd::Until(parse_date_time(name, end)?)
            };
            Ok(Value::Period { start, end })
        }
        "binary" => {
            let raw = expect_str(name, &values[0])?;
            Ok(Value::Binary(raw.to_string()))
        }
        "recur" => {
            let rule = values[0]
                .as_object()
                .ok_or_else(|| structure(format!("{}: recur value is not an object", name)))?;
            Ok(Value::Text(recur_to_text(rule)?))
        }
        // Multi-valued temporal lists and every remaining scalar type
        // pass through as raw text.
        _ => {
            let parts = values
                .iter()
                .map(|v| match v {
                    Json::String(s) => Ok(jcal_temporal_to_ical(value_type, s)),
                    other => json_scalar_to_string(other),
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Text(parts.join(",")))
        }
    }
}

fn expect_str<'a>(name: &str, json: &'a Json) -> Result<&'a str, NormalizeError> {
    json.as_str()
        .ok_or_else(|| structure(format!("{}: value is not a string", name)))
}

fn json_scalar_to_string(json: &Json) -> Result<String, NormalizeError> {
    match json {
        Json::String(s) => Ok(s.clone()),
        Json::Number(n) => Ok(n.to_string()),
        Json::Bool(b) => Ok(if *b { "TRUE" } else { "FALSE" }.to_string()),
        other => Err(structure(format!("unexpected value {:?}", other))),
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

/// Converts a jCal extended-format temporal string back to the compact
/// iCalendar form for raw pass-through values (multi-valued EXDATE/RDATE
/// lists keep their members in iCalendar shape).
fn jcal_temporal_to_ical(value_type: &str, raw: &str) -> String {
    match value_type {
        "date" => raw.replace('-', ""),
        "date-time" => raw.replace(['-', ':'], ""),
        _ => raw.to_string(),
    }
}

/// Renders a jCal recur object as RRULE text.
fn recur_to_text(rule: &serde_json::Map<String, Json>) -> Result<String, NormalizeError> {
    let mut parts = Vec::with_capacity(rule.len());
    for (key, value) in rule {
        let rendered = match value {
            Json::Array(items) => items
                .iter()
                .map(json_scalar_to_string)
                .collect::<Result<Vec<_>, _>>()?
                .join(","),
            other => json_scalar_to_string(other)?,
        };
        parts.push(format!("{}={}", key.to_ascii_uppercase(), rendered));
    }
    Ok(parts.join(";"))
}
