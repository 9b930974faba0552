//! Canonical calendar document model.
//!
//! All three wire formats (iCalendar, jCal, xCal) parse into this model,
//! and storage only ever sees its iCalendar serialization. The dynamic
//! property bags of the wire formats become a tagged component tree with
//! explicit value kinds for DATE, DATE-TIME and PERIOD values.
//!
//! Text values are stored in their iCalendar raw encoding (backslash
//! escapes intact). This makes the iCalendar→iCalendar path an identity
//! transform; the jCal and xCal readers escape on entry.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// A property parameter, e.g. `TZID=Europe/Berlin`.
///
/// Parameters may carry several values (`MEMBER`, `DELEGATED-TO`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    /// Parameter name, uppercase.
    pub name: String,
    /// One or more parameter values, unquoted.
    pub values: Vec<String>,
}

impl Param {
    /// Creates a single-valued parameter.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into().to_ascii_uppercase(),
            values: vec![value.into()],
        }
    }

    /// Returns the first value.
    pub fn value(&self) -> Option<&str> {
        self.values.first().map(String::as_str)
    }
}

/// A date-time with its UTC marker.
///
/// `utc` is true for `...Z` forms. Floating times and times qualified by
/// a `TZID` parameter both have `utc == false`; the parameter stays on
/// the owning [`Property`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateTimeValue {
    /// The wall-clock time.
    pub time: NaiveDateTime,
    /// Whether the value carries the UTC suffix.
    pub utc: bool,
}

/// The end of a PERIOD value: an explicit end time or a duration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeriodEnd {
    /// Explicit end date-time.
    Until(DateTimeValue),
    /// ISO-8601 duration text, e.g. `PT5H30M`.
    Duration(String),
}

/// A typed property value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    /// Raw iCalendar value text. Used for TEXT values (escapes intact)
    /// and as the pass-through kind for structured values the model does
    /// not interpret (RRULE, DURATION, GEO, multi-valued dates, ...).
    Text(String),
    /// A DATE value. Never acquires a time component.
    Date(NaiveDate),
    /// A DATE-TIME value.
    DateTime(DateTimeValue),
    /// A PERIOD value.
    Period {
        /// Period start.
        start: DateTimeValue,
        /// Period end or duration.
        end: PeriodEnd,
    },
    /// Inline base64 binary data.
    Binary(String),
}

impl Value {
    /// Returns true for inline binary values.
    pub fn is_binary(&self) -> bool {
        matches!(self, Self::Binary(_))
    }

    /// Returns the raw text for `Text` values.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// A named property with parameters and a typed value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    /// Property name, uppercase (`SUMMARY`, `DTSTART`, `X-WR-CALNAME`).
    pub name: String,
    /// Property parameters in source order.
    pub params: Vec<Param>,
    /// The value.
    pub value: Value,
}

impl Property {
    /// Creates a property with no parameters.
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into().to_ascii_uppercase(),
            params: Vec::new(),
            value,
        }
    }

    /// Creates a raw-text property.
    pub fn text(name: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::new(name, Value::Text(raw.into()))
    }

    /// Builder: add a parameter.
    pub fn with_param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    /// Returns the first parameter with the given name (case-insensitive).
    pub fn param(&self, name: &str) -> Option<&Param> {
        self.params
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Returns the TZID parameter value, if any.
    pub fn tzid(&self) -> Option<&str> {
        self.param("TZID").and_then(Param::value)
    }
}

/// Looks up the first property with the given name in a property list.
fn find_property<'a>(properties: &'a [Property], name: &str) -> Option<&'a Property> {
    properties.iter().find(|p| p.name.eq_ignore_ascii_case(name))
}

/// A VALARM subcomponent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alarm {
    /// Alarm properties (ACTION, TRIGGER, ...).
    pub properties: Vec<Property>,
}

/// The shared body of VEVENT, VTODO and VJOURNAL components.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentBody {
    /// Component properties in source order.
    pub properties: Vec<Property>,
    /// Nested VALARM subcomponents.
    pub alarms: Vec<Alarm>,
}

impl ComponentBody {
    /// Returns the first property with the given name.
    pub fn property(&self, name: &str) -> Option<&Property> {
        find_property(&self.properties, name)
    }

    /// Returns the UID property's raw text.
    pub fn uid(&self) -> Option<&str> {
        self.property("UID").and_then(|p| p.value.as_text())
    }
}

/// Whether a timezone observance rule is STANDARD or DAYLIGHT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimezoneRuleKind {
    /// A STANDARD observance.
    Standard,
    /// A DAYLIGHT observance.
    Daylight,
}

impl TimezoneRuleKind {
    /// The component name on the wire.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::Standard => "STANDARD",
            Self::Daylight => "DAYLIGHT",
        }
    }
}

/// One STANDARD/DAYLIGHT observance inside a VTIMEZONE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimezoneRule {
    /// The observance kind.
    pub kind: TimezoneRuleKind,
    /// Observance properties (DTSTART, TZOFFSETFROM, TZOFFSETTO, ...).
    pub properties: Vec<Property>,
}

/// A VTIMEZONE component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimezoneComponent {
    /// Timezone properties (TZID, ...).
    pub properties: Vec<Property>,
    /// Observance rules in source order.
    pub rules: Vec<TimezoneRule>,
}

impl TimezoneComponent {
    /// Returns the TZID property's raw text.
    pub fn tzid(&self) -> Option<&str> {
        find_property(&self.properties, "TZID").and_then(|p| p.value.as_text())
    }
}

/// A calendar component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Component {
    /// A VEVENT.
    Event(ComponentBody),
    /// A VTODO.
    Todo(ComponentBody),
    /// A VJOURNAL.
    Journal(ComponentBody),
    /// A VTIMEZONE.
    Timezone(TimezoneComponent),
}

impl Component {
    /// The component name on the wire.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::Event(_) => "VEVENT",
            Self::Todo(_) => "VTODO",
            Self::Journal(_) => "VJOURNAL",
            Self::Timezone(_) => "VTIMEZONE",
        }
    }

    /// Returns the body for event/todo/journal components.
    pub fn body(&self) -> Option<&ComponentBody> {
        match self {
            Self::Event(body) | Self::Todo(body) | Self::Journal(body) => Some(body),
            Self::Timezone(_) => None,
        }
    }

    /// Mutable access to the body for event/todo/journal components.
    pub fn body_mut(&mut self) -> Option<&mut ComponentBody> {
        match self {
            Self::Event(body) | Self::Todo(body) | Self::Journal(body) => Some(body),
            Self::Timezone(_) => None,
        }
    }

    /// Returns the component UID, if it has one.
    pub fn uid(&self) -> Option<&str> {
        self.body().and_then(ComponentBody::uid)
    }
}

/// A parsed calendar: the VCALENDAR wrapper's properties plus its
/// components.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarDocument {
    /// VCALENDAR-level properties (VERSION, PRODID, X-WR-CALNAME, ...).
    pub properties: Vec<Property>,
    /// Calendar components in source order.
    pub components: Vec<Component>,
}

impl CalendarDocument {
    /// Creates an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the first calendar-level property with the given name.
    pub fn property(&self, name: &str) -> Option<&Property> {
        find_property(&self.properties, name)
    }

    /// Returns the UIDs of all event/todo/journal components.
    pub fn uids(&self) -> Vec<&str> {
        self.components.iter().filter_map(Component::uid).collect()
    }

    /// Counts components, excluding timezone definitions.
    pub fn instance_count(&self) -> usize {
        self.components
            .iter()
            .filter(|c| !matches!(c, Component::Timezone(_)))
            .count()
    }
}
