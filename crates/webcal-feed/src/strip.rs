//! Per-subscription strip rules.

use webcal_core::StripRules;

use crate::model::{CalendarDocument, Component};

/// Applies a subscription's strip rules to a parsed document.
///
/// Rules apply after parsing and before serialization, so they work the
/// same for every input format:
///
/// - `todos` drops VTODO components entirely
/// - `alarms` drops VALARM subcomponents from the remaining components
/// - `attachments` drops ATTACH properties carrying inline binary data;
///   URL-valued ATTACH properties stay
pub fn apply_strip_rules(doc: &mut CalendarDocument, rules: &StripRules) {
    if rules.is_noop() {
        return;
    }

    if rules.todos {
        doc.components.retain(|c| !matches!(c, Component::Todo(_)));
    }

    for component in &mut doc.components {
        let Some(body) = component.body_mut() else {
            continue;
        };

        if rules.alarms {
            body.alarms.clear();
        }

        if rules.attachments {
            body.properties
                .retain(|p| !(p.name == "ATTACH" && p.value.is_binary()));
        }
    }
}
