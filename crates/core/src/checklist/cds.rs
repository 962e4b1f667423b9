//! Clinical decision support: alerts derived from a single answer.

use serde::{Deserialize, Serialize};

use crate::checklist::condition::evaluate_operator;
use crate::checklist::template::{AlertSeverity, Item, LocalizedText};
use crate::checklist::value::ResponseValue;
use crate::types::{DbId, Timestamp};

/// An alert produced by one of an item's CDS rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggeredAlert {
    pub item_id: DbId,
    /// Position of the rule within the item's `cds_rules`.
    pub rule_index: usize,
    pub severity: AlertSeverity,
    pub message: LocalizedText,
    pub triggered_at: Timestamp,
}

/// Evaluate every CDS rule of `item` against its new answer.
///
/// The returned list replaces the response's previous alerts; it is derived
/// from the current value only. Skipped answers (`None`) raise nothing.
pub fn evaluate_alerts(
    item: &Item,
    value: Option<&ResponseValue>,
    now: Timestamp,
) -> Vec<TriggeredAlert> {
    let Some(value) = value else {
        return Vec::new();
    };

    item.cds_rules
        .iter()
        .enumerate()
        .filter(|(_, rule)| evaluate_operator(rule.operator, &rule.value, Some(value)))
        .map(|(rule_index, rule)| TriggeredAlert {
            item_id: item.id,
            rule_index,
            severity: rule.severity,
            message: rule.message.clone(),
            triggered_at: now,
        })
        .collect()
}

/// The most severe alert level in a list, if any.
pub fn highest_severity(alerts: &[TriggeredAlert]) -> Option<AlertSeverity> {
    alerts
        .iter()
        .map(|a| a.severity)
        .max_by_key(|s| match s {
            AlertSeverity::Info => 0,
            AlertSeverity::Warning => 1,
            AlertSeverity::Critical => 2,
        })
}
