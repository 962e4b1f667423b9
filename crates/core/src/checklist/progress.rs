//! Visibility and completion progress.
//!
//! Both are recomputed from scratch after every response mutation: a changed
//! answer can reveal or hide whole sections, which moves the denominator.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::checklist::condition::{evaluate_rule_set, AnswerMap};
use crate::checklist::instance::{answers_of, Response};
use crate::checklist::template::Template;
use crate::checklist::validator::is_valid_value;
use crate::types::DbId;

/// Progress reported when nothing visible is required.
pub const FULL_PROGRESS: f64 = 100.0;

/// Which items are part of the currently active form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visibility {
    /// Every visible item, in render order.
    pub visible_item_ids: Vec<DbId>,
    /// Visible items that are also required.
    pub required_item_ids: Vec<DbId>,
}

impl Visibility {
    /// Items visible here but not in `before`, and items visible in `before`
    /// but not here.
    pub fn diff(&self, before: &Visibility) -> (Vec<DbId>, Vec<DbId>) {
        let now: BTreeSet<DbId> = self.visible_item_ids.iter().copied().collect();
        let then: BTreeSet<DbId> = before.visible_item_ids.iter().copied().collect();
        (
            now.difference(&then).copied().collect(),
            then.difference(&now).copied().collect(),
        )
    }
}

/// Evaluate section and item visibility rules against the current answers.
pub fn compute_visibility(template: &Template, answers: &AnswerMap<'_>) -> Visibility {
    let mut visibility = Visibility::default();

    for section in template.ordered_sections() {
        if !evaluate_rule_set(&section.visibility, answers) {
            continue;
        }
        for item in section.ordered_items() {
            if !evaluate_rule_set(&item.visibility, answers) {
                continue;
            }
            visibility.visible_item_ids.push(item.id);
            if item.is_required {
                visibility.required_item_ids.push(item.id);
            }
        }
    }

    visibility
}

/// Completion figures for an instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub percentage: f64,
    pub answered_required: usize,
    pub visible_required: usize,
    /// Visible required items still lacking an answer or a justified skip.
    pub missing_item_ids: Vec<DbId>,
}

/// Whether a response counts towards progress: a valid value, or a skip
/// with a non-empty justification.
pub fn counts_as_answered(template: &Template, response: &Response) -> bool {
    if response.is_skipped {
        return response.has_skip_reason();
    }
    match (&response.value, template.find_item(response.item_id)) {
        (Some(value), Some(item)) => is_valid_value(item, value),
        _ => false,
    }
}

/// Compute progress over the visible required items.
pub fn compute_progress(
    template: &Template,
    visibility: &Visibility,
    responses: &[Response],
) -> Progress {
    let missing_item_ids: Vec<DbId> = visibility
        .required_item_ids
        .iter()
        .copied()
        .filter(|item_id| {
            !responses
                .iter()
                .any(|r| r.item_id == *item_id && counts_as_answered(template, r))
        })
        .collect();

    let visible_required = visibility.required_item_ids.len();
    let answered_required = visible_required - missing_item_ids.len();

    Progress {
        percentage: percentage(answered_required, visible_required),
        answered_required,
        visible_required,
        missing_item_ids,
    }
}

/// Visibility and progress for a response set as it stands.
pub fn evaluate_responses(template: &Template, responses: &[Response]) -> (Visibility, Progress) {
    let visibility = compute_visibility(template, &answers_of(responses));
    let progress = compute_progress(template, &visibility, responses);
    (visibility, progress)
}

/// `round(100 * answered / total, 2)`, or 100 when there is nothing to answer.
pub fn percentage(answered: usize, total: usize) -> f64 {
    if total == 0 {
        return FULL_PROGRESS;
    }
    let raw = 100.0 * answered as f64 / total as f64;
    ((raw * 100.0).round() / 100.0).clamp(0.0, FULL_PROGRESS)
}
