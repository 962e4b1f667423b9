//! Condition evaluator: pure logic, no storage access.
//!
//! A rule set is folded left to right. The first rule seeds the result;
//! every later rule joins the running result with its own `logic`. There is
//! no precedence and no grouping.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::checklist::value::ResponseValue;
use crate::types::DbId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    Contains,
    GreaterThan,
}

/// How a rule joins the result of the rules before it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Logic {
    #[default]
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionRule {
    pub target_item_id: DbId,
    pub operator: Operator,
    pub value: Value,
    /// Ignored on the first rule of a set.
    #[serde(default)]
    pub logic: Logic,
}

/// Current answers keyed by item. Skipped or unanswered items are absent.
pub type AnswerMap<'a> = HashMap<DbId, &'a ResponseValue>;

/// Evaluate a rule set. An empty set is unconditionally true.
pub fn evaluate_rule_set(rules: &[ConditionRule], answers: &AnswerMap<'_>) -> bool {
    let mut rules = rules.iter();
    let Some(first) = rules.next() else {
        return true;
    };

    let seed = evaluate_rule(first, answers);
    rules.fold(seed, |acc, rule| {
        let outcome = evaluate_rule(rule, answers);
        match rule.logic {
            Logic::And => acc && outcome,
            Logic::Or => acc || outcome,
        }
    })
}

/// Evaluate a single rule against the answer set.
pub fn evaluate_rule(rule: &ConditionRule, answers: &AnswerMap<'_>) -> bool {
    let answer = answers.get(&rule.target_item_id).copied();
    evaluate_operator(rule.operator, &rule.value, answer)
}

/// Apply an operator to one (possibly missing) answer.
///
/// A missing answer fails every operator except `not_equals`.
pub fn evaluate_operator(operator: Operator, expected: &Value, answer: Option<&ResponseValue>) -> bool {
    let Some(answer) = answer else {
        return operator == Operator::NotEquals;
    };
    let actual = answer.comparable();

    match operator {
        Operator::Equals => values_equal(&actual, expected),
        Operator::NotEquals => !values_equal(&actual, expected),
        Operator::Contains => value_contains(&actual, expected),
        Operator::GreaterThan => match (as_number(&actual), as_number(expected)) {
            (Some(a), Some(b)) => a > b,
            _ => false,
        },
    }
}

fn values_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(_), _) | (_, Value::Number(_)) => {
            match (as_number(actual), as_number(expected)) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
        }
        _ => actual == expected,
    }
}

fn value_contains(actual: &Value, expected: &Value) -> bool {
    match actual {
        Value::Array(items) => match expected {
            // Every expected element must be present.
            Value::Array(wanted) => wanted
                .iter()
                .all(|w| items.iter().any(|i| values_equal(i, w))),
            other => items.iter().any(|i| values_equal(i, other)),
        },
        Value::String(s) => expected.as_str().is_some_and(|needle| s.contains(needle)),
        _ => false,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}
