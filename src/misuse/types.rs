use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::records::types::{Card, Transaction};

/// The transaction-derived metric a rule checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleField {
    PayerMismatch,
    TransactionAmount,
    TransactionCount,
    StoresDistance,
    /// Any tag outside the closed vocabulary, kept verbatim. Never fires.
    Unknown(String),
}

impl RuleField {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "payer_mismatch" => Self::PayerMismatch,
            "transaction_amount" => Self::TransactionAmount,
            "transaction_count" => Self::TransactionCount,
            "stores_distance" => Self::StoresDistance,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::PayerMismatch => "payer_mismatch",
            Self::TransactionAmount => "transaction_amount",
            Self::TransactionCount => "transaction_count",
            Self::StoresDistance => "stores_distance",
            Self::Unknown(tag) => tag,
        }
    }
}

impl Serialize for RuleField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RuleField {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(Self::from_tag(&tag))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOperator {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    /// Any operator outside the closed vocabulary, kept verbatim. Never matches.
    Unsupported(String),
}

/// Tolerance for `=` on computed metrics such as percentages.
const EQ_TOLERANCE: f64 = 1e-9;

impl RuleOperator {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "<" => Self::Lt,
            "<=" => Self::Le,
            ">" => Self::Gt,
            ">=" => Self::Ge,
            "=" => Self::Eq,
            other => Self::Unsupported(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "=",
            Self::Unsupported(tag) => tag,
        }
    }

    /// Evaluate `lhs OP rhs`. Unsupported operators never match.
    pub fn compare(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            Self::Lt => lhs < rhs,
            Self::Le => lhs <= rhs,
            Self::Gt => lhs > rhs,
            Self::Ge => lhs >= rhs,
            Self::Eq => (lhs - rhs).abs() <= EQ_TOLERANCE,
            Self::Unsupported(_) => false,
        }
    }
}

impl Serialize for RuleOperator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RuleOperator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(Self::from_tag(&tag))
    }
}

impl fmt::Display for RuleOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configurable threshold check over one metric.
/// `value` is kept as text and parsed at evaluation time. Numbers are accepted too.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MisuseRule {
    pub id: String,
    pub field: RuleField,
    pub operator: RuleOperator,
    #[serde(deserialize_with = "deserialize_rule_value")]
    pub value: String,
}

/// Read a rule value from a string or a number. Any other shape is kept as its
/// JSON text so the rule is reported as non-numeric instead of failing the batch.
fn deserialize_rule_value<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(text) => text,
        other => other.to_string(),
    })
}

impl MisuseRule {
    pub fn new(id: &str, field: RuleField, operator: RuleOperator, value: &str) -> Self {
        Self {
            id: id.to_string(),
            field,
            operator,
            value: value.to_string(),
        }
    }

    /// The numeric threshold, if `value` parses to a finite number.
    pub fn threshold(&self) -> Option<f64> {
        self.value
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
    }
}

/// A problem that makes a rule inert for the whole pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleIssue {
    pub rule_id: String,
    pub problem: String,
}

impl fmt::Display for RuleIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rule '{}': {}", self.rule_id, self.problem)
    }
}

/// Report every rule that can never fire. Detection still runs with these rules;
/// they are simply skipped.
pub fn validate_rules(rules: &[MisuseRule]) -> Vec<RuleIssue> {
    let mut issues = Vec::new();

    for rule in rules {
        let problem = if let RuleField::Unknown(tag) = &rule.field {
            Some(format!("unknown field '{}'", tag))
        } else if let RuleOperator::Unsupported(tag) = &rule.operator {
            Some(format!("unsupported operator '{}'", tag))
        } else if rule.threshold().is_none() {
            Some(format!("value '{}' is not a finite number", rule.value))
        } else {
            None
        };

        if let Some(problem) = problem {
            issues.push(RuleIssue {
                rule_id: rule.id.clone(),
                problem,
            });
        }
    }

    issues
}

/// A rule that fired for a card, with the reason shown to reviewers.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub rule_id: String,
    pub field: RuleField,
    pub reason: String,
}

/// A card whose history violated at least one rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlaggedCard {
    #[serde(flatten)]
    pub card: Card,
    pub transactions: Vec<Transaction>,
    pub reasons: Vec<String>,
}

/// Result of one detection pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionReport {
    pub flagged_cards: Vec<FlaggedCard>,
    /// Cards that had transactions and were fully evaluated.
    pub cards_evaluated: usize,
    /// Set when the pass was cancelled before every card was evaluated.
    pub cancelled: bool,
}
