use serde::{Deserialize, Serialize};

use crate::misuse::types::{FlaggedCard, MisuseRule, RuleIssue};
use crate::records::types::{Card, Transaction};

// ============================================================
// Requests
// ============================================================

/// Body of `POST /api/v1/detect`. Omitting `rules` uses the configured rule set;
/// an explicit empty list flags nothing.
#[derive(Debug, Deserialize)]
pub struct DetectRequest {
    pub cards: Vec<Card>,
    pub transactions: Vec<Transaction>,
    #[serde(default)]
    pub rules: Option<Vec<MisuseRule>>,
}

// ============================================================
// Response types
// ============================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub rules: usize,
}

#[derive(Debug, Serialize)]
pub struct RulesResponse {
    pub rules: Vec<MisuseRule>,
    pub warnings: Vec<RuleIssue>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectResponse {
    pub flagged_cards: Vec<FlaggedCard>,
    pub cards_evaluated: usize,
    pub cancelled: bool,
    pub rule_warnings: Vec<RuleIssue>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
