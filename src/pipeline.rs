use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::distance::{DistanceProvider, StaticDistanceTable};
use crate::misuse::engine::MisuseDetector;
use crate::misuse::types::{validate_rules, DetectionReport, MisuseRule, RuleIssue};
use crate::records::types::{Card, Transaction};

/// Orchestrates one detection pass:
/// 1. Rule validation (malformed rules are logged, not fatal)
/// 2. Misuse detection across all cards
/// 3. Logging of every flagged card
pub struct MisusePipeline {
    pub detector: MisuseDetector,
    pub default_rules: Vec<MisuseRule>,
}

impl MisusePipeline {
    /// Initialize the pipeline with the configured distance table and rules.
    pub fn init(config: &Config) -> Self {
        let table = StaticDistanceTable::from_routes(&config.distance.routes);
        Self::with_provider(config, Arc::new(table))
    }

    /// Initialize the pipeline around an externally supplied distance provider.
    pub fn with_provider(config: &Config, distance: Arc<dyn DistanceProvider>) -> Self {
        let default_rules = config.detection.rules.clone();
        for issue in validate_rules(&default_rules) {
            tracing::warn!(rule_id = %issue.rule_id, problem = %issue.problem, "Configured rule will never fire");
        }

        Self {
            detector: MisuseDetector::new(config.detection.clone(), distance),
            default_rules,
        }
    }

    /// Run detection. Returns the report and any rule problems found along the way.
    pub async fn run(
        &self,
        cards: &[Card],
        transactions: &[Transaction],
        rules: &[MisuseRule],
        shutdown: &CancellationToken,
    ) -> (DetectionReport, Vec<RuleIssue>) {
        let issues = validate_rules(rules);
        for issue in &issues {
            tracing::warn!(rule_id = %issue.rule_id, problem = %issue.problem, "Skipping malformed rule");
        }

        let report = self
            .detector
            .detect(cards, transactions, rules, shutdown)
            .await;

        for flagged in &report.flagged_cards {
            tracing::warn!(
                card_id = flagged.card.indexable_id(),
                cardholder = %flagged.card.primary_cardholder_name,
                reasons = ?flagged.reasons,
                "MISUSE DETECTED"
            );
        }

        (report, issues)
    }
}
