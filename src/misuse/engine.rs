use futures::future::join_all;
use futures::stream::{self, StreamExt};
use std::pin::pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::DetectionConfig;
use crate::distance::DistanceProvider;
use crate::records::index::TransactionIndex;
use crate::records::types::{Card, Transaction};

use super::rules::{evaluate_rule, RuleContext};
use super::types::{DetectionReport, FlaggedCard, MisuseRule};

/// The misuse detection engine. Runs every rule against each card's transactions.
pub struct MisuseDetector {
    config: DetectionConfig,
    distance: Arc<dyn DistanceProvider>,
}

impl MisuseDetector {
    pub fn new(config: DetectionConfig, distance: Arc<dyn DistanceProvider>) -> Self {
        Self { config, distance }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Scan all cards against `rules` and return the flagged ones in input order.
    ///
    /// Cards are evaluated concurrently. If `shutdown` fires mid-pass, cards
    /// already evaluated are kept and the rest are left out of the report.
    pub async fn detect(
        &self,
        cards: &[Card],
        transactions: &[Transaction],
        rules: &[MisuseRule],
        shutdown: &CancellationToken,
    ) -> DetectionReport {
        if !self.config.enabled || rules.is_empty() {
            return DetectionReport::default();
        }

        let index = TransactionIndex::build(transactions);
        let ctx = self.rule_context();

        let candidates: Vec<(&Card, &[&Transaction])> = cards
            .iter()
            .filter_map(|card| {
                let id = card.indexable_id()?;
                index.for_card(id).map(|txs| (card, txs))
            })
            .collect();

        // Futures are built up front so the stream holds no borrowing closure
        let evaluations: Vec<_> = candidates
            .into_iter()
            .map(|(card, txs)| evaluate_card(&ctx, card, txs, rules))
            .collect();
        let mut evaluations =
            pin!(stream::iter(evaluations).buffered(self.config.max_concurrent_cards.max(1)));

        let mut report = DetectionReport::default();
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    report.cancelled = true;
                    tracing::warn!(
                        evaluated = report.cards_evaluated,
                        "Detection pass cancelled, remaining cards omitted"
                    );
                    break;
                }
                next = evaluations.next() => match next {
                    Some(flagged) => {
                        report.cards_evaluated += 1;
                        report.flagged_cards.extend(flagged);
                    }
                    None => break,
                },
            }
        }

        tracing::info!(
            cards = cards.len(),
            evaluated = report.cards_evaluated,
            flagged = report.flagged_cards.len(),
            rules = rules.len(),
            "Detection pass complete"
        );
        report
    }

    fn rule_context(&self) -> RuleContext<'_> {
        RuleContext {
            distance: self.distance.as_ref(),
            count_window: hours(self.config.count_window_hours),
            travel_window: hours(self.config.travel_window_hours),
            lookup_timeout: std::time::Duration::from_millis(self.config.distance_timeout_ms),
        }
    }
}

/// Evaluate all rules for one card. Reasons come back in rule order.
async fn evaluate_card(
    ctx: &RuleContext<'_>,
    card: &Card,
    transactions: &[&Transaction],
    rules: &[MisuseRule],
) -> Option<FlaggedCard> {
    let verdicts = join_all(
        rules
            .iter()
            .map(|rule| evaluate_rule(ctx, card, transactions, rule)),
    )
    .await;

    let reasons: Vec<String> = verdicts
        .into_iter()
        .flatten()
        .map(|violation| violation.reason)
        .collect();

    tracing::debug!(
        card_id = card.indexable_id(),
        transactions = transactions.len(),
        violations = reasons.len(),
        "Evaluated card"
    );

    if reasons.is_empty() {
        return None;
    }

    Some(FlaggedCard {
        card: card.clone(),
        transactions: transactions.iter().map(|tx| (*tx).clone()).collect(),
        reasons,
    })
}

fn hours(h: f64) -> chrono::Duration {
    chrono::Duration::milliseconds((h * 3_600_000.0).round() as i64)
}
