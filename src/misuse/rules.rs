use chrono::{DateTime, Duration, Utc};

use crate::distance::DistanceProvider;
use crate::records::types::{Card, Transaction};

use super::types::{MisuseRule, RuleField, RuleOperator, Violation};

/// Everything an evaluator needs beyond the card and the rule.
pub struct RuleContext<'a> {
    pub distance: &'a dyn DistanceProvider,
    /// Length of the rolling window for `transaction_count`.
    pub count_window: Duration,
    /// Longest gap between two transactions still checked for impossible travel.
    pub travel_window: Duration,
    pub lookup_timeout: std::time::Duration,
}

/// Run one rule against one card's transactions.
/// Rules that cannot be evaluated (unknown field, bad operator, bad value) never fire.
pub async fn evaluate_rule(
    ctx: &RuleContext<'_>,
    card: &Card,
    transactions: &[&Transaction],
    rule: &MisuseRule,
) -> Option<Violation> {
    if transactions.is_empty() || matches!(rule.operator, RuleOperator::Unsupported(_)) {
        return None;
    }
    let threshold = rule.threshold()?;

    let operator = &rule.operator;
    let reason = match &rule.field {
        RuleField::PayerMismatch => check_payer_mismatch(card, transactions, operator, threshold),
        RuleField::TransactionAmount => check_transaction_amount(transactions, operator, threshold),
        RuleField::TransactionCount => {
            check_transaction_count(transactions, operator, threshold, ctx.count_window)
        }
        RuleField::StoresDistance => {
            check_stores_distance(ctx, transactions, operator, threshold).await
        }
        RuleField::Unknown(_) => None,
    }?;

    Some(Violation {
        rule_id: rule.id.clone(),
        field: rule.field.clone(),
        reason,
    })
}

/// Check the share of transactions paid by someone other than the cardholders.
pub fn check_payer_mismatch(
    card: &Card,
    transactions: &[&Transaction],
    operator: &RuleOperator,
    threshold: f64,
) -> Option<String> {
    let total = transactions.len();
    let mismatches = transactions
        .iter()
        .filter(|tx| !card.is_cardholder(&tx.payer_name))
        .count();
    let ratio = 100.0 * mismatches as f64 / total as f64;

    if !operator.compare(ratio, threshold) {
        return None;
    }

    Some(format!(
        "Card violates payer mismatch rule: {:.1}% of transactions ({} of {}) were paid by someone other than the cardholder (threshold {} {}%)",
        ratio, mismatches, total, operator, threshold
    ))
}

/// Check whether any single transaction amount crosses the threshold.
pub fn check_transaction_amount(
    transactions: &[&Transaction],
    operator: &RuleOperator,
    threshold: f64,
) -> Option<String> {
    let offending: Vec<&&Transaction> = transactions
        .iter()
        .filter(|tx| operator.compare(tx.transaction_amount, threshold))
        .collect();

    let largest = offending
        .iter()
        .max_by(|a, b| a.transaction_amount.total_cmp(&b.transaction_amount))?;

    Some(format!(
        "Card violates transaction amount rule: {} transaction(s) with amount {} {} (largest: {:.2} at {} on {})",
        offending.len(),
        operator,
        threshold,
        largest.transaction_amount,
        largest.transaction_store,
        format_time(largest.transaction_datetime),
    ))
}

/// Check the busiest rolling window. Each window is anchored at a transaction and
/// covers the closed interval `[t - window, t]`.
pub fn check_transaction_count(
    transactions: &[&Transaction],
    operator: &RuleOperator,
    threshold: f64,
    window: Duration,
) -> Option<String> {
    let (busiest, anchor) = max_window_count(transactions, window)?;

    if !operator.compare(busiest as f64, threshold) {
        return None;
    }

    Some(format!(
        "Card violates transaction count rule: {} transactions within {} hours ending {} (threshold {} {})",
        busiest,
        window_hours(window),
        format_time(anchor),
        operator,
        threshold
    ))
}

/// Largest number of transactions in any window, with the anchoring timestamp.
fn max_window_count(
    transactions: &[&Transaction],
    window: Duration,
) -> Option<(usize, DateTime<Utc>)> {
    let mut times: Vec<DateTime<Utc>> =
        transactions.iter().map(|tx| tx.transaction_datetime).collect();
    times.sort();

    let mut best: Option<(usize, DateTime<Utc>)> = None;
    let mut start = 0;

    for (end, &anchor) in times.iter().enumerate() {
        let window_start = anchor
            .checked_sub_signed(window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        while times[start] < window_start {
            start += 1;
        }
        let count = end - start + 1;
        if best.map_or(true, |(max, _)| count > max) {
            best = Some((count, anchor));
        }
    }

    best
}

/// Check consecutive transactions (by time) for travel between distant stores.
/// Pairs further apart than the travel window, or whose distance is unknown, are skipped.
/// Two transactions at different places with no time between them always fire.
pub async fn check_stores_distance(
    ctx: &RuleContext<'_>,
    transactions: &[&Transaction],
    operator: &RuleOperator,
    threshold: f64,
) -> Option<String> {
    let mut ordered: Vec<&Transaction> = transactions.to_vec();
    ordered.sort_by_key(|tx| tx.transaction_datetime);

    for pair in ordered.windows(2) {
        let (earlier, later) = (pair[0], pair[1]);
        let elapsed = later.transaction_datetime - earlier.transaction_datetime;
        if elapsed > ctx.travel_window {
            continue;
        }

        let Some(distance) = resolve_distance(
            ctx,
            &earlier.transaction_store,
            &later.transaction_store,
        )
        .await
        else {
            continue;
        };

        let elapsed_hours = elapsed.num_milliseconds() as f64 / 3_600_000.0;
        let instantaneous = elapsed_hours <= 0.0;

        if !(operator.compare(distance, threshold) || (instantaneous && distance > 0.0)) {
            continue;
        }

        let speed = if instantaneous {
            "at the same moment".to_string()
        } else {
            format!(
                "{:.1} hours apart, implying {:.0} km/h",
                elapsed_hours,
                distance / elapsed_hours
            )
        };

        return Some(format!(
            "Card violates store distance rule: {} ({}) and {} ({}) are {:.0} km apart, {} (threshold {} {} km)",
            earlier.transaction_store,
            format_time(earlier.transaction_datetime),
            later.transaction_store,
            format_time(later.transaction_datetime),
            distance,
            speed,
            operator,
            threshold
        ));
    }

    None
}

/// Ask the provider for a distance. Failures, timeouts and nonsense values count as unknown.
async fn resolve_distance(ctx: &RuleContext<'_>, from: &str, to: &str) -> Option<f64> {
    match tokio::time::timeout(ctx.lookup_timeout, ctx.distance.distance_km(from, to)).await {
        Ok(Ok(Some(km))) if km.is_finite() && km >= 0.0 => Some(km),
        Ok(Ok(Some(km))) => {
            tracing::warn!(from, to, km, "Distance provider returned an invalid distance, skipping pair");
            None
        }
        Ok(Ok(None)) => {
            tracing::debug!(from, to, "Distance unknown, skipping pair");
            None
        }
        Ok(Err(e)) => {
            tracing::warn!(from, to, error = %e, "Distance lookup failed, skipping pair");
            None
        }
        Err(_) => {
            tracing::warn!(
                from,
                to,
                timeout_ms = ctx.lookup_timeout.as_millis() as u64,
                "Distance lookup timed out, skipping pair"
            );
            None
        }
    }
}

fn window_hours(window: Duration) -> f64 {
    window.num_milliseconds() as f64 / 3_600_000.0
}

fn format_time(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d %H:%M UTC").to_string()
}
