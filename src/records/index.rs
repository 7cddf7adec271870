use std::collections::HashMap;

use super::types::Transaction;

/// In-memory index of transactions keyed by the owning card's id.
/// Each card's transactions keep the order they arrived in.
pub struct TransactionIndex<'a> {
    by_card: HashMap<&'a str, Vec<&'a Transaction>>,
}

impl<'a> TransactionIndex<'a> {
    /// Group a transaction list by card. Transactions without a card reference are dropped.
    pub fn build(transactions: &'a [Transaction]) -> Self {
        let mut by_card: HashMap<&'a str, Vec<&'a Transaction>> = HashMap::new();
        let mut orphaned = 0usize;

        for tx in transactions {
            let card_id = tx.card_record_id.trim();
            if card_id.is_empty() {
                orphaned += 1;
                continue;
            }
            by_card.entry(card_id).or_default().push(tx);
        }

        tracing::debug!(
            cards = by_card.len(),
            transactions = transactions.len(),
            orphaned,
            "Indexed transactions by card"
        );
        Self { by_card }
    }

    /// Look up a card's transactions. Returns None if the card has none.
    pub fn for_card(&self, card_id: &str) -> Option<&[&'a Transaction]> {
        self.by_card
            .get(card_id)
            .map(|v| v.as_slice())
            .filter(|v| !v.is_empty())
    }

    pub fn card_count(&self) -> usize {
        self.by_card.len()
    }
}
