use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A discount card account as supplied by the dashboard.
/// Field names follow the dashboard's camelCase JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub staff_id: String,
    #[serde(default)]
    pub company_name: String,
    pub primary_cardholder_name: String,
    #[serde(default)]
    pub primary_card_number_barcode: String,
    #[serde(default)]
    pub cardholder_name2: Option<String>,
    #[serde(default)]
    pub card_number2: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expires: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

impl Card {
    /// The card's id if it is present and not blank.
    pub fn indexable_id(&self) -> Option<&str> {
        self.id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    /// The secondary cardholder name, if one is on the card.
    pub fn secondary_name(&self) -> Option<&str> {
        self.cardholder_name2
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// Whether `payer` is one of the named cardholders.
    /// Names are compared case-sensitively after trimming whitespace.
    pub fn is_cardholder(&self, payer: &str) -> bool {
        let payer = payer.trim();
        payer == self.primary_cardholder_name.trim() || Some(payer) == self.secondary_name()
    }
}

/// A single purchase attributed to a card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    #[serde(rename = "cardRecordId", default)]
    pub card_record_id: String,
    #[serde(rename = "cardNumber", default)]
    pub card_number: String,
    pub transaction_datetime: DateTime<Utc>,
    pub transaction_store: String,
    pub transaction_amount: f64,
    #[serde(default)]
    pub transaction_discount: f64,
    pub payer_name: String,
    #[serde(default)]
    pub payer_card_number: String,
}
