use serde::de::DeserializeOwned;
use std::path::Path;

use super::types::{Card, Transaction};

/// Load card records from a `.json` array or a `.csv` file with a header row.
pub fn load_cards(path: &str) -> eyre::Result<Vec<Card>> {
    let cards: Vec<Card> = load_records(path, "card")?;
    tracing::info!(cards = cards.len(), path, "Loaded card records");
    Ok(cards)
}

/// Load transaction records from a `.json` array or a `.csv` file with a header row.
pub fn load_transactions(path: &str) -> eyre::Result<Vec<Transaction>> {
    let transactions: Vec<Transaction> = load_records(path, "transaction")?;
    tracing::info!(
        transactions = transactions.len(),
        path,
        "Loaded transaction records"
    );
    Ok(transactions)
}

fn load_records<T: DeserializeOwned>(path: &str, kind: &str) -> eyre::Result<Vec<T>> {
    let extension = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("json") => parse_json_records(path, kind),
        Some("csv") => parse_csv_records(path, kind),
        _ => Err(eyre::eyre!(
            "Unsupported {} file '{}': expected a .json or .csv extension",
            kind,
            path
        )),
    }
}

fn parse_json_records<T: DeserializeOwned>(path: &str, kind: &str) -> eyre::Result<Vec<T>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("Failed to read {} file '{}': {}", kind, path, e))?;

    let value: serde_json::Value = serde_json::from_str(&content)
        .map_err(|e| eyre::eyre!("Failed to parse {} file '{}': {}", kind, path, e))?;

    // Reject the wrong shape up front so the message names the file, not a serde path
    if !value.is_array() {
        return Err(eyre::eyre!(
            "{} file '{}' must contain a JSON array of {} records",
            kind,
            path,
            kind
        ));
    }

    serde_json::from_value(value)
        .map_err(|e| eyre::eyre!("Invalid {} record in '{}': {}", kind, path, e))
}

fn parse_csv_records<T: DeserializeOwned>(path: &str, kind: &str) -> eyre::Result<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("Failed to open {} CSV '{}': {}", kind, path, e))?;

    let mut records = Vec::new();
    for (row, result) in reader.deserialize().enumerate() {
        // Row numbers are 1-based and skip the header
        let record: T = result.map_err(|e| {
            eyre::eyre!("Invalid {} record at row {} of '{}': {}", kind, row + 2, path, e)
        })?;
        records.push(record);
    }

    Ok(records)
}
