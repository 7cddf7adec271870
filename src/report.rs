use serde::Serialize;
use std::io::Write;

use crate::config::ReportFormat;
use crate::misuse::types::FlaggedCard;

/// One row of the spreadsheet export, mirroring the dashboard's misuse report table.
#[derive(Debug, Serialize)]
struct ReportRow<'a> {
    card_id: &'a str,
    staff_id: &'a str,
    cardholder: &'a str,
    card_number: &'a str,
    transactions: usize,
    reasons: String,
}

impl<'a> From<&'a FlaggedCard> for ReportRow<'a> {
    fn from(flagged: &'a FlaggedCard) -> Self {
        Self {
            card_id: flagged.card.id.as_deref().unwrap_or(""),
            staff_id: &flagged.card.staff_id,
            cardholder: &flagged.card.primary_cardholder_name,
            card_number: &flagged.card.primary_card_number_barcode,
            transactions: flagged.transactions.len(),
            reasons: flagged.reasons.join("; "),
        }
    }
}

/// Write the flagged cards to `path`. Returns the number of cards written.
pub fn write_report(
    path: &str,
    format: ReportFormat,
    flagged: &[FlaggedCard],
) -> eyre::Result<usize> {
    match format {
        ReportFormat::Csv => write_csv(path, flagged)?,
        ReportFormat::Json => write_json(path, flagged)?,
    }

    tracing::info!(path, cards = flagged.len(), ?format, "Misuse report written");
    Ok(flagged.len())
}

fn write_csv(path: &str, flagged: &[FlaggedCard]) -> eyre::Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| eyre::eyre!("Failed to create report '{}': {}", path, e))?;

    if flagged.is_empty() {
        // serde only emits headers alongside the first row
        writer.write_record([
            "card_id",
            "staff_id",
            "cardholder",
            "card_number",
            "transactions",
            "reasons",
        ])?;
    }
    for card in flagged {
        writer.serialize(ReportRow::from(card))?;
    }
    writer.flush()?;
    Ok(())
}

fn write_json(path: &str, flagged: &[FlaggedCard]) -> eyre::Result<()> {
    let file = std::fs::File::create(path)
        .map_err(|e| eyre::eyre!("Failed to create report '{}': {}", path, e))?;
    let mut writer = std::io::BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, flagged)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::types::{Card, Transaction};

    fn flagged() -> FlaggedCard {
        let card: Card = serde_json::from_value(serde_json::json!({
            "id": "2",
            "staffId": "678901",
            "primaryCardholderName": "Bob Williams",
            "primaryCardNumberBarcode": "635666678901",
        }))
        .unwrap();
        let tx: Transaction = serde_json::from_value(serde_json::json!({
            "id": "txn-1",
            "cardRecordId": "2",
            "transaction_datetime": "2024-05-01T10:30:00Z",
            "transaction_store": "B&Q London",
            "transaction_amount": 75.0,
            "payer_name": "Fraudulent Frank",
        }))
        .unwrap();
        FlaggedCard {
            card,
            transactions: vec![tx],
            reasons: vec![
                "Card violates transaction amount rule".to_string(),
                "Card violates payer mismatch rule".to_string(),
            ],
        }
    }

    #[test]
    fn test_write_csv_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        let path = path.to_str().unwrap();

        let written = write_report(path, ReportFormat::Csv, &[flagged()]).unwrap();
        assert_eq!(written, 1);

        let content = std::fs::read_to_string(path).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next(),
            Some("card_id,staff_id,cardholder,card_number,transactions,reasons")
        );
        assert_eq!(
            lines.next(),
            Some("2,678901,Bob Williams,635666678901,1,Card violates transaction amount rule; Card violates payer mismatch rule")
        );
    }

    #[test]
    fn test_write_empty_csv_report_keeps_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        let path = path.to_str().unwrap();

        write_report(path, ReportFormat::Csv, &[]).unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.starts_with("card_id,staff_id"));
    }

    #[test]
    fn test_write_json_report_flattens_card() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let path = path.to_str().unwrap();

        write_report(path, ReportFormat::Json, &[flagged()]).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(value[0]["primaryCardholderName"], "Bob Williams");
        assert_eq!(value[0]["transactions"][0]["cardRecordId"], "2");
        assert_eq!(value[0]["reasons"].as_array().unwrap().len(), 2);
    }
}
