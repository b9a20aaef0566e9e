//! Transaction export and import as CSV.
//!
//! Columns are `id,date,type,category,description,amount`. On import the `id`
//! column may be left blank, in which case a fresh id is assigned.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{FinError, Result};
use crate::ledger::TransactionInput;
use crate::model::{Kind, Ledger, Transaction, new_id};

#[derive(Debug, Serialize, Deserialize)]
struct Row {
    #[serde(default)]
    id: String,
    date: NaiveDate,
    #[serde(rename = "type")]
    kind: Kind,
    category: String,
    #[serde(default)]
    description: String,
    amount: f64,
}

/// Render every transaction, newest first.
pub fn to_csv(transactions: &[Transaction]) -> Result<String> {
    let mut sorted: Vec<&Transaction> = transactions.iter().collect();
    sorted.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.id.cmp(&b.id)));

    let mut writer = csv::Writer::from_writer(Vec::new());
    for tx in sorted {
        writer.serialize(Row {
            id: tx.id.clone(),
            date: tx.date,
            kind: tx.kind,
            category: tx.category.clone(),
            description: tx.description.clone(),
            amount: tx.amount,
        })?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| FinError::Io(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| FinError::validation(e.to_string()))
}

/// Parse a CSV upload into validated transactions.
///
/// The whole file is rejected if any row is malformed; the error names the
/// offending line.
pub fn from_csv(data: &[u8]) -> Result<Vec<Transaction>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(data);

    let mut out = Vec::new();
    for (index, row) in reader.deserialize::<Row>().enumerate() {
        // +2: header line, and lines count from one
        let line = index + 2;
        let row = row.map_err(|e| FinError::validation(format!("line {}: {}", line, e)))?;

        let input = TransactionInput {
            description: row.description,
            amount: row.amount,
            kind: row.kind,
            category: row.category,
            date: row.date,
        };
        input
            .validate()
            .map_err(|e| FinError::validation(format!("line {}: {}", line, e)))?;
        let id = if row.id.is_empty() { new_id() } else { row.id };
        out.push(input.into_transaction(id));
    }
    Ok(out)
}

/// Upsert imported rows into `ledger`; returns how many rows were applied.
pub fn import_into(ledger: &mut Ledger, data: &[u8]) -> Result<usize> {
    let rows = from_csv(data)?;
    let count = rows.len();
    for tx in rows {
        ledger.upsert_transaction(tx)?;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(id: &str, day: u32, amount: f64) -> Transaction {
        Transaction {
            id: id.into(),
            description: "Lunch, with team".into(),
            amount,
            kind: Kind::Expense,
            category: "Food".into(),
            date: NaiveDate::from_ymd_opt(2026, 10, day).unwrap(),
        }
    }

    #[test]
    fn export_has_header_and_newest_first() {
        let csv = to_csv(&[tx("a", 1, 10.0), tx("b", 5, 20.0)]).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "id,date,type,category,description,amount");
        assert!(lines[1].starts_with("b,2026-10-05,expense,Food,\"Lunch, with team\""));
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn exported_file_imports_back() {
        let original = vec![tx("a", 1, 10.0), tx("b", 5, 20.5)];
        let csv = to_csv(&original).unwrap();
        let mut ledger = Ledger::default();
        assert_eq!(import_into(&mut ledger, csv.as_bytes()).unwrap(), 2);
        assert_eq!(ledger.transaction("b").unwrap().amount, 20.5);
        assert_eq!(ledger.transaction("a").unwrap().description, "Lunch, with team");
    }

    #[test]
    fn blank_ids_get_generated() {
        let data = "id,date,type,category,description,amount\n,2026-10-01,income,Salary,,5000000\n";
        let rows = from_csv(data.as_bytes()).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].id.is_empty());
        assert_eq!(rows[0].kind, Kind::Income);
    }

    #[test]
    fn bad_rows_reject_the_file() {
        let data = "id,date,type,category,description,amount\n\
                    x,2026-10-01,expense,Food,ok,10\n\
                    y,2026-10-02,expense,Food,negative,-3\n";
        let err = from_csv(data.as_bytes()).unwrap_err();
        assert!(err.to_string().starts_with("line 3:"));

        let mut ledger = Ledger::default();
        assert!(import_into(&mut ledger, data.as_bytes()).is_err());
        assert!(ledger.transactions.is_empty());
    }
}
