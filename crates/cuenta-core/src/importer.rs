//! Materialize parsed transaction records as rows
//!
//! Runs on the connection (usually an open SQLite transaction) handed in by
//! `Database::finalize_statement`, so the import commits or rolls back
//! together with the statement's `parsed_json`.

use std::collections::HashMap;

use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::db::{find_or_create_category_in, insert_transaction_in};
use crate::error::Result;
use crate::models::{
    BankEntryType, NewTransaction, ParsedTransaction, TransactionType, UNCATEGORIZED,
};

/// Where imported rows belong
#[derive(Debug, Clone, Copy)]
pub struct ImportTarget {
    /// Owner of the categories
    pub user_id: i64,
    pub bank_account_id: i64,
    pub statement_file_id: i64,
}

/// Turns normalized parse records into transactions
pub struct TransactionImporter<'c> {
    conn: &'c Connection,
    target: ImportTarget,
    /// (parent id, name) -> category id, for this import only
    categories: HashMap<(Option<i64>, String), i64>,
}

impl<'c> TransactionImporter<'c> {
    pub fn new(conn: &'c Connection, target: ImportTarget) -> Self {
        Self {
            conn,
            target,
            categories: HashMap::new(),
        }
    }

    /// Import every usable record; returns how many rows were created
    ///
    /// Records with an unreadable date or amount are skipped with a warning.
    pub fn import(&mut self, records: &[ParsedTransaction]) -> Result<usize> {
        let mut created = 0;

        for record in records {
            let Some(tx) = self.to_new_transaction(record)? else {
                continue;
            };
            insert_transaction_in(self.conn, &tx)?;
            created += 1;
        }

        debug!(
            statement_id = self.target.statement_file_id,
            created,
            skipped = records.len() - created,
            "Imported transactions"
        );
        Ok(created)
    }

    fn to_new_transaction(&mut self, record: &ParsedTransaction) -> Result<Option<NewTransaction>> {
        let Ok(date) = NaiveDate::parse_from_str(record.date.trim(), "%Y-%m-%d") else {
            warn!(date = %record.date, "Skipping transaction with unreadable date");
            return Ok(None);
        };

        let Some(amount) = Decimal::try_from(record.amount)
            .ok()
            .map(|d| d.round_dp(2))
        else {
            warn!(amount = record.amount, "Skipping transaction with unreadable amount");
            return Ok(None);
        };

        // Classification always follows the sign, whatever produced the record
        let negative = amount.is_sign_negative() && !amount.is_zero();
        let transaction_type = TransactionType::for_amount(Some(record.transaction_type), negative);
        let bank_entry_type = record.bank_entry_type.map(|_| BankEntryType::from_sign(negative));

        let category_id = self.resolve_category(&record.category, record.sub_category.as_deref())?;

        Ok(Some(NewTransaction {
            bank_account_id: self.target.bank_account_id,
            statement_file_id: Some(self.target.statement_file_id),
            category_id,
            date,
            description: record.description.trim().to_string(),
            amount,
            transaction_type,
            bank_entry_type,
            merchant: record.merchant.clone(),
            reference: record.reference.clone(),
        }))
    }

    /// Parent, then child under it; "Uncategorized" or blank means no category
    fn resolve_category(&mut self, category: &str, sub_category: Option<&str>) -> Result<Option<i64>> {
        let category = category.trim();
        if category.is_empty() || category.eq_ignore_ascii_case(UNCATEGORIZED) {
            return Ok(None);
        }

        let parent_id = self.category_id(None, category)?;
        match sub_category.map(str::trim).filter(|s| !s.is_empty()) {
            Some(child) => Ok(Some(self.category_id(Some(parent_id), child)?)),
            None => Ok(Some(parent_id)),
        }
    }

    fn category_id(&mut self, parent_id: Option<i64>, name: &str) -> Result<i64> {
        let key = (parent_id, name.to_string());
        if let Some(id) = self.categories.get(&key) {
            return Ok(*id);
        }
        let (id, created) =
            find_or_create_category_in(self.conn, self.target.user_id, parent_id, name)?;
        if created {
            debug!(user_id = self.target.user_id, name, "Created category during import");
        }
        self.categories.insert(key, id);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn record(date: &str, amount: f64, category: &str, sub: Option<&str>) -> ParsedTransaction {
        ParsedTransaction {
            date: date.to_string(),
            description: "  OXXO Compra ".to_string(),
            amount,
            transaction_type: TransactionType::Income,
            bank_entry_type: Some(BankEntryType::Credit),
            merchant: None,
            reference: None,
            category: category.to_string(),
            sub_category: sub.map(String::from),
            raw_text: String::new(),
            confidence: 0.9,
            category_confidence: None,
            transaction_type_confidence: None,
        }
    }

    fn setup() -> (Database, ImportTarget) {
        let db = Database::in_memory().unwrap();
        let user_id = db.upsert_user("importer@example.com").unwrap();
        let account = db.create_bank_account(user_id, "BBVA", None, "MXN").unwrap();
        let statement = db.create_statement_file(account, "s.pdf", b"%PDF").unwrap();
        (
            db,
            ImportTarget {
                user_id,
                bank_account_id: account,
                statement_file_id: statement,
            },
        )
    }

    #[test]
    fn test_sign_overrides_model_classification() {
        let (db, target) = setup();
        let conn = db.conn().unwrap();

        let imported = TransactionImporter::new(&conn, target)
            .import(&[record("2025-01-07", -89.0, UNCATEGORIZED, None)])
            .unwrap();
        assert_eq!(imported, 1);

        let txs = db.list_statement_transactions(target.statement_file_id).unwrap();
        assert_eq!(txs[0].amount, Decimal::new(-8900, 2));
        assert_eq!(txs[0].transaction_type, TransactionType::VariableExpense);
        assert_eq!(txs[0].bank_entry_type, Some(BankEntryType::Debit));
        assert_eq!(txs[0].description, "OXXO Compra");
        assert_eq!(txs[0].category_id, None);
    }

    #[test]
    fn test_categories_resolved_once_per_name() {
        let (db, target) = setup();
        let conn = db.conn().unwrap();

        let records = vec![
            record("2025-01-03", -120.0, "Comida", Some("Restaurantes")),
            record("2025-01-04", -45.5, "Comida", Some("Restaurantes")),
            record("2025-01-05", -300.0, "Comida", None),
        ];
        let imported = TransactionImporter::new(&conn, target).import(&records).unwrap();
        assert_eq!(imported, 3);

        let txs = db.list_statement_transactions(target.statement_file_id).unwrap();
        assert_eq!(txs[0].category_id, txs[1].category_id);

        let child = db.get_category(txs[0].category_id.unwrap()).unwrap().unwrap();
        assert_eq!(child.name, "Restaurantes");
        assert_eq!(child.parent_id, txs[2].category_id);
        assert_eq!(db.list_categories(target.user_id).unwrap().len(), 2);
    }

    #[test]
    fn test_bad_dates_are_skipped() {
        let (db, target) = setup();
        let conn = db.conn().unwrap();

        let records = vec![
            record("03/01/2025", 10.0, UNCATEGORIZED, None),
            record("2025-02-30", 10.0, UNCATEGORIZED, None),
            record("2025-01-03", 15000.0, UNCATEGORIZED, None),
        ];
        let imported = TransactionImporter::new(&conn, target).import(&records).unwrap();
        assert_eq!(imported, 1);
        assert_eq!(
            db.count_statement_transactions(target.statement_file_id).unwrap(),
            1
        );
    }
}
