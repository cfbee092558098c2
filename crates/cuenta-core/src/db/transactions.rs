//! Transaction operations

use chrono::NaiveDate;
use rusqlite::{params, Connection};

use super::{parse_datetime, parse_decimal_column, Database};
use crate::error::Result;
use crate::models::{NewTransaction, Transaction, TransactionType};

const TRANSACTION_COLUMNS: &str = "id, bank_account_id, statement_file_id, category_id, date, \
     description, amount, transaction_type, bank_entry_type, merchant, reference, created_at";

/// Insert one transaction on an open connection (or transaction)
pub(crate) fn insert_transaction_in(conn: &Connection, tx: &NewTransaction) -> Result<i64> {
    conn.execute(
        r#"
        INSERT INTO transactions (bank_account_id, statement_file_id, category_id, date,
                                  description, amount, transaction_type, bank_entry_type,
                                  merchant, reference)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            tx.bank_account_id,
            tx.statement_file_id,
            tx.category_id,
            tx.date.format("%Y-%m-%d").to_string(),
            tx.description,
            tx.amount.to_string(),
            tx.transaction_type.as_str(),
            tx.bank_entry_type.map(|t| t.as_str()),
            tx.merchant,
            tx.reference,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Remove everything a previous run imported for this statement
pub(crate) fn delete_statement_transactions_in(conn: &Connection, statement_id: i64) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM transactions WHERE statement_file_id = ?",
        params![statement_id],
    )?)
}

impl Database {
    /// Helper to convert a row to Transaction (column order: `TRANSACTION_COLUMNS`)
    pub(crate) fn row_to_transaction(row: &rusqlite::Row) -> rusqlite::Result<Transaction> {
        let date_str: String = row.get(4)?;
        let amount_str: String = row.get(6)?;
        let type_str: String = row.get(7)?;
        let entry_str: Option<String> = row.get(8)?;
        let created_at_str: String = row.get(11)?;
        Ok(Transaction {
            id: row.get(0)?,
            bank_account_id: row.get(1)?,
            statement_file_id: row.get(2)?,
            category_id: row.get(3)?,
            date: NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").unwrap_or_default(),
            description: row.get(5)?,
            amount: parse_decimal_column(&amount_str),
            transaction_type: type_str.parse().unwrap_or(TransactionType::VariableExpense),
            bank_entry_type: entry_str.and_then(|s| s.parse().ok()),
            merchant: row.get(9)?,
            reference: row.get(10)?,
            created_at: parse_datetime(&created_at_str),
        })
    }

    /// Insert a single transaction
    pub fn insert_transaction(&self, tx: &NewTransaction) -> Result<i64> {
        let conn = self.conn()?;
        insert_transaction_in(&conn, tx)
    }

    /// Transactions imported from one statement, in statement order
    pub fn list_statement_transactions(&self, statement_id: i64) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM transactions WHERE statement_file_id = ? ORDER BY id",
            TRANSACTION_COLUMNS
        ))?;
        let transactions = stmt
            .query_map(params![statement_id], |row| Self::row_to_transaction(row))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(transactions)
    }

    /// Most recent transactions of an account
    pub fn list_account_transactions(
        &self,
        bank_account_id: i64,
        limit: i64,
    ) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM transactions WHERE bank_account_id = ? ORDER BY date DESC, id DESC LIMIT ?",
            TRANSACTION_COLUMNS
        ))?;
        let transactions = stmt
            .query_map(params![bank_account_id, limit], |row| {
                Self::row_to_transaction(row)
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(transactions)
    }

    /// Count transactions imported from one statement
    pub fn count_statement_transactions(&self, statement_id: i64) -> Result<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM transactions WHERE statement_file_id = ?",
            params![statement_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
