//! Bank account operations

use rusqlite::{params, OptionalExtension};

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::BankAccount;

const ACCOUNT_COLUMNS: &str = "id, user_id, bank_name, account_number, currency, created_at";

fn row_to_account(row: &rusqlite::Row) -> rusqlite::Result<BankAccount> {
    let created_at_str: String = row.get(5)?;
    Ok(BankAccount {
        id: row.get(0)?,
        user_id: row.get(1)?,
        bank_name: row.get(2)?,
        account_number: row.get(3)?,
        currency: row.get(4)?,
        created_at: parse_datetime(&created_at_str),
    })
}

impl Database {
    /// Create a bank account for a user
    pub fn create_bank_account(
        &self,
        user_id: i64,
        bank_name: &str,
        account_number: Option<&str>,
        currency: &str,
    ) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO bank_accounts (user_id, bank_name, account_number, currency) VALUES (?, ?, ?, ?)",
            params![user_id, bank_name.trim(), account_number, currency.to_uppercase()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Get a bank account by ID
    pub fn get_bank_account(&self, id: i64) -> Result<Option<BankAccount>> {
        let conn = self.conn()?;
        let account = conn
            .query_row(
                &format!("SELECT {} FROM bank_accounts WHERE id = ?", ACCOUNT_COLUMNS),
                params![id],
                row_to_account,
            )
            .optional()?;
        Ok(account)
    }

    /// List bank accounts, optionally for one user
    pub fn list_bank_accounts(&self, user_id: Option<i64>) -> Result<Vec<BankAccount>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM bank_accounts WHERE (?1 IS NULL OR user_id = ?1) ORDER BY bank_name, id",
            ACCOUNT_COLUMNS
        ))?;
        let accounts = stmt
            .query_map(params![user_id], row_to_account)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(accounts)
    }
}
