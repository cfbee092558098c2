//! Statement file operations
//!
//! A statement moves `pending -> processing -> {parsed | error}`. Only the
//! ingestion pipeline writes the status; `reset_statement_for_reprocess`
//! re-enters `pending` on operator request.

use rusqlite::{params, OptionalExtension};
use tracing::{debug, info, warn};

use super::summaries::delete_summary_in;
use super::transactions::delete_statement_transactions_in;
use super::{insert_summary_in, now_str, parse_datetime, Database};
use crate::error::{Error, Result};
use crate::importer::{ImportTarget, TransactionImporter};
use crate::models::{
    NewFinancialSummary, ParsedStatement, RedactionMap, StatementFile, StatementStatus,
};

const STATEMENT_COLUMNS: &str = "id, bank_account_id, filename, status, parsed_json, \
     redaction_map, redaction_hmac, error_message, processed_at, created_at";

fn row_to_statement(row: &rusqlite::Row) -> rusqlite::Result<StatementFile> {
    let status_str: String = row.get(3)?;
    let map_json: Option<String> = row.get(5)?;
    let processed_at: Option<String> = row.get(8)?;
    let created_at_str: String = row.get(9)?;
    Ok(StatementFile {
        id: row.get(0)?,
        bank_account_id: row.get(1)?,
        filename: row.get(2)?,
        status: status_str.parse().unwrap_or(StatementStatus::Error),
        parsed_json: row.get(4)?,
        redaction_map: map_json.and_then(|json| serde_json::from_str(&json).ok()),
        redaction_hmac: row.get(6)?,
        error_message: row.get(7)?,
        processed_at: processed_at.as_deref().map(parse_datetime),
        created_at: parse_datetime(&created_at_str),
    })
}

/// Outcome of writing a parse result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Finalized {
    /// Transactions created by this run
    pub imported: usize,
    /// Whether the financial summary row was written
    pub summary_saved: bool,
}

impl Database {
    /// Store an uploaded statement; it starts out `pending`
    pub fn create_statement_file(
        &self,
        bank_account_id: i64,
        filename: &str,
        content: &[u8],
    ) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO statement_files (bank_account_id, filename, content, status) VALUES (?, ?, ?, ?)",
            params![
                bank_account_id,
                filename,
                content,
                StatementStatus::Pending.as_str()
            ],
        )?;
        let id = conn.last_insert_rowid();
        info!(statement_id = id, bytes = content.len(), "Stored statement file");
        Ok(id)
    }

    /// Get a statement by ID (without its content)
    pub fn get_statement_file(&self, id: i64) -> Result<Option<StatementFile>> {
        let conn = self.conn()?;
        let statement = conn
            .query_row(
                &format!("SELECT {} FROM statement_files WHERE id = ?", STATEMENT_COLUMNS),
                params![id],
                row_to_statement,
            )
            .optional()?;
        Ok(statement)
    }

    /// The uploaded PDF bytes
    pub fn get_statement_blob(&self, id: i64) -> Result<Vec<u8>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT content FROM statement_files WHERE id = ?",
            params![id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| Error::NotFound(format!("statement file {}", id)))
    }

    /// List statements, newest first, optionally for one bank account
    pub fn list_statement_files(&self, bank_account_id: Option<i64>) -> Result<Vec<StatementFile>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM statement_files WHERE (?1 IS NULL OR bank_account_id = ?1) ORDER BY id DESC",
            STATEMENT_COLUMNS
        ))?;
        let statements = stmt
            .query_map(params![bank_account_id], row_to_statement)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(statements)
    }

    /// The user owning the statement's bank account
    pub fn statement_owner(&self, id: i64) -> Result<i64> {
        let conn = self.conn()?;
        conn.query_row(
            r#"
            SELECT ba.user_id FROM statement_files sf
            JOIN bank_accounts ba ON ba.id = sf.bank_account_id
            WHERE sf.id = ?
            "#,
            params![id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| Error::NotFound(format!("statement file {}", id)))
    }

    /// Move a statement to a new status
    pub fn set_statement_status(&self, id: i64, status: StatementStatus) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE statement_files SET status = ? WHERE id = ?",
            params![status.as_str(), id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("statement file {}", id)));
        }
        debug!(statement_id = id, status = %status, "Statement status changed");
        Ok(())
    }

    /// Move a statement to `processing`, dropping the previous run's redaction
    /// map, HMAC and error
    pub fn begin_statement_processing(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            r#"
            UPDATE statement_files
            SET status = ?, redaction_map = NULL, redaction_hmac = NULL, error_message = NULL
            WHERE id = ?
            "#,
            params![StatementStatus::Processing.as_str(), id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("statement file {}", id)));
        }
        debug!(statement_id = id, "Statement processing started");
        Ok(())
    }

    /// Persist the token map and the HMAC of the payload sent out
    pub fn save_redaction(&self, id: i64, map: &RedactionMap, hmac: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE statement_files SET redaction_map = ?, redaction_hmac = ? WHERE id = ?",
            params![serde_json::to_string(map)?, hmac, id],
        )?;
        Ok(())
    }

    /// The stored HMAC of the redacted payload, if the statement was redacted
    pub fn get_redaction_hmac(&self, id: i64) -> Result<Option<String>> {
        let conn = self.conn()?;
        let hmac: Option<Option<String>> = conn
            .query_row(
                "SELECT redaction_hmac FROM statement_files WHERE id = ?",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(hmac.flatten())
    }

    /// Terminal failure: record the message and stamp `processed_at`
    pub fn mark_statement_error(&self, id: i64, message: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE statement_files SET status = ?, error_message = ?, processed_at = ? WHERE id = ?",
            params![StatementStatus::Error.as_str(), message, now_str(), id],
        )?;
        Ok(())
    }

    /// Return a statement to `pending`, clearing the previous run's outcome
    ///
    /// Imported transactions are left in place until the next run finalizes,
    /// which replaces them.
    pub fn reset_statement_for_reprocess(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            r#"
            UPDATE statement_files
            SET status = ?, parsed_json = NULL, redaction_map = NULL, redaction_hmac = NULL,
                error_message = NULL, processed_at = NULL
            WHERE id = ?
            "#,
            params![StatementStatus::Pending.as_str(), id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("statement file {}", id)));
        }
        info!(statement_id = id, "Statement reset for reprocessing");
        Ok(())
    }

    /// Write a parse result in one transaction
    ///
    /// Drops whatever an earlier run imported for this statement, imports
    /// `parsed.transactions`, saves the summary (a failing summary is rolled
    /// back on its own and does not fail the statement), then stores
    /// `parsed_json` with `imported_count` and marks the statement `parsed`.
    pub fn finalize_statement(
        &self,
        id: i64,
        parsed: &mut ParsedStatement,
        summary: Option<&NewFinancialSummary>,
    ) -> Result<Finalized> {
        let mut conn = self.conn()?;
        let mut tx = conn.transaction()?;

        let (bank_account_id, user_id): (i64, i64) = tx
            .query_row(
                r#"
                SELECT sf.bank_account_id, ba.user_id FROM statement_files sf
                JOIN bank_accounts ba ON ba.id = sf.bank_account_id
                WHERE sf.id = ?
                "#,
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("statement file {}", id)))?;

        let replaced = delete_statement_transactions_in(&tx, id)?;
        delete_summary_in(&tx, id)?;
        if replaced > 0 {
            info!(statement_id = id, replaced, "Replacing transactions from a previous run");
        }

        let target = ImportTarget {
            user_id,
            bank_account_id,
            statement_file_id: id,
        };
        let imported = TransactionImporter::new(&tx, target).import(&parsed.transactions)?;

        let summary_saved = match summary {
            Some(summary) => {
                let sp = tx.savepoint()?;
                match insert_summary_in(&sp, id, summary) {
                    Ok(_) => {
                        sp.commit()?;
                        true
                    }
                    Err(e) => {
                        // Savepoint rolls back on drop
                        warn!(statement_id = id, error = %e, "Failed to save financial summary");
                        false
                    }
                }
            }
            None => false,
        };

        parsed.imported_count = Some(imported);
        tx.execute(
            r#"
            UPDATE statement_files
            SET status = ?, parsed_json = ?, error_message = NULL, processed_at = ?
            WHERE id = ?
            "#,
            params![
                StatementStatus::Parsed.as_str(),
                serde_json::to_string(parsed)?,
                now_str(),
                id
            ],
        )?;
        tx.commit()?;

        Ok(Finalized {
            imported,
            summary_saved,
        })
    }
}
