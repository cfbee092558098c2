//! Financial summary operations

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};

use super::{parse_decimal_column, Database};
use crate::error::Result;
use crate::models::{FinancialSummary, NewFinancialSummary, StatementType, StatementTypeData};

/// Insert the summary of a statement on an open connection (or transaction)
pub(crate) fn insert_summary_in(
    conn: &Connection,
    statement_id: i64,
    summary: &NewFinancialSummary,
) -> Result<i64> {
    let type_data = serde_json::to_string(&summary.type_data)?;
    conn.execute(
        r#"
        INSERT INTO statement_financial_summaries
            (statement_file_id, statement_type, initial_balance, final_balance,
             period_start, period_end, days_in_period, total_commissions, total_fees, type_data)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            statement_id,
            summary.statement_type.as_str(),
            summary.initial_balance.to_string(),
            summary.final_balance.to_string(),
            summary.period_start.format("%Y-%m-%d").to_string(),
            summary.period_end.format("%Y-%m-%d").to_string(),
            summary.days_in_period,
            summary.total_commissions.map(|d| d.to_string()),
            summary.total_fees.map(|d| d.to_string()),
            type_data,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn delete_summary_in(conn: &Connection, statement_id: i64) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM statement_financial_summaries WHERE statement_file_id = ?",
        params![statement_id],
    )?)
}

fn parse_date_column(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap_or_default()
}

impl Database {
    /// The financial summary of a statement, if one was extracted
    pub fn get_financial_summary(&self, statement_id: i64) -> Result<Option<FinancialSummary>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                r#"
                SELECT id, statement_file_id, statement_type, initial_balance, final_balance,
                       period_start, period_end, days_in_period, total_commissions, total_fees,
                       type_data
                FROM statement_financial_summaries WHERE statement_file_id = ?
                "#,
                params![statement_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, i64>(7)?,
                        row.get::<_, Option<String>>(8)?,
                        row.get::<_, Option<String>>(9)?,
                        row.get::<_, String>(10)?,
                    ))
                },
            )
            .optional()?;

        let Some((
            id,
            statement_file_id,
            statement_type,
            initial_balance,
            final_balance,
            period_start,
            period_end,
            days_in_period,
            total_commissions,
            total_fees,
            type_data,
        )) = row
        else {
            return Ok(None);
        };

        let statement_type: StatementType = statement_type.parse().unwrap_or_default();
        Ok(Some(FinancialSummary {
            id,
            statement_file_id,
            statement_type,
            initial_balance: parse_decimal_column(&initial_balance),
            final_balance: parse_decimal_column(&final_balance),
            period_start: parse_date_column(&period_start),
            period_end: parse_date_column(&period_end),
            days_in_period,
            total_commissions: total_commissions.as_deref().map(parse_decimal_column),
            total_fees: total_fees.as_deref().map(parse_decimal_column),
            type_data: StatementTypeData::from_json(statement_type, &type_data)?,
        }))
    }
}
