//! Transaction command implementations

use anyhow::Result;
use cuenta_core::db::Database;
use cuenta_core::models::Transaction;

use super::truncate;

pub fn cmd_transactions_list(
    db: &Database,
    statement_id: Option<i64>,
    account_id: Option<i64>,
    limit: i64,
) -> Result<()> {
    let transactions = match (statement_id, account_id) {
        (Some(statement), _) => db.list_statement_transactions(statement)?,
        (None, Some(account)) => db.list_account_transactions(account, limit)?,
        (None, None) => anyhow::bail!("Pass --statement <id> or --account <id>"),
    };

    if transactions.is_empty() {
        println!("No transactions found. Ingest a statement with:");
        println!("  cuenta ingest --account 1 --file statement.pdf");
        return Ok(());
    }

    println!();
    println!("📝 Transactions");
    println!("   ─────────────────────────────────────────────────────────────");

    for tx in &transactions {
        println!(
            "   {} │ {:>12} │ {:<16} │ {}",
            tx.date,
            format_amount(tx),
            tx.transaction_type.as_str(),
            truncate(&tx.description, 40)
        );
    }

    Ok(())
}

fn format_amount(tx: &Transaction) -> String {
    if tx.amount.is_sign_negative() {
        format!("\x1b[31m-${:.2}\x1b[0m", tx.amount.abs()) // Red for expenses
    } else {
        format!("\x1b[32m+${:.2}\x1b[0m", tx.amount) // Green for income
    }
}
