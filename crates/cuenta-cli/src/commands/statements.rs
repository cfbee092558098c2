//! Statement command implementations

use anyhow::Result;
use cuenta_core::db::Database;
use cuenta_core::models::StatementStatus;

use super::truncate;

fn status_icon(status: StatementStatus) -> &'static str {
    match status {
        StatementStatus::Pending => "⏳",
        StatementStatus::Processing => "⚙️",
        StatementStatus::Parsed => "✅",
        StatementStatus::Error => "❌",
    }
}

pub fn cmd_statements_list(db: &Database, account_id: Option<i64>) -> Result<()> {
    let statements = db.list_statement_files(account_id)?;

    if statements.is_empty() {
        println!("No statements found. Ingest one with:");
        println!("  cuenta ingest --account 1 --file statement.pdf");
        return Ok(());
    }

    println!();
    println!("📄 Statements");
    println!("   ─────────────────────────────────────────────────────────────");
    for statement in statements {
        let imported = statement
            .parsed()
            .and_then(|p| p.imported_count)
            .map(|n| format!("{} tx", n))
            .unwrap_or_default();
        println!(
            "   [{}] {} {:<10} │ {:<30} │ {}",
            statement.id,
            status_icon(statement.status),
            statement.status.as_str(),
            truncate(&statement.filename, 30),
            imported
        );
    }

    Ok(())
}

pub fn cmd_statements_show(db: &Database, id: i64, json: bool) -> Result<()> {
    let statement = db
        .get_statement_file(id)?
        .ok_or_else(|| anyhow::anyhow!("Statement {} not found", id))?;

    if json {
        let parsed = statement
            .parsed()
            .ok_or_else(|| anyhow::anyhow!("Statement {} has no parse result", id))?;
        println!("{}", serde_json::to_string_pretty(&parsed)?);
        return Ok(());
    }

    println!();
    println!("📄 Statement {}: {}", statement.id, statement.filename);
    println!("   Status: {} {}", status_icon(statement.status), statement.status);
    println!("   Account: {}", statement.bank_account_id);
    println!("   Uploaded: {}", statement.created_at.format("%Y-%m-%d %H:%M"));
    if let Some(processed_at) = statement.processed_at {
        println!("   Processed: {}", processed_at.format("%Y-%m-%d %H:%M"));
    }
    if let Some(error) = &statement.error_message {
        println!("   Error: {}", error);
    }
    if let Some(map) = &statement.redaction_map {
        println!("   Redacted: {} token(s)", map.len());
    }

    if let Some(parsed) = statement.parsed() {
        if let Some(source) = parsed.extraction_source {
            println!("   Source: {}", source);
        }
        println!(
            "   Transactions: {} parsed, {} imported",
            parsed.transactions.len(),
            parsed.imported_count.unwrap_or_default()
        );
    }

    if let Some(summary) = db.get_financial_summary(id)? {
        println!();
        println!("   💰 Summary ({})", summary.statement_type);
        println!(
            "      Period: {} → {} ({} days)",
            summary.period_start, summary.period_end, summary.days_in_period
        );
        println!(
            "      Balance: {} → {} (net {})",
            summary.initial_balance,
            summary.final_balance,
            summary.net_movement()
        );
        println!("      Deposits: {}", summary.total_deposits());
        if let Some(commissions) = summary.total_commissions {
            println!("      Commissions: {}", commissions);
        }
    }

    Ok(())
}
