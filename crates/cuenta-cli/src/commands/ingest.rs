//! Statement ingestion commands

use std::path::Path;

use anyhow::{Context, Result};
use cuenta_core::db::Database;
use cuenta_core::{IngestReport, IngestionOrchestrator};
use sha2::{Digest, Sha256};

/// Store a PDF as a new statement of `account_id`; returns the statement ID
pub fn upload_statement(db: &Database, account_id: i64, file: &Path) -> Result<i64> {
    if db.get_bank_account(account_id)?.is_none() {
        anyhow::bail!("Bank account {} not found", account_id);
    }

    let content =
        std::fs::read(file).with_context(|| format!("Failed to read file: {}", file.display()))?;
    if !content.starts_with(b"%PDF") {
        println!("   ⚠️  {} does not look like a PDF", file.display());
    }

    let filename = file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "statement.pdf".to_string());
    let fingerprint = hex::encode(Sha256::digest(&content));

    let id = db.create_statement_file(account_id, &filename, &content)?;
    println!(
        "📥 Stored {} as statement {} (sha256 {})",
        filename,
        id,
        &fingerprint[..12]
    );
    Ok(id)
}

pub async fn cmd_ingest(db: &Database, account_id: i64, file: &Path) -> Result<()> {
    let id = upload_statement(db, account_id, file)?;
    let orchestrator = IngestionOrchestrator::from_env(db.clone());
    run_ingestion(&orchestrator, id).await
}

pub async fn cmd_reprocess(db: &Database, id: i64) -> Result<()> {
    let statement = db
        .get_statement_file(id)?
        .ok_or_else(|| anyhow::anyhow!("Statement {} not found", id))?;

    println!("🔁 Reprocessing {} (was {})", statement.filename, statement.status);
    db.reset_statement_for_reprocess(id)?;

    let orchestrator = IngestionOrchestrator::from_env(db.clone());
    run_ingestion(&orchestrator, id).await
}

/// Run the pipeline and print its report
pub async fn run_ingestion(orchestrator: &IngestionOrchestrator, id: i64) -> Result<()> {
    let config = orchestrator.config();
    println!("⚙️  Ingesting statement {}...", id);
    if config.redaction_enabled {
        println!("   🔒 PII redaction: ENABLED");
    }

    let report = orchestrator
        .ingest(id)
        .await
        .with_context(|| format!("Statement {} failed; see 'cuenta statements show {}'", id, id))?;

    print_report(&report);
    Ok(())
}

fn print_report(report: &IngestReport) {
    println!("✅ Statement {} {}", report.statement_id, report.status);
    println!("   Source: {}", report.extraction_source);
    if report.used_ai {
        println!("   Parser: AI ({} request(s))", report.chunks);
    } else {
        println!("   Parser: line parser");
    }
    println!("   Imported: {} transactions", report.transactions_imported);
    if report.summary_saved {
        println!("   Financial summary saved");
    }
}
