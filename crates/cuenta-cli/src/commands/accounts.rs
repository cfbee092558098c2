//! Bank account command implementations

use anyhow::Result;
use cuenta_core::db::Database;
use cuenta_core::BankPatternConfig;

pub fn cmd_accounts_add(
    db: &Database,
    user_id: i64,
    bank: &str,
    number: Option<&str>,
    currency: &str,
) -> Result<()> {
    if db.get_user(user_id)?.is_none() {
        anyhow::bail!("User {} not found", user_id);
    }

    let id = db.create_bank_account(user_id, bank, number, currency)?;
    let patterns = BankPatternConfig::load();
    let resolved = patterns.resolve_bank(Some(bank));

    println!("✅ Bank account {} created", id);
    println!("   Statement patterns: {}", patterns.display_name(&resolved));
    if resolved == "generic" {
        println!("   💡 Bank not recognized; generic patterns will be used. See 'cuenta banks'.");
    }

    Ok(())
}

pub fn cmd_accounts_list(db: &Database, user_id: Option<i64>) -> Result<()> {
    let accounts = db.list_bank_accounts(user_id)?;

    if accounts.is_empty() {
        println!("No bank accounts found. Add one with:");
        println!("  cuenta accounts add --user 1 --bank BBVA");
        return Ok(());
    }

    println!();
    println!("🏦 Bank Accounts");
    println!("   ─────────────────────────────────────────");
    for account in accounts {
        println!(
            "   [{}] {} {} ({}) user {}",
            account.id,
            account.bank_name,
            account.account_number.as_deref().unwrap_or("-"),
            account.currency,
            account.user_id
        );
    }

    Ok(())
}
