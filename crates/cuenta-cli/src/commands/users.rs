//! User command implementations

use anyhow::Result;
use cuenta_core::db::Database;

pub fn cmd_users_add(db: &Database, email: &str, seed_categories: bool) -> Result<()> {
    let email = email.trim();
    if !email.contains('@') {
        anyhow::bail!("Not an email address: {}", email);
    }

    let id = db.upsert_user(email)?;
    println!("✅ User {} ({})", id, email.to_lowercase());

    if seed_categories {
        let created = db.seed_default_categories(id)?;
        println!("   Seeded {} categories", created);
    }

    Ok(())
}

pub fn cmd_users_list(db: &Database) -> Result<()> {
    let users = db.list_users()?;

    if users.is_empty() {
        println!("No users yet. Add one with:");
        println!("  cuenta users add you@example.com");
        return Ok(());
    }

    println!();
    println!("👤 Users");
    println!("   ─────────────────────────────────────────");
    for user in users {
        println!(
            "   [{}] {} (since {})",
            user.id,
            user.email,
            user.created_at.format("%Y-%m-%d")
        );
    }

    Ok(())
}
