//! Category command implementations

use anyhow::Result;
use cuenta_core::db::Database;

pub fn cmd_categories_list(db: &Database, user_id: i64) -> Result<()> {
    let taxonomy = db.category_taxonomy(user_id)?;

    if taxonomy.is_empty() {
        println!("No categories for user {}. Seed the defaults with:", user_id);
        println!("  cuenta categories seed --user {}", user_id);
        return Ok(());
    }

    println!();
    println!("🗂️  Categories");
    for node in taxonomy {
        println!("   {}", node.name);
        for child in node.subcategories {
            println!("     └─ {}", child);
        }
    }

    Ok(())
}

/// Add a root category, or a child with "Parent/Child"
pub fn cmd_categories_add(db: &Database, user_id: i64, path: &str) -> Result<()> {
    let parts: Vec<&str> = path.split('/').map(str::trim).collect();

    let id = match parts.as_slice() {
        [name] => db.find_or_create_category(user_id, None, name)?,
        [parent, child] => {
            let parent_id = db.find_or_create_category(user_id, None, parent)?;
            db.find_or_create_category(user_id, Some(parent_id), child)?
        }
        _ => anyhow::bail!("Categories have at most two levels: 'Parent/Child'"),
    };

    println!("✅ Category {} ({})", id, path);
    Ok(())
}

pub fn cmd_categories_seed(db: &Database, user_id: i64) -> Result<()> {
    if db.get_user(user_id)?.is_none() {
        anyhow::bail!("User {} not found", user_id);
    }
    let created = db.seed_default_categories(user_id)?;
    println!("✅ Seeded {} categories for user {}", created, user_id);
    Ok(())
}
