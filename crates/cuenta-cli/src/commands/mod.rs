//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Core commands (init) and shared utilities (open_db)
//! - `users` - Statement owners
//! - `accounts` - Bank accounts
//! - `categories` - Category tree management
//! - `ingest` - Upload, ingest and reprocess statements
//! - `statements` - Statement listing and details
//! - `transactions` - Transaction listing
//! - `inspect` - Extraction/redaction debugging that stores nothing

pub mod accounts;
pub mod categories;
pub mod core;
pub mod ingest;
pub mod inspect;
pub mod statements;
pub mod transactions;
pub mod users;

// Re-export command functions for main.rs
pub use accounts::*;
pub use categories::*;
pub use core::*;
pub use ingest::*;
pub use inspect::*;
pub use statements::*;
pub use transactions::*;
pub use users::*;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
