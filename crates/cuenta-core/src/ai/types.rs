//! AI backend request types
//!
//! These types are backend-agnostic and used across all AI implementations.

use serde::Serialize;

use crate::models::{CategoryNode, UNCATEGORIZED};

/// What the model is told about the statement besides its text
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatementContext {
    /// Bank account display name
    pub bank_name: String,
    /// Account number as shown to the owner (may be redacted)
    pub account_number: Option<String>,
    /// Owner's closed category set
    pub taxonomy: Vec<CategoryNode>,
}

impl StatementContext {
    /// Taxonomy as sent to the model; never empty
    pub fn taxonomy_or_default(&self) -> Vec<CategoryNode> {
        if self.taxonomy.is_empty() {
            vec![CategoryNode {
                name: UNCATEGORIZED.to_string(),
                subcategories: Vec::new(),
            }]
        } else {
            self.taxonomy.clone()
        }
    }
}

/// A rendered chat request: system instruction plus user message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementPrompt {
    pub system: String,
    pub user: String,
}
