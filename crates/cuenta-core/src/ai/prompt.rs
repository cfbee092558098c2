//! Statement prompt assembly and line-aligned chunking

use std::collections::HashMap;

use crate::error::Result;
use crate::prompts::{PromptId, PromptLibrary};

use super::types::{StatementContext, StatementPrompt};

/// System instruction used when a prompt override has no `# System` section
pub const JSON_ONLY_SYSTEM: &str =
    "You are a precise JSON API. Return ONLY strict JSON, no markdown, no prose.";

/// Render the statement_to_json prompt for one chunk of text
pub fn build_statement_prompt(
    library: &mut PromptLibrary,
    text: &str,
    context: &StatementContext,
) -> Result<StatementPrompt> {
    let taxonomy = serde_json::to_string(&context.taxonomy_or_default())?;
    let examples = library
        .fewshots()
        .iter()
        .map(|e| e.render())
        .collect::<Vec<_>>()
        .join("\n");

    let template = library.get(PromptId::StatementToJson)?;

    let mut vars = HashMap::new();
    vars.insert("taxonomy", taxonomy.as_str());
    vars.insert("examples", examples.as_str());
    vars.insert("bank_name", context.bank_name.as_str());
    vars.insert(
        "account_number",
        context.account_number.as_deref().unwrap_or(""),
    );
    vars.insert("statement_text", text);

    Ok(StatementPrompt {
        system: template
            .system_section()
            .unwrap_or(JSON_ONLY_SYSTEM)
            .to_string(),
        user: template.render_user(&vars),
    })
}

/// Split text on line boundaries into chunks of at most `max_chars` characters
///
/// Lines are never split; a single line longer than the limit becomes its own
/// chunk. Text within the limit comes back as one chunk.
pub fn chunk_lines(text: &str, max_chars: usize) -> Vec<String> {
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.lines() {
        let line_len = line.chars().count();
        // +1 for the newline joining it to the current chunk
        let needed = if current.is_empty() { line_len } else { line_len + 1 };

        if !current.is_empty() && current_len + needed > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if !current.is_empty() {
            current.push('\n');
            current_len += 1;
        }
        current.push_str(line);
        current_len += line_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CategoryNode;

    #[test]
    fn test_short_text_is_one_chunk() {
        assert_eq!(chunk_lines("a\nb", 100), vec!["a\nb".to_string()]);
        assert_eq!(chunk_lines("", 10), vec![String::new()]);
    }

    #[test]
    fn test_chunks_respect_limit_and_line_boundaries() {
        let lines: Vec<String> = (0..50).map(|i| format!("01/01/2025 line {:02} 10.00", i)).collect();
        let text = lines.join("\n");

        let chunks = chunk_lines(&text, 200);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 200);
        }

        let rejoined: Vec<&str> = chunks.iter().flat_map(|c| c.lines()).collect();
        assert_eq!(rejoined, lines.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[test]
    fn test_oversized_line_stands_alone() {
        let long = "x".repeat(30);
        let text = format!("short\n{}\ntail", long);
        let chunks = chunk_lines(&text, 10);
        assert_eq!(chunks, vec!["short".to_string(), long, "tail".to_string()]);
    }

    #[test]
    fn test_prompt_carries_context_and_text() {
        let mut library = PromptLibrary::embedded_only();
        let context = StatementContext {
            bank_name: "BBVA".into(),
            account_number: Some("⟪PII:ACCOUNT:1⟫".into()),
            taxonomy: vec![CategoryNode {
                name: "Comida".into(),
                subcategories: vec!["Mandado".into()],
            }],
        };

        let prompt =
            build_statement_prompt(&mut library, "03/01/2025 OXXO -89.00", &context).unwrap();

        assert_eq!(prompt.system, JSON_ONLY_SYSTEM);
        assert!(prompt.user.contains("bank_name: BBVA"));
        assert!(prompt.user.contains("account_number: ⟪PII:ACCOUNT:1⟫"));
        assert!(prompt.user.contains(r#"{"name":"Comida","subcategories":["Mandado"]}"#));
        assert!(prompt.user.contains("Few-shot guidance"));
        assert!(prompt.user.ends_with("03/01/2025 OXXO -89.00"));
        assert!(!prompt.user.contains("{{"));
    }

    #[test]
    fn test_empty_taxonomy_falls_back_to_uncategorized() {
        let mut library = PromptLibrary::embedded_only();
        let prompt =
            build_statement_prompt(&mut library, "text", &StatementContext::default()).unwrap();
        assert!(prompt.user.contains(r#"[{"name":"Uncategorized","subcategories":[]}]"#));
    }
}
