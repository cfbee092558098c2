//! CLI command tests
//!
//! This module contains all tests for the CLI commands.

use std::io::Write;

use cuenta_core::db::Database;
use cuenta_core::models::{
    BankEntryType, ExtractionSource, ParsedStatement, ParsedTransaction, StatementStatus,
    TransactionType, UNCATEGORIZED,
};

use crate::commands::{self, truncate};

fn setup_test_db() -> Database {
    Database::in_memory().unwrap()
}

/// Create a user and a BBVA account, returning (user_id, account_id)
fn create_test_account(db: &Database) -> (i64, i64) {
    let user_id = db.upsert_user("test@example.com").unwrap();
    let account_id = db
        .create_bank_account(user_id, "BBVA", Some("012180001234567890"), "MXN")
        .unwrap();
    (user_id, account_id)
}

/// Store a statement and finalize it with two transactions
fn create_parsed_statement(db: &Database, account_id: i64) -> i64 {
    let id = db
        .create_statement_file(account_id, "mayo.pdf", b"%PDF-1.4")
        .unwrap();

    let tx = |date: &str, amount: f64, category: &str| ParsedTransaction {
        date: date.to_string(),
        description: format!("MOVIMIENTO {}", date),
        amount,
        transaction_type: TransactionType::VariableExpense,
        bank_entry_type: Some(BankEntryType::Debit),
        merchant: None,
        reference: None,
        category: category.to_string(),
        sub_category: None,
        raw_text: String::new(),
        confidence: 0.8,
        category_confidence: None,
        transaction_type_confidence: None,
    };

    let mut parsed = ParsedStatement {
        transactions: vec![
            tx("2021-05-03", -250.0, "Comida"),
            tx("2021-05-10", 1500.0, UNCATEGORIZED),
        ],
        extraction_source: Some(ExtractionSource::Text),
        ..Default::default()
    };
    db.finalize_statement(id, &mut parsed, None).unwrap();
    id
}

fn temp_file(content: &[u8]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content).unwrap();
    file
}

// ========== Init Command Tests ==========

#[test]
fn test_cmd_init_unencrypted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cuenta.db");

    commands::cmd_init(&path, true).unwrap();
    assert!(path.exists());

    let db = commands::open_db(&path, true).unwrap();
    assert!(db.list_users().unwrap().is_empty());
}

// ========== User Command Tests ==========

#[test]
fn test_cmd_users_add() {
    let db = setup_test_db();
    commands::cmd_users_add(&db, "Ana@Example.com", false).unwrap();

    let users = db.list_users().unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].email, "ana@example.com");
    assert!(db.list_categories(users[0].id).unwrap().is_empty());
}

#[test]
fn test_cmd_users_add_with_seed() {
    let db = setup_test_db();
    commands::cmd_users_add(&db, "ana@example.com", true).unwrap();

    let user = &db.list_users().unwrap()[0];
    assert!(!db.category_taxonomy(user.id).unwrap().is_empty());
}

#[test]
fn test_cmd_users_add_rejects_non_email() {
    let db = setup_test_db();
    assert!(commands::cmd_users_add(&db, "not-an-email", false).is_err());
    assert!(db.list_users().unwrap().is_empty());
}

#[test]
fn test_cmd_users_list() {
    let db = setup_test_db();
    assert!(commands::cmd_users_list(&db).is_ok());

    create_test_account(&db);
    assert!(commands::cmd_users_list(&db).is_ok());
}

// ========== Account Command Tests ==========

#[test]
fn test_cmd_accounts_add() {
    let db = setup_test_db();
    let user_id = db.upsert_user("test@example.com").unwrap();

    commands::cmd_accounts_add(&db, user_id, "Santander", Some("1234"), "mxn").unwrap();

    let accounts = db.list_bank_accounts(Some(user_id)).unwrap();
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0].bank_name, "Santander");
    assert_eq!(accounts[0].currency, "MXN");
}

#[test]
fn test_cmd_accounts_add_unknown_user() {
    let db = setup_test_db();
    let result = commands::cmd_accounts_add(&db, 42, "BBVA", None, "MXN");
    assert!(result.is_err());
    assert!(db.list_bank_accounts(None).unwrap().is_empty());
}

#[test]
fn test_cmd_accounts_add_unrecognized_bank() {
    let db = setup_test_db();
    let user_id = db.upsert_user("test@example.com").unwrap();
    assert!(commands::cmd_accounts_add(&db, user_id, "Banco Imaginario", None, "MXN").is_ok());
}

#[test]
fn test_cmd_accounts_list() {
    let db = setup_test_db();
    assert!(commands::cmd_accounts_list(&db, None).is_ok());

    let (user_id, _) = create_test_account(&db);
    assert!(commands::cmd_accounts_list(&db, Some(user_id)).is_ok());
}

// ========== Category Command Tests ==========

#[test]
fn test_cmd_categories_add_root_and_child() {
    let db = setup_test_db();
    let (user_id, _) = create_test_account(&db);

    commands::cmd_categories_add(&db, user_id, "Mascotas").unwrap();
    commands::cmd_categories_add(&db, user_id, "Mascotas / Veterinario").unwrap();

    let taxonomy = db.category_taxonomy(user_id).unwrap();
    assert_eq!(taxonomy.len(), 1);
    assert_eq!(taxonomy[0].name, "Mascotas");
    assert_eq!(taxonomy[0].subcategories, vec!["Veterinario"]);
}

#[test]
fn test_cmd_categories_add_three_levels_fails() {
    let db = setup_test_db();
    let (user_id, _) = create_test_account(&db);

    let result = commands::cmd_categories_add(&db, user_id, "A/B/C");
    assert!(result.is_err());
    assert!(db.list_categories(user_id).unwrap().is_empty());
}

#[test]
fn test_cmd_categories_seed() {
    let db = setup_test_db();
    let (user_id, _) = create_test_account(&db);

    commands::cmd_categories_seed(&db, user_id).unwrap();
    let count = db.list_categories(user_id).unwrap().len();

    // Seeding twice creates nothing new
    commands::cmd_categories_seed(&db, user_id).unwrap();
    assert_eq!(db.list_categories(user_id).unwrap().len(), count);

    assert!(commands::cmd_categories_list(&db, user_id).is_ok());
}

#[test]
fn test_cmd_categories_seed_unknown_user() {
    let db = setup_test_db();
    assert!(commands::cmd_categories_seed(&db, 7).is_err());
}

// ========== Statement Command Tests ==========

#[test]
fn test_upload_statement() {
    let db = setup_test_db();
    let (_, account_id) = create_test_account(&db);
    let file = temp_file(b"%PDF-1.4 fake");

    let id = commands::upload_statement(&db, account_id, file.path()).unwrap();

    let statement = db.get_statement_file(id).unwrap().unwrap();
    assert_eq!(statement.status, StatementStatus::Pending);
    assert_eq!(statement.bank_account_id, account_id);
    assert_eq!(db.get_statement_blob(id).unwrap(), b"%PDF-1.4 fake");
}

#[test]
fn test_upload_statement_unknown_account() {
    let db = setup_test_db();
    let file = temp_file(b"%PDF-1.4");

    let result = commands::upload_statement(&db, 99, file.path());
    assert!(result.is_err());
    assert!(db.list_statement_files(None).unwrap().is_empty());
}

#[test]
fn test_upload_statement_missing_file() {
    let db = setup_test_db();
    let (_, account_id) = create_test_account(&db);

    let result = commands::upload_statement(
        &db,
        account_id,
        std::path::Path::new("/nonexistent/statement.pdf"),
    );
    assert!(result.is_err());
}

#[test]
fn test_cmd_statements_list_and_show() {
    let db = setup_test_db();
    assert!(commands::cmd_statements_list(&db, None).is_ok());

    let (_, account_id) = create_test_account(&db);
    let id = create_parsed_statement(&db, account_id);

    assert!(commands::cmd_statements_list(&db, Some(account_id)).is_ok());
    assert!(commands::cmd_statements_show(&db, id, false).is_ok());
    assert!(commands::cmd_statements_show(&db, id, true).is_ok());
}

#[test]
fn test_cmd_statements_show_missing() {
    let db = setup_test_db();
    assert!(commands::cmd_statements_show(&db, 404, false).is_err());
}

#[tokio::test]
async fn test_cmd_reprocess_missing_statement() {
    let db = setup_test_db();
    assert!(commands::cmd_reprocess(&db, 404).await.is_err());
}

// ========== Transaction Command Tests ==========

#[test]
fn test_cmd_transactions_list() {
    let db = setup_test_db();
    let (_, account_id) = create_test_account(&db);
    let id = create_parsed_statement(&db, account_id);

    assert!(commands::cmd_transactions_list(&db, Some(id), None, 20).is_ok());
    assert!(commands::cmd_transactions_list(&db, None, Some(account_id), 1).is_ok());
    assert_eq!(db.list_account_transactions(account_id, 1).unwrap().len(), 1);
}

#[test]
fn test_cmd_transactions_list_requires_filter() {
    let db = setup_test_db();
    assert!(commands::cmd_transactions_list(&db, None, None, 20).is_err());
}

#[test]
fn test_cmd_transactions_list_empty() {
    let db = setup_test_db();
    assert!(commands::cmd_transactions_list(&db, Some(1), None, 20).is_ok());
}

// ========== Inspect Command Tests ==========

#[test]
fn test_cmd_banks() {
    assert!(commands::cmd_banks().is_ok());
}

#[tokio::test]
async fn test_cmd_inspect_missing_file() {
    let result = commands::cmd_inspect(std::path::Path::new("/nonexistent.pdf"), None).await;
    assert!(result.is_err());
}

#[test]
fn test_redact_text_hides_email() {
    let redaction = commands::redact_text(
        "Aclaraciones: juan.perez@example.com\n03/05/2021 SPEI ENVIADO 1,200.00",
        None,
        "test-secret",
    )
    .unwrap();

    assert!(!redaction.text.contains("juan.perez@example.com"));
    assert!(redaction
        .map
        .values()
        .any(|original| original == "juan.perez@example.com"));
    assert!(!redaction.hmac.is_empty());
}

#[test]
fn test_redact_text_is_deterministic() {
    let text = "Contacto: ana@example.com";
    let first = commands::redact_text(text, Some("BBVA"), "secret").unwrap();
    let second = commands::redact_text(text, Some("BBVA"), "secret").unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_cmd_redact_requires_secret() {
    let file = temp_file(b"ana@example.com");
    assert!(commands::cmd_redact(file.path(), None, None).is_err());
    assert!(commands::cmd_redact(file.path(), None, Some("secret")).is_ok());
}

// ========== Utility Tests ==========

#[test]
fn test_truncate() {
    assert_eq!(truncate("short", 10), "short");
    assert_eq!(truncate("exactly10!", 10), "exactly10!");
    assert_eq!(truncate("this is a long string", 10), "this is...");
}

#[test]
fn test_truncate_multibyte() {
    // Must not split inside a multi-byte character
    let result = truncate("Depósito en efectivo", 8);
    assert_eq!(result.chars().count(), 8);
    assert!(result.ends_with("..."));
}
