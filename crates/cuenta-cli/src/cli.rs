//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Cuenta - Turn bank statement PDFs into categorized transactions
#[derive(Parser)]
#[command(name = "cuenta")]
#[command(about = "Bank statement ingestion with PII redaction", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "cuenta.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set CUENTA_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Manage statement owners
    Users {
        #[command(subcommand)]
        action: Option<UsersAction>,
    },

    /// Manage bank accounts
    Accounts {
        #[command(subcommand)]
        action: Option<AccountsAction>,
    },

    /// Manage a user's categories
    Categories {
        #[command(subcommand)]
        action: CategoriesAction,
    },

    /// Upload a statement PDF and run the ingestion pipeline on it
    Ingest {
        /// Bank account ID the statement belongs to
        #[arg(short, long)]
        account: i64,

        /// Statement PDF
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Run the ingestion pipeline again for a stored statement
    ///
    /// Transactions from the previous run are replaced, not duplicated.
    Reprocess {
        /// Statement ID
        id: i64,
    },

    /// List or inspect uploaded statements
    Statements {
        #[command(subcommand)]
        action: Option<StatementsAction>,
    },

    /// List imported transactions
    Transactions {
        /// Only transactions from this statement
        #[arg(short, long)]
        statement: Option<i64>,

        /// Only transactions of this bank account
        #[arg(short, long)]
        account: Option<i64>,

        /// Maximum number of transactions to show (account listing)
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// List banks with statement patterns
    Banks,

    /// Show what the pipeline sees in a PDF without storing anything
    Inspect {
        /// Statement PDF
        #[arg(short, long)]
        file: PathBuf,

        /// Bank name or alias (defaults to generic patterns)
        #[arg(short, long)]
        bank: Option<String>,
    },

    /// Redact PII from a text file and print the token map
    Redact {
        /// Text file to redact
        #[arg(short, long)]
        file: PathBuf,

        /// Keep transaction vocabulary for this bank (codes, keywords, amounts)
        #[arg(short, long)]
        bank: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum UsersAction {
    /// Add a user (or show the existing one with that email)
    Add {
        /// Email address
        email: String,

        /// Also create the default category taxonomy
        #[arg(long)]
        seed_categories: bool,
    },
    /// List users
    List,
}

#[derive(Subcommand)]
pub enum AccountsAction {
    /// Add a bank account
    Add {
        /// Owning user ID
        #[arg(short, long)]
        user: i64,

        /// Bank name as printed on statements (e.g. "BBVA")
        #[arg(short, long)]
        bank: String,

        /// Account number
        #[arg(short = 'n', long)]
        number: Option<String>,

        /// Currency code
        #[arg(short, long, default_value = "MXN")]
        currency: String,
    },
    /// List bank accounts
    List {
        /// Only accounts of this user
        #[arg(short, long)]
        user: Option<i64>,
    },
}

#[derive(Subcommand)]
pub enum CategoriesAction {
    /// Show a user's category tree
    List {
        /// User ID
        #[arg(short, long)]
        user: i64,
    },
    /// Add a category; "Parent/Child" adds a subcategory
    Add {
        /// User ID
        #[arg(short, long)]
        user: i64,

        /// Category path ("Comida" or "Comida/Tacos")
        path: String,
    },
    /// Create the default category taxonomy for a user
    Seed {
        /// User ID
        #[arg(short, long)]
        user: i64,
    },
}

#[derive(Subcommand)]
pub enum StatementsAction {
    /// List statements
    List {
        /// Only statements of this bank account
        #[arg(short, long)]
        account: Option<i64>,
    },
    /// Show a statement's status, summary and parse result
    Show {
        /// Statement ID
        id: i64,

        /// Print the stored parse result as JSON
        #[arg(long)]
        json: bool,
    },
}
