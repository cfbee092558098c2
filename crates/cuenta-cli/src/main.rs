//! Cuenta CLI - Bank statement ingestion
//!
//! Usage:
//!   cuenta init                                Initialize database
//!   cuenta users add ana@example.com           Add a statement owner
//!   cuenta accounts add --user 1 --bank BBVA   Add a bank account
//!   cuenta ingest --account 1 --file s.pdf     Upload and parse a statement
//!   cuenta inspect --file s.pdf --bank bbva    Debug extraction without storing

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use cuenta_core::IngestConfig;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, cli.no_encrypt),
        Commands::Users { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                Some(UsersAction::Add {
                    email,
                    seed_categories,
                }) => commands::cmd_users_add(&db, &email, seed_categories),
                None | Some(UsersAction::List) => commands::cmd_users_list(&db),
            }
        }
        Commands::Accounts { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                Some(AccountsAction::Add {
                    user,
                    bank,
                    number,
                    currency,
                }) => commands::cmd_accounts_add(&db, user, &bank, number.as_deref(), &currency),
                Some(AccountsAction::List { user }) => commands::cmd_accounts_list(&db, user),
                None => commands::cmd_accounts_list(&db, None),
            }
        }
        Commands::Categories { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                CategoriesAction::List { user } => commands::cmd_categories_list(&db, user),
                CategoriesAction::Add { user, path } => {
                    commands::cmd_categories_add(&db, user, &path)
                }
                CategoriesAction::Seed { user } => commands::cmd_categories_seed(&db, user),
            }
        }
        Commands::Ingest { account, file } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_ingest(&db, account, &file).await
        }
        Commands::Reprocess { id } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_reprocess(&db, id).await
        }
        Commands::Statements { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None => commands::cmd_statements_list(&db, None),
                Some(StatementsAction::List { account }) => {
                    commands::cmd_statements_list(&db, account)
                }
                Some(StatementsAction::Show { id, json }) => {
                    commands::cmd_statements_show(&db, id, json)
                }
            }
        }
        Commands::Transactions {
            statement,
            account,
            limit,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_transactions_list(&db, statement, account, limit)
        }
        Commands::Banks => commands::cmd_banks(),
        Commands::Inspect { file, bank } => commands::cmd_inspect(&file, bank.as_deref()).await,
        Commands::Redact { file, bank } => {
            let secret = IngestConfig::from_env().secret_key;
            commands::cmd_redact(&file, bank.as_deref(), secret.as_deref())
        }
    }
}
