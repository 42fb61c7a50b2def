//! Sift CLI - Statement ingestion and goal signals
//!
//! Usage:
//!   sift init                                   Initialize database
//!   sift ingest --file stmt.csv --bank hdfc     Ingest a statement
//!   sift transactions --category dining         Query enriched transactions
//!   sift signals                                Show active goal signals

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

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

    let paths = cli.config_paths();

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, cli.no_encrypt),
        Commands::Ingest {
            file,
            bank,
            user,
            format,
            period_start,
            period_end,
            as_of,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let enricher = commands::load_enricher(db, &paths)?;
            let options = commands::IngestOptions {
                user,
                bank,
                format,
                period_start,
                period_end,
                as_of,
            };
            commands::cmd_ingest(&enricher, &file, &options).await
        }
        Commands::Transactions {
            user,
            from,
            to,
            category,
            source,
            limit,
            offset,
            json,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let filter = commands::TransactionFilter {
                from,
                to,
                category,
                source,
                limit,
                offset,
            };
            commands::cmd_transactions(&db, &user, &filter, json)
        }
        Commands::Override {
            key,
            category,
            subcategory,
            user,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let enricher = commands::load_enricher(db, &paths)?;
            commands::cmd_override(&enricher, &user, &key, &category, subcategory.as_deref())
        }
        Commands::Recategorize { user } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let enricher = commands::load_enricher(db, &paths)?;
            commands::cmd_recategorize(&enricher, &user).await
        }
        Commands::Batches { user, show } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match show {
                Some(batch_id) => commands::cmd_batch_show(&db, &user, &batch_id),
                None => commands::cmd_batches(&db, &user),
            }
        }
        Commands::Profiles => commands::cmd_profiles(&paths),
        Commands::Rules => commands::cmd_rules(&paths),
        Commands::Train { output, export } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_train(&db, &paths, output.as_deref(), export.as_deref())
        }
        Commands::Goals { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                GoalsAction::List { user } => commands::cmd_goals_list(&db, &user),
                GoalsAction::Create {
                    name,
                    kind,
                    target,
                    category,
                    start,
                    by,
                    auto_allocate,
                    user,
                } => {
                    let spec = commands::GoalSpec {
                        name,
                        kind,
                        target,
                        category,
                        start,
                        by,
                        auto_allocate,
                    };
                    commands::cmd_goals_create(&db, &user, &spec)
                }
                GoalsAction::Pause { id } => commands::cmd_goals_pause(&db, id),
                GoalsAction::Resume { id } => commands::cmd_goals_resume(&db, id),
                GoalsAction::Rules => commands::cmd_goal_rules(&db, &paths),
                GoalsAction::Enable { rule } => {
                    commands::cmd_goal_rule_toggle(&db, &paths, &rule, true)
                }
                GoalsAction::Disable { rule } => {
                    commands::cmd_goal_rule_toggle(&db, &paths, &rule, false)
                }
            }
        }
        Commands::Signals { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None => commands::cmd_signals_list(&db, "default", None, false, false),
                Some(SignalsAction::List {
                    user,
                    status,
                    all,
                    json,
                }) => commands::cmd_signals_list(&db, &user, status.as_deref(), all, json),
                Some(SignalsAction::Accept { id }) => commands::cmd_signals_accept(&db, id),
                Some(SignalsAction::Dismiss { id }) => commands::cmd_signals_dismiss(&db, id),
            }
        }
    }
}
