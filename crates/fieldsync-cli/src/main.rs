//! Fieldsync CLI - offline-first registration capture for campaign field teams
//!
//! Records are written to a local database first and pushed to the remote
//! store whenever it is reachable.

mod cli;
mod commands;
mod error;

use clap::{CommandFactory, Parser};

use crate::cli::{Cli, Commands, DbCommands, SyncCommands};
use crate::commands::add::run_add;
use crate::commands::attend::run_attend;
use crate::commands::common::{resolve_config_path, resolve_db_path};
use crate::commands::completions::run_completions;
use crate::commands::db::run_db_reset;
use crate::commands::edit::run_edit;
use crate::commands::export::run_export;
use crate::commands::list::run_list;
use crate::commands::show::run_show;
use crate::commands::stats::run_stats;
use crate::commands::status::run_status;
use crate::commands::sync::{run_sync, run_sync_conflicts, run_sync_requeue};
use crate::commands::watch::run_watch;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "fieldsync=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);
    let config_path = resolve_config_path(cli.config);
    let config_path = config_path.as_deref();

    match cli.command {
        Some(Commands::Add(args)) => run_add(args, &db_path).await?,
        Some(Commands::List {
            limit,
            status,
            json,
        }) => {
            run_list(limit, status.map(Into::into), json, &db_path).await?;
        }
        Some(Commands::Show { id }) => run_show(&id, &db_path).await?,
        Some(Commands::Edit { id, assignments }) => {
            run_edit(&id, &assignments, &db_path).await?;
        }
        Some(Commands::Attend { id, day, absent }) => {
            run_attend(&id, day, absent, &db_path).await?;
        }
        Some(Commands::Sync { command }) => match command {
            Some(SyncCommands::Conflicts { limit, json }) => {
                run_sync_conflicts(limit, json, &db_path).await?;
            }
            Some(SyncCommands::Requeue) => {
                run_sync_requeue(&db_path).await?;
            }
            None => run_sync(&db_path, config_path).await?,
        },
        Some(Commands::Status { json }) => run_status(json, &db_path, config_path).await?,
        Some(Commands::Watch) => run_watch(&db_path, config_path).await?,
        Some(Commands::Stats { json }) => run_stats(json, &db_path).await?,
        Some(Commands::Export { output }) => run_export(output.as_deref(), &db_path).await?,
        Some(Commands::Db {
            command: DbCommands::Reset { force },
        }) => {
            run_db_reset(force, &db_path)?;
        }
        Some(Commands::Completions { shell, output }) => {
            run_completions(shell, output.as_deref())?;
        }
        None => {
            Cli::command().print_help().map_err(CliError::Io)?;
            println!();
        }
    }

    Ok(())
}
