mod commands;
mod config;
mod logging;

use anyhow::Result;
use clap::{Parser, Subcommand};
use config::AppConfig;
use lynx_common::{CallerId, DocumentId};
use lynx_history::Page;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "lynx-exec")]
#[command(about = "Run Lynx programs in a supervised sandbox and keep an execution history")]
#[command(version)]
pub struct Cli {
    /// Config file (default: $LYNX_EXEC_CONFIG or ~/.config/lynx-exec/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute a source file with the configured interpreter
    Run {
        /// Source file, or `-` to read from stdin
        file: String,

        /// Authenticated caller id; enables history recording
        #[arg(long)]
        caller: Option<String>,

        /// Saved document id this run belongs to
        #[arg(long)]
        document: Option<String>,

        /// Deadline for this run (e.g. "5s"), capped at the configured timeout
        #[arg(short, long, value_parser = humantime::parse_duration)]
        timeout: Option<Duration>,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },
    /// Inspect or prune execution history
    History {
        #[command(subcommand)]
        command: HistoryCommands,
    },
    /// Delete stale workspace files
    Reap {
        /// Keep sweeping on the configured interval until Ctrl-C
        #[arg(short, long)]
        watch: bool,
    },
    /// Show or create the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum HistoryCommands {
    /// List executions, most recent first
    List {
        /// Caller id
        #[arg(long)]
        caller: String,

        /// Only executions of this document
        #[arg(long)]
        document: Option<String>,

        /// Maximum number of records
        #[arg(short, long, default_value_t = 50)]
        limit: u32,

        /// Records to skip
        #[arg(long, default_value_t = 0)]
        offset: u32,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one execution record
    Show {
        /// Caller id
        #[arg(long)]
        caller: String,

        /// Record id
        id: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Aggregate statistics
    Stats {
        /// Caller id
        #[arg(long)]
        caller: String,

        /// Only executions of this document
        #[arg(long)]
        document: Option<String>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Executions per day
    Daily {
        /// Caller id
        #[arg(long)]
        caller: String,

        /// Number of days, today included
        #[arg(short, long, default_value_t = 7)]
        days: u32,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a caller's records
    Delete {
        /// Caller id
        #[arg(long)]
        caller: String,

        /// Only records of this document
        #[arg(long)]
        document: Option<String>,
    },
    /// Delete records of all callers older than the retention period
    Purge {
        /// Age threshold (default: history.retention from the config)
        #[arg(long, value_parser = humantime::parse_duration)]
        older_than: Option<Duration>,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let (config, config_path) = AppConfig::load(cli.config.as_deref())?;
    // dropped on every return path so the file log is flushed before exit
    let _log_guard = logging::init(
        &config.logging.level,
        cli.verbose,
        config.log_file()?.as_deref(),
    )?;

    match cli.command {
        Commands::Run {
            file,
            caller,
            document,
            timeout,
            json,
        } => {
            let success =
                commands::execute_run(&config, &file, caller, document, timeout, json).await?;
            Ok(exit_code(success))
        }
        Commands::History { command } => run_history(&config, command)
            .await
            .map(|()| ExitCode::SUCCESS),
        Commands::Reap { watch } => commands::execute_reap(&config, watch)
            .await
            .map(|()| ExitCode::SUCCESS),
        Commands::Config { command } => match command {
            ConfigCommands::Show => commands::execute_config_show(&config, &config_path),
            ConfigCommands::Init { force } => commands::execute_config_init(&config_path, force),
        }
        .map(|()| ExitCode::SUCCESS),
    }
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn run_history(config: &AppConfig, command: HistoryCommands) -> Result<()> {
    let store = commands::open_store(config).await?;

    match command {
        HistoryCommands::List {
            caller,
            document,
            limit,
            offset,
            json,
        } => {
            let document = document.map(DocumentId::from);
            commands::execute_history_list(
                &store,
                &CallerId::from(caller),
                document.as_ref(),
                Page::new(limit, offset),
                json,
            )
            .await
        }
        HistoryCommands::Show { caller, id, json } => {
            commands::execute_history_show(&store, &CallerId::from(caller), &id, json).await
        }
        HistoryCommands::Stats {
            caller,
            document,
            json,
        } => {
            let document = document.map(DocumentId::from);
            commands::execute_history_stats(&store, &CallerId::from(caller), document.as_ref(), json)
                .await
        }
        HistoryCommands::Daily { caller, days, json } => {
            commands::execute_history_daily(&store, &CallerId::from(caller), days, json).await
        }
        HistoryCommands::Delete { caller, document } => {
            let document = document.map(DocumentId::from);
            commands::execute_history_delete(&store, &CallerId::from(caller), document.as_ref())
                .await
        }
        HistoryCommands::Purge { older_than } => {
            let older_than = older_than.unwrap_or(config.history.retention);
            commands::execute_history_purge(&store, older_than).await
        }
    }
}
