use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tally_core::BudgetScope;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod state;

use commands::{Session, TxnArgs};

#[derive(Parser, Debug)]
#[command(name = "tally", version, about = "Category suggestions that learn from your budget")]
struct Cli {
    /// User the patterns and feedback belong to
    #[arg(long, global = true, default_value_t = 1)]
    user: i64,

    /// Budget whose categories are suggested
    #[arg(long, global = true, default_value_t = 1)]
    budget: i64,

    /// SQLite file (overrides [database] path)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Log at debug level (RUST_LOG still wins when set)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write ~/.tally/config.toml and create the database
    Init,

    /// Manage budget categories
    Category {
        #[command(subcommand)]
        command: CategoryCommand,
    },

    /// Record transactions
    Txn {
        #[command(subcommand)]
        command: TxnCommand,
    },

    /// Import categorized history and learn patterns from it
    Import {
        /// CSV with date,notes,amount_cents,category_id[,is_split]
        #[arg(long)]
        csv: PathBuf,
    },

    /// Suggest categories for transaction notes
    Suggest {
        notes: String,

        #[arg(long, allow_hyphen_values = true)]
        amount_cents: Option<i64>,

        /// Max suggestions, 1-10 (default: [suggestions] default_limit)
        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Teach that some notes belong to a category
    Learn {
        #[arg(long)]
        category: i64,

        notes: String,

        #[arg(long)]
        transaction: Option<i64>,
    },

    /// Record whether a suggestion was taken, then learn the chosen category
    Feedback {
        #[arg(long)]
        suggested: i64,

        #[arg(long)]
        actual: i64,

        notes: String,

        #[arg(long)]
        transaction: Option<i64>,
    },

    /// Suggestion accuracy over a trailing window
    Stats {
        /// Window in days, 1-365 (default: [stats] default_days)
        #[arg(long)]
        days: Option<u32>,

        #[arg(long)]
        json: bool,
    },

    /// Most recently used learned patterns
    Patterns {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Subcommand, Debug)]
enum CategoryCommand {
    Add {
        name: String,
    },
    List {
        /// Include deactivated categories
        #[arg(long)]
        all: bool,
    },
    Deactivate {
        id: i64,
    },
}

#[derive(Subcommand, Debug)]
enum TxnCommand {
    Add {
        #[arg(long)]
        category: i64,

        #[arg(long, allow_hyphen_values = true)]
        amount_cents: i64,

        /// YYYY-MM-DD (default: today in [profile] timezone)
        #[arg(long)]
        date: Option<NaiveDate>,

        #[arg(long)]
        notes: Option<String>,

        #[arg(long)]
        split: bool,

        /// Also learn the notes for this category
        #[arg(long)]
        learn: bool,
    },
}

fn init_logging(level: &str, verbose: bool) {
    let level = if verbose { "debug" } else { level };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "tally={level},tally_cli={level},tally_suggest={level},tally_store={level}"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config()?;
    init_logging(&cfg.logging.level, cli.verbose);
    debug!("tally v{} starting", env!("CARGO_PKG_VERSION"));

    if let Command::Init = cli.command {
        config::init_config()?;
    }

    let db_path = match cli.db {
        Some(p) => p,
        None => cfg.database_path()?,
    };
    let session = Session::open(&db_path, BudgetScope::new(cli.user, cli.budget), cfg.timezone()?)?;

    match cli.command {
        Command::Init => {
            println!("Database ready: {}", db_path.display());
        }

        Command::Category { command } => match command {
            CategoryCommand::Add { name } => commands::category_add(&session, &name)?,
            CategoryCommand::List { all } => commands::category_list(&session, all)?,
            CategoryCommand::Deactivate { id } => commands::category_deactivate(&session, id)?,
        },

        Command::Txn { command } => match command {
            TxnCommand::Add {
                category,
                amount_cents,
                date,
                notes,
                split,
                learn,
            } => commands::txn_add(
                &session,
                TxnArgs {
                    category_id: category,
                    amount_cents,
                    date,
                    notes,
                    is_split: split,
                    learn,
                },
            )?,
        },

        Command::Import { csv } => {
            commands::import(&session, &csv).with_context(|| format!("importing {}", csv.display()))?
        }

        Command::Suggest {
            notes,
            amount_cents,
            limit,
            json,
        } => {
            let limit = limit.unwrap_or(cfg.suggestions.default_limit);
            commands::suggest(&session, &notes, amount_cents, limit, json)?;
        }

        Command::Learn {
            category,
            notes,
            transaction,
        } => commands::learn(&session, category, &notes, transaction)?,

        Command::Feedback {
            suggested,
            actual,
            notes,
            transaction,
        } => commands::feedback(&session, suggested, actual, &notes, transaction)?,

        Command::Stats { days, json } => {
            let days = days.unwrap_or(cfg.stats.default_days);
            commands::stats(&session, days, json)?;
        }

        Command::Patterns { limit } => commands::patterns(&session, limit)?,
    }

    Ok(())
}
