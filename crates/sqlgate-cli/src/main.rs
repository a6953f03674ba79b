//! sqlgate CLI - run read-only SQL against configured datasources
//!
//! Loads datasource descriptors from a YAML file, provisions one pool per
//! datasource and executes a single statement, or reports on the configured
//! datasources.

mod bootstrap;
mod commands;

use clap::{Parser, Subcommand};
use commands::{CheckCommand, DatasourcesCommand, QueryCommand};
use tracing_subscriber::{layer::SubscriberExt, Layer};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", env = "SQLGATE_LOG_LEVEL", global = true)]
    log_level: String,

    /// Log format: compact, full
    #[arg(
        long,
        default_value = "compact",
        env = "SQLGATE_LOG_FORMAT",
        global = true
    )]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute one statement on a datasource
    Query(QueryCommand),
    /// List configured datasources and available dialects
    Datasources(DatasourcesCommand),
    /// Open every configured pool eagerly and report the outcome
    Check(CheckCommand),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins when set; otherwise our crates log at --log-level
    let filter = if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .map_err(|e| anyhow::anyhow!("Invalid RUST_LOG environment variable: {}", e))?
    } else {
        tracing_subscriber::EnvFilter::new(format!(
            "sqlgate_cli={level},\
             sqlgate={level},\
             sqlgate_sqlx={level},\
             sqlgate_oracle={level},\
             sqlx=warn,\
             rustls=warn",
            level = cli.log_level
        ))
    };

    // Logs go to stderr so query output on stdout stays machine readable
    let fmt_layer = match cli.log_format.as_str() {
        "full" => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
        _ => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set global default subscriber: {}", e))?;

    match cli.command {
        Commands::Query(query_cmd) => query_cmd.execute(),
        Commands::Datasources(datasources_cmd) => datasources_cmd.execute(),
        Commands::Check(check_cmd) => check_cmd.execute(),
    }
}
