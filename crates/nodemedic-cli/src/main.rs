use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "nodemedic",
    about = "nodemedic: inspect and configure the node healer",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Data directory holding the healer state file.
    #[arg(long, global = true, default_value = "/var/lib/nodemedic")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or change per-pool healer config
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Inspect node health records
    Status {
        #[command(subcommand)]
        action: StatusAction,
    },
    /// Work with healer settings files
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective config of every stored pool
    Show,
    /// Merge fields into a pool's config.
    ///
    /// Omit --pool to change the default config inherited by every pool.
    Set {
        #[arg(short, long, default_value = "")]
        pool: String,
        #[arg(long)]
        enabled: Option<bool>,
        /// Seconds without a successful check before healing.
        #[arg(long)]
        max_time_since_success: Option<u64>,
        /// Seconds without any check before healing.
        #[arg(long)]
        max_unresponsive_time: Option<u64>,
    },
    /// Remove a pool's config, or one field of it
    Unset {
        #[arg(short, long, default_value = "")]
        pool: String,
        #[arg(short, long)]
        field: Option<String>,
    },
}

#[derive(Subcommand)]
enum StatusAction {
    /// Print the health record of a node
    Show { address: String },
    /// Print every health record
    List,
    /// Forget a node's health record
    Remove { address: String },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Parse a settings file and print the resolved values
    Check { file: PathBuf },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new("info,nodemedic=debug"))?,
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config::show(&cli.data_dir),
            ConfigAction::Set {
                pool,
                enabled,
                max_time_since_success,
                max_unresponsive_time,
            } => commands::config::set(
                &cli.data_dir,
                &pool,
                nodemedic_state::HealerConfigEntry {
                    enabled,
                    max_time_since_success,
                    max_unresponsive_time,
                },
            ),
            ConfigAction::Unset { pool, field } => {
                commands::config::unset(&cli.data_dir, &pool, field.as_deref())
            }
        },
        Commands::Status { action } => match action {
            StatusAction::Show { address } => commands::status::show(&cli.data_dir, &address),
            StatusAction::List => commands::status::list(&cli.data_dir),
            StatusAction::Remove { address } => commands::status::remove(&cli.data_dir, &address),
        },
        Commands::Settings { action } => match action {
            SettingsAction::Check { file } => commands::settings::check(&file),
        },
    }
}
