pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Context};
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use signcfg_core::config::{AppConfig, LoadOptions, LogFormat};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "signcfg",
    about = "Sign variant configurator CLI",
    long_about = "Configure sign variants onto quotations: resolve or create the variant, record its price and append it as a quotation line.",
    after_help = "Examples:\n  signcfg migrate\n  signcfg seed\n  signcfg catalog --template LED-SIGN-01\n  signcfg configure --quotation QTN-0001 --template LED-SIGN-01 --set Color=Red --set Size=24"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Read configuration from this TOML file")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo sign template, pricing profile, price list and quotation")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, database schema and host readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Print the attribute field layout generated for a template")]
    Catalog {
        #[arg(long, help = "Variant-capable template item code")]
        template: String,
        #[arg(long, help = "Read the template from the host application instead of SQLite")]
        remote: bool,
    },
    #[command(about = "Configure a sign variant and add it to a quotation")]
    Configure(ConfigureArgs),
}

#[derive(Debug, Clone, Args)]
pub struct ConfigureArgs {
    #[arg(long)]
    pub quotation: String,
    #[arg(long)]
    pub template: String,
    #[arg(long = "set", value_name = "NAME=VALUE", help = "Attribute value, repeatable")]
    pub set: Vec<String>,
    #[arg(long, help = "Line quantity (defaults to workflow.default_qty)")]
    pub qty: Option<Decimal>,
    #[arg(long, help = "Line unit of measure (defaults to workflow.default_uom)")]
    pub uom: Option<String>,
    #[arg(long, help = "Design file URL used to prefill the perimeter attribute")]
    pub design_file: Option<String>,
    #[arg(long, help = "Run against the host application instead of SQLite")]
    pub remote: bool,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = LoadOptions { config_path: cli.config, ..LoadOptions::default() };

    if let Ok(config) = AppConfig::load(options.clone()) {
        if let Err(error) = init_logging(&config) {
            eprintln!("logging disabled: {error:#}");
        }
    }

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(options),
        Command::Seed => commands::seed::run(options),
        Command::Config => commands::config::run(options),
        Command::Doctor { json } => commands::doctor::run(options, json),
        Command::Catalog { template, remote } => commands::catalog::run(options, &template, remote),
        Command::Configure(args) => commands::configure::run(options, args),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Installs the global subscriber. Logs go to stderr; stdout carries the command payload.
pub fn init_logging(config: &AppConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(&config.logging.level)
        .with_context(|| format!("invalid log level `{}`", config.logging.level))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
    .map_err(|error| anyhow!("failed to install tracing subscriber: {error}"))
}
