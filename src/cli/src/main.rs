//! SaaS CLI - Command-line interface for the authorization policy.
//!
//! Lists roles, prints the compiled rules of each role, validates the
//! configured policy and answers single authorization queries.

mod commands;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use saas_core::config::SaasConfig;
use saas_core::rbac::RolePermissionTable;
use saas_core::telemetry::{init_telemetry, LogFormat};

use commands::{policy, roles};
use output::OutputFormat;

/// SaaS - Authorization policy CLI
#[derive(Parser)]
#[command(
    name = "saas",
    version = "0.1.0",
    about = "SaaS - Authorization policy CLI",
    long_about = "Inspect roles and rules, validate the configured policy and check single authorization queries.",
    propagate_version = true
)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    output: OutputFormat,

    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, global = true, env = "SAAS_CONFIG")]
    config: Option<String>,

    /// Emit engine logs on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Authorization policy operations
    #[command(subcommand)]
    Policy(policy::PolicyCommands),

    /// List roles and whether they are enabled
    Roles,
}

fn load_config(path: Option<&str>) -> Result<SaasConfig> {
    let config = match path {
        Some(path) => SaasConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path))?,
        None => SaasConfig::load().context("Failed to load configuration")?,
    };
    Ok(config)
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let result = load_config(cli.config.as_deref()).and_then(|config| {
        if cli.verbose {
            let mut logging = config.logging.clone();
            logging.level = "debug".to_string();
            logging.format = LogFormat::Compact;
            init_telemetry(&logging, &config.environment)?;
        }

        let table = RolePermissionTable::from_config(&config.policy);
        match cli.command {
            Commands::Policy(cmd) => policy::execute(cmd, &config, &table, cli.output),
            Commands::Roles => roles::execute(&table, cli.output),
        }
    });

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
