//! CLI parsing and command execution
//!
//! This module handles command-line argument parsing and routes commands to the controllers.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

use crate::backends::BackendType;
use crate::config::Config;
use crate::service::SecretManager;

#[derive(Parser)]
#[command(name = "secret-manager")]
#[command(about = "Tenant secret management over a policy-driven vault", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "SECRET_MANAGER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Secret backend to use (vault or memory)
    #[arg(long)]
    pub backend: Option<BackendType>,

    /// Vault URL (overrides config file)
    #[arg(long)]
    pub vault_url: Option<String>,

    /// Vault account (overrides config file)
    #[arg(long)]
    pub vault_account: Option<String>,

    /// Root policy path (overrides config file)
    #[arg(long)]
    pub root_policy_path: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a sample configuration file
    Init {
        /// Output path for the configuration file
        #[arg(short, long, default_value = "secret-manager.toml")]
        output: PathBuf,
    },

    /// Read a secret by reference or identity
    Get {
        reference: String,
    },

    /// Write a secret ("rotate" generates a new value)
    Set {
        reference: String,
        value: String,
    },

    /// Replace a secret with a freshly generated value
    Rotate {
        reference: String,
    },

    /// Delete a secret
    Delete {
        reference: String,
    },

    /// Create or update a tenant and its secrets
    Onboard {
        /// Secret to seed, as name=value (repeatable)
        #[arg(short, long = "secret", value_parser = parse_secret, global = true)]
        secrets: Vec<(String, String)>,

        #[command(subcommand)]
        tenant: TenantCommand,
    },

    /// Delete a tenant and its secrets
    Offboard {
        #[command(subcommand)]
        tenant: TenantCommand,
    },
}

#[derive(Subcommand)]
pub enum TenantCommand {
    /// An environment
    Env { env: String },
    /// A team in an environment
    Team { env: String, team: String },
    /// An application of a team
    App {
        env: String,
        team: String,
        app: String,
    },
}

fn parse_secret(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected name=value, got '{}'", raw))
}

fn print_refs(refs: &BTreeMap<String, String>) {
    println!("Secret references:");
    for (name, reference) in refs {
        println!("  {}: {}", name, reference);
    }
}

/// Load configuration and apply command-line overrides
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        Config::from_env().context("Failed to load config from environment")?
    };

    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    if let Some(ref mut vault_config) = config.vault {
        if let Some(url) = &cli.vault_url {
            vault_config.url = url.clone();
        }
        if let Some(account) = &cli.vault_account {
            vault_config.account = account.clone();
        }
        if let Some(root) = &cli.root_policy_path {
            vault_config.root_policy_path = root.clone();
        }
    }
    Ok(config)
}

/// Execute a CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    // Handle init command separately as it doesn't need a backend
    if let Commands::Init { output } = &cli.command {
        Config::create_sample(output)
            .with_context(|| format!("Failed to create sample config at {:?}", output))?;
        info!("Sample configuration created at {:?}", output);
        return Ok(());
    }

    let config = load_config(&cli)?;
    let manager = SecretManager::from_config(&config)?;

    match cli.command {
        Commands::Init { .. } => {}

        Commands::Get { reference } => {
            let value = manager
                .secret_controller()
                .get(&reference)
                .await
                .context("Failed to read secret")?;
            eprintln!("WARNING: Secret value will be displayed. Ensure this output is secured.");
            println!("{}", value);
        }

        Commands::Set { reference, value } => {
            let new_ref = manager
                .secret_controller()
                .set(&reference, &value)
                .await
                .context("Failed to write secret")?;
            println!("Secret written: {}", new_ref);
        }

        Commands::Rotate { reference } => {
            let new_ref = manager
                .secret_controller()
                .rotate(&reference)
                .await
                .context("Failed to rotate secret")?;
            println!("Secret rotated: {}", new_ref);
        }

        Commands::Delete { reference } => {
            manager
                .secret_controller()
                .delete(&reference)
                .await
                .context("Failed to delete secret")?;
            println!("Secret deleted: {}", reference);
        }

        Commands::Onboard { secrets, tenant } => {
            let values: BTreeMap<String, String> = secrets.into_iter().collect();
            let controller = manager.onboard_controller();
            let refs = match tenant {
                TenantCommand::Env { env } => controller.upsert_environment(&env, &values).await,
                TenantCommand::Team { env, team } => {
                    controller.upsert_team(&env, &team, &values).await
                }
                TenantCommand::App { env, team, app } => {
                    controller.upsert_application(&env, &team, &app, &values).await
                }
            }
            .context("Failed to onboard tenant")?;
            print_refs(&refs);
        }

        Commands::Offboard { tenant } => {
            let controller = manager.onboard_controller();
            let result = match &tenant {
                TenantCommand::Env { env } => controller.delete_environment(env).await,
                TenantCommand::Team { env, team } => controller.delete_team(env, team).await,
                TenantCommand::App { env, team, app } => {
                    controller.delete_application(env, team, app).await
                }
            };
            result.context("Failed to delete tenant")?;
            println!("Tenant deleted");
        }
    }

    Ok(())
}
