// # pcxctl - VPC Peering Connection CLI
//
// Thin integration layer over `pcx-core`:
// 1. Parse the command line and set up tracing
// 2. Load and validate the JSON configuration
// 3. Register the AWS backend and build the API client
// 4. Drive the lifecycle for the requested command
//
// Handler and polling logic lives in `pcx-core`; nothing here talks to AWS
// directly.
//
// ## Commands
//
// - `apply [NAME]`: create, update or replace configured connections.
//   Without a name every configured resource is applied and recorded
//   resources missing from the configuration are destroyed.
// - `refresh [NAME]`: re-read recorded connections from AWS
// - `destroy NAME`: delete a recorded connection
// - `import NAME ID`: adopt an existing connection under a name
// - `show [NAME]`: print recorded state
// - `schema`: print the resource schema as JSON
//
// ## Environment
//
// - `PCX_CONFIG`: configuration file (default `pcx.json`)
// - `PCX_LOG_LEVEL`: trace, debug, info, warn, error (default `info`)
//
// ## Example
//
// ```bash
// export PCX_CONFIG=/etc/pcx/pcx.json
// pcxctl apply main_to_shared
// pcxctl show
// ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pcx_core::config::{PcxConfig, ProviderConfig};
use pcx_core::lifecycle::{DEFAULT_EVENT_CHANNEL_CAPACITY, Lifecycle, LifecycleEvent};
use pcx_core::schema::resource_schema;
use pcx_core::{BackendRegistry, PeeringConnectionResource, ProviderMeta, StateStore};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::mpsc;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

/// Exit codes for different termination scenarios
///
/// - 0: Success
/// - 1: Configuration or startup error
/// - 2: Runtime error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PcxExitCode {
    Success = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<PcxExitCode> for ExitCode {
    fn from(code: PcxExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

#[derive(Debug, Parser)]
#[command(name = "pcxctl", version, about = "Manage AWS VPC peering connections")]
struct Cli {
    /// Configuration file
    #[arg(short, long, env = "PCX_CONFIG", default_value = "pcx.json")]
    config: PathBuf,

    /// Log level: trace, debug, info, warn, error
    #[arg(long, env = "PCX_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create, update or replace configured connections
    Apply {
        /// Only apply this resource
        name: Option<String>,
    },
    /// Re-read recorded connections from AWS
    Refresh {
        /// Only refresh this resource
        name: Option<String>,
    },
    /// Delete a recorded connection
    Destroy { name: String },
    /// Adopt an existing connection under a resource name
    Import { name: String, id: String },
    /// Print recorded state
    Show {
        /// Only show this resource
        name: Option<String>,
    },
    /// Print the resource schema
    Schema,
}

fn parse_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => anyhow::bail!(
            "PCX_LOG_LEVEL '{}' is not valid. \
            Valid levels: trace, debug, info, warn, error",
            level
        ),
    }
}

/// Classify a failed command: configuration problems exit with 1
fn exit_code_for(err: &anyhow::Error) -> PcxExitCode {
    match err.downcast_ref::<pcx_core::Error>().map(pcx_core::Error::root) {
        Some(pcx_core::Error::Config(_)) => PcxExitCode::ConfigError,
        _ => PcxExitCode::RuntimeError,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match parse_level(&cli.log_level) {
        Ok(level) => level,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return PcxExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return PcxExitCode::ConfigError.into();
    }

    if let Command::Schema = cli.command {
        return match print_json(&resource_schema()) {
            Ok(()) => PcxExitCode::Success.into(),
            Err(e) => {
                error!("{:#}", e);
                PcxExitCode::RuntimeError.into()
            }
        };
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return PcxExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        let config = match PcxConfig::from_file(&cli.config).await {
            Ok(config) => config,
            Err(e) => {
                error!("Configuration error: {}", e);
                return PcxExitCode::ConfigError;
            }
        };
        info!(
            "Configuration loaded: {} resource(s)",
            config.resources.len()
        );

        match run(cli.command, config).await {
            Ok(()) => PcxExitCode::Success,
            Err(e) => {
                error!("{:#}", e);
                exit_code_for(&e)
            }
        }
    });

    result.into()
}

/// Build the lifecycle from configuration and run one command
async fn run(command: Command, config: PcxConfig) -> Result<()> {
    let registry = BackendRegistry::new();
    pcx_provider_aws::register(&registry)?;

    let api = registry
        .create_api(&config.provider)
        .await
        .context("failed to create API client")?;
    info!("Using {} backend in {}", api.backend_name(), api.region());

    let account_id = match &config.provider {
        ProviderConfig::Aws { account_id, .. } => account_id.clone().unwrap_or_default(),
        ProviderConfig::Custom { .. } => String::new(),
    };
    let meta = ProviderMeta {
        account_id,
        region: String::new(),
        default_tags: config.default_tags.clone(),
        ignore_tags: config.ignore_tags.clone(),
        wait: config.wait.clone(),
    };
    let resource = PeeringConnectionResource::connect(api, meta)
        .await
        .context("failed to resolve caller account")?;

    let store = pcx_core::state::from_config(&config.state_store).await?;
    let (lifecycle, rx) = Lifecycle::new(resource, store, DEFAULT_EVENT_CHANNEL_CAPACITY)?;
    let logger = tokio::spawn(log_events(rx));

    let result = execute(&lifecycle, command, &config).await;
    let flushed = lifecycle.state_store().flush().await;

    // Closing the channel ends the logger
    drop(lifecycle);
    if let Err(e) = logger.await {
        warn!("Event logger stopped abnormally: {}", e);
    }

    result?;
    flushed?;
    Ok(())
}

async fn execute(lifecycle: &Lifecycle, command: Command, config: &PcxConfig) -> Result<()> {
    match command {
        Command::Apply { name: Some(name) } => {
            let resource_config = config
                .resources
                .get(&name)
                .ok_or_else(|| pcx_core::Error::config(format!("No resource named '{}'", name)))?;
            let state = lifecycle.apply(&name, resource_config).await?;
            print_json(&state)
        }
        Command::Apply { name: None } => {
            let summary = lifecycle.apply_all(config).await?;
            info!(
                "Apply complete: {} changed, {} unchanged, {} destroyed, {} failed",
                summary.changed.len(),
                summary.unchanged.len(),
                summary.destroyed.len(),
                summary.failed.len()
            );
            if !summary.is_success() {
                for (name, err) in &summary.failed {
                    error!("{}: {}", name, err);
                }
                anyhow::bail!("{} resource(s) failed to apply", summary.failed.len());
            }
            Ok(())
        }
        Command::Refresh { name: Some(name) } => {
            let state = lifecycle.refresh(&name).await?;
            print_json(&state)
        }
        Command::Refresh { name: None } => {
            let mut states = BTreeMap::new();
            for name in lifecycle.state_store().list_records().await? {
                let state = lifecycle.refresh(&name).await?;
                states.insert(name, state);
            }
            print_json(&states)
        }
        Command::Destroy { name } => {
            let timeouts = config
                .resources
                .get(&name)
                .map(|r| r.timeouts)
                .unwrap_or_default();
            lifecycle.destroy(&name, timeouts).await?;
            Ok(())
        }
        Command::Import { name, id } => {
            let state = lifecycle.import(&name, &id).await?;
            print_json(&state)
        }
        Command::Show { name: Some(name) } => {
            let state = lifecycle
                .recorded(&name)
                .await?
                .ok_or_else(|| pcx_core::Error::not_found(format!("No recorded resource '{}'", name)))?;
            print_json(&state)
        }
        Command::Show { name: None } => {
            let mut states = BTreeMap::new();
            for name in lifecycle.state_store().list_records().await? {
                if let Some(state) = lifecycle.recorded(&name).await? {
                    states.insert(name, state);
                }
            }
            print_json(&states)
        }
        Command::Schema => print_json(&resource_schema()),
    }
}

async fn log_events(mut rx: mpsc::Receiver<LifecycleEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            LifecycleEvent::Planned { name, plan } => info!("{}: {}", name, plan),
            LifecycleEvent::Created { name, id } => info!("{}: created {}", name, id),
            LifecycleEvent::Updated { name, id } => info!("{}: updated {}", name, id),
            LifecycleEvent::Replaced {
                name,
                old_id,
                new_id,
            } => info!("{}: replaced {} with {}", name, old_id, new_id),
            LifecycleEvent::Unchanged { name, id } => info!("{}: {} is up to date", name, id),
            LifecycleEvent::Deleted { name, id } => info!("{}: deleted {}", name, id),
            LifecycleEvent::Vanished { name, id } => {
                warn!("{}: {} no longer exists in AWS", name, id)
            }
            LifecycleEvent::Imported { name, id } => info!("{}: imported {}", name, id),
            LifecycleEvent::Failed { name, error } => error!("{}: {}", name, error),
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
