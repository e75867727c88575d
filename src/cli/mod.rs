//! Command-line interface.

pub mod commands;
pub mod output;
pub mod types;

pub use types::{Cli, Commands};

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::adapters::transports::build_transport;
use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::logging::{LogConfig, LoggerImpl};
use crate::infrastructure::ArtifactStore;
use crate::services::AgentInvoker;

/// Loaded configuration plus the global flags every command sees.
pub struct AppContext {
    /// Validated configuration.
    pub config: Config,
    /// Emit JSON instead of human-readable text.
    pub json: bool,
    /// Cancelled on Ctrl-C; shared by every run the command starts.
    pub cancel: CancellationToken,
}

impl AppContext {
    /// Load configuration honoring `--config` and `--transport`.
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load()?,
        };
        if let Some(kind) = cli.transport {
            config.transport.kind = kind;
            ConfigLoader::validate(&config).context("Invalid transport override")?;
        }
        Ok(Self {
            config,
            json: cli.json,
            cancel: CancellationToken::new(),
        })
    }

    /// Invoker over the configured transport.
    pub fn invoker(&self) -> Result<Arc<AgentInvoker>> {
        let transport = build_transport(&self.config.transport).context("Failed to build agent transport")?;
        Ok(Arc::new(AgentInvoker::new(
            transport,
            self.config.roles.clone(),
            self.config.pricing,
        )))
    }

    /// Artifact store under the configured output directory.
    pub fn store(&self) -> ArtifactStore {
        ArtifactStore::new(&self.config.output_dir)
    }

    /// Cancel in-flight runs on Ctrl-C.
    fn cancel_on_ctrl_c(&self) {
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received; cancelling run");
                cancel.cancel();
            }
        });
    }
}

/// Parse-independent entry point used by `main`.
pub async fn run(cli: Cli) -> Result<()> {
    let ctx = AppContext::load(&cli)?;
    let _logger = LoggerImpl::init(&LogConfig::from_settings(&ctx.config.logging))?;
    ctx.cancel_on_ctrl_c();

    match cli.command {
        Commands::Copy(args) => commands::copy::execute(args, &ctx).await,
        Commands::Repair(args) => commands::repair::execute(args, &ctx).await,
        Commands::Preflight(args) => commands::preflight::execute(args, &ctx).await,
        Commands::Scorecard(args) => commands::scorecard::execute(args, &ctx).await,
    }
}

/// Print `err` and exit non-zero.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let chain: Vec<String> = err.chain().skip(1).map(ToString::to_string).collect();
        let body = serde_json::json!({
            "success": false,
            "error": err.to_string(),
            "causes": chain,
        });
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("Error: {err:#}");
    }
    std::process::exit(1);
}
