//! proxy-composer
//!
//! # Architecture Overview
//!
//! ```text
//!   apps/*.conf        overrides/*.conf
//!        │                   │
//!        └──────┬────────────┘
//!               ▼
//!     ┌───────────────────────────────────────────────────────────┐
//!     │                       COMPOSER                             │
//!     │                                                            │
//!     │  fragments ─▶ parser ─▶ resolver ─▶ reserved ─▶ harden     │
//!     │   (load)      (locations) (conflicts)  (guard)   (resolver,│
//!     │                             ▲                   fallback)  │
//!     │                             │                      │       │
//!     │                     decisions.json                 ▼       │
//!     │                                                 compose    │
//!     │                                            (bundle + diag) │
//!     │                                                    │       │
//!     │  triggers ─▶ activation controller ◀──────────────┘       │
//!     │  (watcher,   stage → nginx -t → promote → nginx -s reload  │
//!     │   interval,                                                │
//!     │   SIGHUP,                                                  │
//!     │   admin API)                                               │
//!     └───────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//!                   generated bundle (included by nginx)
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use proxy_composer::activation::Trigger;
use proxy_composer::config::loader::{default_config, load_config};
use proxy_composer::lifecycle::startup;
use proxy_composer::observability::logging::init_logging;

#[derive(Parser)]
#[command(name = "proxy-composer")]
#[command(about = "Compose app routing fragments into a validated nginx bundle", long_about = None)]
struct Cli {
    /// Configuration file (TOML). Defaults apply when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Regenerate on start, then on every trigger until stopped
    Run,
    /// Regenerate once; exit non-zero unless the bundle was activated
    Regenerate,
    /// Compose only and print the bundle and diagnostics
    Check {
        /// Print diagnostics only
        #[arg(long)]
        diagnostics_only: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => default_config()?,
    };
    init_logging(&config.observability);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        app_dir = ?config.sources.app_dir,
        override_dir = ?config.sources.override_dir,
        bundle = ?config.output.bundle_path,
        runtime_enabled = config.runtime.enabled,
        "Configuration loaded"
    );

    match cli.command {
        Commands::Run => startup::run(config).await?,
        Commands::Regenerate => {
            let controller = startup::build_controller(Arc::new(config)).await?;
            let outcome = controller.regenerate(Trigger::Command).await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            if !outcome.activated() {
                std::process::exit(1);
            }
        }
        Commands::Check { diagnostics_only } => {
            let controller = startup::build_controller(Arc::new(config)).await?;
            let composition = controller.dry_run().await?;
            if !diagnostics_only {
                println!("{}", composition.bundle.render());
            }
            println!("{}", composition.diagnostics.to_json()?);
        }
    }

    Ok(())
}
