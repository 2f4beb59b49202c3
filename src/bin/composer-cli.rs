use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "composer-cli")]
#[command(about = "Management CLI for proxy-composer", long_about = None)]
struct Cli {
    /// Admin API root, including the base path.
    #[arg(short, long, default_value = "http://127.0.0.1:8090/devproxy/api")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Controller state and last run
    Status,
    /// Regenerate now
    Reload,
    /// Conflicts settled by the last run
    Conflicts,
    /// Diagnostics of the last run
    Diagnostics,
    /// Effective configuration
    Config,
    /// Install an app fragment from a file
    Install {
        /// App name (becomes `<name>.conf`)
        name: String,
        /// Fragment file
        file: PathBuf,
    },
    /// Pick the winner of a conflict by hand
    Resolve {
        /// Lane key from `conflicts` (e.g. `/api` or `= /health`)
        key: String,
        /// Source identity of the winner
        winner: String,
    },
    /// Rename a route inside a stored fragment
    Rename {
        /// Fragment path as shown in diagnostics
        source: String,
        /// Current location (e.g. `/api/` or `= /health`)
        from: String,
        /// New location pattern
        to: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let res = match cli.command {
        Commands::Status => client.get(format!("{}/status", base)).send().await?,
        Commands::Reload => client.post(format!("{}/reload", base)).send().await?,
        Commands::Conflicts => client.get(format!("{}/overrides/conflicts", base)).send().await?,
        Commands::Diagnostics => client.get(format!("{}/diagnostics", base)).send().await?,
        Commands::Config => client.get(format!("{}/config", base)).send().await?,
        Commands::Install { name, file } => {
            let text = tokio::fs::read_to_string(&file).await?;
            client
                .post(format!("{}/apps/{}", base, name))
                .body(text)
                .send()
                .await?
        }
        Commands::Resolve { key, winner } => {
            client
                .post(format!("{}/resolve-conflict", base))
                .json(&serde_json::json!({ "key": key, "winner": winner }))
                .send()
                .await?
        }
        Commands::Rename { source, from, to } => {
            client
                .post(format!("{}/rename-route", base))
                .json(&serde_json::json!({ "source": source, "from": from, "to": to }))
                .send()
                .await?
        }
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;

    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }

    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        std::process::exit(1);
    }
    Ok(())
}
