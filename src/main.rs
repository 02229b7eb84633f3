//! Resilient client CLI.
//!
//! Runs discovery and the request pipeline from the command line, using a
//! JSON file as the token store.
//!
//! ```text
//! resilient-client --config client.toml discover
//! resilient-client get /announcements --param page=2
//! ```

use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

use resilient_client::config::load_or_default;
use resilient_client::observability::logging;
use resilient_client::pipeline::RequestSpec;
use resilient_client::store::FileStore;
use resilient_client::RequestPipeline;

#[derive(Parser)]
#[command(name = "resilient-client")]
#[command(about = "Discover the backend and send requests through the resilient pipeline", long_about = None)]
struct Cli {
    /// TOML configuration file (defaults are used when omitted).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Token store file (overrides `storage.path`).
    #[arg(short, long)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find a reachable server (fast path if the current one still answers)
    Discover,
    /// Ignore the current server and run full discovery
    Redetect,
    /// Show remembered working URLs
    Cache,
    /// Remember a server URL and make it current
    Remember { url: String },
    /// Send an authenticated GET request
    Get {
        path: String,
        /// Query parameter as key=value (repeatable)
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
    },
    /// Clear the stored session
    Logout,
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_or_default(cli.config.as_deref())?;
    logging::init(&config.observability);

    let store_path = cli
        .store
        .unwrap_or_else(|| PathBuf::from(&config.storage.path));
    tracing::debug!(
        store = %store_path.display(),
        fallback_url = %config.discovery.fallback_url,
        "Configuration loaded"
    );

    let store = Arc::new(FileStore::open(&store_path).await?);
    let pipeline = RequestPipeline::from_config(&config, store).await;
    let discovery = pipeline.discovery();

    match cli.command {
        Commands::Discover => {
            let url = discovery.discover().await;
            print_json(&json!({ "baseUrl": url }))?;
        }
        Commands::Redetect => {
            let url = discovery.force_redetect().await;
            print_json(&json!({ "baseUrl": url }))?;
        }
        Commands::Cache => {
            print_json(&json!({ "workingUrls": discovery.cached_urls() }))?;
        }
        Commands::Remember { url } => match discovery.remember(&url).await {
            Some(url) => print_json(&json!({ "baseUrl": url }))?,
            None => {
                eprintln!("Error: '{}' is not an http(s) URL", url);
                std::process::exit(2);
            }
        },
        Commands::Get { path, params } => {
            let spec = RequestSpec::get(path).with_params(params);
            match pipeline.execute(spec).await {
                Ok(payload) => print_json(&payload)?,
                Err(e) => {
                    eprintln!("{}", serde_json::to_string_pretty(&e.to_json())?);
                    std::process::exit(1);
                }
            }
        }
        Commands::Logout => {
            pipeline.logout().await;
            print_json(&json!({ "loggedOut": true }))?;
        }
    }

    Ok(())
}

fn print_json(value: &serde_json::Value) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
