use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use potatomesh_client::{
    ApiClient, FeedSource, MeshSnapshot, NodeHydrator, Poller, RefreshCycle,
};
use potatomesh_core::{ConfigManager, LoggingConfig, MeshConfig, NodeRef};
use potatomesh_graph::{best_links_for, sort_links_by_snr};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "potatomesh")]
#[command(about = "PotatoMesh CLI - Reconciled node state from a PotatoMesh instance", long_about = None)]
#[command(version)]
struct Cli {
    /// Output format (json, pretty)
    #[arg(short, long, global = true, default_value = "pretty")]
    output: OutputFormat,

    /// Instance base URL, overrides the config file
    #[arg(long, global = true, env = "POTATOMESH_BASE_URL")]
    base_url: Option<String>,

    /// Explicit config file instead of the default search path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild one node from every per-node feed
    Node {
        /// Node ID (`!a1b2c3d4`) or node number
        reference: String,

        /// Fallback node JSON used to seed the aggregate
        #[arg(long)]
        fallback: Option<String>,

        /// Include windowed telemetry and position history
        #[arg(long)]
        history: bool,
    },

    /// Run one refresh cycle and summarize it
    Snapshot {
        /// Print every node aggregate
        #[arg(long)]
        full: bool,
    },

    /// Strongest neighbor links
    Links {
        /// Only links touching this node
        #[arg(long)]
        node: Option<String>,
    },

    /// Drawable traceroute segments
    Traces,

    /// Refresh on the configured interval until interrupted
    Watch,

    /// Check that the instance answers
    Health,

    /// Write a default config file
    Init {
        /// Target path (defaults to ~/.potatomesh/config.toml)
        #[arg(long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

const LOG_TARGETS: [&str; 4] = ["potatomesh", "potatomesh_client", "potatomesh_core", "potatomesh_graph"];

fn default_filter(level: &str) -> String {
    LOG_TARGETS
        .iter()
        .map(|target| format!("{}={}", target, level))
        .collect::<Vec<_>>()
        .join(",")
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(&logging.level)));
    let registry = tracing_subscriber::registry().with(filter);
    match logging.format.as_str() {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        "compact" => registry
            .with(tracing_subscriber::fmt::layer().compact().with_writer(std::io::stderr))
            .init(),
        _ => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

fn load_config(cli: &Cli) -> Result<MeshConfig> {
    let manager = match &cli.config {
        Some(path) => ConfigManager::load_from(path),
        None => ConfigManager::load(),
    }
    .context("Failed to load configuration")?;
    let mut config = manager.into_config();
    if let Some(base_url) = &cli.base_url {
        config.api.base_url = base_url.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Init { path, force } = &cli.command {
        let output = init_config(path.clone(), *force)?;
        return print_output(&cli.output, &output);
    }

    let config = load_config(&cli)?;
    init_tracing(&config.logging);

    match execute_command(&cli, config).await {
        Ok(Some(output)) => {
            print_output(&cli.output, &output)?;
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

async fn execute_command(cli: &Cli, config: MeshConfig) -> Result<Option<Value>> {
    let api = ApiClient::new(&config.api).context("Failed to build API client")?;

    match &cli.command {
        Commands::Node {
            reference,
            fallback,
            history,
        } => {
            let reference = reference
                .parse::<NodeRef>()
                .context("Invalid node reference")?
                .with_fallback(fallback.clone().map(Value::String).as_ref());
            let hydrator = NodeHydrator::new(Arc::new(api), &config);
            if *history {
                let (node, history) = hydrator.hydrate_with_history(&reference).await;
                Ok(Some(json!({
                    "node": node.to_export_json(),
                    "telemetry_history": history.telemetry.iter().map(|s| &s.raw).collect::<Vec<_>>(),
                    "position_history": history.positions.iter().map(|s| &s.raw).collect::<Vec<_>>(),
                })))
            } else {
                Ok(Some(hydrator.hydrate(&reference).await.to_export_json()))
            }
        }
        Commands::Snapshot { full } => {
            let snapshot = run_cycle(api, config).await?;
            if *full {
                let nodes: Vec<Value> = snapshot.nodes().iter().map(|n| n.to_export_json()).collect();
                Ok(Some(Value::Array(nodes)))
            } else {
                Ok(Some(summary(&snapshot)))
            }
        }
        Commands::Links { node } => {
            let snapshot = run_cycle(api, config).await?;
            let mut links = match node {
                Some(raw) => {
                    let reference = raw.parse::<NodeRef>().context("Invalid node reference")?;
                    let key = reference
                        .snapshot_key()
                        .context("Node reference has no grouping key")?;
                    best_links_for(&snapshot.feeds().neighbors, &key)
                }
                None => snapshot.links.clone(),
            };
            sort_links_by_snr(&mut links);
            Ok(Some(to_json(&links)?))
        }
        Commands::Traces => {
            let snapshot = run_cycle(api, config).await?;
            Ok(Some(to_json(&snapshot.trace_segments)?))
        }
        Commands::Watch => {
            watch(api, config, cli.output.clone()).await?;
            Ok(None)
        }
        Commands::Health => {
            let version = api.health_check().await.context("Health check failed")?;
            Ok(Some(json!({
                "base_url": config.api.base_url,
                "version": version,
                "status": "healthy",
            })))
        }
        Commands::Init { .. } => Ok(None),
    }
}

fn init_config(path: Option<PathBuf>, force: bool) -> Result<Value> {
    let path = match path {
        Some(path) => path,
        None => dirs::home_dir()
            .context("Could not determine home directory")?
            .join(".potatomesh")
            .join("config.toml"),
    };
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    ConfigManager::create_default_config(&path).context("Failed to write default config")?;
    Ok(json!({
        "status": "created",
        "path": path.display().to_string(),
    }))
}

async fn run_cycle(api: ApiClient, config: MeshConfig) -> Result<Arc<MeshSnapshot>> {
    let source: Arc<dyn FeedSource> = Arc::new(api);
    let cycle = RefreshCycle::new(source, config);
    let snapshot = cycle.run().await.context("Refresh cycle failed")?;
    Ok(Arc::new(snapshot))
}

async fn watch(api: ApiClient, config: MeshConfig, output: OutputFormat) -> Result<()> {
    let poller = Poller::new(RefreshCycle::new(Arc::new(api), config));
    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Interrupted, stopping");
    };
    poller
        .run(shutdown, |snapshot| {
            if let Err(e) = print_output(&output, &summary(&snapshot)) {
                eprintln!("{} {}", "Error:".red().bold(), e);
            }
        })
        .await;
    Ok(())
}

fn summary(snapshot: &MeshSnapshot) -> Value {
    let located = snapshot
        .nodes()
        .iter()
        .filter(|n| n.coordinates().is_some())
        .count();
    json!({
        "generated_at": snapshot.generated_at.to_rfc3339(),
        "nodes": snapshot.nodes().len(),
        "located_nodes": located,
        "links": snapshot.links.len(),
        "map_lines": snapshot.map_lines.len(),
        "trace_segments": snapshot.trace_segments.len(),
        "messages": snapshot.messages.len(),
        "degraded_feeds": snapshot.degraded.iter().map(|f| f.to_string()).collect::<Vec<_>>(),
    })
}

fn to_json<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

fn print_output(format: &OutputFormat, value: &Value) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        OutputFormat::Pretty => {
            print_pretty(value)?;
        }
    }
    Ok(())
}

fn print_pretty(value: &Value) -> Result<()> {
    match value {
        Value::Object(map) => {
            for (key, val) in map {
                let key_colored = key.cyan().bold();
                match val {
                    Value::String(s) => {
                        println!("{}: {}", key_colored, s.green());
                    }
                    Value::Number(n) => {
                        println!("{}: {}", key_colored, n.to_string().yellow());
                    }
                    Value::Bool(b) => {
                        let val_colored = if *b { "true".green() } else { "false".red() };
                        println!("{}: {}", key_colored, val_colored);
                    }
                    Value::Null => {}
                    _ => {
                        println!("{}: {}", key_colored, val);
                    }
                }
            }
        }
        Value::Array(arr) => {
            for (i, item) in arr.iter().enumerate() {
                println!("\n{}{}:", "Item ".cyan(), (i + 1).to_string().yellow());
                print_pretty(item)?;
            }
        }
        _ => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_covers_every_crate() {
        let filter = default_filter("debug");
        for target in ["potatomesh_client", "potatomesh_core", "potatomesh_graph"] {
            assert!(filter.contains(&format!("{}=debug", target)), "{}", filter);
        }
        assert!(filter.parse::<EnvFilter>().is_ok());
    }
}
