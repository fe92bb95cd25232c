use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use waypoint_app::config::{load_config, AppConfig};
use waypoint_app::TravelApp;

#[derive(Parser)]
#[command(name = "waypoint", about = "Travel planning sync engine")]
struct Cli {
    /// Path to config TOML file. Falls back to the environment when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send one request through the gateway and print the response.
    Request {
        /// Route, e.g. `/TripPlanning/create`
        path: String,
        /// JSON object body
        #[arg(default_value = "{}")]
        body: String,
        /// Log in as this user first and attach the session to the body
        #[arg(long = "as")]
        user: Option<String>,
    },
    /// List the registered rules in matching order.
    Syncs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("waypoint=info"));
    if cli.json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = match &cli.config {
        Some(path) => {
            tracing::info!(config = %path.display(), "Loading config");
            let config = load_config(path)?;
            config.log();
            config
        }
        None => AppConfig::from_env()?,
    };

    let app = TravelApp::build(config)?;

    match cli.command {
        Command::Syncs => {
            for (position, sync) in app.engine().syncs().iter().enumerate() {
                println!("{position:>3}  {}", sync.name());
            }
        }
        Command::Request { path, body, user } => {
            let mut body: Value =
                serde_json::from_str(&body).with_context(|| format!("Request body is not JSON: {body}"))?;
            if let Some(user) = user {
                let session = app.login(&user)?;
                let object = body
                    .as_object_mut()
                    .context("Request body must be a JSON object")?;
                object.insert("session".into(), Value::String(session));
            }

            let response = app.handle(&path, body).await?;
            println!("{} {}", response.status(), serde_json::to_string_pretty(&response.body)?);

            if let Some(report) = &response.report {
                println!();
                println!("run {} ({} rule firings)", report.run_id, report.fired);
                for record in &report.records {
                    let indent = "  ".repeat(record.depth as usize);
                    let marker = if record.is_error() { "!" } else { "-" };
                    println!(
                        "{indent}{marker} #{} {} {}",
                        record.seq,
                        record.action,
                        Value::Object(record.output.clone())
                    );
                }
                for aborted in &report.aborted {
                    println!("  x {} after #{}: {}", aborted.sync, aborted.trigger_seq, aborted.error);
                }
            }
        }
    }

    Ok(())
}
