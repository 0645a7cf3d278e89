mod backend;
mod sync;

use anyhow::Context;
use clap::{Parser, Subcommand};
use kbforge_cloud::LifecycleRequest;
use kbforge_config::Settings;
use std::io::Read;
use std::path::{Path, PathBuf};
use sync::ObjectNotification;

#[derive(Parser)]
#[command(name = "kbforge", version)]
#[command(about = "Provision a vector-search knowledge base as a custom resource", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Handle one lifecycle event and print the response as JSON
    Handle {
        /// Event file (reads stdin when omitted)
        #[arg(short, long)]
        event: Option<PathBuf>,
    },
    /// Start an ingestion job for the knowledge base data source
    Sync {
        #[arg(long, env = "KNOWLEDGE_BASE_ID")]
        knowledge_base_id: String,
        #[arg(long, env = "DATA_SOURCE_ID")]
        data_source_id: String,
        /// Object change notification that triggered the sync
        #[arg(short, long)]
        event: Option<PathBuf>,
    },
}

fn read_input(path: Option<&Path>) -> anyhow::Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            Ok(buf)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // JSON goes to stdout, logs to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_ansi(false)
        .init();

    let settings = Settings::from_env().context("invalid configuration")?;

    match cli.command {
        Commands::Handle { event } => {
            let raw = read_input(event.as_deref())?;
            let request: LifecycleRequest =
                serde_json::from_str(&raw).context("malformed lifecycle event")?;
            let provisioner = backend::provisioner(&settings).await?;

            let response = provisioner.handle(&request).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::Sync {
            knowledge_base_id,
            data_source_id,
            event,
        } => {
            let description = match event {
                Some(path) => {
                    let notification: ObjectNotification =
                        serde_json::from_str(&read_input(Some(&path))?)
                            .context("malformed object notification")?;
                    if let Some(key) = notification.object_key() {
                        tracing::info!(object_key = key, "Object changed in data source");
                    }
                    notification.description()
                }
                None => None,
            };

            let provisioner = backend::provisioner(&settings).await?;
            let client_token = uuid::Uuid::new_v4().to_string();
            let job = provisioner
                .data_sources()
                .sync_knowledge_base(
                    &knowledge_base_id,
                    &data_source_id,
                    &client_token,
                    description.as_deref(),
                )
                .await?;

            if let Some(job) = job {
                println!(
                    "{}",
                    serde_json::json!({ "ingestionJobId": job.id, "status": job.status })
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_sync_args() {
        let cli = Cli::try_parse_from([
            "kbforge",
            "sync",
            "--knowledge-base-id",
            "KB1",
            "--data-source-id",
            "DS1",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Sync { ref knowledge_base_id, event: None, .. } if knowledge_base_id == "KB1"
        ));
    }
}
