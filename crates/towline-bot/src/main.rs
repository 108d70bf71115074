//! Towline — Chatwoot support bot.
//!
//! Wires config, the platform client, the completion backend, and the
//! dispatcher together, then serves the webhook endpoint.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use towline_core::config::BotConfig;
use towline_core::session::{InMemorySessionStore, SessionStore};
use towline_hub::api::{ApiState, start_server};
use towline_hub::chatwoot::ChatwootClient;
use towline_hub::dispatcher::Dispatcher;
use towline_hub::gateway::CompletionGateway;
use towline_hub::metrics::new_metrics;
use towline_hub::providers::OpenAiBackend;
use towline_hub::retrieval::KnowledgeBase;

/// Towline — Chatwoot support bot 🪝
#[derive(Parser)]
#[command(name = "towline", version, about, long_about = None)]
struct Cli {
    /// Config file path (TOML). Environment variables overlay it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind host for the webhook server.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(BotConfig::default_path);
    let mut config = BotConfig::load(&config_path).context("loading config")?;
    config.apply_env().context("applying environment overrides")?;
    config.validate().context("validating config")?;

    info!("🚀 Towline starting on port {}", config.port);

    let store: Arc<dyn SessionStore> = match config.state_provider.as_str() {
        "memory" => Arc::new(InMemorySessionStore::new()),
        other => bail!("unknown state provider: {}", other),
    };

    let platform = Arc::new(ChatwootClient::new(
        &config.chatwoot,
        config.operator_assignee_id,
    ));

    let backend = Arc::new(OpenAiBackend::new(config.completion.clone()));
    let gateway = Arc::new(CompletionGateway::new(
        backend,
        Duration::from_secs(config.completion_timeout_secs),
    ));

    let metrics = new_metrics();
    let mut dispatcher = Dispatcher::new(
        store,
        platform,
        gateway,
        metrics.clone(),
        Duration::from_secs(config.operator_fallback_secs),
    );

    if let Some(dir) = &config.knowledge_dir {
        let knowledge = KnowledgeBase::load(dir)
            .with_context(|| format!("loading knowledge base from {}", dir.display()))?;
        info!("📚 Retrieval mode enabled ({} snippets)", knowledge.len());
        dispatcher = dispatcher.with_knowledge(Arc::new(knowledge));
    } else {
        info!("💬 Plain completion mode (no knowledge base configured)");
    }

    start_server(
        ApiState {
            dispatcher,
            metrics,
        },
        &cli.host,
        config.port,
    )
    .await
}
