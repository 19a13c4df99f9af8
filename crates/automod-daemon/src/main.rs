//! # automod-daemon
//!
//! Line-oriented moderation daemon.
//!
//! Reads one JSON event per line on stdin, evaluates it against the loaded
//! policies, and writes every submitted effect as a JSON line on stdout.
//! Each event is evaluated on its own task, so a slow analyzer call or a
//! delayed action on one event does not hold up the others.
//!
//! ## Usage
//!
//! ```text
//! automod-daemon --config automod.toml --policies policies.yaml < events.jsonl
//! ```
//!
//! Input lines look like:
//! ```json
//! {"event_type": "message_create", "context": {"user_id": "u1", "message_id": "m1", "server_id": "s1", "content": "..."}}
//! ```

mod event;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;

use automod_audit::ServerAuditLogs;
use automod_engine::{
    AuditSink, Collaborators, ContentAnalyzer, EngineConfig, EscalationTracker,
    HttpContentAnalyzer, InMemoryDataAccess, Maintenance, NoAnalyzer, Orchestrator,
    QueueEffectChannel,
};
use automod_policy::{load_policies, PolicyStore};

use crate::event::InboundEvent;

/// Pending effect records buffered between the engine and stdout.
const EFFECT_QUEUE_CAPACITY: usize = 1024;

/// Moderation policy daemon.
#[derive(Parser)]
#[command(name = "automod-daemon", about = "Evaluate moderation policies over a stream of events")]
struct Cli {
    /// Engine configuration (TOML). Missing file means defaults.
    #[arg(long, default_value = "automod.toml")]
    config: PathBuf,

    /// Policy file (.yaml, .yml or .json).
    #[arg(long)]
    policies: Option<PathBuf>,

    /// Emit logs as JSON instead of plain text.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so they don't interfere with effects on stdout.
    let filter = EnvFilter::from_default_env()
        .add_directive("automod_engine=info".parse()?)
        .add_directive("automod_daemon=info".parse()?);
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false);
    if cli.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let config = EngineConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    let store = Arc::new(PolicyStore::new());
    if let Some(path) = &cli.policies {
        for policy in load_policies(path).with_context(|| format!("loading {}", path.display()))? {
            store.upsert(policy)?;
        }
    }
    tracing::info!(policies = store.len(), "policy store ready");

    let analyzer: Arc<dyn ContentAnalyzer> = match HttpContentAnalyzer::from_config(&config.analyzer)? {
        Some(http) => Arc::new(http),
        None => {
            tracing::warn!("no analyzer endpoint configured, ai.* fields will be unresolved");
            Arc::new(NoAnalyzer)
        }
    };

    let audit: Option<Arc<dyn AuditSink>> = match &config.audit.dir {
        Some(dir) => {
            tracing::info!(dir = %dir.display(), "audit logging enabled");
            let logs: Arc<dyn AuditSink> = Arc::new(ServerAuditLogs::new(dir)?);
            Some(logs)
        }
        None => None,
    };

    let data = Arc::new(InMemoryDataAccess::new());
    let (effects, mut effect_rx) = QueueEffectChannel::new(EFFECT_QUEUE_CAPACITY);
    let tracker = Arc::new(EscalationTracker::new(config.escalation.clone()));

    let orchestrator = Arc::new(Orchestrator::new(
        &config,
        Arc::clone(&store),
        Arc::clone(&tracker),
        Collaborators {
            analyzer,
            data: data.clone(),
            effects: Arc::new(effects),
            audit,
        },
    ));

    let maintenance = Maintenance::start(Arc::clone(&store), Arc::clone(&tracker), &config);

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(record) = effect_rx.recv().await {
            let mut line = match serde_json::to_string(&record) {
                Ok(line) => line,
                Err(e) => {
                    tracing::error!(error = %e, "failed to encode effect record");
                    continue;
                }
            };
            line.push('\n');
            if let Err(e) = stdout.write_all(line.as_bytes()).await {
                tracing::error!(error = %e, "stdout closed, dropping effects");
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    tracing::info!("reading events from stdin");

    let mut events = JoinSet::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let inbound = match InboundEvent::parse(&line) {
            Ok(inbound) => inbound,
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed event line");
                continue;
            }
        };
        event::observe(&data, &inbound);

        let orchestrator = Arc::clone(&orchestrator);
        let data = Arc::clone(&data);
        events.spawn(async move {
            let results = orchestrator
                .process_event(inbound.event_type, &inbound.context)
                .await;
            event::record_outcome(&data, &inbound.context, &results);
            tracing::info!(
                event = %inbound.event_type,
                user_id = %inbound.context.user_id,
                evaluated = results.len(),
                matched = results.iter().filter(|r| r.matched).count(),
                "event processed"
            );
        });
    }

    while let Some(joined) = events.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "event task failed");
        }
    }

    maintenance.shutdown();
    // Dropping the orchestrator closes the effect queue and lets the writer finish.
    drop(orchestrator);
    writer.await?;

    let stats = store.stats()?;
    tracing::info!(
        executions = stats.total_executions,
        success_rate = stats.success_rate,
        "input closed, shutting down"
    );
    Ok(())
}
