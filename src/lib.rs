pub mod clock;
pub mod config;
pub mod engine;
pub mod event;
pub mod history;
pub mod parser;
pub mod reaper;
pub mod session;
pub mod sink;
pub mod tailer;
pub mod xp;

pub use clock::{Clock, SystemClock};
pub use engine::CorrelationEngine;
pub use event::{DeathEvent, Location};
pub use reaper::SessionReaper;
pub use session::{FarmingSession, SessionKey, SessionStore};
pub use sink::{Channel, NotificationSink, SinkError};

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Kill-feed relay with farming detection.
#[derive(Debug, Parser)]
#[command(name = "coop-killfeed", version, about)]
pub struct Cli {
    /// Directory holding coop-killfeed.toml (created on first run).
    #[arg(long, default_value = "config")]
    pub config_dir: PathBuf,

    /// JSON-lines kill feed to tail; overrides `feed_path` from config.
    #[arg(long)]
    pub feed: Option<PathBuf>,

    /// Directory for rolling log files.
    #[arg(long, default_value = "logs")]
    pub log_dir: PathBuf,
}

pub async fn run(cli: Cli) -> Result<()> {
    // -----------------------------------------------------------------------
    // Logging — daily rolling file. Keep the guard alive until exit so the
    // non-blocking writer flushes.
    // -----------------------------------------------------------------------
    std::fs::create_dir_all(&cli.log_dir)?;
    let file_appender = tracing_appender::rolling::daily(&cli.log_dir, "killfeed.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("coop_killfeed_lib=debug".parse()?),
        )
        .with_writer(non_blocking)
        .with_ansi(false)
        .init();

    // -----------------------------------------------------------------------
    // Panic hook — log panics through tracing before the process dies.
    // -----------------------------------------------------------------------
    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown location".to_string());
        let message = if let Some(s) = info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        tracing::error!("PANIC at {}: {}", location, message);
    }));

    tracing::info!("coop-killfeed starting — logs → {}", cli.log_dir.display());

    // --- Load config (write defaults on first run) ---
    let cfg = config::load_or_default(&cli.config_dir)?;
    if !config::config_path(&cli.config_dir).exists() {
        config::save(&cfg, &cli.config_dir)?;
    }

    let feed_path = cli.feed.clone().unwrap_or_else(|| cfg.feed_path.clone());
    if feed_path.as_os_str().is_empty() {
        anyhow::bail!(
            "No kill feed configured — set feed_path in {:?} or pass --feed",
            config::config_path(&cli.config_dir)
        );
    }

    // --- Engine + collaborators ---
    let sink: Arc<dyn NotificationSink> = if cfg.has_webhook() {
        Arc::new(sink::WebhookSink::spawn(
            cfg.discord.general_webhook_url.clone(),
            cfg.discord.mob_webhook_url.clone(),
            cfg.discord.queue_len,
        ))
    } else {
        tracing::warn!("No webhook configured — notifications go to the log only");
        Arc::new(sink::LogSink)
    };
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let xp = xp::XpTable::with_overrides(&cfg.xp);

    let engine = Arc::new(CorrelationEngine::new(
        sink,
        Arc::clone(&clock),
        xp,
        cfg.farming.clone(),
        cfg.messages.clone(),
    ));
    let reaper = SessionReaper::new(Arc::clone(&engine), cfg.farming.sweep_interval()).spawn();

    // --- Pipeline: tailer -> parser -> engine ---
    let (raw_tx, raw_rx)     = mpsc::channel::<String>(2048);
    let (event_tx, event_rx) = mpsc::channel::<DeathEvent>(1024);

    let feed_task = tokio::task::spawn_blocking(move || tailer::run(feed_path, raw_tx));
    tokio::spawn(parser::run(raw_rx, event_tx, clock));

    let result = tokio::select! {
        r = engine::run(Arc::clone(&engine), event_rx) => r,
        r = feed_task => match r {
            Ok(inner) => inner,
            Err(e) => Err(anyhow::anyhow!("Tailer task failed: {}", e)),
        },
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown requested");
            Ok(())
        }
    };

    reaper.abort();
    tracing::info!(
        "coop-killfeed stopped ({} session(s) still open)",
        engine.active_sessions()
    );
    result
}
