/// Application configuration — persisted as TOML in the config directory
/// (default `./config/coop-killfeed.toml`).
///
/// First run writes the defaults back out so operators have a file to edit.
/// Webhook URLs left empty fall back to a log-only sink.
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "coop-killfeed.toml";

/// Inactivity after which a farming session stops suppressing and is evicted.
/// Activity checks and eviction both read this one value.
pub const FARMING_IDLE_TIMEOUT_SECS: u64 = 60;

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DiscordConfig {
    /// Webhook for the general channel (chat relay, joins/leaves).
    pub general_webhook_url: String,
    /// Webhook for the mob/kill feed; empty = use the general webhook.
    pub mob_webhook_url:     String,
    /// Messages buffered for the webhook writer before sends start failing.
    pub queue_len:           usize,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            general_webhook_url: String::new(),
            mob_webhook_url:     String::new(),
            queue_len:           256,
        }
    }
}

/// Farming detection thresholds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Thresholds {
    /// Kills in one session before the farming notice fires.
    pub notify_after_kills:  u32,
    pub idle_timeout_secs:   u64,
    pub sweep_interval_secs: u64,
    /// Look-back window of the history-only burst check.
    pub burst_window_secs:   u64,
    pub burst_kills:         usize,
    /// Run a session cleanup every this many processed deaths (0 = never).
    pub cleanup_every:       u64,
    /// Newest deaths kept in the history log.
    pub history_capacity:    usize,
}

impl Thresholds {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    /// Matches `is_farming` must reach; never below 1.
    pub fn burst_threshold(&self) -> usize {
        self.burst_kills.max(1)
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            notify_after_kills:  10,
            idle_timeout_secs:   FARMING_IDLE_TIMEOUT_SECS,
            sweep_interval_secs: 5,
            burst_window_secs:   30,
            burst_kills:         10,
            cleanup_every:       1_000,
            history_capacity:    100_000,
        }
    }
}

/// Chat templates. Placeholders: `{killer}`, `{victim}`, `{message}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MessageTemplates {
    pub death_format:            String,
    pub farming_started_format:  String,
    pub farming_complete_header: String,
}

impl Default for MessageTemplates {
    fn default() -> Self {
        Self {
            death_format:            "💀 {message}".to_owned(),
            farming_started_format:  "It seems {killer} is farming {victim}s".to_owned(),
            farming_complete_header: "**Farming Complete**".to_owned(),
        }
    }
}

impl MessageTemplates {
    pub fn death(&self, message: &str) -> String {
        self.death_format.replace("{message}", message)
    }

    pub fn farming_started(&self, killer: &str, victim: &str) -> String {
        self.farming_started_format
            .replace("{killer}", killer)
            .replace("{victim}", victim)
    }

    pub fn farming_complete(&self, summary: &str) -> String {
        format!("{}\n{}", self.farming_complete_header, summary)
    }
}

// ---------------------------------------------------------------------------
// AppConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    /// JSON-lines kill feed written by the game server.
    #[serde(default)]
    pub feed_path: PathBuf,

    #[serde(default)]
    pub discord:   DiscordConfig,

    #[serde(default)]
    pub farming:   Thresholds,

    #[serde(default)]
    pub messages:  MessageTemplates,

    /// Per-kind XP overrides merged over the built-in table.
    #[serde(default)]
    pub xp:        HashMap<String, u32>,
}

impl AppConfig {
    pub fn has_webhook(&self) -> bool {
        !self.discord.general_webhook_url.is_empty() || !self.discord.mob_webhook_url.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

pub fn config_path(config_dir: &Path) -> PathBuf {
    config_dir.join(CONFIG_FILE)
}

pub fn load_or_default(config_dir: &Path) -> Result<AppConfig> {
    let path = config_path(config_dir);
    if path.exists() {
        let raw = std::fs::read_to_string(&path)?;
        let cfg: AppConfig = toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("Config parse error: {}", e))?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(cfg)
    } else {
        tracing::info!("Config file not found at {:?}, using defaults", path);
        Ok(AppConfig::default())
    }
}

pub fn save(config: &AppConfig, config_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(config_dir)?;
    let raw = toml::to_string_pretty(config)
        .map_err(|e| anyhow::anyhow!("Config serialize error: {}", e))?;
    std::fs::write(config_path(config_dir), raw)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trips_config() {
        let dir = tempdir().unwrap();
        let mut cfg = AppConfig::default();
        cfg.feed_path = PathBuf::from("/srv/mc/killfeed.jsonl");
        cfg.discord.mob_webhook_url = "https://example.invalid/hook".to_owned();
        cfg.farming.notify_after_kills = 25;
        cfg.xp.insert("slime".to_owned(), 4);

        save(&cfg, dir.path()).unwrap();

        let loaded = load_or_default(dir.path()).unwrap();
        assert_eq!(loaded, cfg);
        assert!(loaded.has_webhook());
    }

    #[test]
    fn returns_default_when_missing() {
        let dir = tempdir().unwrap();
        let cfg = load_or_default(dir.path()).unwrap();
        assert_eq!(cfg.farming.notify_after_kills, 10);
        assert_eq!(cfg.farming.idle_timeout_secs, 60);
        assert_eq!(cfg.farming.cleanup_every, 1_000);
        assert!(cfg.feed_path.as_os_str().is_empty());
        assert!(!cfg.has_webhook());
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let dir = tempdir().unwrap();
        std::fs::write(
            config_path(dir.path()),
            "[farming]\nidle_timeout_secs = 90\n\n[messages]\ndeath_format = \"RIP {message}\"\n",
        )
        .unwrap();

        let cfg = load_or_default(dir.path()).unwrap();
        assert_eq!(cfg.farming.idle_timeout_secs, 90);
        assert_eq!(cfg.farming.burst_window_secs, 30);
        assert_eq!(cfg.messages.death("Bob fell"), "RIP Bob fell");
        assert_eq!(cfg.messages.farming_complete_header, "**Farming Complete**");
    }

    #[test]
    fn rejects_malformed_toml() {
        let dir = tempdir().unwrap();
        std::fs::write(config_path(dir.path()), "farming = [").unwrap();
        assert!(load_or_default(dir.path()).is_err());
    }

    #[test]
    fn templates_fill_placeholders() {
        let t = MessageTemplates::default();
        assert_eq!(t.farming_started("Alex", "Zombie"), "It seems Alex is farming Zombies");
        assert_eq!(t.farming_complete("body"), "**Farming Complete**\nbody");
        assert_eq!(t.death("Zombie was slain by Alex"), "💀 Zombie was slain by Alex");
    }

    #[test]
    fn sweep_interval_never_zero() {
        let mut t = Thresholds::default();
        t.sweep_interval_secs = 0;
        assert_eq!(t.sweep_interval(), Duration::from_secs(1));
    }

    #[test]
    fn burst_threshold_never_zero() {
        let mut t = Thresholds::default();
        assert_eq!(t.burst_threshold(), 10);
        t.burst_kills = 0;
        assert_eq!(t.burst_threshold(), 1);
    }
}
