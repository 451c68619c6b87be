use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::BotError;

/// Immutable runtime configuration. Built once at startup and passed by
/// reference (or `Arc`) to every component; nothing mutates it afterwards.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub stake: StakeConfig,
    pub delays: DelaysConfig,
    #[serde(rename = "loop")]
    pub loop_cfg: LoopConfig,
    pub retry: RetryConfig,
    pub chain: ChainConfig,
    pub state: StateConfig,
    pub files: FilesConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct StakeConfig {
    /// Keep this amount liquid, stake the rest.
    pub reserve_balance: f64,
    pub auto_compound: bool,
    pub tier_id: u32,
}

impl Default for StakeConfig {
    fn default() -> Self {
        Self {
            reserve_balance: 0.5,
            auto_compound: true,
            tier_id: 0,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct DelaysConfig {
    pub between_accounts_ms: u64,
    pub between_tasks_ms: u64,
    pub between_operations_ms: u64,
}

impl Default for DelaysConfig {
    fn default() -> Self {
        Self {
            between_accounts_ms: 15_000,
            between_tasks_ms: 5_000,
            between_operations_ms: 3_000,
        }
    }
}

impl DelaysConfig {
    pub fn between_accounts(&self) -> Duration {
        Duration::from_millis(self.between_accounts_ms)
    }
    pub fn between_tasks(&self) -> Duration {
        Duration::from_millis(self.between_tasks_ms)
    }
    pub fn between_operations(&self) -> Duration {
        Duration::from_millis(self.between_operations_ms)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LoopMode {
    /// Wait the configured duration after each completed pass.
    Interval,
    /// Run at the configured UTC time of day.
    Daily,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LoopConfig {
    pub enabled: bool,
    /// Cadence as "HH:MM:SS". Interpreted per `mode`.
    pub every: String,
    pub mode: LoopMode,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            every: "24:00:00".to_string(),
            mode: LoopMode::Interval,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    /// Total time budget for one account's retries.
    pub max_total_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 2_000,
            max_total_ms: 60_000,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub request_timeout_ms: u64,
    /// Suppress per-request RPC diagnostics from the chain client.
    pub quiet_rpc: bool,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8899".to_string(),
            request_timeout_ms: 10_000,
            quiet_rpc: false,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CorruptPolicy {
    /// Abort and let the operator decide.
    Fail,
    /// Reinitialize to an empty mapping (data loss is acceptable).
    Reinit,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct StateConfig {
    pub on_corrupt: CorruptPolicy,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            on_corrupt: CorruptPolicy::Fail,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct FilesConfig {
    pub credentials: String,
    pub proxies: String,
    pub state: String,
    pub log: String,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            credentials: "pk.txt".to_string(),
            proxies: "proxies.txt".to_string(),
            state: "data/data.json".to_string(),
            log: "logs/process.log".to_string(),
        }
    }
}

impl Config {
    /// Strict load for the run path: a missing or invalid file is fatal.
    pub fn load(path: &str) -> Result<Self, BotError> {
        if !std::path::Path::new(path).exists() {
            return Err(BotError::Config(format!(
                "config file not found at '{}'; run `stakepilot check-config` to create one",
                path
            )));
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| BotError::Config(format!("cannot read '{}': {}", path, e)))?;
        let config = Self::from_toml(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Best-effort load for maintenance commands, which only need file paths.
    pub fn load_or_default(path: &str) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml(&text).unwrap_or_else(|e| {
                eprintln!("Warning: {}. Using defaults.", e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn from_toml(text: &str) -> Result<Self, BotError> {
        toml::from_str(text).map_err(|e| BotError::Config(format!("invalid config: {}", e)))
    }

    pub fn validate(&self) -> Result<(), BotError> {
        if !self.stake.reserve_balance.is_finite() || self.stake.reserve_balance < 0.0 {
            return Err(BotError::Config(format!(
                "stake.reserve_balance must be a non-negative number, got {}",
                self.stake.reserve_balance
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(BotError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.chain.rpc_url.is_empty() {
            return Err(BotError::Config("chain.rpc_url is not set".to_string()));
        }
        if self.loop_cfg.enabled {
            let every = parse_clock(&self.loop_cfg.every)?;
            match self.loop_cfg.mode {
                // "00:00:00" is a valid daily trigger (midnight UTC) but a
                // meaningless interval
                LoopMode::Interval if every.is_zero() => {
                    return Err(BotError::Config(format!(
                        "loop.every '{}' must be greater than zero in interval mode",
                        self.loop_cfg.every
                    )));
                }
                LoopMode::Daily if every.as_secs() >= 86_400 => {
                    return Err(BotError::Config(format!(
                        "loop.every '{}' is not a valid time of day for daily mode",
                        self.loop_cfg.every
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Parse a clock-style "HH:MM:SS" string into a duration.
pub fn parse_clock(s: &str) -> Result<Duration, BotError> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 3 {
        return Err(BotError::Config(format!(
            "invalid cadence '{}', expected HH:MM:SS",
            s
        )));
    }
    let mut fields = [0u64; 3];
    for (i, part) in parts.iter().enumerate() {
        fields[i] = part
            .parse()
            .map_err(|_| BotError::Config(format!("invalid cadence '{}': bad field '{}'", s, part)))?;
    }
    let (h, m, sec) = (fields[0], fields[1], fields[2]);
    if m >= 60 || sec >= 60 {
        return Err(BotError::Config(format!(
            "invalid cadence '{}': minutes and seconds must be below 60",
            s
        )));
    }
    Ok(Duration::from_secs(h * 3600 + m * 60 + sec))
}
