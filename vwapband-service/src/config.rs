//! Service configuration, loaded from a TOML file.
//!
//! Every field has a default so a minimal config only needs the symbol list
//! and, when Telegram delivery is wanted, the bot credentials.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vwapband_core::SymbolConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config invalid: {0}")]
    Invalid(String),
}

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Symbols to track, e.g. `["ETHUSDT", "BTCUSDT"]`.
    pub symbols: Vec<String>,

    /// Kline interval understood by the exchange, e.g. "1m".
    pub interval: String,

    /// Engine parameters, shared by every symbol.
    pub engine: SymbolConfig,

    pub telegram: TelegramConfig,
    pub feed: FeedConfig,
    pub notify: NotifyConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            symbols: Vec::new(),
            interval: "1m".to_string(),
            engine: SymbolConfig::default(),
            telegram: TelegramConfig::default(),
            feed: FeedConfig::default(),
            notify: NotifyConfig::default(),
        }
    }
}

/// Telegram bot credentials. With `enabled = false` (or an empty token) the
/// service runs headless and signals go to the log sink instead.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TelegramConfig {
    pub token: String,
    pub chat_id: String,
    pub enabled: bool,
}

impl TelegramConfig {
    pub fn is_usable(&self) -> bool {
        self.enabled && !self.token.is_empty() && !self.chat_id.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FeedConfig {
    /// Seconds between feed polls.
    pub poll_interval_secs: u64,

    /// Seconds between catch-up sweeps.
    pub catchup_interval_secs: u64,

    /// Lag beyond which a symbol is considered behind and catch-up fetches.
    pub catchup_lag_secs: i64,

    /// Bars fetched per catch-up request.
    pub catchup_page: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 300,
            catchup_interval_secs: 60,
            catchup_lag_secs: 70,
            catchup_page: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NotifyConfig {
    /// Debounce window: signals arriving within this many milliseconds of
    /// the first one are delivered as a single batched message.
    pub batch_window_ms: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self { batch_window_ms: 2000 }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbols.is_empty() {
            return Err(ConfigError::Invalid("symbols list is empty".into()));
        }
        for symbol in &self.symbols {
            if symbol.trim().is_empty() {
                return Err(ConfigError::Invalid("blank symbol in symbols list".into()));
            }
        }
        if self.engine.band_multiplier <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "band_multiplier must be positive, got {}",
                self.engine.band_multiplier
            )));
        }
        if self.engine.stoploss_percent <= 0.0 || self.engine.stoploss_percent >= 100.0 {
            return Err(ConfigError::Invalid(format!(
                "stoploss_percent must be in (0, 100), got {}",
                self.engine.stoploss_percent
            )));
        }
        if self.engine.session_delay_min < 0 {
            return Err(ConfigError::Invalid(format!(
                "session_delay_min must not be negative, got {}",
                self.engine.session_delay_min
            )));
        }
        if self.engine.cooldown_min < 0 {
            return Err(ConfigError::Invalid(format!(
                "cooldown_min must not be negative, got {}",
                self.engine.cooldown_min
            )));
        }
        if self.engine.retention_bars == 0 {
            return Err(ConfigError::Invalid("retention_bars must be at least 1".into()));
        }
        if self.telegram.enabled && !self.telegram.is_usable() {
            return Err(ConfigError::Invalid(
                "telegram enabled but token or chat_id missing".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vwapband_core::CalcMode;

    #[test]
    fn minimal_config_fills_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            symbols = ["ETHUSDT"]
            "#,
        )
        .unwrap();
        config.validate().unwrap();

        assert_eq!(config.interval, "1m");
        assert_eq!(config.engine.band_multiplier, 3.1);
        assert_eq!(config.engine.calc_mode, CalcMode::StandardDeviation);
        assert_eq!(config.engine.session_delay_min, 30);
        assert_eq!(config.engine.cooldown_min, 30);
        assert_eq!(config.engine.stoploss_percent, 3.0);
        assert_eq!(config.engine.retention_bars, 1440);
        assert_eq!(config.feed.poll_interval_secs, 300);
        assert_eq!(config.feed.catchup_lag_secs, 70);
        assert_eq!(config.notify.batch_window_ms, 2000);
        assert!(!config.telegram.enabled);
    }

    #[test]
    fn full_config_round_trips() {
        let config: AppConfig = toml::from_str(
            r#"
            symbols = ["ETHUSDT", "BTCUSDT"]
            interval = "1m"

            [engine]
            band_multiplier = 2.5
            calc_mode = "percent-of-vwap"
            session_delay_min = 15
            cooldown_min = 45
            stoploss_percent = 2.0
            retention_bars = 720

            [telegram]
            token = "123:abc"
            chat_id = "-100200300"
            enabled = true

            [feed]
            poll_interval_secs = 60

            [notify]
            batch_window_ms = 500
            "#,
        )
        .unwrap();
        config.validate().unwrap();

        assert_eq!(config.symbols.len(), 2);
        assert_eq!(config.engine.calc_mode, CalcMode::PercentOfVwap);
        assert_eq!(config.engine.cooldown_min, 45);
        assert_eq!(config.feed.poll_interval_secs, 60);
        assert!(config.telegram.is_usable());

        let rendered = toml::to_string(&config).unwrap();
        let reparsed: AppConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(reparsed, config);
    }

    #[test]
    fn rejects_empty_symbols_and_bad_bounds() {
        let config: AppConfig = toml::from_str("symbols = []").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config: AppConfig = toml::from_str(
            r#"
            symbols = ["ETHUSDT"]
            [engine]
            stoploss_percent = 0.0
            "#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_negative_durations() {
        // A negative cooldown would make every cooldown gate pass.
        let config: AppConfig = toml::from_str(
            r#"
            symbols = ["ETHUSDT"]
            [engine]
            cooldown_min = -5
            "#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config: AppConfig = toml::from_str(
            r#"
            symbols = ["ETHUSDT"]
            [engine]
            session_delay_min = -1
            "#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn enabled_telegram_requires_credentials() {
        let config: AppConfig = toml::from_str(
            r#"
            symbols = ["ETHUSDT"]
            [telegram]
            enabled = true
            "#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
