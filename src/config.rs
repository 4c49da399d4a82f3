// Engine configuration, loaded from TOML. Every field has a default so an
// empty file is a valid configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    analytics::MAX_WINDOW_DAYS,
    circuit_breaker::BreakerConfig,
    error::ConfigError,
    model::{OperatingWindow, TimeOfDay},
    retry::RetryConfig,
    slots::SlotGenerator,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub slot_duration_minutes: u16,
    // Applied by the fleet loader to entries that omit their own hours
    pub default_open: TimeOfDay,
    pub default_close: TimeOfDay,
    pub price_per_booking: f64,
    pub utilization_window_days: u32,
    pub revenue_window_days: u32,
    pub popular_slots_window_days: u32,
    pub user_activity_limit: usize,
    pub retry: RetryConfig,
    pub breaker: BreakerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let window = OperatingWindow::default();
        Self {
            slot_duration_minutes: 120,
            default_open: window.open,
            default_close: window.close,
            price_per_booking: 50.0,
            utilization_window_days: 30,
            revenue_window_days: 7,
            popular_slots_window_days: 30,
            user_activity_limit: 10,
            retry: RetryConfig::default(),
            breaker: BreakerConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn default_window(&self) -> OperatingWindow {
        OperatingWindow::new(self.default_open, self.default_close)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        // same checks the slot generator applies per car
        SlotGenerator::new(self.default_window(), self.slot_duration_minutes)?;

        if !self.price_per_booking.is_finite() || self.price_per_booking < 0.0 {
            return Err(ConfigError::InvalidSetting {
                name: "price_per_booking",
                message: format!("{} is not a valid price", self.price_per_booking),
            });
        }
        for (name, days) in [
            ("utilization_window_days", self.utilization_window_days),
            ("revenue_window_days", self.revenue_window_days),
            ("popular_slots_window_days", self.popular_slots_window_days),
        ] {
            if days > MAX_WINDOW_DAYS {
                return Err(ConfigError::InvalidSetting {
                    name,
                    message: format!("at most {MAX_WINDOW_DAYS} days"),
                });
            }
        }
        if self.retry.backoff_multiplier.is_nan() || self.retry.backoff_multiplier < 1.0 {
            return Err(ConfigError::InvalidSetting {
                name: "retry.backoff_multiplier",
                message: "must be at least 1.0".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_factor) {
            return Err(ConfigError::InvalidSetting {
                name: "retry.jitter_factor",
                message: "must be between 0.0 and 1.0".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config.slot_duration_minutes, 120);
        assert_eq!(config.default_open.to_string(), "08:00");
        assert_eq!(config.default_close.to_string(), "18:00");
        assert_eq!(config.price_per_booking, 50.0);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.breaker.failure_threshold, 5);
    }

    #[test]
    fn test_overrides() {
        let config = EngineConfig::from_toml_str(
            r#"
            slot_duration_minutes = 60
            default_open = "09:00"
            default_close = "17:00"
            price_per_booking = 35.5

            [retry]
            max_retries = 5

            [breaker]
            reset_timeout_ms = 100
            "#,
        )
        .unwrap();
        assert_eq!(config.slot_duration_minutes, 60);
        assert_eq!(config.default_window().length_minutes(), 480);
        assert_eq!(config.price_per_booking, 35.5);
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.initial_backoff_ms, 50);
        assert_eq!(config.breaker.reset_timeout_ms, 100);
        assert_eq!(config.breaker.failure_threshold, 5);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        assert!(matches!(
            EngineConfig::from_toml_str("slot_duration_minutes = 0"),
            Err(ConfigError::ZeroSlotDuration)
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("default_open = \"18:00\"\ndefault_close = \"08:00\""),
            Err(ConfigError::EmptyWindow { .. })
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("price_per_booking = -5.0"),
            Err(ConfigError::InvalidSetting { name: "price_per_booking", .. })
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("revenue_window_days = 100000"),
            Err(ConfigError::InvalidSetting { name: "revenue_window_days", .. })
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("default_open = \"8am\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        std::fs::write(&path, "revenue_window_days = 14\n").unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap().revenue_window_days, 14);

        assert!(matches!(
            EngineConfig::load(dir.path().join("missing.toml")),
            Err(ConfigError::Io(_))
        ));
    }
}
