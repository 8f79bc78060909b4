use std::{path::Path, time::Duration};

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::{
    bridge::{BridgeOptions, DEFAULT_LINK_TOPIC},
    error::{SettingsError, SettingsResult},
    logging::LoggingConfig,
    topic::validate_topic,
};

/// Префикс переменных окружения (`DASHBUS_BROKER_URL`,
/// `DASHBUS_LOGGING__LEVEL`, ...).
pub const ENV_PREFIX: &str = "DASHBUS";

/// Настройки процесса.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Адрес брокера, `ws://` или `wss://`.
    pub broker_url: String,
    pub auto_connect: bool,
    pub retry_interval_ms: u64,
    pub connect_timeout_ms: u64,
    /// Разрешение планировщика таймеров.
    pub tick_ms: u64,
    /// Локальные топики, пересылаемые брокеру.
    pub forward_patterns: Vec<String>,
    /// Шаблоны, на которые мост подписывается у брокера при старте.
    pub subscribe_patterns: Vec<String>,
    /// Топик публикации времени работы; `None` отключает публикацию.
    pub uptime_topic: Option<String>,
    pub uptime_period_ms: u64,
    /// Топик, в который публикуются изменения состояния соединения;
    /// `None` отключает публикацию.
    pub link_topic: Option<String>,
    pub logging: LoggingConfig,
}

impl Settings {
    /// Загружает настройки: значения по умолчанию, затем файл (если указан),
    /// затем переменные окружения `DASHBUS_*`.
    pub fn load(path: Option<&Path>) -> SettingsResult<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(SettingsError::FileNotFound {
                    path: path.to_path_buf(),
                });
            }
            builder = builder.add_source(File::from(path));
        }

        let cfg = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("forward_patterns")
                    .with_list_parse_key("subscribe_patterns")
                    .with_list_parse_key("logging.directives")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = cfg.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> SettingsResult<()> {
        if !(self.broker_url.starts_with("ws://") || self.broker_url.starts_with("wss://")) {
            return Err(SettingsError::Invalid {
                field: "broker_url",
                reason: format!("expected ws:// or wss:// url, got `{}`", self.broker_url),
            });
        }
        let positive = [
            ("retry_interval_ms", self.retry_interval_ms),
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("tick_ms", self.tick_ms),
            ("uptime_period_ms", self.uptime_period_ms),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(SettingsError::Invalid {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        let topics = [
            ("uptime_topic", self.uptime_topic.as_deref()),
            ("link_topic", self.link_topic.as_deref()),
        ];
        for (field, topic) in topics {
            if let Some(topic) = topic {
                validate_topic(topic).map_err(|reason| SettingsError::Invalid { field, reason })?;
            }
        }
        Ok(())
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn uptime_period(&self) -> Duration {
        Duration::from_millis(self.uptime_period_ms)
    }

    /// Параметры моста из настроек.
    pub fn bridge_options(&self) -> BridgeOptions {
        BridgeOptions {
            auto_connect: self.auto_connect,
            retry_interval: Duration::from_millis(self.retry_interval_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            forward_patterns: self.forward_patterns.clone(),
            link_topic: self.link_topic.clone(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            broker_url: "ws://127.0.0.1:8080/ws".to_string(),
            auto_connect: true,
            retry_interval_ms: 3000,
            connect_timeout_ms: 5000,
            tick_ms: 1000,
            forward_patterns: vec!["dst/**".to_string()],
            subscribe_patterns: vec!["src/**".to_string()],
            uptime_topic: Some("src/dashboard/sys.uptime".to_string()),
            uptime_period_ms: 1000,
            link_topic: Some(DEFAULT_LINK_TOPIC.to_string()),
            logging: LoggingConfig::default(),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
