use std::{env, fmt, fs, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::error::LoggingError;

/// Переменная окружения, переопределяющая уровень логирования.
pub const ENV_LOG_LEVEL: &str = "DASHBUS_LOG_LEVEL";
/// Переменная окружения, переопределяющая формат вывода.
pub const ENV_LOG_FORMAT: &str = "DASHBUS_LOG_FORMAT";

const LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

/// Формат строк лога.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
    #[default]
    Compact,
}

/// Настройки логирования процесса.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Базовый уровень: trace, debug, info, warn, error или off.
    pub level: String,
    /// Формат по умолчанию для всех приёмников.
    pub format: LogFormat,
    /// Каталог файлов лога.
    pub log_dir: PathBuf,
    /// Дополнительные директивы фильтра, например `dashbus::bridge=trace`.
    pub directives: Vec<String>,
    pub console: ConsoleConfig,
    pub file: FileConfig,
}

/// Вывод в консоль (stderr).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,
    /// Формат консоли; если не задан, берётся общий.
    pub format: Option<LogFormat>,
    pub with_ansi: bool,
    pub with_target: bool,
    pub with_thread_ids: bool,
    pub with_line_numbers: bool,
}

/// Ежедневно ротируемый файл.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub enabled: bool,
    pub filename: String,
    pub format: LogFormat,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            LogFormat::Json => "json",
            LogFormat::Pretty => "pretty",
            LogFormat::Compact => "compact",
        }
    }
}

impl LoggingConfig {
    /// Применяет `DASHBUS_LOG_LEVEL` и `DASHBUS_LOG_FORMAT`.
    pub fn apply_env_overrides(&mut self) -> Result<(), LoggingError> {
        if let Ok(level) = env::var(ENV_LOG_LEVEL) {
            if !level.trim().is_empty() {
                self.level = level.trim().to_lowercase();
            }
        }
        if let Ok(format) = env::var(ENV_LOG_FORMAT) {
            if !format.trim().is_empty() {
                self.format = format.parse()?;
            }
        }
        Ok(())
    }

    /// Проверяет уровень и директивы фильтра.
    pub fn validate(&self) -> Result<(), LoggingError> {
        if !LEVELS.contains(&self.level.as_str()) {
            return Err(LoggingError::Filter {
                directive: self.level.clone(),
                reason: format!("level must be one of {}", LEVELS.join(", ")),
            });
        }
        let directive = self.build_filter_directive();
        EnvFilter::try_new(&directive).map_err(|e| LoggingError::Filter {
            directive,
            reason: e.to_string(),
        })?;
        Ok(())
    }

    /// Создаёт каталог логов, если включён файловый приёмник.
    pub fn ensure_log_dir(&self) -> Result<(), LoggingError> {
        if !self.file.enabled {
            return Ok(());
        }
        fs::create_dir_all(&self.log_dir).map_err(|source| LoggingError::Directory {
            path: self.log_dir.clone(),
            source,
        })
    }

    /// Строка для `EnvFilter`: базовый уровень и дополнительные директивы.
    pub fn build_filter_directive(&self) -> String {
        std::iter::once(self.level.as_str())
            .chain(self.directives.iter().map(String::as_str))
            .filter(|d| !d.is_empty())
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn console_format(&self) -> LogFormat {
        self.console.format.unwrap_or(self.format)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            log_dir: PathBuf::from("logs"),
            directives: Vec::new(),
            console: ConsoleConfig::default(),
            file: FileConfig::default(),
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: None,
            with_ansi: true,
            with_target: true,
            with_thread_ids: false,
            with_line_numbers: false,
        }
    }
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            filename: "dashbus.log".to_string(),
            format: LogFormat::Json,
        }
    }
}

impl FromStr for LogFormat {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            other => Err(LoggingError::Format(other.to_string())),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = LoggingConfig::default();
        assert_eq!(cfg.level, "info");
        assert_eq!(cfg.console_format(), LogFormat::Compact);
        assert!(cfg.console.enabled);
        assert!(!cfg.file.enabled);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_filter_directive_joins_extras() {
        let cfg = LoggingConfig {
            level: "warn".into(),
            directives: vec!["dashbus::bridge=trace".into(), "".into()],
            ..Default::default()
        };
        assert_eq!(cfg.build_filter_directive(), "warn,dashbus::bridge=trace");
    }

    #[test]
    fn test_validate_rejects_unknown_level() {
        let cfg = LoggingConfig {
            level: "loud".into(),
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(LoggingError::Filter { .. })));
    }

    #[test]
    fn test_console_format_override() {
        let mut cfg = LoggingConfig {
            format: LogFormat::Json,
            ..Default::default()
        };
        assert_eq!(cfg.console_format(), LogFormat::Json);
        cfg.console.format = Some(LogFormat::Pretty);
        assert_eq!(cfg.console_format(), LogFormat::Pretty);
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!(" pretty ".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!(matches!(
            "xml".parse::<LogFormat>(),
            Err(LoggingError::Format(_))
        ));
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        env::set_var(ENV_LOG_LEVEL, "DEBUG");
        env::set_var(ENV_LOG_FORMAT, "json");

        let mut cfg = LoggingConfig::default();
        cfg.apply_env_overrides().unwrap();
        assert_eq!(cfg.level, "debug");
        assert_eq!(cfg.format, LogFormat::Json);

        env::set_var(ENV_LOG_FORMAT, "yaml");
        assert!(cfg.apply_env_overrides().is_err());

        env::remove_var(ENV_LOG_LEVEL);
        env::remove_var(ENV_LOG_FORMAT);
    }

    #[test]
    fn test_ensure_log_dir_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested").join("logs");
        let cfg = LoggingConfig {
            log_dir: dir.clone(),
            file: FileConfig {
                enabled: true,
                ..Default::default()
            },
            ..Default::default()
        };
        cfg.ensure_log_dir().unwrap();
        assert!(dir.is_dir());
    }
}
