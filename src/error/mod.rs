//! Ошибки настройки процесса: конфигурация и логирование.
//!
//! Ошибки шины и моста живут в крейте `dashbus-error`.

use std::{any::Any, io, path::PathBuf};

use dashbus_error::{ErrorExt, LogLevel, StatusCode};
use thiserror::Error;
use tracing::{event, Level};

pub type SettingsResult<T> = Result<T, SettingsError>;

/// Ошибка загрузки или проверки настроек.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("config file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Ошибка инициализации логирования.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter `{directive}`: {reason}")]
    Filter { directive: String, reason: String },

    #[error("unsupported log format `{0}`")]
    Format(String),

    #[error("failed to prepare log directory {}: {source}", path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("global subscriber already installed: {0}")]
    AlreadyInstalled(String),
}

impl ErrorExt for SettingsError {
    fn status_code(&self) -> StatusCode {
        match self {
            SettingsError::FileNotFound { .. } => StatusCode::ConfigMissing,
            SettingsError::Load(_) | SettingsError::Invalid { .. } => StatusCode::ConfigInvalid,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn log_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("error_type", "settings".to_string()),
            ("status_code", self.status_code().code().to_string()),
        ];
        match self {
            SettingsError::FileNotFound { path } => {
                fields.push(("path", path.display().to_string()))
            }
            SettingsError::Invalid { field, .. } => fields.push(("field", field.to_string())),
            SettingsError::Load(_) => {}
        }
        fields
    }
}

impl ErrorExt for LoggingError {
    fn status_code(&self) -> StatusCode {
        match self {
            LoggingError::Directory { .. } => StatusCode::Io,
            _ => StatusCode::LoggingInit,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Пишет ошибку в лог на уровне, рекомендованном её статус-кодом.
pub fn log_error<E>(
    err: &E,
    message: &str,
) where
    E: ErrorExt + ?Sized,
{
    let code = err.status_code();
    macro_rules! emit {
        ($level:expr) => {
            event!(
                $level,
                status_code = code.code(),
                error_type = %err.type_name(),
                error = %err,
                "{}",
                message
            )
        };
    }
    match code.log_level() {
        LogLevel::Trace => emit!(Level::TRACE),
        LogLevel::Debug => emit!(Level::DEBUG),
        LogLevel::Info => emit!(Level::INFO),
        LogLevel::Warn => emit!(Level::WARN),
        LogLevel::Error => emit!(Level::ERROR),
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use dashbus_error::{BridgeError, StackError};
    use tracing_subscriber::{fmt, prelude::*, registry::Registry};

    use super::*;

    struct VecMakeWriter(Arc<Mutex<Vec<u8>>>);

    impl<'a> fmt::MakeWriter<'a> for VecMakeWriter {
        type Writer = VecWriterGuard;

        fn make_writer(&'a self) -> Self::Writer {
            VecWriterGuard(self.0.clone())
        }
    }

    struct VecWriterGuard(Arc<Mutex<Vec<u8>>>);

    impl io::Write for VecWriterGuard {
        fn write(
            &mut self,
            buf: &[u8],
        ) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Тест проверяет, что уровень записи берётся из статус-кода ошибки.
    #[test]
    fn test_log_error_uses_status_level() {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let layer = fmt::layer()
            .with_ansi(false)
            .with_writer(VecMakeWriter(buffer.clone()));
        let subscriber = Registry::default().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            log_error(&BridgeError::NotConnected, "offline request");
            log_error(
                &BridgeError::ConnectionLost {
                    reason: "reset by peer".into(),
                },
                "link lost",
            );
            log_error(
                &BridgeError::ProtocolMismatch {
                    expected: "Load".into(),
                    actual: "List".into(),
                },
                "reply mismatch",
            );
        });

        let out = buffer.lock().unwrap();
        let lines: Vec<&str> = std::str::from_utf8(&out).unwrap().lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("DEBUG") && lines[0].contains("offline request"));
        assert!(lines[1].contains("WARN") && lines[1].contains("reset by peer"));
        assert!(lines[2].contains("ERROR") && lines[2].contains("status_code=8003"));
    }

    #[test]
    fn test_settings_error_codes() {
        let missing = SettingsError::FileNotFound {
            path: PathBuf::from("/etc/dashbus.toml"),
        };
        assert_eq!(missing.status_code(), StatusCode::ConfigMissing);
        assert!(missing
            .log_fields()
            .contains(&("path", "/etc/dashbus.toml".to_string())));

        let invalid = SettingsError::Invalid {
            field: "tick_ms",
            reason: "must be positive".into(),
        };
        assert_eq!(invalid.status_code(), StatusCode::ConfigInvalid);
        assert_eq!(
            invalid.to_string(),
            "invalid setting `tick_ms`: must be positive"
        );
    }

    #[test]
    fn test_logging_error_into_stack() {
        let err = LoggingError::Format("xml".into());
        let stack: StackError = err.into();
        assert_eq!(stack.status_code(), StatusCode::LoggingInit);
        assert!(stack.to_string().contains("xml"));
    }
}
