//! Настройка `tracing`: фильтр, консольный и файловый приёмники.

pub mod config;
mod filters;
mod formatter;
pub mod handle;
pub mod sinks;

pub use config::{ConsoleConfig, FileConfig, LogFormat, LoggingConfig};
pub use handle::LoggingHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::LoggingError;

/// Устанавливает глобальный subscriber по конфигурации.
///
/// Переменные `DASHBUS_LOG_LEVEL`/`DASHBUS_LOG_FORMAT` переопределяют
/// конфигурацию, `RUST_LOG` переопределяет фильтр целиком. Возвращённый
/// handle нужно держать до конца работы процесса.
pub fn init_logging(mut config: LoggingConfig) -> Result<LoggingHandle, LoggingError> {
    config.apply_env_overrides()?;
    config.validate()?;
    config.ensure_log_dir()?;

    let env_filter = filters::build_filter_from_config(&config)?;

    let mut layers = Vec::new();
    if config.console.enabled {
        layers.push(sinks::console::layer_with_config(&config));
    }
    let file_guard = if config.file.enabled {
        let (file_layer, guard) = sinks::file::layer_with_config(&config);
        layers.push(file_layer);
        Some(guard)
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInstalled(e.to_string()))?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log_level = %config.level,
        console_format = %config.console_format(),
        file_enabled = config.file.enabled,
        log_dir = %config.log_dir.display(),
        "logging initialized"
    );

    Ok(LoggingHandle::new(file_guard))
}
