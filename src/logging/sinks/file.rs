use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling::daily};
use tracing_subscriber::{layer::Layer as LayerTrait, registry::LookupSpan};

use crate::logging::{config::LoggingConfig, formatter};

/// Слой записи в ежедневно ротируемый файл `log_dir/filename`.
///
/// Запись идёт через фоновый поток; буфер сбрасывается, когда
/// возвращённый guard уничтожается.
pub fn layer_with_config<S>(config: &LoggingConfig) -> (Box<dyn LayerTrait<S> + Send + Sync>, WorkerGuard)
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let appender = daily(&config.log_dir, &config.file.filename);
    let (writer, guard) = non_blocking(appender);
    let layer = formatter::build_formatter(&config.console, config.file.format, false, writer);
    (layer, guard)
}

#[cfg(test)]
mod tests {
    use tracing_subscriber::{prelude::*, registry::Registry};

    use super::*;
    use crate::logging::config::{FileConfig, LogFormat};

    /// Тест проверяет, что после сброса guard в каталоге появляется файл с
    /// записанным событием.
    #[test]
    fn test_file_layer_writes_events() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = LoggingConfig {
            log_dir: tmp.path().to_path_buf(),
            file: FileConfig {
                enabled: true,
                filename: "bridge.log".into(),
                format: LogFormat::Json,
            },
            ..Default::default()
        };

        let (layer, guard) = layer_with_config::<Registry>(&cfg);
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(topic = "src/temp", "message delivered");
        });
        drop(guard);

        let contents: String = std::fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with("bridge.log"))
            .map(|e| std::fs::read_to_string(e.path()).unwrap())
            .collect();
        assert!(contents.contains("message delivered"));
        assert!(contents.contains("src/temp"));
    }
}
