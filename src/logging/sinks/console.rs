use std::io::{self, Stderr};

use tracing_subscriber::{layer::Layer as LayerTrait, registry::LookupSpan};

use crate::logging::{config::LoggingConfig, formatter};

/// Консольный слой. Пишет в stderr, чтобы stdout оставался за
/// результатами команд.
pub fn layer_with_config<S>(config: &LoggingConfig) -> Box<dyn LayerTrait<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let writer: fn() -> Stderr = io::stderr;
    formatter::build_formatter(
        &config.console,
        config.console_format(),
        config.console.with_ansi,
        writer,
    )
}

#[cfg(test)]
mod tests {
    use tracing::info;
    use tracing_subscriber::{prelude::*, registry::Registry};

    use super::*;
    use crate::logging::config::{ConsoleConfig, LogFormat};

    /// Тест проверяет, что слой строится для каждого формата и не паникует
    /// при логировании.
    #[test]
    fn test_layer_for_every_format() {
        for format in [LogFormat::Json, LogFormat::Pretty, LogFormat::Compact] {
            for ansi in [true, false] {
                let cfg = LoggingConfig {
                    format,
                    console: ConsoleConfig {
                        with_ansi: ansi,
                        ..Default::default()
                    },
                    ..Default::default()
                };
                let subscriber = Registry::default().with(layer_with_config::<Registry>(&cfg));
                tracing::subscriber::with_default(subscriber, || {
                    info!(format = %format, ansi, "console layer smoke test");
                });
            }
        }
    }
}
