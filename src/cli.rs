//! Командная строка `dashbus`: режим монитора и разовые операции с
//! брокером.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{info, warn};

use crate::{
    app::App,
    banner::{self, BannerInfo},
    bridge::{Command, LayoutStore},
    config::Settings,
};

#[derive(Debug, Parser)]
#[command(name = "dashbus", version, about = "Topic pub/sub bus bridged to a WebSocket broker")]
pub struct Cli {
    /// Файл настроек (TOML, YAML или JSON).
    #[arg(short, long, env = "DASHBUS_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Адрес брокера, перекрывает настройки.
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// Уровень логирования, перекрывает настройки.
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Cmd,
}

#[derive(Debug, Subcommand)]
pub enum Cmd {
    /// Подключиться, подписаться и печатать каждое сообщение до Ctrl-C.
    Monitor {
        /// Шаблоны подписки у брокера (по умолчанию из настроек).
        #[arg(short = 's', long = "subscribe")]
        patterns: Vec<String>,

        /// Не печатать баннер.
        #[arg(long)]
        no_banner: bool,
    },
    /// Опубликовать JSON-значение в топик.
    Publish { topic: String, payload: String },
    /// Сохранить JSON-значение по ключу.
    Save { key: String, value: String },
    /// Прочитать значение по ключу.
    Load { key: String },
    /// Перечислить ключи с префиксом.
    List {
        #[arg(default_value = "")]
        prefix: String,
    },
    /// Перечислить сохранённые раскладки.
    Layouts,
}

impl Cli {
    /// Переносит флаги командной строки в настройки.
    pub fn apply(
        &self,
        settings: &mut Settings,
    ) {
        if let Some(url) = &self.url {
            settings.broker_url = url.clone();
        }
        if let Some(level) = &self.log_level {
            settings.logging.level = level.to_lowercase();
        }

        match &self.command {
            Cmd::Monitor { patterns, .. } => {
                if !patterns.is_empty() {
                    settings.subscribe_patterns = patterns.clone();
                }
            }
            _ => {
                // Разовая операция: без фоновой публикации, пересылки и
                // переподключений.
                settings.auto_connect = false;
                settings.uptime_topic = None;
                settings.forward_patterns.clear();
                settings.subscribe_patterns.clear();
            }
        }
    }
}

/// Выполняет команду с уже применёнными настройками.
pub async fn run(
    cli: Cli,
    settings: Settings,
) -> anyhow::Result<()> {
    match cli.command {
        Cmd::Monitor { no_banner, .. } => monitor(settings, no_banner).await,
        cmd => one_shot(cmd, settings).await,
    }
}

async fn monitor(
    settings: Settings,
    no_banner: bool,
) -> anyhow::Result<()> {
    if !no_banner {
        banner::print_banner(&BannerInfo {
            broker: &settings.broker_url,
            forward: &settings.forward_patterns,
            subscribe: &settings.subscribe_patterns,
            tick_ms: settings.tick_ms,
        });
    }

    let app = App::start(settings).await?;
    app.bus().subscribe("**", |msg| {
        println!("{}", serde_json::to_string(msg)?);
        Ok(())
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("interrupted, shutting down");
    app.shutdown().await;
    Ok(())
}

async fn one_shot(
    cmd: Cmd,
    settings: Settings,
) -> anyhow::Result<()> {
    let app = App::start(settings).await?;
    let result = match app.connect().await {
        Ok(()) => execute(&app, cmd).await,
        Err(e) => Err(e.into()),
    };
    app.shutdown().await;

    let output = result?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn execute(
    app: &App,
    cmd: Cmd,
) -> anyhow::Result<Value> {
    let bridge = app.bridge();
    let output = match cmd {
        Cmd::Publish { topic, payload } => {
            let payload = parse_json(&payload)?;
            bridge
                .request(Command::Publish { topic, payload })
                .await?;
            Value::Bool(true)
        }
        Cmd::Save { key, value } => {
            bridge.save(key, parse_json(&value)?).await?;
            Value::Bool(true)
        }
        Cmd::Load { key } => bridge.load(key).await?.unwrap_or(Value::Null),
        Cmd::List { prefix } => Value::from(bridge.list(prefix).await?),
        Cmd::Layouts => Value::from(LayoutStore::new(bridge.clone()).list_layouts().await?),
        Cmd::Monitor { .. } => {
            warn!("monitor is not a one-shot command");
            Value::Null
        }
    };
    Ok(output)
}

/// Разбирает аргумент как JSON.
pub fn parse_json(text: &str) -> anyhow::Result<Value> {
    serde_json::from_str(text).with_context(|| format!("`{text}` is not valid JSON"))
}
