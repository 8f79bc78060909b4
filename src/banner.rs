use std::{
    env,
    io::{self, IsTerminal},
};

use chrono::{DateTime, Local};
use owo_colors::OwoColorize;

/// Полный баннер с информацией о процессе.
pub const ASCII_FULL: &str = r#"
    dashbus {version}
    ----------------------------------------------
    Mode:             {mode}
    Broker:           {broker}
    Forward:          {forward}
    Subscribe:        {subscribe}
    Tick:             {tick}ms
    PID:              {pid}
    OS/Arch:          {os}/{arch}
    Git:              {git}
    Build:            {git} ({build_time})
"#;

/// Компактный баннер.
pub const ASCII_COMPACT: &str = r#"
dashbus {version} | {mode} | {broker} | PID {pid}
"#;

/// Что показать в баннере.
#[derive(Debug, Clone)]
pub struct BannerInfo<'a> {
    pub broker: &'a str,
    pub forward: &'a [String],
    pub subscribe: &'a [String],
    pub tick_ms: u64,
}

/// Выводит баннер монитора.
///
/// `DASHBUS_BANNER=full|compact` выбирает вид; по умолчанию полный в
/// отладочной сборке и компактный в релизной.
pub fn print_banner(info: &BannerInfo<'_>) {
    let full = match env::var("DASHBUS_BANNER").ok().as_deref() {
        Some("full") => true,
        Some("compact") => false,
        _ => cfg!(debug_assertions),
    };
    let color = io::stdout().is_terminal();
    let text = render(info, full);

    if !color {
        println!("{text}");
        return;
    }

    if !full {
        println!("{}", text.bold().green());
        return;
    }

    for (i, line) in text.lines().enumerate() {
        let trimmed = line.trim_start();
        if i == 1 {
            println!("{}", line.bold().bright_blue());
        } else if trimmed.starts_with("Broker:") {
            println!("{}", line.replace(info.broker, &info.broker.cyan().to_string()));
        } else if trimmed.starts_with("Git:") || trimmed.starts_with("Build:") {
            println!("{}", line.dimmed());
        } else {
            println!("{line}");
        }
    }
}

/// Подставляет значения в шаблон баннера.
pub fn render(
    info: &BannerInfo<'_>,
    full: bool,
) -> String {
    let bits = std::mem::size_of::<usize>() * 8;
    let version = format!("{} ({bits}-bit)", env!("CARGO_PKG_VERSION"));
    let mode = if cfg!(debug_assertions) {
        "debug"
    } else {
        "release"
    };
    let pid = std::process::id().to_string();

    if !full {
        return ASCII_COMPACT
            .replace("{version}", &version)
            .replace("{mode}", mode)
            .replace("{broker}", info.broker)
            .replace("{pid}", &pid);
    }

    let git = option_env!("GIT_COMMIT").unwrap_or("unknown");
    ASCII_FULL
        .replace("{version}", &version)
        .replace("{mode}", mode)
        .replace("{broker}", info.broker)
        .replace("{forward}", &list_or_none(info.forward))
        .replace("{subscribe}", &list_or_none(info.subscribe))
        .replace("{tick}", &info.tick_ms.to_string())
        .replace("{pid}", &pid)
        .replace("{os}", env::consts::OS)
        .replace("{arch}", env::consts::ARCH)
        .replace("{git}", git)
        .replace("{build_time}", &build_time())
}

fn build_time() -> String {
    let raw = option_env!("BUILD_TIME").unwrap_or("unknown");
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => dt
            .with_timezone(&Local)
            .format("%d.%m.%Y %H:%M:%S")
            .to_string(),
        Err(_) => raw.to_string(),
    }
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items.join(", ")
    }
}
