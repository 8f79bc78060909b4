//! dashbus: шина публикации/подписки по топикам для дашбордов, связанная с
//! удалённым брокером через WebSocket.
//!
//! Компоненты снизу вверх:
//! - [`topic`]: сопоставление иерархических топиков с шаблонами `*`/`**`;
//! - [`bus`]: локальная шина, единственная точка рассылки сообщений;
//! - [`scheduler`]: общий таймер-планировщик с фиксированным разрешением;
//! - [`bridge`]: мост к брокеру с сопоставлением запросов и ответов и
//!   автоматическим переподключением;
//! - [`app`]: корень композиции, собирающий всё вместе из [`config`].

/// Корень композиции: шина, планировщик и мост.
pub mod app;
/// Баннер режима монитора.
pub mod banner;
/// Мост к удалённому брокеру.
pub mod bridge;
/// Локальная шина.
pub mod bus;
/// Командная строка.
pub mod cli;
/// Загрузка настроек.
pub mod config;
/// Ошибки настройки процесса.
pub mod error;
/// Логирование (фильтры, форматы, приёмники).
pub mod logging;
/// Планировщик таймеров.
pub mod scheduler;
/// Сопоставление топиков.
pub mod topic;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

pub use app::App;
pub use bridge::{
    BridgeOptions, BridgeResult, Command, ExpiringSubscription, LayoutStore, LinkState,
    LinkStatus, PendingReply, RemoteBridge,
};
pub use bus::{BusStats, Dispatcher, Handler, HandlerResult, LocalBus, Message, Origin, SubscriptionId};
pub use config::Settings;
pub use dashbus_error::{BridgeError, DashResult, ErrorExt, StackError, StatusCode};
pub use scheduler::{publish_every, uptime_publisher, Scheduler, SchedulerTask, Timer, TimerMode};
pub use topic::{is_pattern, matches, validate_topic};
