//! Корень композиции: шина, планировщик и мост, собранные из [`Settings`].
//!
//! Жизненный цикл: [`App::start`] создаёт экземпляры, запускает задачу
//! планировщика, публикацию времени работы и (если включено) подключение;
//! [`App::shutdown`] останавливает их в обратном порядке.

use dashbus_error::{DashResult, ResultExt};
use tracing::{info, trace};

use crate::{
    bridge::RemoteBridge,
    bus::{LocalBus, SubscriptionId},
    config::Settings,
    error::log_error,
    scheduler::{uptime_publisher, Scheduler, SchedulerTask, Timer},
};

/// Собранное приложение.
pub struct App {
    settings: Settings,
    bus: LocalBus,
    scheduler: Scheduler,
    scheduler_task: SchedulerTask,
    bridge: RemoteBridge,
    uptime: Option<Timer>,
    subscriptions: Vec<SubscriptionId>,
}

impl App {
    /// Собирает и запускает приложение. Должен вызываться внутри runtime
    /// tokio.
    ///
    /// Неудачное первое подключение не считается ошибкой: при включённом
    /// автоподключении мост повторяет попытки сам.
    pub async fn start(settings: Settings) -> DashResult<Self> {
        settings.validate().context("invalid settings")?;

        let bus = LocalBus::new();
        let scheduler = Scheduler::with_dispatcher(settings.tick(), bus.dispatcher().clone());
        let scheduler_task = scheduler.spawn();
        let bridge = RemoteBridge::spawn(bus.clone(), &scheduler, settings.bridge_options());

        let uptime = settings
            .uptime_topic
            .as_deref()
            .map(|topic| uptime_publisher(&scheduler, &bus, topic, settings.uptime_period()));

        let subscriptions = settings
            .subscribe_patterns
            .iter()
            .map(|pattern| {
                bridge.subscribe(pattern.as_str(), |msg| {
                    trace!(topic = %msg.topic, "remote message");
                    Ok(())
                })
            })
            .collect();

        info!(
            broker = %settings.broker_url,
            tick_ms = settings.tick_ms,
            forward = ?settings.forward_patterns,
            subscribe = ?settings.subscribe_patterns,
            "dashbus started"
        );

        let app = Self {
            settings,
            bus,
            scheduler,
            scheduler_task,
            bridge,
            uptime,
            subscriptions,
        };

        if app.settings.auto_connect {
            if let Err(e) = app.bridge.connect(app.settings.broker_url.clone()).await {
                log_error(&e, "initial connect failed, will retry");
            }
        }

        Ok(app)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn bus(&self) -> &LocalBus {
        &self.bus
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn bridge(&self) -> &RemoteBridge {
        &self.bridge
    }

    /// Подключается к брокеру из настроек.
    pub async fn connect(&self) -> DashResult<()> {
        self.bridge
            .connect(self.settings.broker_url.clone())
            .await
            .with_context(|| format!("connect to {}", self.settings.broker_url))
    }

    /// Останавливает публикацию, мост и планировщик.
    pub async fn shutdown(self) {
        if let Some(timer) = &self.uptime {
            timer.dispose();
        }
        for id in &self.subscriptions {
            self.bridge.unsubscribe(*id);
        }
        self.bridge.shutdown().await;
        self.scheduler_task.shutdown().await;

        let stats = self.bus.stats();
        info!(
            published = stats.published,
            delivered = stats.delivered,
            handler_errors = stats.handler_errors,
            "dashbus stopped"
        );
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
