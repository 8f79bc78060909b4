use std::time::Duration;

use super::RemoteBridge;
use crate::{
    bus::{HandlerResult, Message, SubscriptionId},
    scheduler::{Scheduler, Timer, TimerMode},
};

/// Подписка у брокера с таймером тишины.
///
/// Каждое сообщение по шаблону откладывает таймер на полный период; пока
/// топик молчит, `on_timeout` вызывается раз в период. Так виджет может
/// показать, что данные устарели.
pub struct ExpiringSubscription {
    bridge: RemoteBridge,
    id: SubscriptionId,
    timer: Timer,
}

impl ExpiringSubscription {
    pub fn new<F, T>(
        bridge: &RemoteBridge,
        scheduler: &Scheduler,
        pattern: impl Into<String>,
        timeout: Duration,
        on_message: F,
        on_timeout: T,
    ) -> Self
    where
        F: Fn(&Message) -> HandlerResult + Send + Sync + 'static,
        T: FnMut() + Send + 'static,
    {
        let timer = scheduler.add_timer(timeout, TimerMode::Continuous, on_timeout);
        let watchdog = timer.clone();
        let id = bridge.subscribe(pattern, move |msg| {
            watchdog.reset();
            on_message(msg)
        });

        Self {
            bridge: bridge.clone(),
            id,
            timer,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    /// Откладывает срабатывание таймера тишины.
    pub fn reset_timer(&self) {
        self.timer.reset();
    }

    /// Снимает подписку и удаляет таймер.
    pub fn dispose(self) {
        self.bridge.unsubscribe(self.id);
        self.timer.stop();
        self.timer.dispose();
    }
}
