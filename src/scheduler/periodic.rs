use std::{sync::Arc, time::Duration};

use serde_json::{json, Value};

use super::{Scheduler, Timer, TimerMode};
use crate::bus::LocalBus;

/// Периодически публикует на шине значение, полученное от `producer`.
///
/// Возвращает непрерывный таймер; остановка или удаление таймера
/// прекращает публикацию.
pub fn publish_every<F>(
    scheduler: &Scheduler,
    bus: &LocalBus,
    topic: impl Into<Arc<str>>,
    period: Duration,
    mut producer: F,
) -> Timer
where
    F: FnMut() -> Value + Send + 'static,
{
    let bus = bus.clone();
    let topic: Arc<str> = topic.into();
    scheduler.add_timer(period, TimerMode::Continuous, move || {
        bus.publish(topic.clone(), producer());
    })
}

/// Публикует время работы шины в миллисекундах.
pub fn uptime_publisher(
    scheduler: &Scheduler,
    bus: &LocalBus,
    topic: impl Into<Arc<str>>,
    period: Duration,
) -> Timer {
    let source = bus.clone();
    publish_every(scheduler, bus, topic, period, move || {
        json!(source.uptime().as_millis() as u64)
    })
}
