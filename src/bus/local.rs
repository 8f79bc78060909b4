use std::{
    any::Any,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use dashbus_error::BridgeError;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use super::{Dispatcher, Message, SubscriptionId};
use crate::topic::{self, RECURSIVE_WILDCARD};

/// Результат обработчика: ошибка логируется шиной и дальше не уходит.
pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Обработчик сообщений локальной шины.
pub type Handler = Arc<dyn Fn(&Message) -> HandlerResult + Send + Sync>;

/// Внутрипроцессная шина publish/subscribe с шаблонами топиков.
///
/// Поддерживает:
/// - подписки по шаблонам (`*`, `**`);
/// - вызов обработчиков в порядке регистрации;
/// - изоляцию ошибок и паник отдельных обработчиков;
/// - статистику публикаций и доставок.
///
/// Обработчики вызываются под [`Dispatcher`] шины: публикации из разных
/// задач не выполняют обработчики одновременно.
///
/// Клонирование дешёвое: все клоны разделяют один реестр.
#[derive(Clone)]
pub struct LocalBus {
    inner: Arc<Inner>,
}

/// Снимок счётчиков шины.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStats {
    /// Количество вызовов `publish`.
    pub published: u64,
    /// Количество успешных вызовов обработчиков.
    pub delivered: u64,
    /// Количество обработчиков, вернувших ошибку или запаниковавших.
    pub handler_errors: u64,
}

struct Inner {
    registrations: Mutex<Vec<Arc<Registration>>>,
    dispatcher: Dispatcher,
    next_id: AtomicU64,
    created_at: Instant,
    published: AtomicU64,
    delivered: AtomicU64,
    handler_errors: AtomicU64,
}

struct Registration {
    id: SubscriptionId,
    pattern: Arc<str>,
    handler: Handler,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl LocalBus {
    pub fn new() -> Self {
        Self::with_dispatcher(Dispatcher::new())
    }

    /// Создаёт шину, разделяющую замок вызова колбэков с другими
    /// компонентами (например, с [`crate::scheduler::Scheduler`]).
    pub fn with_dispatcher(dispatcher: Dispatcher) -> Self {
        Self {
            inner: Arc::new(Inner {
                registrations: Mutex::new(Vec::new()),
                dispatcher,
                next_id: AtomicU64::new(1),
                created_at: Instant::now(),
                published: AtomicU64::new(0),
                delivered: AtomicU64::new(0),
                handler_errors: AtomicU64::new(0),
            }),
        }
    }

    /// Регистрирует обработчик для шаблона и возвращает идентификатор
    /// подписки.
    pub fn subscribe<F>(
        &self,
        pattern: impl Into<Arc<str>>,
        handler: F,
    ) -> SubscriptionId
    where
        F: Fn(&Message) -> HandlerResult + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let pattern = pattern.into();
        debug!(subscription = %id, pattern = %pattern, "bus subscribe");

        self.inner.registrations.lock().push(Arc::new(Registration {
            id,
            pattern,
            handler: Arc::new(handler),
        }));
        id
    }

    /// Удаляет подписку. Возвращает `false`, если такой подписки уже нет.
    pub fn unsubscribe(
        &self,
        id: SubscriptionId,
    ) -> bool {
        let mut regs = self.inner.registrations.lock();
        match regs.iter().position(|r| r.id == id) {
            Some(pos) => {
                let reg = regs.remove(pos);
                debug!(subscription = %id, pattern = %reg.pattern, "bus unsubscribe");
                true
            }
            None => false,
        }
    }

    /// Публикует значение от локального источника.
    ///
    /// Возвращает количество вызванных обработчиков.
    pub fn publish(
        &self,
        topic: impl Into<Arc<str>>,
        payload: Value,
    ) -> usize {
        self.publish_message(Message::new(topic, payload))
    }

    /// Публикует готовое сообщение с явно указанным источником.
    ///
    /// Набор обработчиков фиксируется до первого вызова: подписки,
    /// добавленные или удалённые обработчиками, влияют только на следующие
    /// публикации. Обработчики вызываются вне блокировки реестра, но под
    /// замком диспетчера.
    pub fn publish_message(
        &self,
        msg: Message,
    ) -> usize {
        self.inner.published.fetch_add(1, Ordering::Relaxed);
        self.inner.dispatcher.run(|| self.dispatch(&msg))
    }

    fn dispatch(
        &self,
        msg: &Message,
    ) -> usize {
        let snapshot: Vec<Arc<Registration>> = self
            .inner
            .registrations
            .lock()
            .iter()
            .filter(|r| topic::matches(&r.pattern, &msg.topic))
            .cloned()
            .collect();

        for reg in &snapshot {
            let outcome = catch_unwind(AssertUnwindSafe(|| (reg.handler)(msg)));
            let reason = match outcome {
                Ok(Ok(())) => {
                    self.inner.delivered.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(panic) => format!("panicked: {}", panic_message(&*panic)),
            };

            self.inner.handler_errors.fetch_add(1, Ordering::Relaxed);
            let err = BridgeError::Handler {
                subscription: reg.id.as_u64(),
                reason,
            };
            warn!(
                subscription = %reg.id,
                pattern = %reg.pattern,
                topic = %msg.topic,
                error = %err,
                "bus handler failed"
            );
        }

        snapshot.len()
    }

    /// Регистрирует диагностический обработчик на `**`, который пишет каждое
    /// сообщение в лог вместе со временем с момента создания шины.
    pub fn log_all(&self) -> SubscriptionId {
        let created_at = self.inner.created_at;
        self.subscribe(RECURSIVE_WILDCARD, move |msg| {
            debug!(
                elapsed_ms = created_at.elapsed().as_millis() as u64,
                topic = %msg.topic,
                origin = ?msg.origin,
                payload = %msg.payload,
                "bus message"
            );
            Ok(())
        })
    }

    pub fn stats(&self) -> BusStats {
        BusStats {
            published: self.inner.published.load(Ordering::Relaxed),
            delivered: self.inner.delivered.load(Ordering::Relaxed),
            handler_errors: self.inner.handler_errors.load(Ordering::Relaxed),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.registrations.lock().len()
    }

    /// Время с момента создания шины.
    pub fn uptime(&self) -> Duration {
        self.inner.created_at.elapsed()
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Достаёт текст паники из payload `catch_unwind`.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
