use std::collections::VecDeque;

use dashbus_error::BridgeError;
use tokio::{sync::oneshot, time::Instant};
use tracing::{debug, trace, warn};

use super::{
    frame::{Reply, Verb},
    BridgeResult,
};

/// Куда доставить результат запроса.
#[derive(Debug)]
pub enum Responder {
    /// Вызывающая сторона ждёт результат.
    Caller(oneshot::Sender<BridgeResult<Reply>>),
    /// Результат никому не нужен; отказ только логируется.
    Detached,
}

/// Запрос, ожидающий ответа брокера.
#[derive(Debug)]
pub struct PendingRequest {
    verb: Verb,
    responder: Responder,
    enqueued_at: Instant,
}

/// Чем закончилась обработка входящего ответа.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Голова очереди получила ответ.
    Resolved,
    /// Голова очереди отклонена (ошибка брокера или несовпадение глагола).
    Rejected,
    /// Очередь пуста, ответ отброшен.
    Unsolicited,
}

/// FIFO-сопоставление исходящих команд и входящих ответов.
///
/// Брокер отвечает в порядке получения команд, поэтому каждый ответ
/// относится к самому старому ожидающему запросу. Каждый запрос
/// разрешается или отклоняется ровно один раз.
#[derive(Debug, Default)]
pub struct Correlator {
    queue: VecDeque<PendingRequest>,
}

impl Responder {
    /// Отклоняет запрос, который так и не попал в очередь.
    pub fn reject(
        self,
        err: BridgeError,
    ) {
        match self {
            Responder::Caller(tx) => {
                let _ = tx.send(Err(err));
            }
            Responder::Detached => debug!(error = %err, "detached request rejected"),
        }
    }
}

impl PendingRequest {
    fn complete(
        self,
        result: BridgeResult<Reply>,
    ) {
        let age_ms = self.enqueued_at.elapsed().as_millis() as u64;
        match self.responder {
            Responder::Caller(tx) => {
                trace!(verb = %self.verb, age_ms, ok = result.is_ok(), "request completed");
                if tx.send(result).is_err() {
                    trace!(verb = %self.verb, "request caller went away");
                }
            }
            Responder::Detached => match result {
                Ok(_) => trace!(verb = %self.verb, age_ms, "detached request completed"),
                Err(e) => warn!(verb = %self.verb, error = %e, "detached request failed"),
            },
        }
    }
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ставит запрос в конец очереди. Вызывается до отправки команды.
    pub fn enqueue(
        &mut self,
        verb: Verb,
        responder: Responder,
    ) {
        self.queue.push_back(PendingRequest {
            verb,
            responder,
            enqueued_at: Instant::now(),
        });
    }

    /// Сопоставляет ответ с головой очереди.
    pub fn resolve(
        &mut self,
        reply: Reply,
    ) -> Resolution {
        let Some(head) = self.queue.pop_front() else {
            warn!(verb = %reply.verb, "unsolicited reply dropped");
            return Resolution::Unsolicited;
        };

        if head.verb != reply.verb {
            let err = BridgeError::ProtocolMismatch {
                expected: head.verb.to_string(),
                actual: reply.verb.to_string(),
            };
            warn!(error = %err, "reply does not match pending request");
            head.complete(Err(err));
            return Resolution::Rejected;
        }

        if let Some(message) = reply.error.clone() {
            head.complete(Err(BridgeError::Broker {
                verb: reply.verb.to_string(),
                message,
            }));
            return Resolution::Rejected;
        }

        head.complete(Ok(reply));
        Resolution::Resolved
    }

    /// Отклоняет все ожидающие запросы одной и той же ошибкой.
    ///
    /// Очередь забирается целиком до первого уведомления, так что запросы,
    /// поставленные в очередь позже, к этой партии не относятся.
    pub fn reject_all(
        &mut self,
        err: &BridgeError,
    ) -> usize {
        let drained = std::mem::take(&mut self.queue);
        let count = drained.len();
        for pending in drained {
            pending.complete(Err(err.clone()));
        }
        count
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Глагол запроса в голове очереди.
    pub fn head_verb(&self) -> Option<Verb> {
        self.queue.front().map(|p| p.verb)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
