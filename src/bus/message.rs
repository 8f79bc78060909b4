use std::{fmt, sync::Arc};

use serde::Serialize;
use serde_json::Value;

/// Источник сообщения на локальной шине.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Опубликовано внутри процесса.
    Local,
    /// Пришло от удалённого брокера.
    Remote,
}

/// Сообщение, доставляемое подписчикам локальной шины.
///
/// Топик хранится как `Arc<str>`, чтобы рассылка по многим обработчикам не
/// копировала строку.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub topic: Arc<str>,
    pub payload: Value,
    pub origin: Origin,
}

/// Идентификатор регистрации подписки.
///
/// Монотонно растёт; именно он, а не шаблон, определяет подписку, поэтому
/// две подписки на один шаблон удаляются независимо.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub(crate) u64);

impl Message {
    pub fn new(
        topic: impl Into<Arc<str>>,
        payload: Value,
    ) -> Self {
        Self {
            topic: topic.into(),
            payload,
            origin: Origin::Local,
        }
    }

    /// Сообщение, полученное от брокера.
    pub fn remote(
        topic: impl Into<Arc<str>>,
        payload: Value,
    ) -> Self {
        Self {
            topic: topic.into(),
            payload,
            origin: Origin::Remote,
        }
    }

    pub fn is_remote(&self) -> bool {
        self.origin == Origin::Remote
    }
}

impl SubscriptionId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
