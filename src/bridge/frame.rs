//! Конверт протокола: JSON-объект в одном текстовом фрейме WebSocket.
//!
//! Исходящие команды кодируются тегом `type`, входящие фреймы делятся на
//! push-сообщения (`type: Publish`) и ответы на команды (`reply: <Verb>`).

use std::fmt;

use dashbus_error::BridgeError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::topic;

/// Глагол команды протокола.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verb {
    Publish,
    Subscribe,
    Unsubscribe,
    Save,
    Load,
    List,
}

/// Исходящая команда брокеру.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Command {
    Publish { topic: String, payload: Value },
    Subscribe { topic: String },
    Unsubscribe { topic: String },
    Save { key: String, payload: Value },
    Load { key: String },
    /// Ключи с заданным префиксом; пустой префикс означает все ключи.
    List { key: String },
}

/// Разобранный входящий фрейм.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Публикация от брокера по одной из подписок.
    Push { topic: String, payload: Value },
    /// Ответ на ранее отправленную команду.
    Reply(Reply),
}

/// Ответ брокера на команду.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub verb: Verb,
    pub topic: Option<String>,
    pub key: Option<String>,
    pub value: Option<Value>,
    pub error: Option<String>,
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type", alias = "request")]
    kind: Option<Verb>,
    reply: Option<Verb>,
    topic: Option<String>,
    key: Option<String>,
    #[serde(alias = "value")]
    payload: Option<Value>,
    error: Option<String>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Verb {
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Publish => "Publish",
            Verb::Subscribe => "Subscribe",
            Verb::Unsubscribe => "Unsubscribe",
            Verb::Save => "Save",
            Verb::Load => "Load",
            Verb::List => "List",
        }
    }
}

impl Command {
    pub fn verb(&self) -> Verb {
        match self {
            Command::Publish { .. } => Verb::Publish,
            Command::Subscribe { .. } => Verb::Subscribe,
            Command::Unsubscribe { .. } => Verb::Unsubscribe,
            Command::Save { .. } => Verb::Save,
            Command::Load { .. } => Verb::Load,
            Command::List { .. } => Verb::List,
        }
    }

    /// Проверяет команду до отправки.
    ///
    /// Публикация требует конкретного топика без шаблонов, подписки требуют
    /// непустого шаблона, операции хранилища (кроме `List`) требуют
    /// непустого ключа.
    pub fn validate(&self) -> Result<(), BridgeError> {
        let malformed = |reason: String| BridgeError::MalformedCommand { reason };
        match self {
            Command::Publish { topic, .. } => topic::validate_topic(topic).map_err(malformed),
            Command::Subscribe { topic } | Command::Unsubscribe { topic } if topic.is_empty() => {
                Err(malformed(format!("{} pattern is empty", self.verb())))
            }
            Command::Save { key, .. } | Command::Load { key } if key.is_empty() => {
                Err(malformed(format!("{} key is empty", self.verb())))
            }
            _ => Ok(()),
        }
    }

    pub fn encode(&self) -> Result<String, BridgeError> {
        serde_json::to_string(self).map_err(|e| BridgeError::MalformedCommand {
            reason: e.to_string(),
        })
    }
}

impl Inbound {
    /// Разбирает текстовый фрейм.
    pub fn decode(text: &str) -> Result<Self, BridgeError> {
        let raw: RawFrame = serde_json::from_str(text).map_err(|e| BridgeError::MalformedFrame {
            reason: e.to_string(),
        })?;

        match (raw.reply, raw.kind) {
            (Some(verb), _) => Ok(Inbound::Reply(Reply {
                verb,
                topic: raw.topic,
                key: raw.key,
                value: raw.payload,
                error: raw.error,
            })),
            (None, Some(Verb::Publish)) => match raw.topic {
                Some(topic) if !topic.is_empty() => Ok(Inbound::Push {
                    topic,
                    payload: raw.payload.unwrap_or(Value::Null),
                }),
                _ => Err(BridgeError::MalformedFrame {
                    reason: "push frame without topic".to_string(),
                }),
            },
            (None, Some(other)) => Err(BridgeError::MalformedFrame {
                reason: format!("unexpected inbound {other} frame"),
            }),
            (None, None) => Err(BridgeError::MalformedFrame {
                reason: "frame has neither type nor reply".to_string(),
            }),
        }
    }

    /// Разбирает бинарный фрейм, если он содержит UTF-8.
    pub fn decode_bytes(bytes: &[u8]) -> Result<Self, BridgeError> {
        let text = std::str::from_utf8(bytes).map_err(|e| BridgeError::MalformedFrame {
            reason: format!("binary frame is not UTF-8: {e}"),
        })?;
        Self::decode(text)
    }
}

impl fmt::Display for Verb {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
