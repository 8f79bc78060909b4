use std::any::Any;

use crate::{ErrorExt, StatusCode};

/// Ошибки моста между локальной шиной и удалённым брокером.
///
/// Тип клонируемый: одна и та же причина отклоняет сразу все ожидающие
/// запросы при разрыве соединения.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// Соединение не установлено, запрос отклонён без отправки.
    NotConnected,
    /// Попытка подключения не удалась.
    ConnectFailed { url: String, reason: String },
    /// Соединение потеряно, пока запрос ожидал ответа.
    ConnectionLost { reason: String },
    /// Глагол ответа не совпал с глаголом запроса в голове очереди.
    ProtocolMismatch { expected: String, actual: String },
    /// Входящий фрейм не удалось разобрать.
    MalformedFrame { reason: String },
    /// Исходящая команда не прошла проверку.
    MalformedCommand { reason: String },
    /// Брокер вернул ошибку в ответе.
    Broker { verb: String, message: String },
    /// Ответ корректен, но его значение имеет неожиданную форму.
    UnexpectedReply { verb: String, reason: String },
    /// Обработчик подписки завершился ошибкой или паникой.
    Handler { subscription: u64, reason: String },
    /// Мост остановлен.
    Shutdown,
}

impl BridgeError {
    /// Ошибка относится к состоянию соединения.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::NotConnected | Self::ConnectFailed { .. } | Self::ConnectionLost { .. }
        )
    }
}

impl std::fmt::Display for BridgeError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::NotConnected => write!(f, "not connected to broker"),
            Self::ConnectFailed { url, reason } => {
                write!(f, "failed to connect to {url}: {reason}")
            }
            Self::ConnectionLost { reason } => write!(f, "connection lost: {reason}"),
            Self::ProtocolMismatch { expected, actual } => {
                write!(
                    f,
                    "protocol mismatch: expected reply to {expected}, got {actual}"
                )
            }
            Self::MalformedFrame { reason } => write!(f, "malformed frame: {reason}"),
            Self::MalformedCommand { reason } => write!(f, "malformed command: {reason}"),
            Self::Broker { verb, message } => write!(f, "broker rejected {verb}: {message}"),
            Self::UnexpectedReply { verb, reason } => {
                write!(f, "unexpected reply to {verb}: {reason}")
            }
            Self::Handler {
                subscription,
                reason,
            } => write!(f, "handler of subscription #{subscription} failed: {reason}"),
            Self::Shutdown => write!(f, "bridge is shut down"),
        }
    }
}

impl std::error::Error for BridgeError {}

impl ErrorExt for BridgeError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotConnected => StatusCode::NotConnected,
            Self::ConnectFailed { .. } => StatusCode::ConnectionFailed,
            Self::ConnectionLost { .. } => StatusCode::ConnectionLost,
            Self::ProtocolMismatch { .. } => StatusCode::ProtocolMismatch,
            Self::MalformedFrame { .. } => StatusCode::InvalidFrame,
            Self::MalformedCommand { .. } => StatusCode::InvalidCommand,
            Self::Broker { .. } => StatusCode::BrokerError,
            Self::UnexpectedReply { .. } => StatusCode::UnexpectedReply,
            Self::Handler { .. } => StatusCode::HandlerFailed,
            Self::Shutdown => StatusCode::Shutdown,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn log_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("error_type", "bridge".to_string()),
            ("status_code", self.status_code().code().to_string()),
        ];

        match self {
            Self::ConnectFailed { url, .. } => fields.push(("url", url.clone())),
            Self::ProtocolMismatch { expected, actual } => {
                fields.push(("expected", expected.clone()));
                fields.push(("actual", actual.clone()));
            }
            Self::Broker { verb, .. } | Self::UnexpectedReply { verb, .. } => {
                fields.push(("verb", verb.clone()))
            }
            Self::Handler { subscription, .. } => {
                fields.push(("subscription", subscription.to_string()))
            }
            _ => {}
        }

        fields
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
