use std::fmt;

use num_enum::TryFromPrimitive;
#[cfg(feature = "serde_repr")]
use serde_repr::{Deserialize_repr, Serialize_repr};
#[cfg(feature = "strum")]
use strum_macros::{AsRefStr, EnumIter};

/// Коды статуса для категоризации ошибок.
///
/// # Диапазоны:
/// - 0xxx: Успех
/// - 1xxx: Общие ошибки
/// - 2xxx: Ошибки данных (топики, ключи, паттерны)
/// - 3xxx: Обработчики подписок
/// - 4xxx: Конфигурация и окружение
/// - 6xxx: Сеть / соединение с брокером
/// - 8xxx: Протокольные ошибки
///
/// # Реализация:
/// - `num_enum::TryFromPrimitive` даёт нативную реализацию `TryFrom<u32>`.
/// - опционально: `strum` для `AsRefStr`/`EnumIter` (feature = "strum").
/// - опционально: `serde_repr` для сериализации в виде числового значения
///   (feature = "serde_repr").
#[cfg_attr(feature = "strum", derive(AsRefStr, EnumIter))]
#[cfg_attr(feature = "serde_repr", derive(Serialize_repr, Deserialize_repr))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u32)]
#[non_exhaustive]
pub enum StatusCode {
    // === 0xxx: Успех ===
    Success = 0,

    // === 1xxx: Общие ошибки ===
    Unknown = 1000,
    Unexpected = 1002,
    Internal = 1003,
    InvalidArgs = 1004,

    // === 2xxx: Ошибки данных ===
    NotFound = 2000,
    InvalidValue = 2002,
    InvalidTopic = 2003,

    // === 3xxx: Обработчики подписок ===
    HandlerFailed = 3000,

    // === 4xxx: Конфигурация ===
    ConfigInvalid = 4000,
    ConfigMissing = 4001,
    LoggingInit = 4002,

    // === 6xxx: Сеть/IO ===
    Io = 6000,
    Timeout = 6002,
    ConnectionFailed = 6003,
    NotConnected = 6004,
    ConnectionLost = 6005,
    Shutdown = 6006,

    // === 8xxx: Протокол ===
    InvalidFrame = 8000,
    InvalidCommand = 8001,
    InvalidUtf8 = 8002,
    ProtocolMismatch = 8003,
    UnexpectedReply = 8004,
    BrokerError = 8005,
}

/// Уровень, на котором стоит логировать ошибку с данным кодом.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StatusCode {
    /// Числовое представление кода статуса.
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Пытается получить вариант `StatusCode` из `u32`.
    ///
    /// Использует `TryFrom<u32>` из `num_enum`; возвращает `None`, если
    /// значение не соответствует ни одному варианту.
    pub fn from_u32(v: u32) -> Option<Self> {
        Self::try_from(v).ok()
    }

    /// Возвращает `true`, если операцию имеет смысл повторить позже
    /// («попробуйте позже» для дашборда).
    ///
    /// Сам мост повторяет только подключение; повтор запросов остаётся
    /// решением вызывающей стороны.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout
                | Self::ConnectionFailed
                | Self::NotConnected
                | Self::ConnectionLost
        )
    }

    /// Вернёт `true`, если переданный `code` означает успешный результат.
    pub fn is_success(code: u32) -> bool {
        Self::Success as u32 == code
    }

    /// Является ли код ошибкой вызывающей стороны: проблема в запросе или
    /// данных.
    ///
    /// Клиентские ошибки лежат в диапазоне `2xxx..4xxx`. Значение
    /// `InvalidArgs` (1004) семантически относится к клиентским ошибкам и
    /// учитывается явно.
    pub fn is_client_error(&self) -> bool {
        let c = self.code();
        if (2000..=4999).contains(&c) {
            return true;
        }
        matches!(self, Self::InvalidArgs)
    }

    /// Является ли код внутренней или инфраструктурной ошибкой.
    ///
    /// Обычно это диапазоны `1xxx` и `5xxx..7xxx`.
    pub fn is_server_error(&self) -> bool {
        let c = self.code();
        matches!(c, 1000..=1999 | 5000..=7999)
    }

    /// Ошибка протокола или разбора фрейма (диапазон 8xxx).
    pub fn is_protocol_error(&self) -> bool {
        (8000..=8999).contains(&self.code())
    }

    /// Требуется ли логировать как критическую ошибку.
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::Internal | Self::Unexpected)
    }

    /// Рекомендуемый уровень логирования для данного кода.
    pub fn log_level(&self) -> LogLevel {
        match self {
            Self::Success => LogLevel::Trace,
            Self::NotFound | Self::NotConnected => LogLevel::Debug,
            Self::InvalidArgs
            | Self::InvalidValue
            | Self::InvalidTopic
            | Self::InvalidCommand
            | Self::Shutdown => LogLevel::Info,
            Self::Timeout
            | Self::ConnectionFailed
            | Self::ConnectionLost
            | Self::HandlerFailed => LogLevel::Warn,
            Self::Internal | Self::Unexpected | Self::ProtocolMismatch => LogLevel::Error,
            _ => LogLevel::Warn,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для StatusCode
////////////////////////////////////////////////////////////////////////////////

impl From<StatusCode> for u32 {
    fn from(c: StatusCode) -> Self {
        c.code()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        // С feature "strum" печатается имя из AsRefStr, иначе Debug-имя.
        #[cfg(feature = "strum")]
        {
            write!(f, "{} ({})", self.as_ref(), self.code())
        }
        #[cfg(not(feature = "strum"))]
        {
            write!(f, "{:?} ({})", self, self.code())
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    /// Тест проверяет, что ошибки соединения помечаются как retryable.
    #[test]
    fn test_retryable() {
        assert!(StatusCode::NotConnected.is_retryable());
        assert!(StatusCode::ConnectionLost.is_retryable());
        assert!(StatusCode::Timeout.is_retryable());
        assert!(!StatusCode::ProtocolMismatch.is_retryable());
        assert!(!StatusCode::InvalidCommand.is_retryable());
    }

    /// Тест проверяет разделение клиентских и серверных ошибок.
    #[test]
    fn test_client_vs_server() {
        assert!(StatusCode::InvalidArgs.is_client_error());
        assert!(StatusCode::InvalidTopic.is_client_error());
        assert!(StatusCode::HandlerFailed.is_client_error());
        assert!(StatusCode::Internal.is_server_error());
        assert!(StatusCode::ConnectionLost.is_server_error());
        assert!(!StatusCode::InvalidTopic.is_server_error());
    }

    /// Тест проверяет конвертацию через `TryFrom<u32>` и вспомогательную
    /// `from_u32`.
    #[test]
    fn test_from_try_from_u32() {
        let n = StatusCode::ProtocolMismatch.code();
        assert_eq!(
            StatusCode::try_from(n).unwrap(),
            StatusCode::ProtocolMismatch
        );
        assert!(StatusCode::from_u32(99999).is_none());
    }

    /// Тест проверяет получение числового представления и конвертацию
    /// `From<StatusCode> for u32`.
    #[test]
    fn test_code_and_into() {
        let c = StatusCode::NotConnected;
        assert_eq!(c.code(), 6004);
        let n: u32 = c.into();
        assert_eq!(n, 6004);
        assert!(StatusCode::is_success(StatusCode::Success.code()));
        assert!(!StatusCode::is_success(StatusCode::NotFound.code()));
    }

    /// Тест проверяет определение протокольных ошибок (диапазон 8xxx).
    #[test]
    fn test_is_protocol_error() {
        assert!(StatusCode::InvalidFrame.is_protocol_error());
        assert!(StatusCode::ProtocolMismatch.is_protocol_error());
        assert!(!StatusCode::NotConnected.is_protocol_error());
    }

    /// Тест проверяет отображаемый уровень логирования для разных кодов.
    #[test]
    fn test_log_level_mappings() {
        assert_eq!(StatusCode::Success.log_level(), LogLevel::Trace);
        assert_eq!(StatusCode::NotConnected.log_level(), LogLevel::Debug);
        assert_eq!(StatusCode::HandlerFailed.log_level(), LogLevel::Warn);
        assert_eq!(StatusCode::ProtocolMismatch.log_level(), LogLevel::Error);
    }

    /// Тест проверяет, что `Display` содержит имя варианта и числовой код.
    #[test]
    fn test_display_contains_name_and_code() {
        let s = format!("{}", StatusCode::InvalidFrame);
        assert!(
            s.contains("8000"),
            "Display must contain code 8000, got: {s}"
        );
        assert!(
            s.contains("InvalidFrame"),
            "Display must contain variant name 'InvalidFrame', got: {s}"
        );
    }
}
