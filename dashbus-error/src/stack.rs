use std::{fmt, panic::Location, sync::Arc};

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::{ErrorExt, LogLevel, StatusCode};

/// Ошибка верхнего уровня с цепочкой контекстов.
///
/// Корневая ошибка хранится за `Arc`, поэтому `StackError` дёшево клонируется
/// и может быть разослана нескольким ожидающим сторонам.
#[derive(Clone)]
pub struct StackError {
    inner: Arc<dyn ErrorExt>,
    contexts: Vec<ErrorContext>,
}

/// Один шаг контекста с местом вызова.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub message: String,
    pub location: Option<&'static Location<'static>>,
}

/// Сериализуемое представление ошибки для вывода в JSON.
#[cfg(feature = "serde")]
#[derive(Debug, Serialize)]
pub struct ErrorReport {
    pub code: u32,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub contexts: Vec<String>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StackError {
    pub fn new<E: ErrorExt>(err: E) -> Self {
        Self {
            inner: Arc::new(err),
            contexts: Vec::new(),
        }
    }

    /// Добавляет контекст к ошибке, запоминая место вызова.
    #[track_caller]
    pub fn context(
        mut self,
        msg: impl Into<String>,
    ) -> Self {
        self.contexts.push(ErrorContext {
            message: msg.into(),
            location: Some(Location::caller()),
        });
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.inner.status_code()
    }

    pub fn client_message(&self) -> String {
        self.inner.client_message()
    }

    /// Корневая ошибка без контекстов.
    pub fn root(&self) -> &dyn ErrorExt {
        self.inner.as_ref()
    }

    pub fn contexts(&self) -> &[ErrorContext] {
        &self.contexts
    }

    pub fn log_fields(&self) -> Vec<(&'static str, String)> {
        self.inner.log_fields()
    }

    /// Downcast корневой ошибки к конкретному типу.
    pub fn downcast_ref<T: ErrorExt>(&self) -> Option<&T> {
        self.inner.as_any().downcast_ref::<T>()
    }

    pub fn is_retryable(&self) -> bool {
        self.status_code().is_retryable()
    }

    pub fn log_level(&self) -> LogLevel {
        self.status_code().log_level()
    }

    #[cfg(feature = "serde")]
    pub fn to_report(&self) -> ErrorReport {
        ErrorReport {
            code: self.status_code().code(),
            message: self.client_message(),
            contexts: self.format_contexts(),
        }
    }

    fn format_contexts(&self) -> Vec<String> {
        self.contexts
            .iter()
            .map(|ctx| match ctx.location {
                Some(loc) => format!("{} ({}:{})", ctx.message, loc.file(), loc.line()),
                None => ctx.message.clone(),
            })
            .collect()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для StackError
////////////////////////////////////////////////////////////////////////////////

impl fmt::Debug for StackError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let mut debug = f.debug_struct("StackError");
        debug.field("inner", &self.inner.to_string());
        debug.field("status_code", &self.status_code());
        if !self.contexts.is_empty() {
            debug.field("contexts", &self.format_contexts());
        }
        debug.finish()
    }
}

impl fmt::Display for StackError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        // Контексты выводятся от внешнего к внутреннему.
        for ctx in self.contexts.iter().rev() {
            write!(f, "{}: ", ctx.message)?;
        }
        write!(f, "{}", self.inner)
    }
}

impl std::error::Error for StackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.inner.as_ref())
    }
}

impl<E: ErrorExt> From<E> for StackError {
    fn from(e: E) -> Self {
        StackError::new(e)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BridgeError;

    #[test]
    fn test_context_chain() {
        let stack = StackError::new(BridgeError::NotConnected)
            .context("publish dst/lamp")
            .context("monitor command");

        assert_eq!(stack.contexts().len(), 2);
        assert_eq!(stack.contexts()[0].message, "publish dst/lamp");
        assert!(stack.contexts()[0].location.is_some());
        assert_eq!(
            stack.to_string(),
            "monitor command: publish dst/lamp: not connected to broker"
        );
    }

    #[test]
    fn test_downcast() {
        let stack = StackError::from(BridgeError::Shutdown);
        assert!(matches!(
            stack.downcast_ref::<BridgeError>(),
            Some(BridgeError::Shutdown)
        ));
        assert_eq!(stack.status_code(), StatusCode::Shutdown);
    }

    #[test]
    fn test_retryable_passthrough() {
        let stack = StackError::from(BridgeError::ConnectionLost {
            reason: "reset by peer".into(),
        });
        assert!(stack.is_retryable());
        assert_eq!(stack.log_level(), LogLevel::Warn);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_report_serialization() {
        let stack = StackError::from(BridgeError::NotConnected).context("save layout");
        let report = stack.to_report();
        assert_eq!(report.code, StatusCode::NotConnected.code());

        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("not connected"));
        assert!(json.contains("save layout"));
    }
}
