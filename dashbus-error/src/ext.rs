use std::{any::Any, error::Error};

use crate::StatusCode;

/// Расширение для ошибок шины и моста (object-safe).
///
/// Даёт единый набор сведений об ошибке:
/// - статус-код для классификации,
/// - короткое сообщение для отображения в дашборде,
/// - подробное сообщение для логов,
/// - пары ключ-значение для структурированного логирования.
pub trait ErrorExt: Error + Send + Sync + 'static {
    /// Код статуса ошибки.
    ///
    /// По умолчанию возвращает [`StatusCode::Internal`].
    fn status_code(&self) -> StatusCode {
        StatusCode::Internal
    }

    /// Возвращает ошибку как [`Any`](std::any::Any) для downcast к
    /// конкретному типу.
    fn as_any(&self) -> &dyn Any;

    /// Сообщение, которое можно показать пользователю дашборда.
    ///
    /// Внутренние ошибки скрываются за общей фразой, ошибки соединения
    /// дополняются подсказкой о повторе.
    fn client_message(&self) -> String {
        let code = self.status_code();
        match code {
            StatusCode::Unknown | StatusCode::Internal | StatusCode::Unexpected => {
                "Internal error".to_string()
            }
            _ if code.is_retryable() => format!("{self}; try again later"),
            _ => self.to_string(),
        }
    }

    /// Детализированное сообщение для логов.
    fn log_message(&self) -> String {
        format!("{self:?}")
    }

    /// Поля для структурированного лога (`tracing`).
    fn log_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("error_type", self.type_name()),
            ("status_code", self.status_code().code().to_string()),
        ]
    }

    /// Короткое имя типа ошибки.
    fn type_name(&self) -> String {
        std::any::type_name::<Self>()
            .rsplit("::")
            .next()
            .unwrap_or("Unknown")
            .to_string()
    }
}

/// Трейт-расширение для `Result`: превращает ошибку в [`StackError`] и
/// добавляет контекст.
///
/// [`StackError`]: crate::StackError
pub trait ResultExt<T> {
    fn context<C>(
        self,
        ctx: C,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>;

    /// Ленивый вариант: строка контекста строится только при ошибке.
    fn with_context<C, F>(
        self,
        f: F,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<crate::StackError>,
{
    #[track_caller]
    fn context<C>(
        self,
        ctx: C,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>,
    {
        match self {
            Ok(v) => Ok(v),
            Err(e) => Err(e.into().context(ctx)),
        }
    }

    #[track_caller]
    fn with_context<C, F>(
        self,
        f: F,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        match self {
            Ok(v) => Ok(v),
            Err(e) => Err(e.into().context(f())),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
