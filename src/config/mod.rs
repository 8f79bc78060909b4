//! Многоуровневые настройки: значения по умолчанию, файл, окружение.

pub mod settings;

pub use settings::*;
