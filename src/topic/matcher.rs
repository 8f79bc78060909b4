/// Разделитель сегментов топика.
pub const DELIMITER: char = '/';
/// Шаблон, совпадающий ровно с одним сегментом.
pub const SINGLE_WILDCARD: &str = "*";
/// Шаблон, совпадающий с нулём или более оставшихся сегментов.
pub const RECURSIVE_WILDCARD: &str = "**";

/// Проверяет, совпадает ли топик с шаблоном.
///
/// Правила:
/// - `*` совпадает ровно с одним сегментом (в том числе пустым);
/// - `**` совпадает с нулём или более оставшихся сегментов и завершает
///   сравнение, поэтому `a/**` совпадает и с `a`;
/// - остальные сегменты сравниваются целиком, без частичных совпадений;
/// - `*` внутри топика является обычным символом.
///
/// Функция чистая и может вызываться из любого потока.
pub fn matches(
    pattern: &str,
    topic: &str,
) -> bool {
    let mut p = pattern.split(DELIMITER);
    let mut t = topic.split(DELIMITER);

    loop {
        match (p.next(), t.next()) {
            (Some(RECURSIVE_WILDCARD), _) => return true,
            (Some(SINGLE_WILDCARD), Some(_)) => continue,
            (Some(a), Some(b)) if a == b => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Содержит ли строка хотя бы один сегмент-шаблон (`*` или `**`).
pub fn is_pattern(s: &str) -> bool {
    s.split(DELIMITER)
        .any(|seg| seg == SINGLE_WILDCARD || seg == RECURSIVE_WILDCARD)
}

/// Проверяет, что строку можно использовать как конкретный топик для
/// публикации: она непустая и не содержит сегментов-шаблонов.
pub fn validate_topic(topic: &str) -> Result<(), String> {
    if topic.is_empty() {
        return Err("topic is empty".to_string());
    }
    if is_pattern(topic) {
        return Err(format!("topic '{topic}' contains a wildcard segment"));
    }
    Ok(())
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
