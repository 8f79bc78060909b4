#![no_main]

use dashbus::topic::{is_pattern, matches, validate_topic};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: (&str, &str)| {
    let (pattern, topic) = data;
    let matched = matches(pattern, topic);

    // Шаблон без подстановок совпадает только с самим собой.
    if !is_pattern(pattern) && validate_topic(topic).is_ok() {
        assert_eq!(matched, pattern == topic);
    }
    // `**` совпадает с любым топиком.
    assert!(matches("**", topic));
});
