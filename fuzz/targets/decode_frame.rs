#![no_main]

use dashbus::bridge::{Inbound, Verb};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Разбор никогда не паникует: любой вход либо фрейм, либо ошибка.
    let Ok(inbound) = Inbound::decode_bytes(data) else {
        return;
    };

    match inbound {
        Inbound::Push { topic, .. } => assert!(!topic.is_empty()),
        Inbound::Reply(reply) => {
            let wire = serde_json::to_value(reply.verb).unwrap();
            let back: Verb = serde_json::from_value(wire).unwrap();
            assert_eq!(back, reply.verb);
        }
    }
});
