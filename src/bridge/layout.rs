use std::future::Future;

use dashbus_error::BridgeError;
use serde_json::Value;

use super::{BridgeResult, RemoteBridge};

/// Префикс ключей раскладок в хранилище брокера.
pub const LAYOUT_PREFIX: &str = "layout/";

/// Хранилище раскладок панелей поверх `save`/`load`/`list` брокера.
#[derive(Clone)]
pub struct LayoutStore {
    bridge: RemoteBridge,
}

impl LayoutStore {
    pub fn new(bridge: RemoteBridge) -> Self {
        Self { bridge }
    }

    pub fn save_layout(
        &self,
        name: &str,
        doc: Value,
    ) -> impl Future<Output = BridgeResult<()>> + Send + 'static {
        let key = layout_key(name);
        let bridge = self.bridge.clone();
        async move { bridge.save(key?, doc).await }
    }

    /// Загружает раскладку; `None`, если её нет.
    pub fn load_layout(
        &self,
        name: &str,
    ) -> impl Future<Output = BridgeResult<Option<Value>>> + Send + 'static {
        let key = layout_key(name);
        let bridge = self.bridge.clone();
        async move { bridge.load(key?).await }
    }

    /// Имена сохранённых раскладок без префикса.
    pub fn list_layouts(&self) -> impl Future<Output = BridgeResult<Vec<String>>> + Send + 'static {
        let pending = self.bridge.list(LAYOUT_PREFIX);
        async move { Ok(layout_names(pending.await?)) }
    }
}

fn layout_key(name: &str) -> BridgeResult<String> {
    if name.is_empty() {
        return Err(BridgeError::MalformedCommand {
            reason: "layout name is empty".to_string(),
        });
    }
    Ok(format!("{LAYOUT_PREFIX}{name}"))
}

fn layout_names(keys: Vec<String>) -> Vec<String> {
    keys.into_iter()
        .filter_map(|key| key.strip_prefix(LAYOUT_PREFIX).map(str::to_string))
        .filter(|name| !name.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{bridge::BridgeOptions, bus::LocalBus, scheduler::Scheduler};

    #[test]
    fn test_layout_key() {
        assert_eq!(layout_key("main").unwrap(), "layout/main");
        assert!(matches!(
            layout_key(""),
            Err(BridgeError::MalformedCommand { .. })
        ));
    }

    #[test]
    fn test_layout_names_strip_prefix() {
        let keys = vec![
            "layout/main".to_string(),
            "layout/".to_string(),
            "settings/theme".to_string(),
            "layout/ops/night".to_string(),
        ];
        assert_eq!(layout_names(keys), vec!["main", "ops/night"]);
    }

    /// Тест проверяет, что без соединения операции отклоняются сразу.
    #[tokio::test]
    async fn test_offline_operations_fail_fast() {
        let bus = LocalBus::new();
        let sched = Scheduler::default();
        let bridge = RemoteBridge::spawn(
            bus,
            &sched,
            BridgeOptions {
                auto_connect: false,
                forward_patterns: Vec::new(),
                ..BridgeOptions::default()
            },
        );
        let store = LayoutStore::new(bridge.clone());

        assert_eq!(
            store.save_layout("main", json!({"w": 3})).await,
            Err(BridgeError::NotConnected)
        );
        assert_eq!(store.load_layout("main").await, Err(BridgeError::NotConnected));
        assert_eq!(store.list_layouts().await, Err(BridgeError::NotConnected));
        assert!(matches!(
            store.load_layout("").await,
            Err(BridgeError::MalformedCommand { .. })
        ));

        bridge.shutdown().await;
    }
}
