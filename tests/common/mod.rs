//! Брокер-заглушка на WebSocket и обвязка моста для интеграционных тестов.

#![allow(dead_code)]

use std::{
    collections::BTreeMap,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use dashbus::{
    bridge::{BridgeOptions, RemoteBridge},
    bus::{LocalBus, Message},
    scheduler::{Scheduler, SchedulerTask},
};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::mpsc,
    task::JoinHandle,
    time::timeout,
};
use tokio_tungstenite::{accept_async, tungstenite::Message as WsMessage, WebSocketStream};

pub const WAIT: Duration = Duration::from_secs(5);

/// Что увидел брокер.
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerEvent {
    Connected,
    Frame(Value),
    Closed,
}

enum Control {
    Send(String),
    Drop,
}

type Store = Arc<Mutex<BTreeMap<String, Value>>>;

/// Брокер на случайном порту 127.0.0.1.
///
/// Принимает одно соединение за раз. В режиме автоответа отвечает на
/// каждую команду сразу и хранит ключи в памяти; без автоответа тест сам
/// решает, что и когда отправить.
pub struct MockBroker {
    addr: SocketAddr,
    events: mpsc::UnboundedReceiver<BrokerEvent>,
    control: Arc<Mutex<Option<mpsc::UnboundedSender<Control>>>>,
    auto_reply: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl MockBroker {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (events_tx, events) = mpsc::unbounded_channel();
        let control: Arc<Mutex<Option<mpsc::UnboundedSender<Control>>>> = Arc::default();
        let auto_reply = Arc::new(AtomicBool::new(true));
        let store: Store = Arc::default();

        let task = {
            let control = control.clone();
            let auto_reply = auto_reply.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let Ok(ws) = accept_async(stream).await else {
                        continue;
                    };
                    let (tx, rx) = mpsc::unbounded_channel();
                    *control.lock() = Some(tx);
                    let _ = events_tx.send(BrokerEvent::Connected);
                    serve(ws, rx, &events_tx, &auto_reply, &store).await;
                    let _ = events_tx.send(BrokerEvent::Closed);
                }
            })
        };

        Self {
            addr,
            events,
            control,
            auto_reply,
            task,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn set_auto_reply(
        &self,
        on: bool,
    ) {
        self.auto_reply.store(on, Ordering::SeqCst);
    }

    /// Отправляет фрейм в текущее соединение.
    pub fn send(
        &self,
        frame: Value,
    ) {
        let control = self.control.lock();
        let tx = control.as_ref().expect("no broker connection yet");
        let _ = tx.send(Control::Send(frame.to_string()));
    }

    pub fn push(
        &self,
        topic: &str,
        payload: Value,
    ) {
        self.send(json!({"type": "Publish", "topic": topic, "payload": payload}));
    }

    /// Закрывает текущее соединение со стороны брокера.
    pub fn drop_connection(&self) {
        if let Some(tx) = self.control.lock().as_ref() {
            let _ = tx.send(Control::Drop);
        }
    }

    pub async fn next_event(&mut self) -> BrokerEvent {
        timeout(WAIT, self.events.recv())
            .await
            .expect("broker event timed out")
            .expect("broker stopped")
    }

    /// Следующий принятый фрейм; события соединения пропускаются.
    pub async fn next_frame(&mut self) -> Value {
        loop {
            if let BrokerEvent::Frame(frame) = self.next_event().await {
                return frame;
            }
        }
    }

    pub async fn expect_connected(&mut self) {
        loop {
            if self.next_event().await == BrokerEvent::Connected {
                return;
            }
        }
    }

    pub async fn expect_closed(&mut self) {
        loop {
            if self.next_event().await == BrokerEvent::Closed {
                return;
            }
        }
    }

    /// Проверяет, что за `dur` брокер ничего не получил.
    pub async fn assert_quiet(
        &mut self,
        dur: Duration,
    ) {
        if let Ok(Some(event)) = timeout(dur, self.events.recv()).await {
            panic!("unexpected broker event: {event:?}");
        }
    }
}

impl Drop for MockBroker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    mut ws: WebSocketStream<TcpStream>,
    mut control: mpsc::UnboundedReceiver<Control>,
    events: &mpsc::UnboundedSender<BrokerEvent>,
    auto_reply: &AtomicBool,
    store: &Store,
) {
    loop {
        let event = tokio::select! {
            frame = ws.next() => Step::Frame(frame),
            cmd = control.recv() => Step::Control(cmd),
        };

        match event {
            Step::Frame(Some(Ok(WsMessage::Text(text)))) => {
                let Ok(value) = serde_json::from_str::<Value>(text.as_str()) else {
                    continue;
                };
                let _ = events.send(BrokerEvent::Frame(value.clone()));
                if auto_reply.load(Ordering::SeqCst) {
                    let reply = reply_for(&value, store);
                    if ws.send(WsMessage::text(reply.to_string())).await.is_err() {
                        return;
                    }
                }
            }
            Step::Frame(Some(Ok(WsMessage::Close(_)))) | Step::Frame(Some(Err(_))) | Step::Frame(None) => {
                return
            }
            Step::Frame(Some(Ok(_))) => {}
            Step::Control(Some(Control::Send(text))) => {
                if ws.send(WsMessage::text(text)).await.is_err() {
                    return;
                }
            }
            Step::Control(Some(Control::Drop)) | Step::Control(None) => {
                let _ = ws.close(None).await;
                return;
            }
        }
    }
}

enum Step {
    Frame(Option<Result<WsMessage, tokio_tungstenite::tungstenite::Error>>),
    Control(Option<Control>),
}

fn reply_for(
    frame: &Value,
    store: &Store,
) -> Value {
    let verb = frame["type"].as_str().unwrap_or_default();
    let key = frame["key"].as_str().unwrap_or_default().to_string();
    match verb {
        "Save" => {
            store.lock().insert(key.clone(), frame["payload"].clone());
            json!({"reply": "Save", "key": key})
        }
        "Load" => {
            let value = store.lock().get(&key).cloned().unwrap_or(Value::Null);
            json!({"reply": "Load", "key": key, "value": value})
        }
        "List" => {
            let keys: Vec<String> = store
                .lock()
                .keys()
                .filter(|k| k.starts_with(&key))
                .cloned()
                .collect();
            json!({"reply": "List", "key": key, "value": keys})
        }
        other => json!({"reply": other, "topic": frame["topic"]}),
    }
}

/// Мост с планировщиком, тикающим каждые 10 мс.
pub struct Harness {
    pub bus: LocalBus,
    pub scheduler: Scheduler,
    pub bridge: RemoteBridge,
    task: SchedulerTask,
}

impl Harness {
    pub fn new(options: BridgeOptions) -> Self {
        let bus = LocalBus::new();
        let scheduler = Scheduler::with_dispatcher(Duration::from_millis(10), bus.dispatcher().clone());
        let task = scheduler.spawn();
        let bridge = RemoteBridge::spawn(bus.clone(), &scheduler, options);
        Self {
            bus,
            scheduler,
            bridge,
            task,
        }
    }

    /// Без автоподключения, пересылки и публикации состояния соединения.
    pub fn manual() -> Self {
        Self::new(BridgeOptions {
            auto_connect: false,
            forward_patterns: Vec::new(),
            link_topic: None,
            ..BridgeOptions::default()
        })
    }

    pub async fn connect(
        &self,
        broker: &mut MockBroker,
    ) {
        self.bridge.connect(broker.url()).await.unwrap();
        broker.expect_connected().await;
    }

    /// Подписчик шины, складывающий сообщения в канал.
    pub fn collect(
        &self,
        pattern: &str,
    ) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.bus.subscribe(pattern, move |msg| {
            let _ = tx.send(msg.clone());
            Ok(())
        });
        rx
    }

    pub async fn shutdown(self) {
        self.bridge.shutdown().await;
        self.task.shutdown().await;
    }
}

pub async fn recv(rx: &mut mpsc::UnboundedReceiver<Message>) -> Message {
    timeout(WAIT, rx.recv())
        .await
        .expect("message timed out")
        .expect("channel closed")
}

/// Адрес, на котором никто не слушает.
pub fn refused_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("ws://127.0.0.1:{port}/ws")
}
