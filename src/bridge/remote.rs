use std::{
    collections::BTreeMap,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use dashbus_error::BridgeError;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::{
    net::TcpStream,
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
    time::timeout,
};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message as WsMessage},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, trace, warn};

use super::{
    correlator::{Correlator, Responder},
    frame::{Command, Inbound, Reply, Verb},
    state::{LinkState, LinkStatus},
    BridgeResult,
};
use crate::{
    bus::{HandlerResult, LocalBus, Message, SubscriptionId},
    error::log_error,
    scheduler::{Scheduler, Timer, TimerMode},
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Топик состояния соединения по умолчанию.
pub const DEFAULT_LINK_TOPIC: &str = "src/dashboard/link";

/// Параметры моста.
#[derive(Debug, Clone)]
pub struct BridgeOptions {
    /// Переподключаться автоматически после разрыва.
    pub auto_connect: bool,
    /// Период попыток переподключения.
    pub retry_interval: Duration,
    /// Ограничение на одну попытку подключения.
    pub connect_timeout: Duration,
    /// Шаблоны локальных топиков, пересылаемых брокеру.
    pub forward_patterns: Vec<String>,
    /// Топик шины для изменений состояния соединения, например
    /// `{"state": "connected", "url": "...", "error": null}`.
    pub link_topic: Option<String>,
}

/// Мост между [`LocalBus`] и удалённым брокером.
///
/// Сокет, очередь ожидающих запросов и реестр удалённых подписок
/// принадлежат одной фоновой задаче; клонируемый дескриптор передаёт ей
/// команды через неограниченный канал, поэтому порядок вызовов совпадает с
/// порядком отправки.
#[derive(Clone)]
pub struct RemoteBridge {
    link: Link,
    bus: LocalBus,
    shared: Arc<Shared>,
}

/// Будущий ответ брокера на запрос.
///
/// Ограничения по времени нет: если ожидание должно быть ограничено,
/// оборачивайте в `tokio::time::timeout` или используйте таймер
/// планировщика.
#[must_use = "a reply is delivered only when awaited"]
pub struct PendingReply {
    state: PendingState,
}

enum PendingState {
    Ready(Option<BridgeError>),
    Waiting(oneshot::Receiver<BridgeResult<Reply>>),
}

#[derive(Clone)]
struct Link {
    commands: mpsc::UnboundedSender<BridgeCmd>,
    status: watch::Receiver<LinkStatus>,
}

struct Shared {
    actor: Mutex<Option<JoinHandle<()>>>,
    retry_timer: Option<Timer>,
    forward_ids: Vec<SubscriptionId>,
}

enum BridgeCmd {
    Connect {
        url: String,
        responder: oneshot::Sender<BridgeResult<()>>,
    },
    Disconnect {
        responder: oneshot::Sender<()>,
    },
    Request {
        command: Command,
        responder: Responder,
    },
    Track {
        id: SubscriptionId,
        pattern: String,
    },
    Untrack {
        id: SubscriptionId,
    },
    Retry,
    Shutdown,
}

enum Event {
    Command(Option<BridgeCmd>),
    Frame(Option<Result<WsMessage, WsError>>),
}

struct Actor {
    commands: mpsc::UnboundedReceiver<BridgeCmd>,
    socket: Option<WsStream>,
    url: Option<String>,
    correlator: Correlator,
    remote_subs: BTreeMap<SubscriptionId, String>,
    bus: LocalBus,
    status: watch::Sender<LinkStatus>,
    link_topic: Option<Arc<str>>,
    auto_connect: bool,
    deliberately_closed: bool,
    connect_timeout: Duration,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            auto_connect: true,
            retry_interval: Duration::from_millis(3000),
            connect_timeout: Duration::from_millis(5000),
            forward_patterns: vec!["dst/**".to_string()],
            link_topic: Some(DEFAULT_LINK_TOPIC.to_string()),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// RemoteBridge
////////////////////////////////////////////////////////////////////////////////

impl RemoteBridge {
    /// Создаёт мост и запускает его фоновую задачу.
    ///
    /// Должен вызываться внутри runtime tokio. Если включено
    /// автоподключение, в `scheduler` регистрируется непрерывный таймер,
    /// который будит задачу, пока соединение разорвано. Каждое изменение
    /// состояния соединения публикуется на шине в `link_topic`.
    pub fn spawn(
        bus: LocalBus,
        scheduler: &Scheduler,
        options: BridgeOptions,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(LinkStatus::default());
        let link = Link {
            commands: cmd_tx,
            status: status_rx,
        };

        let actor = Actor {
            commands: cmd_rx,
            socket: None,
            url: None,
            correlator: Correlator::new(),
            remote_subs: BTreeMap::new(),
            bus: bus.clone(),
            status: status_tx,
            link_topic: options.link_topic.as_deref().map(Arc::from),
            auto_connect: options.auto_connect,
            deliberately_closed: false,
            connect_timeout: options.connect_timeout,
        };
        let handle = tokio::spawn(actor.run());

        let retry_timer = options.auto_connect.then(|| {
            let link = link.clone();
            scheduler.add_timer(options.retry_interval, TimerMode::Continuous, move || {
                if link.state() == LinkState::Disconnected {
                    let _ = link.send(BridgeCmd::Retry);
                }
            })
        });

        let forward_ids = options
            .forward_patterns
            .iter()
            .map(|pattern| {
                let link = link.clone();
                bus.subscribe(pattern.as_str(), move |msg| link.forward(msg))
            })
            .collect();

        Self {
            link,
            bus,
            shared: Arc::new(Shared {
                actor: Mutex::new(Some(handle)),
                retry_timer,
                forward_ids,
            }),
        }
    }

    pub fn bus(&self) -> &LocalBus {
        &self.bus
    }

    /// Подключается к брокеру.
    ///
    /// Снимает запрет на автоподключение, установленный `disconnect`.
    pub fn connect(
        &self,
        url: impl Into<String>,
    ) -> impl Future<Output = BridgeResult<()>> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        let sent = self.link.send(BridgeCmd::Connect {
            url: url.into(),
            responder: tx,
        });
        async move {
            sent?;
            rx.await.unwrap_or(Err(BridgeError::Shutdown))
        }
    }

    /// Закрывает соединение и отключает автоподключение до следующего
    /// `connect`. Ожидающие запросы отклоняются.
    pub fn disconnect(&self) -> impl Future<Output = ()> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        let sent = self.link.send(BridgeCmd::Disconnect { responder: tx });
        async move {
            if sent.is_ok() {
                let _ = rx.await;
            }
        }
    }

    /// Отправляет команду и возвращает будущий ответ.
    ///
    /// Некорректная команда или отсутствие соединения отклоняются сразу, без
    /// обращения к сокету и очереди. Ответы сопоставляются с запросами в
    /// порядке отправки.
    pub fn request(
        &self,
        command: Command,
    ) -> PendingReply {
        if let Err(e) = command.validate() {
            return PendingReply::failed(e);
        }
        if !self.link.is_connected() {
            return PendingReply::failed(BridgeError::NotConnected);
        }

        let (tx, rx) = oneshot::channel();
        match self.link.send(BridgeCmd::Request {
            command,
            responder: Responder::Caller(tx),
        }) {
            Ok(()) => PendingReply::waiting(rx),
            Err(e) => PendingReply::failed(e),
        }
    }

    /// Публикует значение у брокера без ожидания ответа.
    ///
    /// Отказ только логируется.
    pub fn publish(
        &self,
        topic: impl Into<String>,
        payload: Value,
    ) {
        let command = Command::Publish {
            topic: topic.into(),
            payload,
        };
        if let Err(e) = self.link.request_detached(command) {
            log_error(&e, "publish dropped");
        }
    }

    pub fn save(
        &self,
        key: impl Into<String>,
        value: Value,
    ) -> impl Future<Output = BridgeResult<()>> + Send + 'static {
        let pending = self.request(Command::Save {
            key: key.into(),
            payload: value,
        });
        async move { pending.await.map(|_| ()) }
    }

    /// Читает значение по ключу; `None`, если ключа нет.
    pub fn load(
        &self,
        key: impl Into<String>,
    ) -> impl Future<Output = BridgeResult<Option<Value>>> + Send + 'static {
        let pending = self.request(Command::Load { key: key.into() });
        async move {
            let reply = pending.await?;
            Ok(reply.value.filter(|v| !v.is_null()))
        }
    }

    /// Перечисляет ключи с заданным префиксом.
    pub fn list(
        &self,
        prefix: impl Into<String>,
    ) -> impl Future<Output = BridgeResult<Vec<String>>> + Send + 'static {
        let pending = self.request(Command::List { key: prefix.into() });
        async move { keys_from_reply(pending.await?) }
    }

    /// Подписывается на шаблон локально и у брокера.
    ///
    /// Подписка у брокера переживает переподключения: после каждого
    /// подключения шаблон подписывается заново.
    pub fn subscribe<F>(
        &self,
        pattern: impl Into<String>,
        handler: F,
    ) -> SubscriptionId
    where
        F: Fn(&Message) -> HandlerResult + Send + Sync + 'static,
    {
        let pattern = pattern.into();
        let id = self.bus.subscribe(pattern.as_str(), handler);
        if let Err(e) = self.link.send(BridgeCmd::Track { id, pattern }) {
            debug!(subscription = %id, error = %e, "remote subscription not tracked");
        }
        id
    }

    /// Снимает подписку, созданную [`RemoteBridge::subscribe`].
    pub fn unsubscribe(
        &self,
        id: SubscriptionId,
    ) -> bool {
        let removed = self.bus.unsubscribe(id);
        if removed {
            let _ = self.link.send(BridgeCmd::Untrack { id });
        }
        removed
    }

    pub fn status(&self) -> LinkStatus {
        self.link.status.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    /// Поток изменений состояния соединения.
    pub fn state_changes(&self) -> watch::Receiver<LinkStatus> {
        self.link.status.clone()
    }

    /// Ждёт состояния `Connected`.
    pub async fn wait_connected(&self) -> BridgeResult<()> {
        let mut rx = self.link.status.clone();
        rx.wait_for(|s| s.is_connected())
            .await
            .map(|_| ())
            .map_err(|_| BridgeError::Shutdown)
    }

    /// Останавливает фоновую задачу; всё, что ещё ожидает ответа,
    /// отклоняется с [`BridgeError::Shutdown`].
    pub async fn shutdown(&self) {
        if let Some(timer) = &self.shared.retry_timer {
            timer.dispose();
        }
        for id in &self.shared.forward_ids {
            self.bus.unsubscribe(*id);
        }
        let _ = self.link.send(BridgeCmd::Shutdown);

        let handle = self.shared.actor.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "bridge task failed");
            }
        }
    }
}

fn keys_from_reply(reply: Reply) -> BridgeResult<Vec<String>> {
    let unexpected = |reason: String| BridgeError::UnexpectedReply {
        verb: Verb::List.to_string(),
        reason,
    };
    match reply.value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(key) => Ok(key),
                other => Err(unexpected(format!("expected string key, got {other}"))),
            })
            .collect(),
        Some(other) => Err(unexpected(format!("expected array of keys, got {other}"))),
    }
}

////////////////////////////////////////////////////////////////////////////////
// PendingReply
////////////////////////////////////////////////////////////////////////////////

impl PendingReply {
    fn failed(err: BridgeError) -> Self {
        Self {
            state: PendingState::Ready(Some(err)),
        }
    }

    fn waiting(rx: oneshot::Receiver<BridgeResult<Reply>>) -> Self {
        Self {
            state: PendingState::Waiting(rx),
        }
    }
}

impl Future for PendingReply {
    type Output = BridgeResult<Reply>;

    fn poll(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Self::Output> {
        match &mut self.state {
            PendingState::Ready(err) => Poll::Ready(Err(err.take().unwrap_or(BridgeError::Shutdown))),
            PendingState::Waiting(rx) => Pin::new(rx)
                .poll(cx)
                .map(|res| res.unwrap_or(Err(BridgeError::Shutdown))),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Link
////////////////////////////////////////////////////////////////////////////////

impl Link {
    fn send(
        &self,
        cmd: BridgeCmd,
    ) -> BridgeResult<()> {
        self.commands.send(cmd).map_err(|_| BridgeError::Shutdown)
    }

    fn state(&self) -> LinkState {
        self.status.borrow().state
    }

    fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    fn request_detached(
        &self,
        command: Command,
    ) -> BridgeResult<()> {
        command.validate()?;
        if !self.is_connected() {
            return Err(BridgeError::NotConnected);
        }
        self.send(BridgeCmd::Request {
            command,
            responder: Responder::Detached,
        })
    }

    /// Обработчик шины для пересылаемых шаблонов.
    fn forward(
        &self,
        msg: &Message,
    ) -> HandlerResult {
        if msg.is_remote() {
            return Ok(());
        }
        if !self.is_connected() {
            trace!(topic = %msg.topic, "not forwarded, link is down");
            return Ok(());
        }
        let command = Command::Publish {
            topic: msg.topic.to_string(),
            payload: msg.payload.clone(),
        };
        if let Err(e) = self.request_detached(command) {
            debug!(topic = %msg.topic, error = %e, "not forwarded");
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Actor
////////////////////////////////////////////////////////////////////////////////

impl Actor {
    async fn run(mut self) {
        loop {
            let event = match self.socket.as_mut() {
                Some(ws) => tokio::select! {
                    cmd = self.commands.recv() => Event::Command(cmd),
                    frame = ws.next() => Event::Frame(frame),
                },
                None => Event::Command(self.commands.recv().await),
            };

            match event {
                Event::Command(None) | Event::Command(Some(BridgeCmd::Shutdown)) => break,
                Event::Command(Some(cmd)) => self.handle_command(cmd).await,
                Event::Frame(frame) => self.handle_frame(frame).await,
            }
        }

        if let Some(mut ws) = self.socket.take() {
            let _ = ws.close(None).await;
        }
        let rejected = self.correlator.reject_all(&BridgeError::Shutdown);
        self.set_state(LinkState::Disconnected, None);
        info!(rejected, "bridge stopped");
    }

    async fn handle_command(
        &mut self,
        cmd: BridgeCmd,
    ) {
        match cmd {
            BridgeCmd::Connect { url, responder } => {
                let result = self.connect(url).await;
                let _ = responder.send(result);
            }
            BridgeCmd::Disconnect { responder } => {
                self.deliberately_closed = true;
                if let Some(mut ws) = self.socket.take() {
                    let _ = ws.close(None).await;
                    let rejected = self.correlator.reject_all(&BridgeError::ConnectionLost {
                        reason: "disconnected by client".to_string(),
                    });
                    self.set_state(LinkState::Disconnected, None);
                    info!(rejected, "disconnected from broker");
                }
                let _ = responder.send(());
            }
            BridgeCmd::Request { command, responder } => self.send_request(command, responder).await,
            BridgeCmd::Track { id, pattern } => {
                let first = !self.remote_subs.values().any(|p| *p == pattern);
                self.remote_subs.insert(id, pattern.clone());
                if first && self.socket.is_some() {
                    self.send_request(Command::Subscribe { topic: pattern }, Responder::Detached)
                        .await;
                }
            }
            BridgeCmd::Untrack { id } => {
                let Some(pattern) = self.remote_subs.remove(&id) else {
                    return;
                };
                let last = !self.remote_subs.values().any(|p| *p == pattern);
                if last && self.socket.is_some() {
                    self.send_request(Command::Unsubscribe { topic: pattern }, Responder::Detached)
                        .await;
                }
            }
            BridgeCmd::Retry => {
                if self.socket.is_some() || !self.auto_connect || self.deliberately_closed {
                    return;
                }
                if let Some(url) = self.url.clone() {
                    debug!(url = %url, "reconnecting");
                    let _ = self.connect(url).await;
                }
            }
            BridgeCmd::Shutdown => {}
        }
    }

    async fn connect(
        &mut self,
        url: String,
    ) -> BridgeResult<()> {
        self.deliberately_closed = false;
        if self.socket.is_some() {
            if self.url.as_deref() == Some(url.as_str()) {
                return Ok(());
            }
            if let Some(mut ws) = self.socket.take() {
                let _ = ws.close(None).await;
            }
            self.link_down(BridgeError::ConnectionLost {
                reason: format!("switching to {url}"),
            });
        }

        self.url = Some(url.clone());
        self.set_state(LinkState::Connecting, None);

        let err = match timeout(self.connect_timeout, connect_async(url.as_str())).await {
            Ok(Ok((ws, _response))) => {
                self.socket = Some(ws);
                self.set_state(LinkState::Connected, None);
                info!(url = %url, "connected to broker");
                self.replay_subscriptions().await;
                return Ok(());
            }
            Ok(Err(e)) => BridgeError::ConnectFailed {
                url,
                reason: e.to_string(),
            },
            Err(_) => BridgeError::ConnectFailed {
                url,
                reason: format!("timed out after {}ms", self.connect_timeout.as_millis()),
            },
        };

        log_error(&err, "connect attempt failed");
        self.set_state(LinkState::Disconnected, Some(err.clone()));
        Err(err)
    }

    /// Повторяет подписки у брокера: по одной команде на шаблон в порядке
    /// первой регистрации.
    async fn replay_subscriptions(&mut self) {
        let mut patterns: Vec<String> = Vec::new();
        for pattern in self.remote_subs.values() {
            if !patterns.contains(pattern) {
                patterns.push(pattern.clone());
            }
        }
        debug!(count = patterns.len(), "replaying remote subscriptions");

        for pattern in patterns {
            if self.socket.is_none() {
                break;
            }
            self.send_request(Command::Subscribe { topic: pattern }, Responder::Detached)
                .await;
        }
    }

    async fn send_request(
        &mut self,
        command: Command,
        responder: Responder,
    ) {
        let Some(ws) = self.socket.as_mut() else {
            responder.reject(BridgeError::NotConnected);
            return;
        };
        let text = match command.encode() {
            Ok(text) => text,
            Err(e) => {
                responder.reject(e);
                return;
            }
        };

        self.correlator.enqueue(command.verb(), responder);
        trace!(verb = %command.verb(), "sending command");
        let sent = ws.send(WsMessage::text(text)).await;
        if let Err(e) = sent {
            self.link_down(BridgeError::ConnectionLost {
                reason: e.to_string(),
            });
        }
    }

    async fn handle_frame(
        &mut self,
        frame: Option<Result<WsMessage, WsError>>,
    ) {
        match frame {
            Some(Ok(WsMessage::Text(text))) => self.dispatch(Inbound::decode(text.as_str())),
            Some(Ok(WsMessage::Binary(data))) => self.dispatch(Inbound::decode_bytes(&data)),
            Some(Ok(WsMessage::Ping(payload))) => {
                if let Some(ws) = self.socket.as_mut() {
                    let sent = ws.send(WsMessage::Pong(payload)).await;
                    if let Err(e) = sent {
                        self.link_down(BridgeError::ConnectionLost {
                            reason: e.to_string(),
                        });
                    }
                }
            }
            Some(Ok(WsMessage::Pong(_))) | Some(Ok(WsMessage::Frame(_))) => {}
            Some(Ok(WsMessage::Close(frame))) => {
                let reason = frame
                    .map(|f| f.reason.to_string())
                    .filter(|r| !r.is_empty())
                    .unwrap_or_else(|| "closed by broker".to_string());
                self.link_down(BridgeError::ConnectionLost { reason });
            }
            Some(Err(e)) => self.link_down(BridgeError::ConnectionLost {
                reason: e.to_string(),
            }),
            None => self.link_down(BridgeError::ConnectionLost {
                reason: "stream ended".to_string(),
            }),
        }
    }

    fn dispatch(
        &mut self,
        inbound: BridgeResult<Inbound>,
    ) {
        match inbound {
            Ok(Inbound::Push { topic, payload }) => {
                self.bus.publish_message(Message::remote(topic, payload));
            }
            Ok(Inbound::Reply(reply)) => {
                self.correlator.resolve(reply);
            }
            Err(e) => log_error(&e, "dropping malformed frame"),
        }
    }

    /// Соединение потеряно: все ожидающие запросы отклоняются одной
    /// партией, подписки сохраняются для повтора.
    fn link_down(
        &mut self,
        err: BridgeError,
    ) {
        self.socket = None;
        self.set_state(LinkState::Disconnected, Some(err.clone()));
        let rejected = self.correlator.reject_all(&err);
        log_error(&err, "link to broker lost");
        debug!(rejected, "pending requests rejected");
    }

    fn set_state(
        &self,
        state: LinkState,
        last_error: Option<BridgeError>,
    ) {
        let prev = self.status.borrow().state;
        if prev != state && !prev.can_transition_to(state) {
            debug!(from = %prev, to = %state, "unexpected link transition");
        }
        let error = last_error.as_ref().map(ToString::to_string);
        self.status.send_replace(LinkStatus { state, last_error });
        if prev == state {
            return;
        }
        debug!(from = %prev, to = %state, "link state changed");

        if let Some(topic) = &self.link_topic {
            self.bus.publish(
                topic.clone(),
                json!({
                    "state": state.to_string(),
                    "url": self.url,
                    "error": error,
                }),
            );
        }
    }
}
