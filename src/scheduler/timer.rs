use std::{
    future::Future,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
    time::Duration,
};

use parking_lot::Mutex;
use tokio::{
    sync::oneshot,
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, trace, warn};

use crate::bus::{local::panic_message, Dispatcher};

/// Разрешение часов планировщика по умолчанию.
pub const DEFAULT_RESOLUTION: Duration = Duration::from_millis(1000);

/// Режим таймера.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerMode {
    /// Срабатывает один раз и останавливается.
    OneShot,
    /// После срабатывания перезапускается на тот же период.
    Continuous,
}

type Callback = Box<dyn FnMut() + Send>;

/// Общие часы с фиксированным разрешением, продвигающие независимые
/// таймеры.
///
/// Каждый тик просматривает таймеры в порядке регистрации по снимку набора,
/// поэтому таймеры, добавленные во время тика, срабатывают не раньше
/// следующего. Колбэки вызываются вне блокировок реестра, так что из
/// колбэка можно останавливать, сбрасывать и удалять любые таймеры, включая
/// собственный. Колбэки выполняются под [`Dispatcher`]: планировщик,
/// созданный через [`Scheduler::with_dispatcher`] с диспетчером шины, не
/// запускает колбэк одновременно с обработчиком этой шины.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

/// Управляющая ссылка на таймер, зарегистрированный в [`Scheduler`].
///
/// Клоны ссылаются на один и тот же таймер.
#[derive(Clone)]
pub struct Timer {
    slot: Arc<TimerSlot>,
    scheduler: Weak<Inner>,
}

/// Фоновая задача, продвигающая планировщик.
pub struct SchedulerTask {
    handle: JoinHandle<()>,
    stop: oneshot::Sender<()>,
}

struct Inner {
    timers: Mutex<Vec<Arc<TimerSlot>>>,
    dispatcher: Dispatcher,
    next_id: AtomicU64,
    resolution: Duration,
}

struct TimerSlot {
    id: u64,
    state: Mutex<TimerState>,
    callback: Mutex<Callback>,
}

struct TimerState {
    period: Duration,
    mode: TimerMode,
    expires_at: Instant,
    running: bool,
    disposed: bool,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Scheduler {
    pub fn new(resolution: Duration) -> Self {
        Self::with_dispatcher(resolution, Dispatcher::new())
    }

    /// Создаёт планировщик, разделяющий замок вызова колбэков с шиной.
    pub fn with_dispatcher(
        resolution: Duration,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                timers: Mutex::new(Vec::new()),
                dispatcher,
                next_id: AtomicU64::new(1),
                resolution,
            }),
        }
    }

    pub fn resolution(&self) -> Duration {
        self.inner.resolution
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    /// Регистрирует таймер. Таймер сразу запущен и впервые сработает через
    /// `period`.
    pub fn add_timer<F>(
        &self,
        period: Duration,
        mode: TimerMode,
        callback: F,
    ) -> Timer
    where
        F: FnMut() + Send + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let slot = Arc::new(TimerSlot {
            id,
            state: Mutex::new(TimerState {
                period,
                mode,
                expires_at: Instant::now() + period,
                running: true,
                disposed: false,
            }),
            callback: Mutex::new(Box::new(callback)),
        });
        self.inner.timers.lock().push(slot.clone());
        debug!(timer = id, period_ms = period.as_millis() as u64, ?mode, "timer added");

        Timer {
            slot,
            scheduler: Arc::downgrade(&self.inner),
        }
    }

    /// Удаляет таймер из планировщика. Повторный вызов ничего не делает.
    pub fn dispose(
        &self,
        timer: &Timer,
    ) {
        self.inner.remove(&timer.slot);
    }

    pub fn timer_count(&self) -> usize {
        self.inner.timers.lock().len()
    }

    /// Один проход часов: срабатывают все запущенные таймеры, чьё время
    /// наступило.
    ///
    /// Возвращает количество сработавших таймеров.
    pub fn tick(&self) -> usize {
        let snapshot: Vec<Arc<TimerSlot>> = self.inner.timers.lock().clone();
        let now = Instant::now();
        let mut fired = 0;

        for slot in snapshot {
            {
                let mut state = slot.state.lock();
                if state.disposed || !state.running || now < state.expires_at {
                    continue;
                }
                // Перевзвод до вызова: stop/reset из колбэка переопределяют его.
                match state.mode {
                    TimerMode::Continuous => state.expires_at = now + state.period,
                    TimerMode::OneShot => state.running = false,
                }
            }

            fired += 1;
            trace!(timer = slot.id, "timer fired");
            self.inner.dispatcher.run(|| {
                let mut callback = slot.callback.lock();
                if let Err(panic) = catch_unwind(AssertUnwindSafe(|| (*callback)())) {
                    warn!(
                        timer = slot.id,
                        reason = %panic_message(&*panic),
                        "timer callback panicked"
                    );
                }
            });
        }

        fired
    }

    /// Продвигает часы с заданным разрешением, пока не завершится `shutdown`.
    ///
    /// Пропущенные тики не догоняются.
    pub async fn run<S>(
        self,
        shutdown: S,
    ) where
        S: Future<Output = ()>,
    {
        let resolution = self.inner.resolution;
        let mut ticker = interval_at(Instant::now() + resolution, resolution);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        debug!(
            resolution_ms = resolution.as_millis() as u64,
            "scheduler started"
        );
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick();
                }
                _ = &mut shutdown => break,
            }
        }
        debug!("scheduler stopped");
    }

    /// Запускает [`Scheduler::run`] в отдельной задаче tokio.
    pub fn spawn(&self) -> SchedulerTask {
        let (stop, stopped) = oneshot::channel();
        let scheduler = self.clone();
        let handle = tokio::spawn(scheduler.run(async move {
            let _ = stopped.await;
        }));
        SchedulerTask { handle, stop }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(DEFAULT_RESOLUTION)
    }
}

impl Inner {
    fn remove(
        &self,
        slot: &Arc<TimerSlot>,
    ) {
        slot.state.lock().disposed = true;
        let mut timers = self.timers.lock();
        if let Some(pos) = timers.iter().position(|t| Arc::ptr_eq(t, slot)) {
            timers.remove(pos);
            debug!(timer = slot.id, "timer disposed");
        }
    }
}

impl Timer {
    pub fn id(&self) -> u64 {
        self.slot.id
    }

    /// Запускает таймер; следующее срабатывание через полный период.
    pub fn start(&self) {
        let mut state = self.slot.state.lock();
        state.running = true;
        state.expires_at = Instant::now() + state.period;
    }

    /// Останавливает таймер, не удаляя его из планировщика.
    pub fn stop(&self) {
        self.slot.state.lock().running = false;
    }

    /// Откладывает следующее срабатывание на полный период от текущего
    /// момента. Флаг запуска не меняется.
    pub fn reset(&self) {
        let mut state = self.slot.state.lock();
        state.expires_at = Instant::now() + state.period;
    }

    /// Удаляет таймер из планировщика.
    pub fn dispose(&self) {
        match self.scheduler.upgrade() {
            Some(inner) => inner.remove(&self.slot),
            None => self.slot.state.lock().disposed = true,
        }
    }

    pub fn is_running(&self) -> bool {
        let state = self.slot.state.lock();
        state.running && !state.disposed
    }

    pub fn is_disposed(&self) -> bool {
        self.slot.state.lock().disposed
    }

    pub fn period(&self) -> Duration {
        self.slot.state.lock().period
    }

    pub fn mode(&self) -> TimerMode {
        self.slot.state.lock().mode
    }
}

impl std::fmt::Debug for Timer {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let state = self.slot.state.lock();
        f.debug_struct("Timer")
            .field("id", &self.slot.id)
            .field("period", &state.period)
            .field("mode", &state.mode)
            .field("running", &state.running)
            .field("disposed", &state.disposed)
            .finish()
    }
}

impl SchedulerTask {
    /// Останавливает задачу и дожидается её завершения.
    pub async fn shutdown(self) {
        let _ = self.stop.send(());
        if let Err(e) = self.handle.await {
            warn!(error = %e, "scheduler task failed");
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
