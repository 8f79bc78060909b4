use std::sync::Arc;

use parking_lot::ReentrantMutex;

/// Общий замок вызова колбэков.
///
/// Обработчики шины и колбэки таймеров, разделяющие один `Dispatcher`,
/// никогда не выполняются одновременно, даже если их вызывают разные задачи
/// многопоточного runtime. Замок реентерабелен в пределах потока: обработчик
/// может публиковать в ту же шину, а колбэк таймера вызывать обработчики.
///
/// Клоны разделяют один замок.
#[derive(Clone)]
pub struct Dispatcher {
    gate: Arc<ReentrantMutex<()>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            gate: Arc::new(ReentrantMutex::new(())),
        }
    }

    /// Выполняет `f`, пока ни один другой колбэк этого диспетчера не
    /// выполняется.
    pub fn run<R>(
        &self,
        f: impl FnOnce() -> R,
    ) -> R {
        let _guard = self.gate.lock();
        f()
    }

    /// Разделяют ли два диспетчера один замок.
    pub fn same_as(
        &self,
        other: &Dispatcher,
    ) -> bool {
        Arc::ptr_eq(&self.gate, &other.gate)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        thread,
        time::Duration,
    };

    use super::*;

    /// Тест проверяет, что колбэки из разных потоков не пересекаются, а
    /// вложенный вызов в том же потоке не блокируется.
    #[test]
    fn test_run_is_exclusive_and_reentrant() {
        let dispatcher = Dispatcher::new();
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let dispatcher = dispatcher.clone();
                let active = active.clone();
                let max_active = max_active.clone();
                thread::spawn(move || {
                    for _ in 0..20 {
                        dispatcher.run(|| {
                            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                            max_active.fetch_max(now, Ordering::SeqCst);
                            dispatcher.run(|| thread::sleep(Duration::from_micros(200)));
                            active.fetch_sub(1, Ordering::SeqCst);
                        });
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }

        assert_eq!(max_active.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clones_share_gate() {
        let a = Dispatcher::new();
        assert!(a.same_as(&a.clone()));
        assert!(!a.same_as(&Dispatcher::new()));
    }
}
