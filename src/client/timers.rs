//! Single-shot timers driving outbound presence traffic.
//!
//! Both timers spawn onto the current tokio runtime and must be used from
//! within one.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct ThrottleState<T> {
    last_fire: Option<Instant>,
    pending: Option<T>,
    timer: Option<JoinHandle<()>>,
    disposed: bool,
}

/// Trailing-edge throttle.
///
/// The first call in a quiet period fires at once. Calls made before the
/// interval has elapsed are collapsed into one deferred call at the interval
/// boundary, carrying the latest value.
pub struct Throttle<T: Send + 'static> {
    interval: Duration,
    state: Arc<Mutex<ThrottleState<T>>>,
    emit: Arc<dyn Fn(T) + Send + Sync>,
}

impl<T: Send + 'static> Throttle<T> {
    pub fn new(interval: Duration, emit: impl Fn(T) + Send + Sync + 'static) -> Self {
        Self {
            interval,
            state: Arc::new(Mutex::new(ThrottleState {
                last_fire: None,
                pending: None,
                timer: None,
                disposed: false,
            })),
            emit: Arc::new(emit),
        }
    }

    pub fn call(&self, value: T) {
        let mut state = lock(&self.state);
        if state.disposed {
            return;
        }
        if state.timer.is_some() {
            state.pending = Some(value);
            return;
        }

        let now = Instant::now();
        let due = state.last_fire.map(|last| last + self.interval);
        match due {
            Some(due) if now < due => {
                state.pending = Some(value);
                state.timer = Some(self.schedule(due));
            }
            _ => {
                state.last_fire = Some(now);
                drop(state);
                (self.emit)(value);
            }
        }
    }

    fn schedule(&self, due: Instant) -> JoinHandle<()> {
        let state = Arc::clone(&self.state);
        let emit = Arc::clone(&self.emit);
        tokio::spawn(async move {
            time::sleep_until(due).await;
            let value = {
                let mut state = lock(&state);
                state.timer = None;
                state.last_fire = Some(Instant::now());
                state.pending.take()
            };
            if let Some(value) = value {
                emit(value);
            }
        })
    }

    /// Whether a deferred call is waiting for the interval boundary.
    pub fn is_armed(&self) -> bool {
        lock(&self.state).timer.is_some()
    }

    /// Cancel the deferred call, if any. Later calls still work.
    pub fn disarm(&self) {
        let mut state = lock(&self.state);
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.pending = None;
    }

    /// Cancel the deferred call and ignore all further calls.
    pub fn dispose(&self) {
        self.disarm();
        lock(&self.state).disposed = true;
    }
}

impl<T: Send + 'static> Drop for Throttle<T> {
    fn drop(&mut self) {
        self.disarm();
    }
}

/// Debounce: fires `on_idle` once `timeout` has passed since the last `arm`.
pub struct IdleTimer {
    timeout: Duration,
    on_idle: Arc<dyn Fn() + Send + Sync>,
    timer: Mutex<Option<JoinHandle<()>>>,
    disposed: Mutex<bool>,
}

impl IdleTimer {
    pub fn new(timeout: Duration, on_idle: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            timeout,
            on_idle: Arc::new(on_idle),
            timer: Mutex::new(None),
            disposed: Mutex::new(false),
        }
    }

    /// (Re)start the countdown.
    pub fn arm(&self) {
        if *lock(&self.disposed) {
            return;
        }
        let on_idle = Arc::clone(&self.on_idle);
        let timeout = self.timeout;
        let handle = tokio::spawn(async move {
            time::sleep(timeout).await;
            on_idle();
        });
        if let Some(previous) = lock(&self.timer).replace(handle) {
            previous.abort();
        }
    }

    pub fn disarm(&self) {
        if let Some(timer) = lock(&self.timer).take() {
            timer.abort();
        }
    }

    pub fn dispose(&self) {
        *lock(&self.disposed) = true;
        self.disarm();
    }
}

impl Drop for IdleTimer {
    fn drop(&mut self) {
        self.disarm();
    }
}
