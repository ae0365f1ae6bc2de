use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::client::timers::{IdleTimer, Throttle};
use crate::models::{Indicator, IndicatorKind};

/// Colors handed out to participants, one per session.
pub const DISPLAY_COLORS: [&str; 4] = ["#FF5733", "#33FF57", "#3357FF", "#FF33F5"];

pub fn pick_display_color() -> &'static str {
    let index = (Uuid::new_v4().as_u128() % DISPLAY_COLORS.len() as u128) as usize;
    DISPLAY_COLORS[index]
}

/// Client-side presence timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceConfig {
    /// Minimum spacing between two outbound indicators of the same kind
    pub throttle_interval: Duration,
    /// Pointer inactivity after which the local cursor is re-announced
    pub pointer_idle_timeout: Duration,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            throttle_interval: Duration::from_millis(50),
            pointer_idle_timeout: Duration::from_millis(1000),
        }
    }
}

/// Who is in a document and where their indicators are.
#[derive(Debug, Clone)]
pub struct PresenceTracker {
    self_id: String,
    color: String,
    indicators: BTreeMap<(String, IndicatorKind), Indicator>,
    active: BTreeSet<String>,
}

impl PresenceTracker {
    pub fn new(self_id: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            self_id: self_id.into(),
            color: color.into(),
            indicators: BTreeMap::new(),
            active: BTreeSet::new(),
        }
    }

    pub fn self_id(&self) -> &str {
        &self.self_id
    }

    pub fn color(&self) -> &str {
        &self.color
    }

    /// Store a remote indicator. The latest arrival wins per user and kind;
    /// our own indicators echoed back are ignored.
    pub fn apply_incoming(&mut self, indicator: Indicator) -> bool {
        if indicator.user_id == self.self_id {
            return false;
        }
        self.indicators
            .insert((indicator.user_id.clone(), indicator.kind), indicator);
        true
    }

    pub fn record_join(&mut self, user_id: &str) -> bool {
        self.active.insert(user_id.to_string())
    }

    /// Forget a participant along with every indicator they left behind.
    pub fn record_leave(&mut self, user_id: &str) -> bool {
        self.indicators.retain(|(owner, _), _| owner != user_id);
        self.active.remove(user_id)
    }

    pub fn is_active(&self, user_id: &str) -> bool {
        self.active.contains(user_id)
    }

    pub fn active_users(&self) -> Vec<String> {
        self.active.iter().cloned().collect()
    }

    pub fn indicator(&self, user_id: &str, kind: IndicatorKind) -> Option<&Indicator> {
        self.indicators.get(&(user_id.to_string(), kind))
    }

    pub fn indicators(&self) -> Vec<Indicator> {
        self.indicators.values().cloned().collect()
    }

    pub fn local_cursor(&self, position: usize) -> Indicator {
        Indicator::cursor(self.self_id.clone(), self.color.clone(), position)
    }

    pub fn local_pointer(&self, x: f64, y: f64) -> Indicator {
        Indicator::pointer(self.self_id.clone(), self.color.clone(), x, y)
    }
}

/// Outbound side of presence: one throttled stream per indicator kind, plus
/// the idle timer that re-announces the cursor once the pointer rests.
pub struct PresenceEmitter {
    cursor: Throttle<Indicator>,
    pointer: Throttle<Indicator>,
    idle: IdleTimer,
    last_cursor: Arc<Mutex<Option<Indicator>>>,
}

impl PresenceEmitter {
    pub fn new(config: PresenceConfig, emit: impl Fn(Indicator) + Send + Sync + 'static) -> Self {
        let emit: Arc<dyn Fn(Indicator) + Send + Sync> = Arc::new(emit);
        let last_cursor: Arc<Mutex<Option<Indicator>>> = Arc::new(Mutex::new(None));

        let idle = {
            let emit = Arc::clone(&emit);
            let last_cursor = Arc::clone(&last_cursor);
            IdleTimer::new(config.pointer_idle_timeout, move || {
                let cursor = last_cursor.lock().unwrap_or_else(PoisonError::into_inner).clone();
                if let Some(mut cursor) = cursor {
                    debug!("Pointer idle, re-announcing cursor at {:?}", cursor.position());
                    cursor.timestamp = chrono::Utc::now().timestamp_millis();
                    emit(cursor);
                }
            })
        };
        let cursor = {
            let emit = Arc::clone(&emit);
            Throttle::new(config.throttle_interval, move |indicator: Indicator| emit(indicator))
        };
        let pointer = Throttle::new(config.throttle_interval, move |indicator: Indicator| emit(indicator));

        Self { cursor, pointer, idle, last_cursor }
    }

    pub fn cursor_moved(&self, indicator: Indicator) {
        *self.last_cursor.lock().unwrap_or_else(PoisonError::into_inner) = Some(indicator.clone());
        self.cursor.call(indicator);
    }

    pub fn pointer_moved(&self, indicator: Indicator) {
        self.pointer.call(indicator);
        self.idle.arm();
    }

    /// Drop anything scheduled; the emitter stays usable.
    pub fn disarm(&self) {
        self.cursor.disarm();
        self.pointer.disarm();
        self.idle.disarm();
    }

    pub fn dispose(&self) {
        self.cursor.dispose();
        self.pointer.dispose();
        self.idle.dispose();
    }
}
