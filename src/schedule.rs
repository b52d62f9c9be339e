//! Cooperative scheduling primitives
//!
//! Everything runs on the UI thread. Timers are polled with an explicit
//! `now` so that the frame loop (or a test) drives time.

use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

/// Trailing-edge debounce: every trigger inside the window pushes the
/// deadline back; the action fires once after the window has been quiet.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    pub fn trigger(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    /// True exactly once when a pending trigger is due.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(d) if now >= d => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

/// Debounced value: only the latest pushed value is delivered.
#[derive(Debug, Clone)]
pub struct Debounced<T> {
    timer: Debouncer,
    pending: Option<T>,
}

impl<T> Debounced<T> {
    pub fn new(delay: Duration) -> Self {
        Self {
            timer: Debouncer::new(delay),
            pending: None,
        }
    }

    pub fn push(&mut self, value: T, now: Instant) {
        self.pending = Some(value);
        self.timer.trigger(now);
    }

    pub fn poll(&mut self, now: Instant) -> Option<T> {
        if self.timer.poll(now) {
            self.pending.take()
        } else {
            None
        }
    }

    pub fn cancel(&mut self) {
        self.timer.cancel();
        self.pending = None;
    }

    pub fn is_pending(&self) -> bool {
        self.timer.is_pending()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.timer.deadline()
    }
}

/// Leading + trailing throttle: at most one run per interval, and a call
/// made during the interval runs once when it ends.
#[derive(Debug, Clone)]
pub struct Throttler {
    interval: Duration,
    last_run: Option<Instant>,
    trailing: bool,
}

impl Throttler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_run: None,
            trailing: false,
        }
    }

    /// Request a run; true when it may run right now.
    pub fn call(&mut self, now: Instant) -> bool {
        match self.last_run {
            Some(last) if now.duration_since(last) < self.interval => {
                self.trailing = true;
                false
            }
            _ => {
                self.last_run = Some(now);
                self.trailing = false;
                true
            }
        }
    }

    /// True when a deferred run is due.
    pub fn poll(&mut self, now: Instant) -> bool {
        if !self.trailing {
            return false;
        }
        match self.last_run {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.trailing = false;
                self.last_run = Some(now);
                true
            }
        }
    }

    pub fn cancel(&mut self) {
        self.trailing = false;
    }

    pub fn is_pending(&self) -> bool {
        self.trailing
    }
}

/// Generation counter for animation loops. Starting a loop invalidates the
/// previous one so two loops never draw to the same surface.
#[derive(Debug, Clone, Default)]
pub struct LoopGuard {
    generation: u64,
    running: bool,
}

impl LoopGuard {
    pub fn start(&mut self) -> u64 {
        self.generation += 1;
        self.running = true;
        self.generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.running && self.generation == generation
    }

    pub fn finish(&mut self, generation: u64) {
        if self.generation == generation {
            self.running = false;
        }
    }

    pub fn cancel(&mut self) {
        self.generation += 1;
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

/// Input events shared between components.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    Resize { width: f32, height: f32 },
    /// A click that landed outside the subscriber's area (closes menus).
    ClickOutside,
    KeyPressed(String),
}

pub type SubscriberId = u64;

/// Process-wide input event bus with explicit subscribe / unsubscribe.
#[derive(Debug, Default)]
pub struct EventBus {
    next_id: SubscriberId,
    queues: BTreeMap<SubscriberId, (String, VecDeque<InputEvent>)>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, owner: &str) -> SubscriberId {
        self.next_id += 1;
        self.queues.insert(self.next_id, (owner.to_string(), VecDeque::new()));
        tracing::debug!("Event bus: '{}' subscribed as {}", owner, self.next_id);
        self.next_id
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) {
        if let Some((owner, _)) = self.queues.remove(&id) {
            tracing::debug!("Event bus: '{}' unsubscribed", owner);
        }
    }

    pub fn publish(&mut self, event: InputEvent) {
        for (_, queue) in self.queues.values_mut() {
            queue.push_back(event.clone());
        }
    }

    pub fn drain(&mut self, id: SubscriberId) -> Vec<InputEvent> {
        match self.queues.get_mut(&id) {
            Some((_, queue)) => queue.drain(..).collect(),
            None => Vec::new(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.queues.len()
    }
}
