//! Per-connection outbound event queue.
//!
//! Room actors push events here and never wait: when the queue is full
//! the oldest event is discarded. A slow subscriber therefore loses
//! history instead of stalling the room. Clients recover from a gap using
//! the roster carried by the next event.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tandem_protocol::ServerEvent;
use tokio::sync::Notify;

/// Default number of events buffered per connection.
pub const DEFAULT_OUTBOX_CAPACITY: usize = 64;

/// What happened to a pushed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Queued, after evicting the oldest pending event.
    DroppedOldest,
    /// The outbox is closed; the event was discarded.
    Closed,
}

#[derive(Debug, Default)]
struct State {
    queue: VecDeque<ServerEvent>,
    closed: bool,
}

/// Bounded drop-oldest FIFO with a single async consumer.
#[derive(Debug)]
pub struct Outbox {
    state: Mutex<State>,
    notify: Notify,
    capacity: usize,
}

impl Outbox {
    /// Creates an outbox holding at most `capacity` events (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(State {
                queue: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            notify: Notify::new(),
            capacity,
        }
    }

    // The critical sections below never panic, so a poisoned lock still
    // holds a consistent queue.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends an event without blocking.
    pub fn push(&self, event: ServerEvent) -> PushOutcome {
        let outcome = {
            let mut state = self.lock();
            if state.closed {
                return PushOutcome::Closed;
            }
            let outcome = if state.queue.len() >= self.capacity {
                state.queue.pop_front();
                PushOutcome::DroppedOldest
            } else {
                PushOutcome::Queued
            };
            state.queue.push_back(event);
            outcome
        };
        self.notify.notify_one();
        outcome
    }

    /// Waits for the next event. Returns `None` once the outbox is closed.
    pub async fn next(&self) -> Option<ServerEvent> {
        loop {
            {
                let mut state = self.lock();
                if state.closed {
                    return None;
                }
                if let Some(event) = state.queue.pop_front() {
                    return Some(event);
                }
            }
            // `notify_one` stores a permit when nobody is waiting, so a push
            // that lands between the check above and this await is not lost.
            self.notify.notified().await;
        }
    }

    /// Closes the outbox: pending events are discarded, further pushes are
    /// refused, and a waiting consumer is woken with `None`.
    pub fn close(&self) {
        {
            let mut state = self.lock();
            state.closed = true;
            state.queue.clear();
        }
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for Outbox {
    fn default() -> Self {
        Self::new(DEFAULT_OUTBOX_CAPACITY)
    }
}
