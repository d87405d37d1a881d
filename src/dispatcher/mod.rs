//! A fair, reentrant shared/exclusive permit arbiter.
//!
//! [`TransactionDispatcher`] hands out up to `capacity` permits total. A
//! shared acquire always wants exactly one permit; an exclusive acquire
//! wants every permit the calling thread doesn't already hold. Waiters are
//! served in ticket (arrival) order via two FIFO queues: `regular` and
//! `exclusive`. A promotion rule moves a blocked exclusive waiter out of the
//! regular queue so later shared arrivals can't leapfrog it forever.

mod transaction;

#[cfg(test)]
mod tests;

pub use transaction::{ThreadToken, TransactionDescriptor};

use std::collections::{HashMap, VecDeque};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::config::EnvironmentConfig;
use crate::error::{EngineError, EngineResult};
use crate::observation::Observatory;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Kind {
    Shared,
    Exclusive,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Queue {
    Regular,
    Exclusive,
}

struct Waiter {
    ticket: u64,
    thread: ThreadToken,
    requested: u32,
}

struct DispatcherState {
    capacity: u32,
    acquired: u32,
    next_ticket: u64,
    permits_held: HashMap<ThreadToken, u32>,
    regular: VecDeque<Waiter>,
    exclusive: VecDeque<Waiter>,
}

impl DispatcherState {
    fn held(&self, thread: ThreadToken) -> u32 {
        self.permits_held.get(&thread).copied().unwrap_or(0)
    }

    fn front_ticket(&self, queue: Queue) -> Option<u64> {
        match queue {
            Queue::Regular => self.regular.front().map(|w| w.ticket),
            Queue::Exclusive => self.exclusive.front().map(|w| w.ticket),
        }
    }

    fn remove_ticket(&mut self, queue: Queue, ticket: u64) {
        let deque = match queue {
            Queue::Regular => &mut self.regular,
            Queue::Exclusive => &mut self.exclusive,
        };
        if let Some(pos) = deque.iter().position(|w| w.ticket == ticket) {
            deque.remove(pos);
        }
    }

    fn charge(&mut self, thread: ThreadToken, permits: u32) {
        self.acquired += permits;
        *self.permits_held.entry(thread).or_insert(0) += permits;
    }
}

/// Admission control for up to `capacity` simultaneous permits.
///
/// Built on a `Mutex` + condition signalling rather than a channel or
/// semaphore crate, since the wake condition here ("am I at the head of my
/// queue and does the budget now fit") isn't expressible as a plain
/// counting semaphore.
pub struct TransactionDispatcher {
    state: Mutex<DispatcherState>,
    condvar: Condvar,
    observatory: Observatory,
}

impl TransactionDispatcher {
    /// Panics if `capacity` is zero: a dispatcher that can never grant a
    /// single permit is a misconfiguration, not a runtime condition.
    pub fn new(capacity: u32) -> Self {
        assert!(capacity > 0, "TransactionDispatcher capacity must be > 0");
        Self {
            state: Mutex::new(DispatcherState {
                capacity,
                acquired: 0,
                next_ticket: 0,
                permits_held: HashMap::new(),
                regular: VecDeque::new(),
                exclusive: VecDeque::new(),
            }),
            condvar: Condvar::new(),
            observatory: Observatory::new(),
        }
    }

    pub fn available_permits(&self) -> u32 {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.capacity - state.acquired
    }

    /// Logs a summary of every recorded acquire/release pair, including the
    /// longest-held permits. Exists for lock-timeout postmortems.
    pub fn observatory_report(&self) {
        self.observatory.analyze();
    }

    /// Blocks until a single shared permit is granted.
    pub fn acquire_shared(&self, thread: ThreadToken) -> EngineResult<()> {
        self.acquire(thread, Kind::Shared, None, true).map(|_| ())
    }

    /// Blocks until `capacity - permits_held[thread]` permits are granted.
    /// Returns the number of permits granted.
    pub fn acquire_exclusive(&self, thread: ThreadToken) -> EngineResult<u32> {
        self.acquire(thread, Kind::Exclusive, None, true)
    }

    /// Attempts an exclusive acquire within `timeout`. Returns `0` (not an
    /// error) on timeout or on refusing to queue behind an already-queued
    /// exclusive waiter. The caller falls back to a shared acquire.
    pub fn try_acquire_exclusive(
        &self,
        thread: ThreadToken,
        timeout: Duration,
    ) -> EngineResult<u32> {
        {
            let state = self.lock_state()?;
            if !state.exclusive.is_empty() {
                return Ok(0);
            }
        }
        self.acquire(thread, Kind::Exclusive, Some(timeout), false)
    }

    pub fn release(&self, thread: ThreadToken, permits: u32) -> EngineResult<()> {
        let mut state = self.lock_state()?;
        let held = state.held(thread);
        if permits > held {
            return Err(EngineError::invariant(format!(
                "releasing {} permits but thread only holds {}",
                permits, held
            )));
        }
        state.acquired -= permits;
        let remaining = held - permits;
        if remaining == 0 {
            state.permits_held.remove(&thread);
        } else {
            state.permits_held.insert(thread, remaining);
        }
        self.observatory.record(span_tags(thread), "released");
        self.condvar.notify_all();
        Ok(())
    }

    /// Runs the three-branch admission policy described for
    /// [`TransactionDescriptor`]: created-exclusive transactions block
    /// without a timeout, replay/GC exclusive transactions try with a
    /// timeout and demote to shared on failure, everything else is shared.
    pub fn acquire_transaction(
        &self,
        descriptor: &mut dyn TransactionDescriptor,
        config: &EnvironmentConfig,
    ) -> EngineResult<()> {
        let thread = descriptor.thread();
        if descriptor.is_exclusive() && descriptor.was_created_exclusive() && !descriptor.is_gc_transaction() {
            let granted = self.acquire_exclusive(thread)?;
            descriptor.set_acquired_permits(granted);
            return Ok(());
        }

        if descriptor.is_exclusive() {
            let timeout_ms = if descriptor.is_gc_transaction() {
                config.gc_txn_acquire_timeout_ms
            } else {
                config.env_txn_replay_timeout_ms
            };
            let granted = self.try_acquire_exclusive(thread, Duration::from_millis(timeout_ms))?;
            if granted > 0 {
                descriptor.set_acquired_permits(granted);
                return Ok(());
            }
            descriptor.set_exclusive(false);
        }

        self.acquire_shared(thread)?;
        descriptor.set_acquired_permits(1);
        Ok(())
    }

    fn lock_state(&self) -> EngineResult<MutexGuard<'_, DispatcherState>> {
        self.state
            .lock()
            .map_err(|_| EngineError::interrupted("dispatcher state lock poisoned"))
    }

    fn acquire(
        &self,
        thread: ThreadToken,
        kind: Kind,
        timeout: Option<Duration>,
        can_promote_when_contended: bool,
    ) -> EngineResult<u32> {
        let deadline = timeout.map(|d| Instant::now() + d);
        let mut state = self.lock_state()?;

        let held = state.held(thread);
        if held >= state.capacity {
            return Err(EngineError::invariant(format!(
                "thread already holds the full capacity ({})",
                state.capacity
            )));
        }
        let requested = match kind {
            Kind::Shared => 1,
            Kind::Exclusive => state.capacity - held,
        };

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.regular.push_back(Waiter {
            ticket,
            thread,
            requested,
        });

        let mut queue = Queue::Regular;
        loop {
            if state.front_ticket(queue) == Some(ticket) {
                if state.acquired + requested <= state.capacity {
                    state.remove_ticket(queue, ticket);
                    state.charge(thread, requested);
                    self.observatory.record(span_tags(thread), "acquired");
                    self.condvar.notify_all();
                    return Ok(requested);
                }

                if kind == Kind::Exclusive && queue == Queue::Regular {
                    if !can_promote_when_contended && !state.exclusive.is_empty() {
                        state.remove_ticket(queue, ticket);
                        self.condvar.notify_all();
                        return Ok(0);
                    }
                    state.remove_ticket(Queue::Regular, ticket);
                    state.exclusive.push_back(Waiter {
                        ticket,
                        thread,
                        requested,
                    });
                    queue = Queue::Exclusive;
                    self.condvar.notify_all();
                    continue;
                }
            }

            state = match deadline {
                None => self
                    .condvar
                    .wait(state)
                    .map_err(|_| EngineError::interrupted("dispatcher condvar poisoned"))?,
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        state.remove_ticket(queue, ticket);
                        self.condvar.notify_all();
                        return Ok(0);
                    }
                    let (guard, _timed_out) = self
                        .condvar
                        .wait_timeout(state, deadline - now)
                        .map_err(|_| EngineError::interrupted("dispatcher condvar poisoned"))?;
                    guard
                }
            };
        }
    }
}

fn span_tags(thread: ThreadToken) -> HashMap<String, String> {
    let mut tags = HashMap::new();
    tags.insert("thread".to_string(), format!("{:?}", thread));
    tags
}
