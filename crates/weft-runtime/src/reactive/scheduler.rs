#![forbid(unsafe_code)]

//! Batched, process-scoped update scheduling.
//!
//! Mutations never flush inline. The first component that becomes dirty after
//! the previous flush drained asks the installed [`FlushHost`] for one
//! deferred flush; everything mutated before that flush runs joins the same
//! batch. Tests (and hosts) drive flushes with [`flush_now`] or [`settle`].
//!
//! The queue is thread-local: components are `Rc`-based and single-threaded,
//! and independently created trees share one batch. [`reset`] clears it for
//! test isolation.
//!
//! # Invariants
//!
//! 1. A component enqueued several times before a flush flushes once.
//! 2. Dirty components flush ancestors first (by tree depth, then enqueue
//!    order).
//! 3. Mutations made while a flush runs join the next batch; the host is
//!    asked again once the running flush completes.
//! 4. A flush requested while one is running is refused, never nested.
//!
//! # Failure Modes
//!
//! - **Flush error**: a renderer or handler error stops the batch and is
//!   returned from [`flush_now`]. Components already flushed, and the one
//!   that failed, keep what they applied. Components not reached yet and
//!   the batch's tick callbacks go back into the queue, and the host is
//!   asked for another flush.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use ahash::AHashSet;
use weft_core::{Result, WeftError};

use crate::component::{Component, ComponentId, WeakComponent};
use crate::config::RuntimeConfig;

/// Receives "please flush soon" requests.
pub trait FlushHost {
    fn request_flush(&self);
}

/// Ignores requests; the caller drives [`flush_now`] itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualHost;

impl FlushHost for ManualHost {
    fn request_flush(&self) {}
}

/// Forwards requests to a closure, e.g. one that posts a task onto an event
/// loop which then calls [`flush_now`].
pub struct CallbackHost {
    callback: Box<dyn Fn()>,
}

impl CallbackHost {
    pub fn new(callback: impl Fn() + 'static) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }
}

impl FlushHost for CallbackHost {
    fn request_flush(&self) {
        (self.callback)();
    }
}

impl fmt::Debug for CallbackHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackHost").finish_non_exhaustive()
    }
}

/// What one [`flush_now`] call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Batch number, starting at 1. Zero for a refused reentrant request.
    pub batch: u64,
    /// Components whose pending changes were applied.
    pub flushed: usize,
    /// `updated` hooks fired.
    pub updated_hooks: usize,
    /// `next_tick` callbacks run.
    pub ticks: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Requested,
    Flushing,
}

#[derive(Default)]
struct Queue {
    nodes: Vec<WeakComponent>,
    ids: AHashSet<ComponentId>,
}

impl Queue {
    fn push(&mut self, id: ComponentId, node: WeakComponent) {
        if self.ids.insert(id) {
            self.nodes.push(node);
        }
    }

    fn remove(&mut self, id: ComponentId) {
        if self.ids.remove(&id) {
            self.nodes.retain(|node| node.id() != id);
        }
    }

    fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

type Tick = Box<dyn FnOnce()>;

struct Scheduler {
    phase: Phase,
    current: Queue,
    next: Queue,
    ticks: Vec<Tick>,
    host: Rc<dyn FlushHost>,
    config: RuntimeConfig,
    batch: u64,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            current: Queue::default(),
            next: Queue::default(),
            ticks: Vec::new(),
            host: Rc::new(ManualHost),
            config: RuntimeConfig::default(),
            batch: 0,
        }
    }
}

impl Scheduler {
    /// Move to `Requested` if idle; returns the host to notify.
    fn request(&mut self) -> Option<Rc<dyn FlushHost>> {
        if self.phase == Phase::Idle {
            self.phase = Phase::Requested;
            Some(Rc::clone(&self.host))
        } else {
            None
        }
    }
}

thread_local! {
    static SCHEDULER: RefCell<Scheduler> = RefCell::new(Scheduler::default());
}

fn with<R>(f: impl FnOnce(&mut Scheduler) -> R) -> R {
    SCHEDULER.with(|cell| f(&mut cell.borrow_mut()))
}

/// Mark `node` dirty for the current (or, during a flush, the next) batch.
pub fn enqueue(node: &Component) {
    let id = node.id();
    let weak = node.downgrade();
    let host = with(|s| {
        if s.phase == Phase::Flushing {
            s.next.push(id, weak);
            None
        } else {
            s.current.push(id, weak);
            s.request()
        }
    });
    if let Some(host) = host {
        host.request_flush();
    }
}

/// Drop `id` from both queues.
pub fn cancel(id: ComponentId) {
    with(|s| {
        s.current.remove(id);
        s.next.remove(id);
    });
}

/// Run `callback` once the next flush completes.
pub fn next_tick(callback: impl FnOnce() + 'static) {
    let host = with(|s| {
        s.ticks.push(Box::new(callback));
        if s.phase == Phase::Flushing {
            None
        } else {
            s.request()
        }
    });
    if let Some(host) = host {
        host.request_flush();
    }
}

/// Whether dirty components or tick callbacks are waiting.
#[must_use]
pub fn is_pending() -> bool {
    with(|s| !s.current.is_empty() || !s.next.is_empty() || !s.ticks.is_empty())
}

#[must_use]
pub fn is_flushing() -> bool {
    with(|s| s.phase == Phase::Flushing)
}

/// Install a new host. Pending requests are not replayed.
pub fn set_host(host: Rc<dyn FlushHost>) {
    with(|s| s.host = host);
}

pub fn configure(config: RuntimeConfig) {
    with(|s| s.config = config);
}

#[must_use]
pub fn config() -> RuntimeConfig {
    with(|s| s.config.clone())
}

/// Clear queues, ticks, host and configuration. For test isolation.
pub fn reset() {
    let old = with(std::mem::take);
    // Dropped outside the borrow: tick closures may own components.
    drop(old);
}

/// Restores the phase when a flush ends, however it ends.
struct FlushGuard;

impl Drop for FlushGuard {
    fn drop(&mut self) {
        let host = SCHEDULER
            .try_with(|cell| {
                let mut s = cell.borrow_mut();
                let next = std::mem::take(&mut s.next);
                for node in next.nodes {
                    let id = node.id();
                    s.current.push(id, node);
                }
                s.phase = Phase::Idle;
                if s.current.is_empty() && s.ticks.is_empty() {
                    None
                } else {
                    s.request()
                }
            })
            .ok()
            .flatten();
        if let Some(host) = host {
            host.request_flush();
        }
    }
}

/// Run one batch now.
pub fn flush_now() -> Result<FlushReport> {
    let start = with(|s| {
        if s.phase == Phase::Flushing {
            return None;
        }
        s.phase = Phase::Flushing;
        s.batch += 1;
        let queue = std::mem::take(&mut s.current);
        let ticks = std::mem::take(&mut s.ticks);
        Some((s.batch, queue, ticks))
    });
    let Some((batch, queue, ticks)) = start else {
        tracing::warn!("flush requested while a flush is running; deferred to the next batch");
        return Ok(FlushReport::default());
    };
    let _guard = FlushGuard;

    let mut nodes: Vec<Component> = queue.nodes.iter().filter_map(WeakComponent::upgrade).collect();
    nodes.sort_by_key(Component::depth);

    let span = tracing::debug_span!("weft.flush", batch, dirty = nodes.len());
    let _enter = span.enter();

    let mut report = FlushReport {
        batch,
        ..FlushReport::default()
    };
    for (i, node) in nodes.iter().enumerate() {
        if let Err(err) = node.flush(&mut report) {
            let rest = &nodes[i + 1..];
            tracing::warn!(
                batch,
                component = %node.id(),
                requeued = rest.len(),
                %err,
                "flush failed"
            );
            requeue(rest, ticks);
            return Err(err);
        }
    }
    for tick in ticks {
        tick();
        report.ticks += 1;
    }
    tracing::debug!(
        flushed = report.flushed,
        updated_hooks = report.updated_hooks,
        ticks = report.ticks,
        "flush complete"
    );
    Ok(report)
}

/// Put work an aborted batch did not reach back at the front of the queue.
fn requeue(nodes: &[Component], mut ticks: Vec<Tick>) {
    with(|s| {
        let mut current = Queue::default();
        for node in nodes {
            current.push(node.id(), node.downgrade());
        }
        for node in std::mem::take(&mut s.current.nodes) {
            current.push(node.id(), node);
        }
        s.current = current;
        ticks.append(&mut s.ticks);
        s.ticks = ticks;
    });
}

/// Flush until nothing is pending. Returns the number of rounds run.
pub fn settle() -> Result<usize> {
    if is_flushing() {
        tracing::warn!("settle requested while a flush is running; ignored");
        return Ok(0);
    }
    let max = config().max_settle_rounds;
    let mut rounds = 0;
    while is_pending() {
        if rounds >= max {
            return Err(WeftError::SettleLimitExceeded { rounds });
        }
        flush_now()?;
        rounds += 1;
    }
    Ok(rounds)
}
