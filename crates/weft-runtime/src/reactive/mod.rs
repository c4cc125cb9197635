#![forbid(unsafe_code)]

//! Change propagation for Weft components.
//!
//! - [`DependencyGraph`]: computed values whose dependencies are discovered
//!   at evaluation time and re-evaluated only when a batch touches them.
//! - [`scheduler`]: the process-scoped queue that coalesces mutations into
//!   batches and drives flushes.
//!
//! # Architecture
//!
//! A component's `set` writes its store immediately and records the write in
//! the component's [`ChangeLog`](weft_core::ChangeLog). Nothing else happens
//! until the scheduler flushes: the component then recomputes stale
//! computeds against that log, patches its view, flushes the children it
//! pushed inputs to, fires watchers and finally its `updated` hook.
//!
//! # Invariants
//!
//! 1. No effect of a `set` is visible in rendered output before a flush.
//! 2. Within a batch, a parent's bindings apply before its children's.
//! 3. Each watcher fires at most once per batch.
//! 4. Each computed evaluates at most once per batch.

pub mod computed;
pub mod scheduler;

pub use computed::{ComputeFn, ComputedDefinition, ComputedScope, Dependency, DependencyGraph};
pub use scheduler::{CallbackHost, FlushHost, FlushReport, ManualHost};
