#![forbid(unsafe_code)]

//! Harness: an in-memory renderer and component fixtures for exercising the
//! Weft runtime without a real output backend.

pub mod dom;
pub mod fixtures;

pub use dom::{MemoryDom, NodeKind};
pub use fixtures::{CountingHost, Mounted, mount, mount_component};
