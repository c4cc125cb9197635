#![forbid(unsafe_code)]

//! Core: data values, paths, path-addressed stores and per-batch change logs.

pub mod change_log;
pub mod error;
pub mod path;
pub mod store;
pub mod value;

pub use change_log::{ChangeEntry, ChangeLog};
pub use error::{RenderError, Result, WeftError};
pub use path::{Key, Path};
pub use store::{MAX_INDEX_GAP, PathStore, Write};
pub use value::{DataMap, DataValue, text_of};
