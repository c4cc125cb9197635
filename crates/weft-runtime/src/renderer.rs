#![forbid(unsafe_code)]

//! The seam between the reactive core and a concrete output backend.
//!
//! The core never draws anything itself. It creates output nodes, sets their
//! attributes and text, arranges them under parents, and subscribes to native
//! interaction signals through [`Renderer`]. Every primitive is fallible and
//! failures propagate unchanged to whoever triggered the work (`attach`, a
//! flush).

use std::fmt;
use std::rc::Rc;

use weft_core::{DataMap, DataValue, RenderError};

/// Handle to a node owned by a [`Renderer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputId(pub u64);

impl OutputId {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for OutputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Handle to a native listener registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// A native interaction signal delivered by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeEvent {
    pub name: String,
    pub detail: Option<DataValue>,
}

impl NativeEvent {
    #[must_use]
    pub fn new(name: impl Into<String>, detail: Option<DataValue>) -> Self {
        Self {
            name: name.into(),
            detail,
        }
    }

    /// The value bound to `$event` for native handlers: `{type, detail}`.
    #[must_use]
    pub fn to_value(&self) -> DataValue {
        let mut map = DataMap::new();
        map.insert("type".to_owned(), DataValue::from(self.name.as_str()));
        if let Some(detail) = &self.detail {
            map.insert("detail".to_owned(), detail.clone());
        }
        DataValue::Map(map)
    }
}

pub type NativeHandler = Rc<dyn Fn(&NativeEvent)>;

/// Output primitives consumed by the core.
pub trait Renderer {
    fn create_element(&self, tag: &str) -> Result<OutputId, RenderError>;

    fn create_text(&self, text: &str) -> Result<OutputId, RenderError>;

    /// An invisible placeholder marking where a repeated or conditional
    /// region starts its insertions.
    fn create_anchor(&self) -> Result<OutputId, RenderError>;

    fn set_attribute(&self, node: OutputId, name: &str, value: &str) -> Result<(), RenderError>;

    fn remove_attribute(&self, node: OutputId, name: &str) -> Result<(), RenderError>;

    fn set_text(&self, node: OutputId, text: &str) -> Result<(), RenderError>;

    /// Insert `child` under `parent`, before `before` when given, else last.
    fn insert(
        &self,
        parent: OutputId,
        child: OutputId,
        before: Option<OutputId>,
    ) -> Result<(), RenderError>;

    fn remove(&self, parent: OutputId, child: OutputId) -> Result<(), RenderError>;

    fn listen(
        &self,
        node: OutputId,
        event: &str,
        handler: NativeHandler,
    ) -> Result<ListenerId, RenderError>;

    fn unlisten(&self, listener: ListenerId) -> Result<(), RenderError>;
}

/// Where a root component attaches: a renderer plus a container node in it.
#[derive(Clone)]
pub struct RenderTarget {
    pub renderer: Rc<dyn Renderer>,
    pub node: OutputId,
}

impl RenderTarget {
    #[must_use]
    pub fn new(renderer: Rc<dyn Renderer>, node: OutputId) -> Self {
        Self { renderer, node }
    }
}

impl fmt::Debug for RenderTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderTarget")
            .field("node", &self.node)
            .finish_non_exhaustive()
    }
}
