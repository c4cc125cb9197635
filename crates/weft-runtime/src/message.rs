#![forbid(unsafe_code)]

//! Upward messages and owner-bound custom events.
//!
//! Two channels leave a component:
//!
//! - **dispatch** walks the structural ancestor chain (slot content counts as
//!   a child of the component it is slotted into) and stops at the first
//!   ancestor that handles the message name.
//! - **fire** invokes the listeners the owner registered on the component's
//!   placement (`on-<event>` bindings), in registration order.
//!
//! Neither channel enqueues anything by itself; handlers that mutate data go
//! through the regular batched `set`.

use std::fmt;

use weft_core::{DataValue, Result};

use crate::component::Component;

/// A dispatched message, as seen by the handling ancestor.
#[derive(Clone)]
pub struct Message {
    pub name: String,
    pub payload: Option<DataValue>,
    /// The component that dispatched it.
    pub target: Component,
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("name", &self.name)
            .field("payload", &self.payload)
            .field("target", &self.target.id())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MessageRouter;

impl MessageRouter {
    /// Deliver `name` to the nearest ancestor handling it. Returns whether
    /// one did.
    pub fn dispatch(source: &Component, name: &str, payload: Option<DataValue>) -> Result<bool> {
        source.ensure_alive("dispatch")?;
        let mut hops = 0usize;
        let mut cursor = source.parent();
        while let Some(node) = cursor {
            hops += 1;
            if let Some(handler) = node.message_handler(name) {
                tracing::trace!(
                    message = name,
                    source = %source.id(),
                    handler = %node.id(),
                    hops,
                    "message handled"
                );
                let message = Message {
                    name: name.to_owned(),
                    payload,
                    target: source.clone(),
                };
                handler(&node, &message)?;
                return Ok(true);
            }
            cursor = node.parent();
        }
        tracing::trace!(message = name, source = %source.id(), hops, "message unhandled");
        Ok(false)
    }

    /// Invoke the owner's listeners for `event`. Returns how many ran.
    pub fn fire(source: &Component, event: &str, payload: Option<DataValue>) -> Result<usize> {
        source.ensure_alive("fire")?;
        let listeners = source.listeners_for(event);
        for listener in &listeners {
            listener(payload.clone())?;
        }
        tracing::trace!(event, source = %source.id(), listeners = listeners.len(), "event fired");
        Ok(listeners.len())
    }
}
