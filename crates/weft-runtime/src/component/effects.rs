#![forbid(unsafe_code)]

//! Work deferred until no component state is borrowed.

use weft_core::{Result, WeftError};

use super::Component;
use super::class::LifecycleHook;

enum Effect {
    Hook(Component, LifecycleHook),
    Dispose(Component),
}

/// Hooks and disposals queued during a mount or patch walk, run in queue
/// order.
#[derive(Default)]
pub(crate) struct Effects {
    queue: Vec<Effect>,
}

impl Effects {
    pub(crate) fn hook(&mut self, component: &Component, kind: LifecycleHook) {
        self.queue.push(Effect::Hook(component.clone(), kind));
    }

    pub(crate) fn dispose(&mut self, component: &Component) {
        self.queue.push(Effect::Dispose(component.clone()));
    }

    /// Run everything. A failure does not stop later effects; the first
    /// error is returned.
    pub(crate) fn run(self) -> Result<()> {
        let mut first: Option<WeftError> = None;
        for effect in self.queue {
            let result = match effect {
                Effect::Hook(component, kind) => component.run_hook(kind),
                Effect::Dispose(component) => component.dispose_nested(),
            };
            if let Err(err) = result {
                first.get_or_insert(err);
            }
        }
        first.map_or(Ok(()), Err)
    }
}
