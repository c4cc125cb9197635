#![forbid(unsafe_code)]

//! Component instances.
//!
//! A [`Component`] is a cheap handle (`Rc<RefCell<..>>`) to one instance of a
//! [`ComponentClass`]: its data store, pending change log, computed graph,
//! watchers, and (once attached) its materialized view.
//!
//! # Design
//!
//! Two relations connect instances:
//!
//! - **owner**: the component whose template placed this one. The owner
//!   evaluates the placement's bindings and receives its events.
//! - **parent**: the structural parent. Equal to the owner, except for slot
//!   content, whose parent is the component it is slotted into. Messages
//!   travel along this relation.
//!
//! # Invariants
//!
//! 1. `set` never touches rendered output; the scheduler applies the batch.
//! 2. No hook, method, watcher or message handler runs while any component
//!    state is borrowed. Work discovered during a borrow is queued in
//!    [`Effects`] and run afterwards.
//! 3. A disposed component stays disposed; every mutating call on it fails
//!    with [`WeftError::InvalidLifecycleState`] and `dispose` is a no-op.
//!
//! # Failure Modes
//!
//! - **Hook error during dispose**: disposal still completes; the first error
//!   is returned.
//! - **Renderer error during dispose**: logged at `warn` and skipped.

pub mod class;
pub(crate) mod effects;
pub mod lifecycle;

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;
use weft_core::{ChangeLog, DataValue, Path, PathStore, Result, WeftError};

use crate::binding::EventPlan;
use crate::expr::{EvalEnv, FilterTable, Scope, eval};
use crate::message::MessageRouter;
use crate::reactive::DependencyGraph;
use crate::reactive::scheduler::{self, FlushReport};
use crate::renderer::{OutputId, RenderTarget, Renderer};
use crate::view::{self, SlotAnchor, View, ViewCx};

pub use class::{
    ComponentClass, ComponentOptions, ComponentRef, Hook, LifecycleHook, MessageHandler, Method,
    WatchFn,
};
use effects::Effects;
pub use lifecycle::{Lifecycle, Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(u64);

impl ComponentId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Handle returned by [`Component::watch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(u64);

pub(crate) type ListenerFn = Rc<dyn Fn(Option<DataValue>) -> Result<()>>;

struct Listener {
    event: String,
    handler: ListenerFn,
}

struct Watcher {
    id: WatchId,
    path: Path,
    func: WatchFn,
}

struct NodeInner {
    class: Rc<ComponentClass>,
    lifecycle: Lifecycle,
    depth: usize,
    store: PathStore,
    log: ChangeLog,
    graph: DependencyGraph,
    watchers: Vec<Watcher>,
    next_watch: u64,
    messages: AHashMap<String, MessageHandler>,
    filters: FilterTable,
    listeners: Vec<Listener>,
    owner: Option<WeakComponent>,
    parent: Option<WeakComponent>,
    /// Separate cell: children register while the parent's state is
    /// borrowed for a mount walk.
    children: RefCell<Vec<WeakComponent>>,
    view: Option<View>,
    renderer: Option<Rc<dyn Renderer>>,
    /// Output node the root element is inserted into.
    host: Option<OutputId>,
}

#[derive(Clone)]
pub struct Component {
    id: ComponentId,
    inner: Rc<RefCell<NodeInner>>,
}

#[derive(Clone)]
pub struct WeakComponent {
    id: ComponentId,
    inner: Weak<RefCell<NodeInner>>,
}

impl WeakComponent {
    #[must_use]
    pub fn id(&self) -> ComponentId {
        self.id
    }

    #[must_use]
    pub fn upgrade(&self) -> Option<Component> {
        self.inner.upgrade().map(|inner| Component { id: self.id, inner })
    }
}

impl fmt::Debug for WeakComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WeakComponent").field(&self.id).finish()
    }
}

impl Component {
    /// Create a root instance of `class`. The `inited` hook runs before this
    /// returns; nothing is rendered until [`attach`](Self::attach).
    pub fn new(class: &Rc<ComponentClass>, options: ComponentOptions) -> Result<Self> {
        let mut effects = Effects::default();
        let component = Self::construct(class, options, None, None, &mut effects)?;
        effects.run()?;
        Ok(component)
    }

    pub(crate) fn construct(
        class: &Rc<ComponentClass>,
        options: ComponentOptions,
        owner: Option<&Component>,
        parent: Option<&Component>,
        effects: &mut Effects,
    ) -> Result<Self> {
        let ComponentOptions {
            data,
            computed,
            messages,
            filters,
        } = options;
        let data = PathStore::merge_defaults(class.default_data(), data.unwrap_or(DataValue::Null));
        let mut store = PathStore::from_value(data);
        let mut graph = DependencyGraph::new(class.computed_defs().iter().cloned().chain(computed));
        graph.evaluate_all(&mut store)?;

        let mut handlers = class.messages().clone();
        handlers.extend(messages);
        let mut table = class.filters().clone();
        table.extend(filters);

        let id = ComponentId::next();
        let depth = parent.map_or(0, |p| p.depth() + 1);
        let inner = NodeInner {
            class: Rc::clone(class),
            lifecycle: Lifecycle::INITED,
            depth,
            store,
            log: ChangeLog::new(),
            graph,
            watchers: Vec::new(),
            next_watch: 1,
            messages: handlers,
            filters: table,
            listeners: Vec::new(),
            owner: owner.map(Component::downgrade),
            parent: parent.map(Component::downgrade),
            children: RefCell::new(Vec::new()),
            view: None,
            renderer: None,
            host: None,
        };
        let component = Self {
            id,
            inner: Rc::new(RefCell::new(inner)),
        };
        if let Some(parent) = parent {
            parent
                .inner
                .borrow()
                .children
                .borrow_mut()
                .push(component.downgrade());
        }
        tracing::debug!(component = %id, class = class.name(), depth, "component constructed");
        effects.hook(&component, LifecycleHook::Inited);
        Ok(component)
    }

    // --- identity and relations ---

    #[must_use]
    pub fn id(&self) -> ComponentId {
        self.id
    }

    #[must_use]
    pub fn class(&self) -> Rc<ComponentClass> {
        Rc::clone(&self.inner.borrow().class)
    }

    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.inner.borrow().lifecycle
    }

    #[must_use]
    pub fn is(&self, stage: Stage) -> bool {
        self.lifecycle().is(stage)
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.is(Stage::Disposed)
    }

    pub(crate) fn is_mounted(&self) -> bool {
        self.is(Stage::Attached)
    }

    /// The root output sits where it was inserted: materialized and not
    /// detached since.
    pub(crate) fn output_in_place(&self) -> bool {
        let state = self.lifecycle();
        state.is(Stage::Created) && !state.is(Stage::Detached)
    }

    /// Attached, and so is every structural ancestor.
    pub(crate) fn is_live(&self) -> bool {
        let mut node = Some(self.clone());
        while let Some(current) = node {
            if !current.is_mounted() {
                return false;
            }
            node = current.parent();
        }
        true
    }

    /// Distance from the tree root.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.inner.borrow().depth
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakComponent {
        WeakComponent {
            id: self.id,
            inner: Rc::downgrade(&self.inner),
        }
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Component) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// The structural parent.
    #[must_use]
    pub fn parent(&self) -> Option<Component> {
        self.inner.borrow().parent.as_ref()?.upgrade()
    }

    /// The component whose template placed this one.
    #[must_use]
    pub fn owner(&self) -> Option<Component> {
        self.inner.borrow().owner.as_ref()?.upgrade()
    }

    /// Live structural children, in creation order.
    #[must_use]
    pub fn children(&self) -> Vec<Component> {
        self.inner
            .borrow()
            .children
            .borrow()
            .iter()
            .filter_map(WeakComponent::upgrade)
            .collect()
    }

    /// Root output node, once materialized.
    #[must_use]
    pub fn root_output(&self) -> Option<OutputId> {
        self.inner.borrow().view.as_ref()?.root_output()
    }

    /// How often computed `name` has been evaluated.
    #[must_use]
    pub fn computed_evaluations(&self, name: &str) -> Option<u64> {
        self.inner.borrow().graph.evaluations(name)
    }

    pub(crate) fn ensure_alive(&self, operation: &'static str) -> Result<()> {
        let state = self.lifecycle();
        if state.is(Stage::Disposed) {
            Err(WeftError::lifecycle(self.id.raw(), state.describe(), operation))
        } else {
            Ok(())
        }
    }

    // --- data ---

    /// Current value at `path`. Unparsable paths read as absent.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<DataValue> {
        match Path::parse(path) {
            Ok(path) => self.get_path(&path),
            Err(err) => {
                tracing::debug!(path, error = %err, "unreadable path");
                None
            }
        }
    }

    #[must_use]
    pub fn get_path(&self, path: &Path) -> Option<DataValue> {
        self.inner.borrow().store.get(path).cloned()
    }

    /// Snapshot of the whole store.
    #[must_use]
    pub fn data(&self) -> DataValue {
        self.inner.borrow().store.root().clone()
    }

    /// Write `value` at `path` and schedule a flush.
    pub fn set(&self, path: &str, value: impl Into<DataValue>) -> Result<()> {
        let path = Path::parse(path)?;
        self.set_path(&path, value.into())
    }

    pub fn set_path(&self, path: &Path, value: DataValue) -> Result<()> {
        let skip_unchanged = scheduler::config().skip_unchanged_writes;
        let changed = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            if inner.lifecycle.is(Stage::Disposed) {
                return Err(WeftError::lifecycle(self.id.raw(), "disposed", "set data"));
            }
            if skip_unchanged {
                inner.store.set_tracked(path, value, &mut inner.log)?
            } else {
                inner.store.replace_tracked(path, value, &mut inner.log)?;
                true
            }
        };
        if changed {
            tracing::trace!(component = %self.id, %path, "data set");
            scheduler::enqueue(self);
        }
        Ok(())
    }

    /// Remove the value at `path` and schedule a flush.
    pub fn unset(&self, path: &str) -> Result<()> {
        let path = Path::parse(path)?;
        self.remove_path(&path)
    }

    pub fn remove_path(&self, path: &Path) -> Result<()> {
        let removed = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            if inner.lifecycle.is(Stage::Disposed) {
                return Err(WeftError::lifecycle(self.id.raw(), "disposed", "remove data"));
            }
            inner.store.remove_tracked(path, &mut inner.log)
        };
        if removed {
            tracing::trace!(component = %self.id, %path, "data removed");
            scheduler::enqueue(self);
        }
        Ok(())
    }

    /// Input pushed by the owner during its patch. Returns whether anything
    /// changed; the owner flushes this component afterwards.
    pub(crate) fn set_input(&self, target: &Path, value: Option<DataValue>) -> bool {
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        if inner.lifecycle.is(Stage::Disposed) {
            return false;
        }
        match value {
            Some(value) => match inner.store.assign_tracked(target, value, &mut inner.log) {
                Ok(changed) => changed,
                Err(err) => {
                    tracing::warn!(component = %self.id, %target, %err, "input rejected");
                    false
                }
            },
            None => inner.store.remove_tracked(target, &mut inner.log),
        }
    }

    // --- watchers ---

    /// Call `func` after each batch that changed `path`, an ancestor of it,
    /// or a descendant of it.
    pub fn watch(
        &self,
        path: &str,
        func: impl Fn(&Component, Option<DataValue>) -> Result<()> + 'static,
    ) -> Result<WatchId> {
        let path = Path::parse(path)?;
        self.ensure_alive("watch")?;
        Ok(self.watch_path(path, Rc::new(func)))
    }

    fn watch_path(&self, path: Path, func: WatchFn) -> WatchId {
        let mut inner = self.inner.borrow_mut();
        let id = WatchId(inner.next_watch);
        inner.next_watch += 1;
        inner.watchers.push(Watcher { id, path, func });
        id
    }

    pub fn unwatch(&self, id: WatchId) -> bool {
        let mut inner = self.inner.borrow_mut();
        let before = inner.watchers.len();
        inner.watchers.retain(|w| w.id != id);
        inner.watchers.len() != before
    }

    /// Write `target` changes back to `owner_path` on the owner.
    pub(crate) fn bind_upstream(&self, target: Path, owner: WeakComponent, owner_path: Path) {
        let func: WatchFn = Rc::new(move |_: &Component, value: Option<DataValue>| {
            let Some(owner) = owner.upgrade() else {
                return Ok(());
            };
            if owner.is_disposed() {
                return Ok(());
            }
            match value {
                Some(value) => owner.set_path(&owner_path, value),
                None => owner.remove_path(&owner_path),
            }
        });
        self.watch_path(target, func);
    }

    fn fire_watchers(&self, log: &ChangeLog) -> Result<()> {
        let due: Vec<(Path, WatchFn)> = self
            .inner
            .borrow()
            .watchers
            .iter()
            .filter(|w| log.affects(&w.path))
            .map(|w| (w.path.clone(), Rc::clone(&w.func)))
            .collect();
        for (path, func) in due {
            if self.is_disposed() {
                break;
            }
            let value = self.get_path(&path);
            func(self, value)?;
        }
        Ok(())
    }

    // --- methods, events and messages ---

    /// Invoke a class method.
    pub fn call(&self, method: &str, args: &[Option<DataValue>]) -> Result<()> {
        self.ensure_alive("call a method")?;
        let func = self
            .inner
            .borrow()
            .class
            .method_named(method)
            .ok_or_else(|| WeftError::UnknownMethod {
                name: method.to_owned(),
            })?;
        func(self, args)
    }

    /// Run an event binding of this component's template. With no argument
    /// expressions the payload is the only argument.
    pub(crate) fn invoke(&self, plan: &EventPlan, scope: &Scope, payload: Option<&DataValue>) -> Result<()> {
        if self.is_disposed() {
            tracing::debug!(component = %self.id, event = %plan.name, "event on disposed component ignored");
            return Ok(());
        }
        let args: Vec<Option<DataValue>> = {
            let inner = self.inner.borrow();
            if plan.args.is_empty() {
                vec![payload.cloned()]
            } else {
                let env = EvalEnv::new(&inner.store, scope, &inner.filters).with_event(payload);
                plan.args.iter().map(|arg| eval(arg, &env)).collect()
            }
        };
        match self.call(&plan.method, &args) {
            Err(WeftError::UnknownMethod { name }) => {
                tracing::warn!(
                    component = %self.id,
                    event = %plan.name,
                    method = %name,
                    "event bound to unknown method"
                );
                Ok(())
            }
            other => other,
        }
    }

    /// Register an owner-side listener for `event`.
    pub(crate) fn add_listener(&self, event: &str, owner: WeakComponent, plan: Rc<EventPlan>, scope: Rc<Scope>) {
        let handler: ListenerFn = Rc::new(move |payload: Option<DataValue>| {
            let Some(owner) = owner.upgrade() else {
                return Ok(());
            };
            owner.invoke(&plan, &scope, payload.as_ref())
        });
        self.inner.borrow_mut().listeners.push(Listener {
            event: event.to_owned(),
            handler,
        });
    }

    pub(crate) fn listeners_for(&self, event: &str) -> Vec<ListenerFn> {
        self.inner
            .borrow()
            .listeners
            .iter()
            .filter(|l| l.event == event)
            .map(|l| Rc::clone(&l.handler))
            .collect()
    }

    pub(crate) fn message_handler(&self, name: &str) -> Option<MessageHandler> {
        self.inner.borrow().messages.get(name).cloned()
    }

    /// Send `name` up the structural ancestors. Returns whether one handled it.
    pub fn dispatch(&self, name: &str, payload: Option<DataValue>) -> Result<bool> {
        MessageRouter::dispatch(self, name, payload)
    }

    /// Fire a custom event at the owner's listeners.
    pub fn fire(&self, event: &str, payload: Option<DataValue>) -> Result<()> {
        MessageRouter::fire(self, event, payload)?;
        Ok(())
    }

    /// The owned component placed with reference name `name`. Searches this
    /// component's template, including slot content it placed.
    #[must_use]
    pub fn reference(&self, name: &str) -> Option<Component> {
        let mut found = Vec::new();
        {
            let inner = self.inner.borrow();
            inner.view.as_ref()?.root.find_reference(name, &mut found);
        }
        if found.len() > 1 && scheduler::config().warn_duplicate_refs {
            tracing::warn!(
                component = %self.id,
                reference = name,
                matches = found.len(),
                "duplicate reference name; using the first"
            );
        }
        found.into_iter().next()
    }

    // --- rendering ---

    /// Materialize the view (first call) and insert it under `target`.
    pub fn attach(&self, target: &RenderTarget) -> Result<()> {
        let state = self.lifecycle();
        if state.is(Stage::Disposed) || state.is(Stage::Attached) {
            return Err(WeftError::lifecycle(self.id.raw(), state.describe(), "attach"));
        }
        let first = self.inner.borrow().view.is_none();
        let mut effects = Effects::default();
        let root = if first {
            // Pending writes apply to the store before the first render.
            self.flush(&mut FlushReport::default())?;
            scheduler::cancel(self.id);
            self.materialize(&target.renderer, &mut effects, true)?
        } else {
            self.root_output()
                .ok_or_else(|| WeftError::lifecycle(self.id.raw(), state.describe(), "attach"))?
        };
        target.renderer.insert(target.node, root, None)?;
        {
            let mut inner = self.inner.borrow_mut();
            inner.lifecycle.mark_attached();
            inner.host = Some(target.node);
        }
        if !first {
            self.attach_placed(&mut effects);
        }
        tracing::debug!(component = %self.id, node = %target.node, first, "component attached");
        effects.run()?;
        if first {
            self.run_hook(LifecycleHook::Created)?;
        }
        self.run_hook(LifecycleHook::Attached)
    }

    /// Remove the rendered output, keeping it for a later `attach`.
    pub fn detach(&self) -> Result<()> {
        let state = self.lifecycle();
        if !state.is(Stage::Attached) {
            return Err(WeftError::lifecycle(self.id.raw(), state.describe(), "detach"));
        }
        let (renderer, host, root) = {
            let inner = self.inner.borrow();
            (
                inner.renderer.clone(),
                inner.host,
                inner.view.as_ref().and_then(View::root_output),
            )
        };
        if let (Some(renderer), Some(host), Some(root)) = (renderer, host, root) {
            renderer.remove(host, root)?;
        }
        self.inner.borrow_mut().lifecycle.mark_detached();
        tracing::debug!(component = %self.id, "component detached");
        self.run_hook(LifecycleHook::Detached)
    }

    /// Tear down this component and everything it owns. A second call does
    /// nothing.
    pub fn dispose(&self) -> Result<()> {
        self.dispose_with(true)
    }

    /// Dispose as part of an enclosing teardown that already removed the
    /// output.
    pub(crate) fn dispose_nested(&self) -> Result<()> {
        self.dispose_with(false)
    }

    fn dispose_with(&self, sever: bool) -> Result<()> {
        let state = self.lifecycle();
        if state.is(Stage::Disposed) {
            return Ok(());
        }
        tracing::debug!(component = %self.id, state = state.describe(), "disposing component");
        let mut first: Option<WeftError> = None;

        if sever && self.output_in_place() {
            let (renderer, host, root) = {
                let inner = self.inner.borrow();
                (
                    inner.renderer.clone(),
                    inner.host,
                    inner.view.as_ref().and_then(View::root_output),
                )
            };
            if let (Some(renderer), Some(host), Some(root)) = (renderer, host, root)
                && let Err(err) = renderer.remove(host, root)
            {
                tracing::warn!(component = %self.id, error = %err, "failed to remove output during dispose");
            }
        }
        if state.is(Stage::Attached) {
            self.inner.borrow_mut().lifecycle.mark_detached();
            if let Err(err) = self.run_hook(LifecycleHook::Detached) {
                first.get_or_insert(err);
            }
        }

        let (view, renderer) = {
            let mut inner = self.inner.borrow_mut();
            if inner.lifecycle.is(Stage::Disposed) {
                // The detached hook disposed us.
                return first.map_or(Ok(()), Err);
            }
            (inner.view.take(), inner.renderer.take())
        };
        if let (Some(view), Some(renderer)) = (view, renderer) {
            view.root.dispose_tree(&*renderer, &mut first);
        }

        let parent = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            inner.lifecycle.mark_disposed();
            inner.watchers.clear();
            inner.listeners.clear();
            inner.messages.clear();
            inner.log.clear();
            inner.store = PathStore::new();
            inner.graph = DependencyGraph::default();
            inner.children.get_mut().clear();
            inner.owner = None;
            inner.host = None;
            inner.parent.take()
        };
        scheduler::cancel(self.id);
        if let Some(parent) = parent.and_then(|p| p.upgrade()) {
            parent
                .inner
                .borrow()
                .children
                .borrow_mut()
                .retain(|child| child.id != self.id);
        }
        if let Err(err) = self.run_hook(LifecycleHook::Disposed) {
            first.get_or_insert(err);
        }
        first.map_or(Ok(()), Err)
    }

    pub(crate) fn run_hook(&self, kind: LifecycleHook) -> Result<()> {
        let hook = {
            let inner = self.inner.borrow();
            let live = match kind {
                LifecycleHook::Disposed => true,
                LifecycleHook::Created => inner.lifecycle.is(Stage::Created),
                LifecycleHook::Attached | LifecycleHook::Updated => inner.lifecycle.is(Stage::Attached),
                LifecycleHook::Inited | LifecycleHook::Detached => !inner.lifecycle.is(Stage::Disposed),
            };
            if !live {
                return Ok(());
            }
            inner.class.hook_for(kind)
        };
        let Some(hook) = hook else {
            return Ok(());
        };
        tracing::trace!(component = %self.id, hook = kind.as_str(), "lifecycle hook");
        hook(self)
    }

    /// Build the view from the class template. The root is not inserted.
    pub(crate) fn materialize(
        &self,
        renderer: &Rc<dyn Renderer>,
        effects: &mut Effects,
        live: bool,
    ) -> Result<OutputId> {
        let bindings = self.class().bindings()?;
        let (root, slot) = {
            let inner = self.inner.borrow();
            let mut cx = ViewCx {
                renderer,
                owner: self,
                class: &inner.class,
                store: &inner.store,
                filters: &inner.filters,
                log: None,
                effects,
                slot: None,
                live,
            };
            let root = view::mount_root(&mut cx, bindings.root())?;
            (root, cx.slot)
        };
        let view = View { root, slot };
        let output = view
            .root_output()
            .ok_or_else(|| WeftError::template("root node must be an element"))?;
        let mut inner = self.inner.borrow_mut();
        inner.view = Some(view);
        inner.renderer = Some(Rc::clone(renderer));
        Ok(output)
    }

    pub(crate) fn slot_anchor(&self) -> Option<SlotAnchor> {
        self.inner.borrow().view.as_ref()?.slot
    }

    /// Record that the owner's view placed this component under `host`.
    /// It counts as attached only when that view is connected.
    pub(crate) fn mark_placed(&self, host: OutputId, live: bool) {
        let mut inner = self.inner.borrow_mut();
        if live {
            inner.lifecycle.mark_attached();
        } else {
            inner.lifecycle.mark_created();
        }
        inner.host = Some(host);
    }

    /// Attach the owned components placed while this one was detached.
    fn attach_placed(&self, effects: &mut Effects) {
        for child in self.owned_components() {
            if child.is_disposed() {
                continue;
            }
            if !child.is_mounted() {
                child.inner.borrow_mut().lifecycle.mark_attached();
                tracing::debug!(component = %child.id, "placed component attached");
                effects.hook(&child, LifecycleHook::Attached);
            }
            child.attach_placed(effects);
        }
    }

    // --- flushing ---

    /// Apply pending changes: recompute, patch the view, flush the owned
    /// components that received inputs, fire watchers, then `updated`.
    pub(crate) fn flush(&self, report: &mut FlushReport) -> Result<()> {
        let (log, was_attached) = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            if inner.lifecycle.is(Stage::Disposed) || inner.log.is_empty() {
                return Ok(());
            }
            let mut log = inner.log.take();
            inner.graph.recompute(&mut inner.store, &mut log)?;
            (log, inner.lifecycle.is(Stage::Attached))
        };
        tracing::trace!(component = %self.id, changes = log.len(), "flushing component");

        let mut effects = Effects::default();
        self.patch_view(&log, &mut effects)?;
        effects.run()?;
        for child in self.owned_components() {
            child.flush(report)?;
        }
        self.fire_watchers(&log)?;
        report.flushed += 1;
        if was_attached && self.is(Stage::Attached) {
            self.run_hook(LifecycleHook::Updated)?;
            report.updated_hooks += 1;
        }
        Ok(())
    }

    fn patch_view(&self, log: &ChangeLog, effects: &mut Effects) -> Result<()> {
        let (view, renderer) = {
            let mut inner = self.inner.borrow_mut();
            let renderer = inner.renderer.clone();
            (inner.view.take(), renderer)
        };
        let Some(mut view) = view else {
            return Ok(());
        };
        let live = self.is_live();
        let result = match renderer {
            Some(renderer) => self.class().bindings().and_then(|bindings| {
                let inner = self.inner.borrow();
                let mut cx = ViewCx {
                    renderer: &renderer,
                    owner: self,
                    class: &inner.class,
                    store: &inner.store,
                    filters: &inner.filters,
                    log: Some(log),
                    effects,
                    slot: None,
                    live,
                };
                view::patch_root(&mut cx, &mut view.root, bindings.root())
            }),
            None => Ok(()),
        };
        self.inner.borrow_mut().view = Some(view);
        result
    }

    fn owned_components(&self) -> Vec<Component> {
        let mut out = Vec::new();
        if let Some(view) = &self.inner.borrow().view {
            view.root.components(&mut out);
        }
        out
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("Component");
        out.field("id", &self.id);
        if let Ok(inner) = self.inner.try_borrow() {
            out.field("class", &inner.class.name())
                .field("lifecycle", &inner.lifecycle.describe())
                .field("depth", &inner.depth);
        }
        out.finish_non_exhaustive()
    }
}
