#![forbid(unsafe_code)]

//! Component classes: the template, handlers and defaults shared by every
//! instance.
//!
//! A class is built once with [`ComponentClass::new`] and its `with_*`-style
//! builder methods, then frozen into an `Rc` by [`ComponentClass::build`].
//! The binding plan is compiled on first use and cached.

use std::cell::OnceCell;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use weft_core::{DataValue, Result, WeftError};

use crate::binding::BindingSet;
use crate::component::Component;
use crate::expr::{Filter, FilterTable};
use crate::message::Message;
use crate::reactive::{ComputedDefinition, ComputedScope};
use crate::template::TemplateNode;

/// A method callable from event bindings and [`Component::call`].
pub type Method = Rc<dyn Fn(&Component, &[Option<DataValue>]) -> Result<()>>;

/// Handles a message dispatched by a descendant.
pub type MessageHandler = Rc<dyn Fn(&Component, &Message) -> Result<()>>;

pub type Hook = Rc<dyn Fn(&Component) -> Result<()>>;

/// Receives the value at the watched path after a batch touched it.
pub type WatchFn = Rc<dyn Fn(&Component, Option<DataValue>) -> Result<()>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleHook {
    Inited,
    Created,
    Attached,
    Detached,
    Disposed,
    Updated,
}

impl LifecycleHook {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inited => "inited",
            Self::Created => "created",
            Self::Attached => "attached",
            Self::Detached => "detached",
            Self::Disposed => "disposed",
            Self::Updated => "updated",
        }
    }
}

/// A child component registration.
#[derive(Clone)]
pub enum ComponentRef {
    Class(Rc<ComponentClass>),
    /// The registering class itself, for recursive templates.
    SelfRef,
}

type InitData = Rc<dyn Fn() -> DataValue>;

pub struct ComponentClass {
    name: String,
    template: Option<TemplateNode>,
    components: AHashMap<String, ComponentRef>,
    init_data: Option<InitData>,
    computed: Vec<ComputedDefinition>,
    messages: AHashMap<String, MessageHandler>,
    methods: AHashMap<String, Method>,
    filters: FilterTable,
    hooks: AHashMap<LifecycleHook, Hook>,
    bindings: OnceCell<Rc<BindingSet>>,
}

impl ComponentClass {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template: None,
            components: AHashMap::new(),
            init_data: None,
            computed: Vec::new(),
            messages: AHashMap::new(),
            methods: AHashMap::new(),
            filters: FilterTable::new(),
            hooks: AHashMap::new(),
            bindings: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn template(mut self, template: TemplateNode) -> Self {
        self.template = Some(template);
        self
    }

    /// Register `class` under `name` for use in the template.
    #[must_use]
    pub fn component(mut self, name: impl Into<String>, class: &Rc<ComponentClass>) -> Self {
        self.components
            .insert(name.into(), ComponentRef::Class(Rc::clone(class)));
        self
    }

    /// Register this class under `name`, so the template may place itself.
    #[must_use]
    pub fn recursive(mut self, name: impl Into<String>) -> Self {
        self.components.insert(name.into(), ComponentRef::SelfRef);
        self
    }

    /// Default data, cloned into every instance.
    #[must_use]
    pub fn init_data(self, data: impl Into<DataValue>) -> Self {
        let data = data.into();
        self.init_data_with(move || data.clone())
    }

    /// Default data produced per instance.
    #[must_use]
    pub fn init_data_with(mut self, factory: impl Fn() -> DataValue + 'static) -> Self {
        self.init_data = Some(Rc::new(factory));
        self
    }

    #[must_use]
    pub fn computed(
        mut self,
        name: impl Into<String>,
        func: impl Fn(&mut ComputedScope<'_>) -> Option<DataValue> + 'static,
    ) -> Self {
        self.computed.push(ComputedDefinition::new(name, func));
        self
    }

    #[must_use]
    pub fn message(
        mut self,
        name: impl Into<String>,
        handler: impl Fn(&Component, &Message) -> Result<()> + 'static,
    ) -> Self {
        self.messages.insert(name.into(), Rc::new(handler));
        self
    }

    #[must_use]
    pub fn method(
        mut self,
        name: impl Into<String>,
        method: impl Fn(&Component, &[Option<DataValue>]) -> Result<()> + 'static,
    ) -> Self {
        self.methods.insert(name.into(), Rc::new(method));
        self
    }

    #[must_use]
    pub fn filter(
        mut self,
        name: impl Into<String>,
        filter: impl Fn(Option<DataValue>, &[Option<DataValue>]) -> Option<DataValue> + 'static,
    ) -> Self {
        self.filters.insert(name.into(), Rc::new(filter) as Filter);
        self
    }

    /// Install the handler for `kind`, replacing any earlier one.
    #[must_use]
    pub fn hook(mut self, kind: LifecycleHook, hook: impl Fn(&Component) -> Result<()> + 'static) -> Self {
        self.hooks.insert(kind, Rc::new(hook));
        self
    }

    #[must_use]
    pub fn build(self) -> Rc<Self> {
        Rc::new(self)
    }

    // --- accessors ---

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The compiled binding plan, compiled on first call. Compile errors are
    /// returned every time and never cached.
    pub fn bindings(&self) -> Result<Rc<BindingSet>> {
        if let Some(set) = self.bindings.get() {
            return Ok(Rc::clone(set));
        }
        let template = self.template.as_ref().ok_or_else(|| {
            WeftError::template(format!("component `{}` has no template", self.name))
        })?;
        let set = Rc::new(BindingSet::compile(template, |name| {
            self.components.contains_key(name)
        })?);
        tracing::debug!(
            class = %self.name,
            bindings = set.binding_count(),
            "compiled binding plan"
        );
        Ok(Rc::clone(self.bindings.get_or_init(|| set)))
    }

    pub(crate) fn resolve(self: &Rc<Self>, name: &str) -> Option<Rc<ComponentClass>> {
        match self.components.get(name)? {
            ComponentRef::Class(class) => Some(Rc::clone(class)),
            ComponentRef::SelfRef => Some(Rc::clone(self)),
        }
    }

    pub(crate) fn default_data(&self) -> DataValue {
        self.init_data
            .as_ref()
            .map_or(DataValue::Null, |factory| factory())
    }

    pub(crate) fn computed_defs(&self) -> &[ComputedDefinition] {
        &self.computed
    }

    pub(crate) fn messages(&self) -> &AHashMap<String, MessageHandler> {
        &self.messages
    }

    pub(crate) fn method_named(&self, name: &str) -> Option<Method> {
        self.methods.get(name).cloned()
    }

    pub(crate) fn filters(&self) -> &FilterTable {
        &self.filters
    }

    pub(crate) fn hook_for(&self, kind: LifecycleHook) -> Option<Hook> {
        self.hooks.get(&kind).cloned()
    }
}

impl fmt::Debug for ComponentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentClass")
            .field("name", &self.name)
            .field("components", &self.components.keys().collect::<Vec<_>>())
            .field("computed", &self.computed.len())
            .field("methods", &self.methods.len())
            .finish_non_exhaustive()
    }
}

/// Per-instance overrides applied on top of the class.
#[derive(Default, Clone)]
pub struct ComponentOptions {
    pub(crate) data: Option<DataValue>,
    pub(crate) computed: Vec<ComputedDefinition>,
    pub(crate) messages: AHashMap<String, MessageHandler>,
    pub(crate) filters: FilterTable,
}

impl ComponentOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Initial data. Top-level keys win over the class defaults.
    #[must_use]
    pub fn data(mut self, data: impl Into<DataValue>) -> Self {
        self.data = Some(data.into());
        self
    }

    #[must_use]
    pub fn computed(
        mut self,
        name: impl Into<String>,
        func: impl Fn(&mut ComputedScope<'_>) -> Option<DataValue> + 'static,
    ) -> Self {
        self.computed.push(ComputedDefinition::new(name, func));
        self
    }

    #[must_use]
    pub fn message(
        mut self,
        name: impl Into<String>,
        handler: impl Fn(&Component, &Message) -> Result<()> + 'static,
    ) -> Self {
        self.messages.insert(name.into(), Rc::new(handler));
        self
    }

    #[must_use]
    pub fn filter(
        mut self,
        name: impl Into<String>,
        filter: impl Fn(Option<DataValue>, &[Option<DataValue>]) -> Option<DataValue> + 'static,
    ) -> Self {
        self.filters.insert(name.into(), Rc::new(filter) as Filter);
        self
    }
}

impl fmt::Debug for ComponentOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentOptions")
            .field("data", &self.data)
            .field("computed", &self.computed.len())
            .field("messages", &self.messages.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
