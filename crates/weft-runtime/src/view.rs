#![forbid(unsafe_code)]

//! Materialized output of one component's template, and its patching.
//!
//! A [`View`] mirrors the [`PlanNode`] tree it was mounted from. Mounting
//! walks the plan, creating renderer nodes and child components; patching
//! walks plan and mounted tree in parallel and re-evaluates only bindings
//! whose reads the batch log affects.
//!
//! The owner's component state is borrowed for the whole walk, so nothing
//! here runs application code. Lifecycle hooks of children and disposals of
//! removed children are queued in [`Effects`] and run by the caller once the
//! borrow is released.

use std::rc::Rc;

use weft_core::{ChangeLog, DataMap, DataValue, PathStore, Result, WeftError, text_of};

use crate::binding::{ComponentPlan, ElementPlan, EventPlan, ForPlan, IfPlan, PlanNode, ValuePlan};
use crate::component::class::{ComponentClass, ComponentOptions, LifecycleHook};
use crate::component::effects::Effects;
use crate::component::{Component, WeakComponent};
use crate::expr::{EvalEnv, FilterTable, Local, Scope};
use crate::list::ListReconciler;
use crate::renderer::{ListenerId, NativeEvent, NativeHandler, OutputId, Renderer};

/// Where a component template placed its `<slot>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SlotAnchor {
    pub parent: OutputId,
    pub anchor: OutputId,
}

pub(crate) struct View {
    pub root: Mounted,
    pub slot: Option<SlotAnchor>,
}

impl View {
    pub fn root_output(&self) -> Option<OutputId> {
        match &self.root {
            Mounted::Element(el) => Some(el.output),
            _ => None,
        }
    }
}

pub(crate) enum Mounted {
    Element(MountedElement),
    Text {
        output: OutputId,
        last: String,
    },
    Component(Box<MountedComponent>),
    For(MountedList),
    If(MountedBranch),
    Slot {
        anchor: OutputId,
    },
}

pub(crate) struct MountedElement {
    output: OutputId,
    /// Last applied text per attribute; `None` when absent.
    attrs: Vec<Option<String>>,
    listeners: Vec<ListenerId>,
    children: Vec<Mounted>,
}

pub(crate) struct MountedComponent {
    component: Component,
    reference: Option<String>,
    /// Slot content this view's owner rendered into the component.
    slot: Vec<Mounted>,
    root: OutputId,
}

pub(crate) struct MountedList {
    parent: OutputId,
    anchor: OutputId,
    items: Vec<ListItem>,
}

struct ListItem {
    scope: Rc<Scope>,
    content: Mounted,
}

/// Which branch of a conditional is mounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Branch {
    Body,
    Otherwise,
}

pub(crate) struct MountedBranch {
    parent: OutputId,
    anchor: OutputId,
    branch: Option<Branch>,
    content: Option<Box<Mounted>>,
}

/// Insertion point.
#[derive(Debug, Clone, Copy)]
struct Place {
    parent: OutputId,
    before: Option<OutputId>,
}

/// State shared by one mount or patch walk.
pub(crate) struct ViewCx<'a> {
    pub renderer: &'a Rc<dyn Renderer>,
    /// The component whose template is being walked.
    pub owner: &'a Component,
    pub class: &'a Rc<ComponentClass>,
    pub store: &'a PathStore,
    pub filters: &'a FilterTable,
    /// The batch being applied. `None` while mounting.
    pub log: Option<&'a ChangeLog>,
    pub effects: &'a mut Effects,
    /// Set when the walk mounts a `<slot>`.
    pub slot: Option<SlotAnchor>,
    /// Whether the walked output is connected. Components mounted by a
    /// walk that is not stay `created` until the owner attaches again.
    pub live: bool,
}

impl ViewCx<'_> {
    fn env<'s>(&'s self, scope: &'s Scope) -> EvalEnv<'s> {
        EvalEnv::new(self.store, scope, self.filters)
    }

    fn touched(&self, value: &ValuePlan, scope: &Scope, force: bool) -> bool {
        force || self.log.is_none_or(|log| value.is_affected(scope, log))
    }

    fn insert(&self, place: Option<Place>, node: OutputId) -> Result<()> {
        if let Some(place) = place {
            self.renderer.insert(place.parent, node, place.before)?;
        }
        Ok(())
    }
}

fn attr_text(value: Option<DataValue>) -> Option<String> {
    match value {
        None | Some(DataValue::Null | DataValue::Bool(false)) => None,
        Some(value) => Some(value.to_text()),
    }
}

fn item_scope(
    parent: &Rc<Scope>,
    plan: &ForPlan,
    source: Option<&weft_core::Path>,
    idx: usize,
    value: &DataValue,
) -> Rc<Scope> {
    let item = match source {
        Some(path) => Local::Alias(path.child(idx)),
        None => Local::Value(value.clone()),
    };
    let mut locals = vec![(plan.item.clone(), item)];
    if let Some(index) = &plan.index {
        locals.push((index.clone(), Local::Value(idx.into())));
    }
    Scope::child(parent, locals)
}

fn source_items(plan: &ForPlan, env: &EvalEnv<'_>) -> (Option<weft_core::Path>, Vec<DataValue>) {
    let path = plan.source.expr.as_read().and_then(|read| read.store_path(env));
    let items = match plan.source.eval(env) {
        Some(DataValue::Seq(items)) => items,
        _ => Vec::new(),
    };
    (path, items)
}

// ---------------------------------------------------------------------------
// Event wiring
// ---------------------------------------------------------------------------

fn native_handler(owner: WeakComponent, plan: Rc<EventPlan>, scope: Rc<Scope>) -> NativeHandler {
    Rc::new(move |event: &NativeEvent| {
        let Some(owner) = owner.upgrade() else {
            return;
        };
        let payload = event.to_value();
        if let Err(err) = owner.invoke(&plan, &scope, Some(&payload)) {
            tracing::warn!(
                component = %owner.id(),
                event = %plan.name,
                method = %plan.method,
                error = %err,
                "native event handler failed"
            );
        }
    })
}

// ---------------------------------------------------------------------------
// Mount
// ---------------------------------------------------------------------------

/// Mount `plan` as the root of a component template. The root element is not
/// inserted anywhere.
pub(crate) fn mount_root(cx: &mut ViewCx<'_>, plan: &PlanNode) -> Result<Mounted> {
    let scope = Scope::root();
    let owner = cx.owner.clone();
    mount(cx, plan, &scope, &owner, None)
}

fn mount(
    cx: &mut ViewCx<'_>,
    plan: &PlanNode,
    scope: &Rc<Scope>,
    parent: &Component,
    place: Option<Place>,
) -> Result<Mounted> {
    match plan {
        PlanNode::Element(el) => mount_element(cx, el, scope, parent, place),
        PlanNode::Text(value) => {
            let last = text_of(value.eval(&cx.env(scope)).as_ref());
            let output = cx.renderer.create_text(&last)?;
            cx.insert(place, output)?;
            Ok(Mounted::Text { output, last })
        }
        PlanNode::Component(comp) => mount_component(cx, comp, scope, parent, place),
        PlanNode::For(list) => {
            let place = place.ok_or_else(|| WeftError::template("loop cannot be a root"))?;
            let anchor = cx.renderer.create_anchor()?;
            cx.insert(Some(place), anchor)?;
            let (source, values) = source_items(list, &cx.env(scope));
            let at = Place {
                parent: place.parent,
                before: Some(anchor),
            };
            let mut items = Vec::with_capacity(values.len());
            for (idx, value) in values.iter().enumerate() {
                let item = item_scope(scope, list, source.as_ref(), idx, value);
                let content = mount(cx, &list.body, &item, parent, Some(at))?;
                items.push(ListItem {
                    scope: item,
                    content,
                });
            }
            Ok(Mounted::For(MountedList {
                parent: place.parent,
                anchor,
                items,
            }))
        }
        PlanNode::If(cond) => {
            let place = place.ok_or_else(|| WeftError::template("conditional cannot be a root"))?;
            let anchor = cx.renderer.create_anchor()?;
            cx.insert(Some(place), anchor)?;
            let branch = pick_branch(cx, cond, scope);
            let at = Place {
                parent: place.parent,
                before: Some(anchor),
            };
            let content = match branch.and_then(|b| branch_plan(cond, b)) {
                Some(body) => Some(Box::new(mount(cx, body, scope, parent, Some(at))?)),
                None => None,
            };
            Ok(Mounted::If(MountedBranch {
                parent: place.parent,
                anchor,
                branch,
                content,
            }))
        }
        PlanNode::Slot => {
            let place = place.ok_or_else(|| WeftError::template("slot cannot be a root"))?;
            let anchor = cx.renderer.create_anchor()?;
            cx.insert(Some(place), anchor)?;
            cx.slot = Some(SlotAnchor {
                parent: place.parent,
                anchor,
            });
            Ok(Mounted::Slot { anchor })
        }
    }
}

fn mount_element(
    cx: &mut ViewCx<'_>,
    plan: &ElementPlan,
    scope: &Rc<Scope>,
    parent: &Component,
    place: Option<Place>,
) -> Result<Mounted> {
    let output = cx.renderer.create_element(&plan.tag)?;
    let mut attrs = Vec::with_capacity(plan.attrs.len());
    for (name, value) in &plan.attrs {
        let text = attr_text(value.eval(&cx.env(scope)));
        if let Some(text) = &text {
            cx.renderer.set_attribute(output, name, text)?;
        }
        attrs.push(text);
    }
    let mut listeners = Vec::with_capacity(plan.events.len());
    for event in &plan.events {
        let handler = native_handler(cx.owner.downgrade(), Rc::clone(event), Rc::clone(scope));
        listeners.push(cx.renderer.listen(output, &event.name, handler)?);
    }
    let inside = Place {
        parent: output,
        before: None,
    };
    let mut children = Vec::with_capacity(plan.children.len());
    for child in &plan.children {
        children.push(mount(cx, child, scope, parent, Some(inside))?);
    }
    cx.insert(place, output)?;
    Ok(Mounted::Element(MountedElement {
        output,
        attrs,
        listeners,
        children,
    }))
}

fn mount_component(
    cx: &mut ViewCx<'_>,
    plan: &ComponentPlan,
    scope: &Rc<Scope>,
    parent: &Component,
    place: Option<Place>,
) -> Result<Mounted> {
    let place = place.ok_or_else(|| WeftError::template("component cannot be a root"))?;
    let class = cx
        .class
        .resolve(&plan.name)
        .ok_or_else(|| WeftError::UnknownComponent {
            name: plan.name.clone(),
        })?;

    let mut data = DataMap::new();
    let mut upstream = Vec::new();
    {
        let env = cx.env(scope);
        for prop in &plan.props {
            if let Some(value) = prop.value.eval(&env) {
                data.insert(prop.name.clone(), value);
            }
            if let Some(path) = prop.two_way.as_ref().and_then(|read| read.store_path(&env)) {
                upstream.push((prop.target.clone(), path));
            }
        }
    }

    let options = ComponentOptions::new().data(DataValue::Map(data));
    let child = Component::construct(&class, options, Some(cx.owner), Some(parent), cx.effects)?;
    for event in &plan.events {
        child.add_listener(&event.name, cx.owner.downgrade(), Rc::clone(event), Rc::clone(scope));
    }
    for (target, owner_path) in upstream {
        child.bind_upstream(target, cx.owner.downgrade(), owner_path);
    }

    let root = child.materialize(cx.renderer, cx.effects, cx.live)?;
    let mut slot = Vec::new();
    match child.slot_anchor() {
        Some(anchor) => {
            let at = Place {
                parent: anchor.parent,
                before: Some(anchor.anchor),
            };
            for node in &plan.slot {
                slot.push(mount(cx, node, scope, &child, Some(at))?);
            }
        }
        None if !plan.slot.is_empty() => {
            tracing::debug!(component = %plan.name, "slot content dropped: template has no slot");
        }
        None => {}
    }

    cx.renderer.insert(place.parent, root, place.before)?;
    child.mark_placed(place.parent, cx.live);
    cx.effects.hook(&child, LifecycleHook::Created);
    if cx.live {
        cx.effects.hook(&child, LifecycleHook::Attached);
    }

    let reference = plan
        .reference
        .as_ref()
        .map(|r| text_of(r.eval(&cx.env(scope)).as_ref()));
    tracing::trace!(
        owner = %cx.owner.id(),
        component = %child.id(),
        name = %plan.name,
        "component mounted"
    );
    Ok(Mounted::Component(Box::new(MountedComponent {
        component: child,
        reference,
        slot,
        root,
    })))
}

fn pick_branch(cx: &ViewCx<'_>, plan: &IfPlan, scope: &Scope) -> Option<Branch> {
    let on = plan
        .guard
        .eval(&cx.env(scope))
        .is_some_and(|v| v.is_truthy());
    if on {
        Some(Branch::Body)
    } else if plan.otherwise.is_some() {
        Some(Branch::Otherwise)
    } else {
        None
    }
}

fn branch_plan(plan: &IfPlan, branch: Branch) -> Option<&PlanNode> {
    match branch {
        Branch::Body => Some(&plan.body),
        Branch::Otherwise => plan.otherwise.as_deref(),
    }
}

// ---------------------------------------------------------------------------
// Patch
// ---------------------------------------------------------------------------

/// Re-apply the bindings of a component root against `cx.log`.
pub(crate) fn patch_root(cx: &mut ViewCx<'_>, mounted: &mut Mounted, plan: &PlanNode) -> Result<()> {
    let scope = Scope::root();
    let owner = cx.owner.clone();
    patch(cx, mounted, plan, &scope, &owner, false)
}

fn patch(
    cx: &mut ViewCx<'_>,
    mounted: &mut Mounted,
    plan: &PlanNode,
    scope: &Rc<Scope>,
    parent: &Component,
    force: bool,
) -> Result<()> {
    match (mounted, plan) {
        (Mounted::Element(el), PlanNode::Element(plan)) => {
            for ((name, value), last) in plan.attrs.iter().zip(el.attrs.iter_mut()) {
                if !cx.touched(value, scope, force) {
                    continue;
                }
                let next = attr_text(value.eval(&cx.env(scope)));
                if next == *last {
                    continue;
                }
                match &next {
                    Some(text) => cx.renderer.set_attribute(el.output, name, text)?,
                    None => cx.renderer.remove_attribute(el.output, name)?,
                }
                tracing::trace!(node = %el.output, attr = %name, "attribute applied");
                *last = next;
            }
            for (child, plan) in el.children.iter_mut().zip(&plan.children) {
                patch(cx, child, plan, scope, parent, force)?;
            }
            Ok(())
        }
        (Mounted::Text { output, last }, PlanNode::Text(value)) => {
            if cx.touched(value, scope, force) {
                let next = text_of(value.eval(&cx.env(scope)).as_ref());
                if next != *last {
                    cx.renderer.set_text(*output, &next)?;
                    tracing::trace!(node = %output, "text applied");
                    *last = next;
                }
            }
            Ok(())
        }
        (Mounted::Component(mounted), PlanNode::Component(plan)) => {
            patch_component(cx, mounted, plan, scope, force)
        }
        (Mounted::For(list), PlanNode::For(plan)) => patch_list(cx, list, plan, scope, parent, force),
        (Mounted::If(branch), PlanNode::If(plan)) => {
            patch_branch(cx, branch, plan, scope, parent, force)
        }
        (Mounted::Slot { .. }, PlanNode::Slot) => Ok(()),
        _ => Err(WeftError::template("mounted view does not match its plan")),
    }
}

fn patch_component(
    cx: &mut ViewCx<'_>,
    mounted: &mut MountedComponent,
    plan: &ComponentPlan,
    scope: &Rc<Scope>,
    force: bool,
) -> Result<()> {
    for prop in &plan.props {
        if !cx.touched(&prop.value, scope, force) {
            continue;
        }
        let value = prop.value.eval(&cx.env(scope));
        let changed = mounted.component.set_input(&prop.target, value);
        if changed {
            tracing::trace!(
                component = %mounted.component.id(),
                prop = %prop.name,
                "input pushed"
            );
        }
    }
    if let Some(reference) = &plan.reference
        && cx.touched(reference, scope, force)
    {
        mounted.reference = Some(text_of(reference.eval(&cx.env(scope)).as_ref()));
    }
    let host = mounted.component.clone();
    for (content, node) in mounted.slot.iter_mut().zip(&plan.slot) {
        patch(cx, content, node, scope, &host, force)?;
    }
    Ok(())
}

fn patch_list(
    cx: &mut ViewCx<'_>,
    list: &mut MountedList,
    plan: &ForPlan,
    scope: &Rc<Scope>,
    parent: &Component,
    force: bool,
) -> Result<()> {
    if !cx.touched(&plan.source, scope, force) {
        for item in &mut list.items {
            patch(cx, &mut item.content, &plan.body, &item.scope, parent, force)?;
        }
        return Ok(());
    }

    let (source, values) = source_items(plan, &cx.env(scope));
    let diff = ListReconciler::plan(list.items.len(), values.len());
    tracing::trace!(
        retained = diff.retained.len(),
        created = diff.created.len(),
        disposed = diff.disposed.len(),
        "list reconciled"
    );

    for item in list.items.drain(diff.disposed.clone()).rev() {
        release(cx, item.content, list.parent)?;
    }
    for idx in diff.retained.clone() {
        let next = item_scope(scope, plan, source.as_ref(), idx, &values[idx]);
        let item = &mut list.items[idx];
        let rebound = source.is_none() || !same_alias(&item.scope, &next, &plan.item);
        item.scope = next;
        patch(cx, &mut item.content, &plan.body, &item.scope, parent, force || rebound)?;
    }
    let at = Place {
        parent: list.parent,
        before: Some(list.anchor),
    };
    for idx in diff.created {
        let item = item_scope(scope, plan, source.as_ref(), idx, &values[idx]);
        let content = mount(cx, &plan.body, &item, parent, Some(at))?;
        list.items.push(ListItem {
            scope: item,
            content,
        });
    }
    Ok(())
}

fn same_alias(prev: &Scope, next: &Scope, item: &str) -> bool {
    match (prev.lookup(item), next.lookup(item)) {
        (Some(Local::Alias(a)), Some(Local::Alias(b))) => a == b,
        _ => false,
    }
}

fn patch_branch(
    cx: &mut ViewCx<'_>,
    mounted: &mut MountedBranch,
    plan: &IfPlan,
    scope: &Rc<Scope>,
    parent: &Component,
    force: bool,
) -> Result<()> {
    if cx.touched(&plan.guard, scope, force) {
        let next = pick_branch(cx, plan, scope);
        if next != mounted.branch {
            if let Some(content) = mounted.content.take() {
                release(cx, *content, mounted.parent)?;
            }
            mounted.branch = next;
            let at = Place {
                parent: mounted.parent,
                before: Some(mounted.anchor),
            };
            if let Some(body) = next.and_then(|b| branch_plan(plan, b)) {
                mounted.content = Some(Box::new(mount(cx, body, scope, parent, Some(at))?));
            }
            return Ok(());
        }
    }
    if let (Some(content), Some(body)) = (
        mounted.content.as_deref_mut(),
        mounted.branch.and_then(|b| branch_plan(plan, b)),
    ) {
        patch(cx, content, body, scope, parent, force)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Release
// ---------------------------------------------------------------------------

/// Remove `mounted` from `parent` and queue disposal of every component in
/// it.
fn release(cx: &mut ViewCx<'_>, mounted: Mounted, parent: OutputId) -> Result<()> {
    let mut tops = Vec::new();
    mounted.tops(&mut tops);
    for node in tops {
        cx.renderer.remove(parent, node)?;
    }
    mounted.retire(&**cx.renderer, cx.effects);
    Ok(())
}

fn unlisten_all(renderer: &dyn Renderer, listeners: &[ListenerId]) {
    for listener in listeners {
        if let Err(err) = renderer.unlisten(*listener) {
            tracing::warn!(error = %err, "failed to release native listener");
        }
    }
}

impl Mounted {
    /// Outputs inserted directly into the enclosing parent.
    fn tops(&self, out: &mut Vec<OutputId>) {
        match self {
            Self::Element(el) => out.push(el.output),
            Self::Text { output, .. } => out.push(*output),
            Self::Component(mounted) => {
                if mounted.component.output_in_place() {
                    out.push(mounted.root);
                }
            }
            Self::For(list) => {
                list.items.iter().for_each(|item| item.content.tops(out));
                out.push(list.anchor);
            }
            Self::If(branch) => {
                if let Some(content) = &branch.content {
                    content.tops(out);
                }
                out.push(branch.anchor);
            }
            Self::Slot { anchor } => out.push(*anchor),
        }
    }

    /// Release listeners and queue component disposals; outputs are left to
    /// whoever removed the top nodes.
    fn retire(self, renderer: &dyn Renderer, effects: &mut Effects) {
        match self {
            Self::Element(el) => {
                unlisten_all(renderer, &el.listeners);
                el.children
                    .into_iter()
                    .for_each(|child| child.retire(renderer, effects));
            }
            Self::Component(mounted) => {
                let MountedComponent {
                    component, slot, ..
                } = *mounted;
                slot.into_iter()
                    .for_each(|content| content.retire(renderer, effects));
                effects.dispose(&component);
            }
            Self::For(list) => list
                .items
                .into_iter()
                .for_each(|item| item.content.retire(renderer, effects)),
            Self::If(branch) => {
                if let Some(content) = branch.content {
                    content.retire(renderer, effects);
                }
            }
            Self::Text { .. } | Self::Slot { .. } => {}
        }
    }

    /// Tear down a whole view during disposal: listeners released, components
    /// disposed in place (slot content before its host).
    pub(crate) fn dispose_tree(self, renderer: &dyn Renderer, first_err: &mut Option<WeftError>) {
        match self {
            Self::Element(el) => {
                unlisten_all(renderer, &el.listeners);
                el.children
                    .into_iter()
                    .for_each(|child| child.dispose_tree(renderer, first_err));
            }
            Self::Component(mounted) => {
                let MountedComponent {
                    component, slot, ..
                } = *mounted;
                slot.into_iter()
                    .for_each(|content| content.dispose_tree(renderer, first_err));
                if let Err(err) = component.dispose_nested() {
                    first_err.get_or_insert(err);
                }
            }
            Self::For(list) => list
                .items
                .into_iter()
                .for_each(|item| item.content.dispose_tree(renderer, first_err)),
            Self::If(branch) => {
                if let Some(content) = branch.content {
                    content.dispose_tree(renderer, first_err);
                }
            }
            Self::Text { .. } | Self::Slot { .. } => {}
        }
    }

    /// Every component this view owns, in document order. Slot content comes
    /// before its host.
    pub(crate) fn components(&self, out: &mut Vec<Component>) {
        match self {
            Self::Element(el) => el.children.iter().for_each(|c| c.components(out)),
            Self::Component(mounted) => {
                mounted.slot.iter().for_each(|c| c.components(out));
                out.push(mounted.component.clone());
            }
            Self::For(list) => list.items.iter().for_each(|i| i.content.components(out)),
            Self::If(branch) => {
                if let Some(content) = &branch.content {
                    content.components(out);
                }
            }
            Self::Text { .. } | Self::Slot { .. } => {}
        }
    }

    /// Live components whose resolved reference name is `name`.
    pub(crate) fn find_reference(&self, name: &str, out: &mut Vec<Component>) {
        match self {
            Self::Element(el) => el.children.iter().for_each(|c| c.find_reference(name, out)),
            Self::Component(mounted) => {
                if mounted.reference.as_deref() == Some(name) && !mounted.component.is_disposed() {
                    out.push(mounted.component.clone());
                }
                mounted.slot.iter().for_each(|c| c.find_reference(name, out));
            }
            Self::For(list) => list
                .items
                .iter()
                .for_each(|i| i.content.find_reference(name, out)),
            Self::If(branch) => {
                if let Some(content) = &branch.content {
                    content.find_reference(name, out);
                }
            }
            Self::Text { .. } | Self::Slot { .. } => {}
        }
    }
}
