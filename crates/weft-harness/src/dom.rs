#![forbid(unsafe_code)]

//! An in-memory [`Renderer`] with DOM-like semantics.
//!
//! Nodes live in one arena keyed by [`OutputId`]. `insert` moves a node that
//! already has a parent, like a browser DOM does. `remove` and `insert` with a
//! `before` sibling verify the parent relation and fail otherwise.
//!
//! Failure injection: [`MemoryDom::fail_next`] makes the next call of one
//! primitive return a [`RenderError`].

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::rc::Rc;

use ahash::AHashMap;
use weft_core::{DataValue, RenderError};
use weft_runtime::renderer::{ListenerId, NativeEvent, NativeHandler, OutputId, RenderTarget, Renderer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Element {
        tag: String,
        attrs: BTreeMap<String, String>,
    },
    Text(String),
    Anchor,
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<OutputId>,
    children: Vec<OutputId>,
}

struct Registration {
    node: OutputId,
    event: String,
    handler: NativeHandler,
}

#[derive(Default)]
struct DomState {
    nodes: AHashMap<OutputId, Node>,
    listeners: BTreeMap<u64, Registration>,
    next_node: u64,
    next_listener: u64,
    fail: Option<&'static str>,
    ops: usize,
}

impl DomState {
    fn check(&mut self, op: &'static str) -> Result<(), RenderError> {
        self.ops += 1;
        if self.fail == Some(op) {
            self.fail = None;
            return Err(RenderError::new(op, "injected failure"));
        }
        Ok(())
    }

    fn alloc(&mut self, kind: NodeKind) -> OutputId {
        self.next_node += 1;
        let id = OutputId::new(self.next_node);
        self.nodes.insert(
            id,
            Node {
                kind,
                parent: None,
                children: Vec::new(),
            },
        );
        id
    }

    fn node(&self, op: &'static str, id: OutputId) -> Result<&Node, RenderError> {
        self.nodes
            .get(&id)
            .ok_or_else(|| RenderError::new(op, format!("unknown node {id}")))
    }

    fn node_mut(&mut self, op: &'static str, id: OutputId) -> Result<&mut Node, RenderError> {
        self.nodes
            .get_mut(&id)
            .ok_or_else(|| RenderError::new(op, format!("unknown node {id}")))
    }

    fn detach(&mut self, child: OutputId) {
        let parent = self.nodes.get_mut(&child).and_then(|n| n.parent.take());
        if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(&p)) {
            parent.children.retain(|c| *c != child);
        }
    }
}

/// DOM-like renderer for tests and headless use.
#[derive(Default)]
pub struct MemoryDom {
    state: RefCell<DomState>,
}

impl MemoryDom {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn shared() -> Rc<Self> {
        Rc::new(Self::new())
    }

    /// A detached `<root>` element to attach components under.
    #[must_use]
    pub fn create_root(&self) -> OutputId {
        self.state.borrow_mut().alloc(NodeKind::Element {
            tag: "root".to_owned(),
            attrs: BTreeMap::new(),
        })
    }

    #[must_use]
    pub fn target(self: &Rc<Self>, node: OutputId) -> RenderTarget {
        RenderTarget::new(Rc::clone(self) as Rc<dyn Renderer>, node)
    }

    /// Make the next call of `op` (e.g. `"insert"`, `"set_attribute"`) fail.
    pub fn fail_next(&self, op: &'static str) {
        self.state.borrow_mut().fail = Some(op);
    }

    /// Renderer primitives called so far.
    #[must_use]
    pub fn op_count(&self) -> usize {
        self.state.borrow().ops
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.state.borrow().nodes.len()
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.state.borrow().listeners.len()
    }

    #[must_use]
    pub fn kind(&self, node: OutputId) -> Option<NodeKind> {
        self.state.borrow().nodes.get(&node).map(|n| n.kind.clone())
    }

    #[must_use]
    pub fn tag(&self, node: OutputId) -> Option<String> {
        match self.kind(node)? {
            NodeKind::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    #[must_use]
    pub fn attribute(&self, node: OutputId, name: &str) -> Option<String> {
        match &self.state.borrow().nodes.get(&node)?.kind {
            NodeKind::Element { attrs, .. } => attrs.get(name).cloned(),
            _ => None,
        }
    }

    #[must_use]
    pub fn parent(&self, node: OutputId) -> Option<OutputId> {
        self.state.borrow().nodes.get(&node)?.parent
    }

    /// Children including text nodes and anchors.
    #[must_use]
    pub fn children(&self, node: OutputId) -> Vec<OutputId> {
        self.state
            .borrow()
            .nodes
            .get(&node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    /// Element children only.
    #[must_use]
    pub fn element_children(&self, node: OutputId) -> Vec<OutputId> {
        let state = self.state.borrow();
        state
            .nodes
            .get(&node)
            .map(|n| {
                n.children
                    .iter()
                    .copied()
                    .filter(|c| {
                        matches!(state.nodes.get(c).map(|n| &n.kind), Some(NodeKind::Element { .. }))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Concatenated text of all descendant text nodes.
    #[must_use]
    pub fn text_content(&self, node: OutputId) -> String {
        let state = self.state.borrow();
        let mut out = String::new();
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            let Some(n) = state.nodes.get(&id) else {
                continue;
            };
            if let NodeKind::Text(text) = &n.kind {
                out.push_str(text);
            }
            stack.extend(n.children.iter().rev().copied());
        }
        out
    }

    /// Descendant elements named `tag`, in document order.
    #[must_use]
    pub fn find_by_tag(&self, root: OutputId, tag: &str) -> Vec<OutputId> {
        let state = self.state.borrow();
        let mut found = Vec::new();
        let mut stack: Vec<OutputId> = state
            .nodes
            .get(&root)
            .map(|n| n.children.iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(id) = stack.pop() {
            let Some(n) = state.nodes.get(&id) else {
                continue;
            };
            if matches!(&n.kind, NodeKind::Element { tag: t, .. } if t == tag) {
                found.push(id);
            }
            stack.extend(n.children.iter().rev().copied());
        }
        found
    }

    #[must_use]
    pub fn first_by_tag(&self, root: OutputId, tag: &str) -> Option<OutputId> {
        self.find_by_tag(root, tag).into_iter().next()
    }

    /// Whether `node` is `root` or one of its descendants.
    #[must_use]
    pub fn is_connected(&self, node: OutputId, root: OutputId) -> bool {
        let state = self.state.borrow();
        let mut cursor = Some(node);
        while let Some(id) = cursor {
            if id == root {
                return true;
            }
            cursor = state.nodes.get(&id).and_then(|n| n.parent);
        }
        false
    }

    /// Markup for the subtree at `node`. Anchors are omitted.
    #[must_use]
    pub fn render(&self, node: OutputId) -> String {
        let state = self.state.borrow();
        let mut out = String::new();
        render_into(&state, node, &mut out);
        out
    }

    /// Deliver a native event to every listener on `node`. Returns how many
    /// ran.
    pub fn trigger(&self, node: OutputId, event: &str, detail: Option<DataValue>) -> usize {
        let handlers: Vec<NativeHandler> = self
            .state
            .borrow()
            .listeners
            .values()
            .filter(|r| r.node == node && r.event == event)
            .map(|r| Rc::clone(&r.handler))
            .collect();
        let native = NativeEvent::new(event, detail);
        for handler in &handlers {
            handler(&native);
        }
        tracing::trace!(node = %node, event, handlers = handlers.len(), "native event");
        handlers.len()
    }
}

fn render_into(state: &DomState, id: OutputId, out: &mut String) {
    let Some(node) = state.nodes.get(&id) else {
        return;
    };
    match &node.kind {
        NodeKind::Text(text) => out.push_str(text),
        NodeKind::Anchor => {}
        NodeKind::Element { tag, attrs } => {
            out.push('<');
            out.push_str(tag);
            for (name, value) in attrs {
                let _ = write!(out, " {name}=\"{value}\"");
            }
            out.push('>');
            for child in &node.children {
                render_into(state, *child, out);
            }
            let _ = write!(out, "</{tag}>");
        }
    }
}

impl Renderer for MemoryDom {
    fn create_element(&self, tag: &str) -> Result<OutputId, RenderError> {
        let mut state = self.state.borrow_mut();
        state.check("create_element")?;
        Ok(state.alloc(NodeKind::Element {
            tag: tag.to_owned(),
            attrs: BTreeMap::new(),
        }))
    }

    fn create_text(&self, text: &str) -> Result<OutputId, RenderError> {
        let mut state = self.state.borrow_mut();
        state.check("create_text")?;
        Ok(state.alloc(NodeKind::Text(text.to_owned())))
    }

    fn create_anchor(&self) -> Result<OutputId, RenderError> {
        let mut state = self.state.borrow_mut();
        state.check("create_anchor")?;
        Ok(state.alloc(NodeKind::Anchor))
    }

    fn set_attribute(&self, node: OutputId, name: &str, value: &str) -> Result<(), RenderError> {
        let mut state = self.state.borrow_mut();
        state.check("set_attribute")?;
        match &mut state.node_mut("set_attribute", node)?.kind {
            NodeKind::Element { attrs, .. } => {
                attrs.insert(name.to_owned(), value.to_owned());
                Ok(())
            }
            _ => Err(RenderError::new("set_attribute", format!("{node} is not an element"))),
        }
    }

    fn remove_attribute(&self, node: OutputId, name: &str) -> Result<(), RenderError> {
        let mut state = self.state.borrow_mut();
        state.check("remove_attribute")?;
        if let NodeKind::Element { attrs, .. } = &mut state.node_mut("remove_attribute", node)?.kind {
            attrs.remove(name);
        }
        Ok(())
    }

    fn set_text(&self, node: OutputId, text: &str) -> Result<(), RenderError> {
        let mut state = self.state.borrow_mut();
        state.check("set_text")?;
        match &mut state.node_mut("set_text", node)?.kind {
            NodeKind::Text(current) => {
                text.clone_into(current);
                Ok(())
            }
            _ => Err(RenderError::new("set_text", format!("{node} is not a text node"))),
        }
    }

    fn insert(&self, parent: OutputId, child: OutputId, before: Option<OutputId>) -> Result<(), RenderError> {
        let mut state = self.state.borrow_mut();
        state.check("insert")?;
        state.node("insert", child)?;
        if let Some(before) = before
            && state.node("insert", before)?.parent != Some(parent)
        {
            return Err(RenderError::new(
                "insert",
                format!("{before} is not a child of {parent}"),
            ));
        }
        state.node("insert", parent)?;
        state.detach(child);
        let siblings = &mut state.node_mut("insert", parent)?.children;
        let at = before
            .and_then(|b| siblings.iter().position(|c| *c == b))
            .unwrap_or(siblings.len());
        siblings.insert(at, child);
        state.node_mut("insert", child)?.parent = Some(parent);
        Ok(())
    }

    fn remove(&self, parent: OutputId, child: OutputId) -> Result<(), RenderError> {
        let mut state = self.state.borrow_mut();
        state.check("remove")?;
        if state.node("remove", child)?.parent != Some(parent) {
            return Err(RenderError::new("remove", format!("{child} is not a child of {parent}")));
        }
        state.detach(child);
        Ok(())
    }

    fn listen(&self, node: OutputId, event: &str, handler: NativeHandler) -> Result<ListenerId, RenderError> {
        let mut state = self.state.borrow_mut();
        state.check("listen")?;
        state.node("listen", node)?;
        state.next_listener += 1;
        let id = state.next_listener;
        state.listeners.insert(
            id,
            Registration {
                node,
                event: event.to_owned(),
                handler,
            },
        );
        Ok(ListenerId(id))
    }

    fn unlisten(&self, listener: ListenerId) -> Result<(), RenderError> {
        let mut state = self.state.borrow_mut();
        state.check("unlisten")?;
        state
            .listeners
            .remove(&listener.0)
            .map(drop)
            .ok_or_else(|| RenderError::new("unlisten", format!("unknown listener {}", listener.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_before_and_move() {
        let dom = MemoryDom::new();
        let root = dom.create_root();
        let a = dom.create_text("a").expect("text");
        let b = dom.create_text("b").expect("text");
        dom.insert(root, b, None).expect("insert");
        dom.insert(root, a, Some(b)).expect("insert before");
        assert_eq!(dom.text_content(root), "ab");

        let other = dom.create_element("p").expect("el");
        dom.insert(root, other, None).expect("insert");
        dom.insert(other, a, None).expect("move");
        assert_eq!(dom.children(root), vec![b, other]);
        assert_eq!(dom.render(root), "<root>b<p>a</p></root>");
    }

    #[test]
    fn remove_checks_parent() {
        let dom = MemoryDom::new();
        let root = dom.create_root();
        let el = dom.create_element("div").expect("el");
        assert!(dom.remove(root, el).is_err());
        dom.insert(root, el, None).expect("insert");
        dom.remove(root, el).expect("remove");
        assert!(!dom.is_connected(el, root));
    }

    #[test]
    fn injected_failure_fires_once() {
        let dom = MemoryDom::new();
        dom.fail_next("create_element");
        let err = dom.create_element("div").expect_err("injected");
        assert_eq!(err.operation, "create_element");
        assert!(dom.create_element("div").is_ok());
    }

    #[test]
    fn trigger_reaches_listeners_of_node_only() {
        let dom = MemoryDom::new();
        let a = dom.create_element("button").expect("el");
        let b = dom.create_element("button").expect("el");
        let hits = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&hits);
        let id = dom
            .listen(a, "click", Rc::new(move |e: &NativeEvent| sink.borrow_mut().push(e.name.clone())))
            .expect("listen");
        assert_eq!(dom.trigger(b, "click", None), 0);
        assert_eq!(dom.trigger(a, "click", None), 1);
        assert_eq!(*hits.borrow(), vec!["click".to_owned()]);
        dom.unlisten(id).expect("unlisten");
        assert_eq!(dom.listener_count(), 0);
        assert!(dom.unlisten(id).is_err());
    }
}
