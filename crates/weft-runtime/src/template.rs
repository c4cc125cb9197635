#![forbid(unsafe_code)]

//! The compiled template tree a component class is defined with.
//!
//! Markup parsing lives outside this crate; whatever front end produces the
//! tree hands over [`TemplateNode`] values. The builder functions here are how
//! Rust code and tests write templates directly:
//!
//! ```
//! use weft_runtime::expr::Expr;
//! use weft_runtime::template::{el, text};
//!
//! let tree = el("a").child(
//!     el("span")
//!         .attr("title", Expr::path("email"))
//!         .child(text(Expr::path("name"))),
//! );
//! # let _ = tree;
//! ```

use crate::expr::Expr;

/// A handler binding: `on-<name>="method(args)"`.
#[derive(Debug, Clone, PartialEq)]
pub struct EventBinding {
    pub name: String,
    pub method: String,
    /// Argument expressions. Empty means the payload itself is the only
    /// argument.
    pub args: Vec<Expr>,
}

/// An input passed from an owner template into a child component.
#[derive(Debug, Clone, PartialEq)]
pub struct Prop {
    pub name: String,
    pub expr: Expr,
    /// `{= path =}`: the child's changes to this input flow back into the
    /// owner's path.
    pub two_way: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplateNode {
    Element {
        tag: String,
        attrs: Vec<(String, Expr)>,
        events: Vec<EventBinding>,
        children: Vec<TemplateNode>,
    },
    Text(Expr),
    Component {
        name: String,
        props: Vec<Prop>,
        events: Vec<EventBinding>,
        /// `san-ref`: a literal or an interpolated name.
        reference: Option<Expr>,
        /// Slot content, rendered by the owner at the child's slot.
        children: Vec<TemplateNode>,
    },
    For {
        source: Expr,
        item: String,
        index: Option<String>,
        /// Accepted for compatibility; reuse stays positional.
        key: Option<Expr>,
        body: Box<TemplateNode>,
    },
    If {
        guard: Expr,
        body: Box<TemplateNode>,
        otherwise: Option<Box<TemplateNode>>,
    },
    /// Where the owner's slot content goes inside this component.
    Slot,
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

#[must_use]
pub fn el(tag: impl Into<String>) -> TemplateNode {
    TemplateNode::Element {
        tag: tag.into(),
        attrs: Vec::new(),
        events: Vec::new(),
        children: Vec::new(),
    }
}

#[must_use]
pub fn text(expr: Expr) -> TemplateNode {
    TemplateNode::Text(expr)
}

/// Literal text.
#[must_use]
pub fn raw(text: &str) -> TemplateNode {
    TemplateNode::Text(Expr::lit(text))
}

#[must_use]
pub fn component(name: impl Into<String>) -> TemplateNode {
    TemplateNode::Component {
        name: name.into(),
        props: Vec::new(),
        events: Vec::new(),
        reference: None,
        children: Vec::new(),
    }
}

/// `san-for="item in source"` around `body`.
#[must_use]
pub fn for_each(item: impl Into<String>, source: Expr, body: TemplateNode) -> TemplateNode {
    TemplateNode::For {
        source,
        item: item.into(),
        index: None,
        key: None,
        body: Box::new(body),
    }
}

/// `san-if="guard"` around `body`.
#[must_use]
pub fn when(guard: Expr, body: TemplateNode) -> TemplateNode {
    TemplateNode::If {
        guard,
        body: Box::new(body),
        otherwise: None,
    }
}

#[must_use]
pub fn slot() -> TemplateNode {
    TemplateNode::Slot
}

impl TemplateNode {
    /// Add an attribute (elements) or a one-way prop (components).
    #[must_use]
    pub fn attr(mut self, name: impl Into<String>, expr: Expr) -> Self {
        match &mut self {
            Self::Element { attrs, .. } => attrs.push((name.into(), expr)),
            Self::Component { props, .. } => props.push(Prop {
                name: name.into(),
                expr,
                two_way: false,
            }),
            _ => {}
        }
        self
    }

    /// Literal attribute or prop.
    #[must_use]
    pub fn attr_lit(self, name: impl Into<String>, value: &str) -> Self {
        self.attr(name, Expr::lit(value))
    }

    /// One-way prop; alias of [`attr`](Self::attr) on components.
    #[must_use]
    pub fn prop(self, name: impl Into<String>, expr: Expr) -> Self {
        self.attr(name, expr)
    }

    /// Two-way prop bound to the owner path `path`.
    #[must_use]
    pub fn bind(mut self, name: impl Into<String>, path: &str) -> Self {
        if let Self::Component { props, .. } = &mut self {
            props.push(Prop {
                name: name.into(),
                expr: Expr::path(path),
                two_way: true,
            });
        }
        self
    }

    /// `on-<event>="method(args)"`.
    #[must_use]
    pub fn on(
        mut self,
        event: impl Into<String>,
        method: impl Into<String>,
        args: impl IntoIterator<Item = Expr>,
    ) -> Self {
        let binding = EventBinding {
            name: event.into(),
            method: method.into(),
            args: args.into_iter().collect(),
        };
        match &mut self {
            Self::Element { events, .. } | Self::Component { events, .. } => events.push(binding),
            _ => {}
        }
        self
    }

    /// `san-ref`.
    #[must_use]
    pub fn reference(mut self, name: Expr) -> Self {
        if let Self::Component { reference, .. } = &mut self {
            *reference = Some(name);
        }
        self
    }

    #[must_use]
    pub fn child(mut self, node: TemplateNode) -> Self {
        match &mut self {
            Self::Element { children, .. } | Self::Component { children, .. } => {
                children.push(node);
            }
            _ => {}
        }
        self
    }

    #[must_use]
    pub fn children(self, nodes: impl IntoIterator<Item = TemplateNode>) -> Self {
        nodes.into_iter().fold(self, Self::child)
    }

    /// Name the loop index (`san-for="item, index in source"`).
    #[must_use]
    pub fn index(mut self, name: impl Into<String>) -> Self {
        if let Self::For { index, .. } = &mut self {
            *index = Some(name.into());
        }
        self
    }

    /// `trackBy` key expression for a loop.
    #[must_use]
    pub fn key(mut self, expr: Expr) -> Self {
        if let Self::For { key, .. } = &mut self {
            *key = Some(expr);
        }
        self
    }

    /// `san-else` branch for a conditional.
    #[must_use]
    pub fn otherwise(mut self, node: TemplateNode) -> Self {
        if let Self::If { otherwise, .. } = &mut self {
            *otherwise = Some(Box::new(node));
        }
        self
    }
}
