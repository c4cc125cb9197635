#![forbid(unsafe_code)]

//! Compilation of a class template into replayable binding plans.
//!
//! [`BindingSet::compile`] runs once per component class. Each dynamic value
//! in the resulting plan tree ([`ValuePlan`]) keeps the read paths extracted
//! from its expression, so patching can skip every binding whose reads the
//! batch did not touch.
//!
//! # Invariants
//!
//! 1. The root plan node is an element.
//! 2. Every component placement names a component the class registers.
//! 3. Two-way props are plain path reads.

use std::rc::Rc;

use smallvec::SmallVec;
use weft_core::{ChangeLog, DataValue, Path, Result, WeftError};

use crate::expr::{self, EvalEnv, Expr, ExprPath, Scope};
use crate::template::{EventBinding, TemplateNode};

/// A dynamic value plus the paths it reads.
#[derive(Debug, Clone)]
pub struct ValuePlan {
    pub expr: Expr,
    reads: Vec<ExprPath>,
}

impl ValuePlan {
    #[must_use]
    pub fn new(expr: Expr) -> Self {
        let reads = expr.reads();
        Self { expr, reads }
    }

    /// Store paths this value depends on, resolved against `scope`.
    #[must_use]
    pub fn deps(&self, scope: &Scope) -> SmallVec<[Path; 2]> {
        self.reads
            .iter()
            .filter_map(|read| read.resolve_static(scope))
            .collect()
    }

    #[must_use]
    pub fn is_affected(&self, scope: &Scope, log: &ChangeLog) -> bool {
        self.reads
            .iter()
            .filter_map(|read| read.resolve_static(scope))
            .any(|path| log.affects(&path))
    }

    #[must_use]
    pub fn eval(&self, env: &EvalEnv<'_>) -> Option<DataValue> {
        expr::eval(&self.expr, env)
    }

    #[must_use]
    pub fn is_static(&self) -> bool {
        self.reads.is_empty()
    }
}

/// A handler binding, shared by every listener created from it.
#[derive(Debug, Clone, PartialEq)]
pub struct EventPlan {
    pub name: String,
    pub method: String,
    pub args: Vec<Expr>,
}

impl From<&EventBinding> for EventPlan {
    fn from(binding: &EventBinding) -> Self {
        Self {
            name: binding.name.clone(),
            method: binding.method.clone(),
            args: binding.args.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ElementPlan {
    pub tag: String,
    pub attrs: Vec<(String, ValuePlan)>,
    pub events: Vec<Rc<EventPlan>>,
    pub children: Vec<PlanNode>,
}

#[derive(Debug, Clone)]
pub struct PropPlan {
    pub name: String,
    /// Path in the child's store the prop writes.
    pub target: Path,
    pub value: ValuePlan,
    /// Owner path written back when the child changes `target`.
    pub two_way: Option<ExprPath>,
}

#[derive(Debug, Clone)]
pub struct ComponentPlan {
    pub name: String,
    pub props: Vec<PropPlan>,
    pub events: Vec<Rc<EventPlan>>,
    pub reference: Option<ValuePlan>,
    pub slot: Vec<PlanNode>,
}

#[derive(Debug, Clone)]
pub struct ForPlan {
    pub source: ValuePlan,
    pub item: String,
    pub index: Option<String>,
    pub key: Option<ValuePlan>,
    pub body: Box<PlanNode>,
}

#[derive(Debug, Clone)]
pub struct IfPlan {
    pub guard: ValuePlan,
    pub body: Box<PlanNode>,
    pub otherwise: Option<Box<PlanNode>>,
}

#[derive(Debug, Clone)]
pub enum PlanNode {
    Element(ElementPlan),
    Text(ValuePlan),
    Component(ComponentPlan),
    For(ForPlan),
    If(IfPlan),
    Slot,
}

/// The compiled plan for one component class.
#[derive(Debug, Clone)]
pub struct BindingSet {
    root: PlanNode,
    bindings: usize,
}

impl BindingSet {
    /// Compile `template`. `is_known` answers whether a component name is
    /// registered with the class.
    pub fn compile(template: &TemplateNode, is_known: impl Fn(&str) -> bool) -> Result<Self> {
        if !matches!(template, TemplateNode::Element { .. }) {
            return Err(WeftError::template("root node must be an element"));
        }
        let mut compiler = Compiler {
            is_known: &is_known,
            bindings: 0,
        };
        let root = compiler.node(template)?;
        Ok(Self {
            root,
            bindings: compiler.bindings,
        })
    }

    #[must_use]
    pub fn root(&self) -> &PlanNode {
        &self.root
    }

    /// Number of dynamic values in the plan.
    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.bindings
    }
}

struct Compiler<'a> {
    is_known: &'a dyn Fn(&str) -> bool,
    bindings: usize,
}

impl Compiler<'_> {
    fn value(&mut self, expr: &Expr) -> ValuePlan {
        let plan = ValuePlan::new(expr.clone());
        if !plan.is_static() {
            self.bindings += 1;
        }
        plan
    }

    fn nodes(&mut self, nodes: &[TemplateNode]) -> Result<Vec<PlanNode>> {
        nodes.iter().map(|node| self.node(node)).collect()
    }

    fn node(&mut self, node: &TemplateNode) -> Result<PlanNode> {
        Ok(match node {
            TemplateNode::Element {
                tag,
                attrs,
                events,
                children,
            } => PlanNode::Element(ElementPlan {
                tag: tag.clone(),
                attrs: attrs
                    .iter()
                    .map(|(name, expr)| (name.clone(), self.value(expr)))
                    .collect(),
                events: events.iter().map(|e| Rc::new(EventPlan::from(e))).collect(),
                children: self.nodes(children)?,
            }),
            TemplateNode::Text(expr) => PlanNode::Text(self.value(expr)),
            TemplateNode::Component {
                name,
                props,
                events,
                reference,
                children,
            } => {
                if !(self.is_known)(name) {
                    return Err(WeftError::UnknownComponent { name: name.clone() });
                }
                let mut plans = Vec::with_capacity(props.len());
                for prop in props {
                    let two_way = if prop.two_way {
                        let Some(path) = prop.expr.as_read() else {
                            return Err(WeftError::template(format!(
                                "two-way prop `{}` must bind a plain path",
                                prop.name
                            )));
                        };
                        Some(path.clone())
                    } else {
                        None
                    };
                    plans.push(PropPlan {
                        name: prop.name.clone(),
                        target: Path::name(prop.name.as_str()),
                        value: self.value(&prop.expr),
                        two_way,
                    });
                }
                PlanNode::Component(ComponentPlan {
                    name: name.clone(),
                    props: plans,
                    events: events.iter().map(|e| Rc::new(EventPlan::from(e))).collect(),
                    reference: reference.as_ref().map(|r| self.value(r)),
                    slot: self.nodes(children)?,
                })
            }
            TemplateNode::For {
                source,
                item,
                index,
                key,
                body,
            } => PlanNode::For(ForPlan {
                source: self.value(source),
                item: item.clone(),
                index: index.clone(),
                key: key.as_ref().map(|k| self.value(k)),
                body: Box::new(self.node(body)?),
            }),
            TemplateNode::If {
                guard,
                body,
                otherwise,
            } => PlanNode::If(IfPlan {
                guard: self.value(guard),
                body: Box::new(self.node(body)?),
                otherwise: match otherwise {
                    Some(other) => Some(Box::new(self.node(other)?)),
                    None => None,
                },
            }),
            TemplateNode::Slot => PlanNode::Slot,
        })
    }
}
