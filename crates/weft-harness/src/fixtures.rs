#![forbid(unsafe_code)]

//! Reusable component classes for scenario tests.

use std::cell::Cell;
use std::rc::Rc;

use serde_json::json;
use weft_core::{DataValue, Result};
use weft_runtime::component::{Component, ComponentClass, ComponentOptions};
use weft_runtime::expr::{BinaryOp, Expr};
use weft_runtime::reactive::FlushHost;
use weft_runtime::renderer::OutputId;
use weft_runtime::template::{component, el, for_each, text};

use crate::dom::MemoryDom;

/// A root component attached under a fresh `<root>` of its own
/// [`MemoryDom`].
pub struct Mounted {
    pub dom: Rc<MemoryDom>,
    pub root: OutputId,
    pub component: Component,
}

impl Mounted {
    /// Text of the first descendant `tag`, if any.
    #[must_use]
    pub fn text_of(&self, tag: &str) -> Option<String> {
        self.dom
            .first_by_tag(self.root, tag)
            .map(|node| self.dom.text_content(node))
    }

    /// Attribute `name` of the first descendant `tag`.
    #[must_use]
    pub fn attr_of(&self, tag: &str, name: &str) -> Option<String> {
        self.dom
            .first_by_tag(self.root, tag)
            .and_then(|node| self.dom.attribute(node, name))
    }

    /// Attribute `name` of every descendant `tag`, in document order.
    #[must_use]
    pub fn attrs_of(&self, tag: &str, name: &str) -> Vec<Option<String>> {
        self.dom
            .find_by_tag(self.root, tag)
            .into_iter()
            .map(|node| self.dom.attribute(node, name))
            .collect()
    }
}

/// Construct `class` and attach it to a new in-memory document.
pub fn mount(class: &Rc<ComponentClass>, options: ComponentOptions) -> Result<Mounted> {
    let component = Component::new(class, options)?;
    mount_component(component)
}

/// Attach an already constructed component to a new in-memory document.
pub fn mount_component(component: Component) -> Result<Mounted> {
    let dom = MemoryDom::shared();
    let root = dom.create_root();
    component.attach(&dom.target(root))?;
    Ok(Mounted {
        dom,
        root,
        component,
    })
}

/// Counts flush requests.
#[derive(Debug, Default)]
pub struct CountingHost {
    requests: Cell<usize>,
}

impl CountingHost {
    #[must_use]
    pub fn requests(&self) -> usize {
        self.requests.get()
    }
}

impl FlushHost for CountingHost {
    fn request_flush(&self) {
        self.requests.set(self.requests.get() + 1);
    }
}

/// A swatch list: `<b>` shows the value, one `<li>` per swatch, clicking a
/// swatch selects it.
#[must_use]
pub fn color_picker() -> Rc<ComponentClass> {
    let swatch = el("li")
        .attr(
            "style",
            Expr::concat([Expr::lit("background: "), Expr::path("item")]),
        )
        .attr(
            "class",
            Expr::cond(
                Expr::binary(BinaryOp::Eq, Expr::path("item"), Expr::path("value")),
                Expr::lit("selected"),
                Expr::lit(""),
            ),
        )
        .on("click", "itemClick", [Expr::path("item")]);
    ComponentClass::new("ColorPicker")
        .template(
            el("div")
                .child(
                    el("b")
                        .attr("title", Expr::path("value"))
                        .child(text(Expr::path("value"))),
                )
                .child(
                    el("ul")
                        .attr_lit("class", "ui-colorpicker")
                        .child(for_each("item", Expr::path("datasource"), swatch)),
                ),
        )
        .init_data(json!({"datasource": ["red", "blue", "yellow", "green"]}))
        .method("itemClick", |picker, args| match args.first().cloned().flatten() {
            Some(item) => picker.set("value", item),
            None => Ok(()),
        })
        .build()
}

/// `<span title="{{text}}">{{text}}</span>`.
#[must_use]
pub fn label() -> Rc<ComponentClass> {
    ComponentClass::new("Label")
        .template(
            el("span")
                .attr("title", Expr::path("text"))
                .child(text(Expr::path("text"))),
        )
        .build()
}

/// One `<li>` per entry of `list`.
#[must_use]
pub fn tel_list() -> Rc<ComponentClass> {
    ComponentClass::new("TelList")
        .template(
            el("ul").child(for_each(
                "item",
                Expr::path("list"),
                el("li")
                    .attr("title", Expr::path("item"))
                    .child(text(Expr::path("item"))),
            )),
        )
        .build()
}

/// One `<dl>` per person, with the person's tels rendered by a
/// [`tel_list`].
#[must_use]
pub fn person_list() -> Rc<ComponentClass> {
    let person = el("dl")
        .child(
            el("dt")
                .attr("title", Expr::path("item.name"))
                .child(text(Expr::path("item.name"))),
        )
        .child(el("dd").child(component("ui-tel").attr("list", Expr::path("item.tels"))));
    ComponentClass::new("PersonList")
        .component("ui-tel", &tel_list())
        .template(el("div").child(for_each("item", Expr::path("list"), person)))
        .build()
}

/// Two people with two numbers each.
#[must_use]
pub fn persons() -> DataValue {
    json!([
        {"name": "erik", "tels": ["12345678", "123456789"]},
        {"name": "firede", "tels": ["2345678", "23456789"]}
    ])
    .into()
}
