//! A counter built only from the facade and its prelude.

#![forbid(unsafe_code)]

use serde_json::json;
use weft::prelude::*;
use weft::{ComponentClass, ComponentOptions, LifecycleHook, Stage};
use weft_harness::mount;

fn counter() -> std::rc::Rc<ComponentClass> {
    ComponentClass::new("Counter")
        .template(
            el("div")
                .child(
                    el("button")
                        .attr_lit("class", "inc")
                        .on("click", "add", [Expr::lit(1)]),
                )
                .child(el("output").child(text(Expr::path("count")))),
        )
        .init_data(json!({"count": 0}))
        .method("add", |me, args| {
            let step = args.first().cloned().flatten().map_or(0.0, |v| v.to_number());
            let count = me.get("count").map_or(0.0, |v| v.to_number());
            me.set("count", count + step)
        })
        .hook(LifecycleHook::Updated, |me| {
            let count = me.get("count").map_or(0.0, |v| v.to_number());
            if count >= 3.0 { me.set("capped", true) } else { Ok(()) }
        })
        .build()
}

#[test]
fn clicks_accumulate_after_flush() {
    scheduler::reset();
    let mounted = mount(&counter(), ComponentOptions::new()).expect("mount");
    let button = mounted.dom.first_by_tag(mounted.root, "button").expect("button");
    assert_eq!(mounted.text_of("output").as_deref(), Some("0"));

    for _ in 0..3 {
        mounted.dom.trigger(button, "click", None);
    }
    assert_eq!(mounted.text_of("output").as_deref(), Some("0"));
    scheduler::settle().expect("settle");
    assert_eq!(mounted.text_of("output").as_deref(), Some("3"));
    assert_eq!(mounted.component.get("capped"), Some(true.into()));

    mounted.component.dispose().expect("dispose");
    assert!(mounted.component.is(Stage::Disposed));
    scheduler::reset();
}

#[test]
fn options_data_overrides_initial_data() {
    scheduler::reset();
    let options = ComponentOptions::new().data(json!({"count": 41}));
    let mounted = mount(&counter(), options).expect("mount");
    let button = mounted.dom.first_by_tag(mounted.root, "button").expect("button");
    mounted.dom.trigger(button, "click", None);
    scheduler::flush_now().expect("flush");
    assert_eq!(mounted.text_of("output").as_deref(), Some("42"));
    scheduler::reset();
}
