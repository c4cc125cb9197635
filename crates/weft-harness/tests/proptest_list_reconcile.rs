//! Property-based invariant tests for repeated regions.
//!
//! 1. A plan covers both sequences: retained + created = next, retained + disposed = prev.
//! 2. Retained is always a shared prefix; at most one of created/disposed is non-empty.
//! 3. After any sequence of list writes and flushes, the rendered items equal the source.
//! 4. The live child components match the source length; every dropped one is disposed.
//! 5. Items at surviving positions keep their output nodes.

#![forbid(unsafe_code)]

use std::cell::Cell;
use std::rc::Rc;

use proptest::prelude::*;
use weft_core::DataValue;
use weft_harness::mount;
use weft_runtime::component::{ComponentClass, ComponentOptions, LifecycleHook};
use weft_runtime::expr::Expr;
use weft_runtime::list::ListReconciler;
use weft_runtime::reactive::scheduler;
use weft_runtime::template::{component, el, for_each, text};

// ── Helpers ─────────────────────────────────────────────────────────────

fn items_strategy() -> impl Strategy<Value = Vec<String>> {
    proptest::collection::vec("[a-z]{1,4}", 0..7)
}

fn as_value(items: &[String]) -> DataValue {
    DataValue::Seq(items.iter().map(|s| DataValue::from(s.as_str())).collect())
}

fn plain_list() -> Rc<ComponentClass> {
    ComponentClass::new("Plain")
        .template(el("ul").child(for_each(
            "item",
            Expr::path("items"),
            el("li").attr("title", Expr::path("item")).child(text(Expr::path("item"))),
        )))
        .build()
}

fn label_list(disposed: &Rc<Cell<usize>>) -> Rc<ComponentClass> {
    let counter = Rc::clone(disposed);
    let tracked = ComponentClass::new("TrackedLabel")
        .template(el("span").attr("title", Expr::path("text")))
        .hook(LifecycleHook::Disposed, move |_| {
            counter.set(counter.get() + 1);
            Ok(())
        })
        .build();
    ComponentClass::new("Labels")
        .component("ui-label", &tracked)
        .template(el("div").child(for_each(
            "item",
            Expr::path("items"),
            component("ui-label").attr("text", Expr::path("item")),
        )))
        .build()
}

// ═════════════════════════════════════════════════════════════════════════
// 1–2. Plan shape
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn plan_covers_both_sequences(prev in 0usize..50, next in 0usize..50) {
        let plan = ListReconciler::plan(prev, next);
        prop_assert_eq!(plan.retained.start, 0);
        prop_assert_eq!(plan.retained.len() + plan.created.len(), next);
        prop_assert_eq!(plan.retained.len() + plan.disposed.len(), prev);
        prop_assert_eq!(plan.created.start, plan.retained.end);
        prop_assert_eq!(plan.disposed.start, plan.retained.end);
    }

    #[test]
    fn plan_grows_or_shrinks_never_both(prev in 0usize..50, next in 0usize..50) {
        let plan = ListReconciler::plan(prev, next);
        prop_assert!(plan.created.is_empty() || plan.disposed.is_empty());
        prop_assert_eq!(plan.is_noop(), prev == next);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 3. Rendered items follow the source
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn rendered_items_follow_writes(
        initial in items_strategy(),
        writes in proptest::collection::vec(items_strategy(), 1..5),
    ) {
        scheduler::reset();
        let options = ComponentOptions::new().data(DataValue::Map(
            [("items".to_owned(), as_value(&initial))].into_iter().collect(),
        ));
        let mounted = mount(&plain_list(), options).expect("mount");
        prop_assert_eq!(mounted.attrs_of("li", "title"), initial.iter().cloned().map(Some).collect::<Vec<_>>());

        for items in &writes {
            mounted.component.set("items", as_value(items)).expect("set");
            scheduler::flush_now().expect("flush");
            let titles = mounted.attrs_of("li", "title");
            prop_assert_eq!(titles, items.iter().cloned().map(Some).collect::<Vec<_>>());
            prop_assert_eq!(mounted.dom.text_content(mounted.root), items.concat());
        }
        mounted.component.dispose().expect("dispose");
        scheduler::reset();
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. Components track the source length
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn dropped_components_are_disposed(
        initial in items_strategy(),
        writes in proptest::collection::vec(items_strategy(), 1..5),
    ) {
        scheduler::reset();
        let disposed = Rc::new(Cell::new(0));
        let options = ComponentOptions::new().data(DataValue::Map(
            [("items".to_owned(), as_value(&initial))].into_iter().collect(),
        ));
        let mounted = mount(&label_list(&disposed), options).expect("mount");

        let mut expected_disposed = 0;
        let mut len = initial.len();
        for items in &writes {
            mounted.component.set("items", as_value(items)).expect("set");
            scheduler::flush_now().expect("flush");
            expected_disposed += len.saturating_sub(items.len());
            len = items.len();
            prop_assert_eq!(mounted.component.children().len(), items.len());
            prop_assert_eq!(disposed.get(), expected_disposed);
            prop_assert_eq!(
                mounted.attrs_of("span", "title"),
                items.iter().cloned().map(Some).collect::<Vec<_>>()
            );
        }

        mounted.component.dispose().expect("dispose");
        prop_assert_eq!(disposed.get(), expected_disposed + len);
        scheduler::reset();
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 5. Surviving positions keep their nodes
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn retained_positions_keep_output(initial in items_strategy(), next in items_strategy()) {
        scheduler::reset();
        let options = ComponentOptions::new().data(DataValue::Map(
            [("items".to_owned(), as_value(&initial))].into_iter().collect(),
        ));
        let mounted = mount(&plain_list(), options).expect("mount");
        let before = mounted.dom.find_by_tag(mounted.root, "li");

        mounted.component.set("items", as_value(&next)).expect("set");
        scheduler::flush_now().expect("flush");
        let after = mounted.dom.find_by_tag(mounted.root, "li");

        let shared = initial.len().min(next.len());
        prop_assert_eq!(&before[..shared], &after[..shared]);
        for gone in &before[shared..] {
            prop_assert!(!mounted.dom.is_connected(*gone, mounted.root));
        }
        scheduler::reset();
    }
}
