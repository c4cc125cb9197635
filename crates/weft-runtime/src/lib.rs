#![forbid(unsafe_code)]

//! Runtime: component lifecycle, computed values, batched scheduling and
//! template binding over an abstract [`Renderer`](renderer::Renderer).
//!
//! # Example
//!
//! ```
//! use weft_runtime::component::{Component, ComponentClass, ComponentOptions};
//! use weft_runtime::expr::Expr;
//! use weft_runtime::reactive::scheduler;
//! use weft_runtime::template::{el, text};
//!
//! let class = ComponentClass::new("greeting")
//!     .template(el("p").child(text(Expr::path("name"))))
//!     .init_data(serde_json::json!({"name": "weft"}))
//!     .build();
//! let greeting = Component::new(&class, ComponentOptions::new()).unwrap();
//! greeting.set("name", "loom").unwrap();
//! scheduler::flush_now().unwrap();
//! assert_eq!(greeting.get("name"), Some("loom".into()));
//! ```

pub mod binding;
pub mod component;
pub mod config;
pub mod expr;
pub mod list;
pub mod message;
pub mod reactive;
pub mod renderer;
pub mod template;
mod view;

pub use component::{
    Component, ComponentClass, ComponentId, ComponentOptions, LifecycleHook, Stage, WatchId,
};
pub use config::RuntimeConfig;
pub use message::{Message, MessageRouter};
pub use renderer::{ListenerId, NativeEvent, NativeHandler, OutputId, RenderTarget, Renderer};
