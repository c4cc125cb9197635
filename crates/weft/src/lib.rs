#![forbid(unsafe_code)]

//! Weft public facade crate.
//!
//! This crate provides the stable, ergonomic surface area for users.

pub use weft_core::{DataValue, Path, Result, WeftError};
pub use weft_runtime::{
    Component, ComponentClass, ComponentOptions, LifecycleHook, RenderTarget, Renderer,
    RuntimeConfig, Stage,
};

pub mod prelude {
    pub use weft_core as core;
    #[cfg(feature = "harness")]
    pub use weft_harness as harness;
    pub use weft_runtime as runtime;

    pub use weft_runtime::expr::{BinaryOp, Expr};
    pub use weft_runtime::reactive::scheduler;
    pub use weft_runtime::template::{component, el, for_each, raw, slot, text, when};
}
