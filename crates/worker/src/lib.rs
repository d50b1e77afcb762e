//! Shared task primitives for the handoff crates.
//!
//! Every task the broker starts goes through [`spawn`] so it is labelled with a
//! [`TaskClass`] in traces and lands on a runtime even when the caller is a
//! foreign thread.

mod class;
mod spawn;

pub use class::TaskClass;
pub use spawn::{in_runtime, spawn};
