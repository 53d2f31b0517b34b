//! A small Lisp: a reader and printer for S-expressions, a bytecode compiler
//! and VM, and a garbage-collected heap with a choice of collectors.
//!

pub mod config;
pub mod data;
pub mod error;
pub mod eval;
pub mod printer;
pub mod reader;
pub mod repl;

pub use repl::repl;

#[cfg(feature = "render")]
pub use data::render::{render_store, save_graph};
