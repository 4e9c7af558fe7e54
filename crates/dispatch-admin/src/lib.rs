//! A small interactive administration loop: a hierarchical command tree
//! the operator can descend into and back out of, read from a line editor
//! on its own dedicated thread.

pub mod command;
pub mod repl;

pub use command::{CommandTable, Outcome};
pub use repl::{run_repl, ReplConfig};
