//! A small line-oriented command interpreter.
//!
//! Lines are split on whitespace, classified as a builtin (`exit`, `cd`,
//! `path`) or a pipeline, and pipelines are run as one child process per stage
//! connected with pipes. The last stage may send its output to a file with
//! `> file`, and a trailing `&` runs the pipeline in the background.
//!
//! The main entry point is [`Interpreter`]. The engine pieces are public so
//! they can be driven and tested on their own: [`parser`] builds stages,
//! [`pipeline`] spawns them and [`job`] waits for or reaps them.

mod builtin;
pub mod command;
pub mod env;
pub mod error;
mod interpreter;
pub mod io_adapters;
pub mod job;
mod lexer;
pub mod logging;
pub mod parser;
pub mod pipeline;
pub mod search;

pub use builtin::{BUILTINS, is_builtin};
pub use interpreter::Interpreter;
pub use lexer::split_into_tokens;
