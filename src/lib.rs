//! An interactive command shell's execution engine.
//!
//! A line is tokenized ([`lexer`]), segmented into a [`Pipeline`] ([`parser`])
//! and then either run in-process by a builtin ([`builtin`]) or launched as one
//! process per segment ([`pipeline`]), connected by pipes, with an optional
//! redirection at the open ends. When the shell owns a terminal, every
//! pipeline gets its own process group which is handed the foreground for the
//! duration of the job ([`job`]), while the shell itself ignores the
//! terminal-generated signals ([`signals`]).
//!
//! The main entry point is [`Interpreter`].

pub mod builtin;
pub mod command;
pub mod env;
pub mod error;
pub mod job;
pub mod lexer;
pub mod logging;
pub mod parser;
pub mod pipeline;
pub mod resolver;
pub mod signals;
mod interpreter;
mod sys;

pub use error::ShellError;
pub use interpreter::Interpreter;
pub use job::ShellTerminalState;
pub use parser::{CommandSegment, Pipeline, Redirection};
