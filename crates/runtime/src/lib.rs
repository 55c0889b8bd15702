//! plisp runtime: reading and evaluating terms
//!
//! Key pieces:
//! - Reader: text to terms, with its parser state kept in a frame map
//! - Evaluator: trampoline over frames, no recursion on the Rust stack
//! - Builtins: `println` and a few Int/String natives
//! - Root: one arena plus its root frame, the embedding entry point

pub mod builtins;
pub mod config;
pub mod eval;
pub mod reader;
pub mod root;

pub use builtins::{Output, install, install_builtins, stdout_output};
pub use config::{DEFAULT_MAX_READ_DEPTH, RuntimeConfig};
pub use eval::{Evaluator, Step, frame_eval};
pub use reader::{Reader, reader_read, reader_read_all};
pub use root::Root;

// Core types, so embedders need only this crate
pub use plisp_core::{Arena, ArenaStats, Elem, ElemType, Function, Key, LispError, Native};
