//! Plisp Core: persistent values for a frame-driven Lisp
//!
//! This crate provides the data layer the interpreter is built from. Every
//! value is immutable once allocated; "changing" a list, set, map or frame
//! means allocating a new head that shares the old structure.
//!
//! Key design principles:
//! - Arena: fixed-capacity cell table, one per root frame
//! - Elem: `Copy` reference to a sentinel or an arena cell
//! - Frames are plain maps keyed by well-known symbols
//!
//! # Modules
//!
//! - `arena`: cell table, free list, checked allocation, statistics
//! - `value`: `Elem`, `Cell`, type tags, native function trait
//! - `collections`: persistent List/Set/Map operations and equality
//! - `frame`: root/child frames, `env` bindings
//! - `printer`: textual rendering of values
//! - `error`: interpreter error type

pub mod arena;
pub mod collections;
pub mod error;
pub mod frame;
pub mod printer;
pub mod value;

pub use arena::{Arena, ArenaId, ArenaStats, DEFAULT_CAPACITY};
pub use collections::{ListIter, MapIter};
pub use error::LispError;
pub use printer::{Printed, print_elem, write_elem};
pub use value::{Cell, CellId, Elem, ElemType, Function, Key, Native};
