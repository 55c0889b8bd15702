//! Frame model
//!
//! A frame is not its own type: it is a Map keyed by well-known symbols.
//!
//! ```text
//! evaluation frame              reader frame
//! ┌─────────┬──────────────┐    ┌───────────┬──────────────────────┐
//! │ alloc   │ <alloc:N>    │    │ alloc     │ <alloc:N>            │
//! │ env     │ {bindings}   │    │ input     │ "source text"        │
//! │ lhs     │ (done ...)   │    │ pos       │ Int                  │
//! │ rhs     │ (todo ...)   │    │ curr_char │ Int, nil at the end  │
//! │ parent  │ frame or nil │    │ expr      │ last term read       │
//! └─────────┴──────────────┘    │ error     │ nil or Error         │
//!                               └───────────┴──────────────────────┘
//! ```
//!
//! "Updating" a frame returns a new map whose head shadows the old binding.
//! Bindings made by user code live in the nested `env` map so they never
//! collide with the interpreter's own keys.

use crate::arena::Arena;
use crate::error::LispError;
use crate::value::{Cell, Elem, Key};

impl Arena {
    /// The root of a fresh evaluation: allocator handle, empty `env`,
    /// empty `lhs`/`rhs`, no `parent`
    pub fn new_root_frame(&mut self) -> Result<Elem, LispError> {
        let f = self.try_alloc(Cell::Map {
            key: Key::Alloc.into(),
            value: self.handle(),
            next: Elem::EmptyMap,
        })?;
        let f = self.frame_set(f, Key::Env, Elem::EmptyMap)?;
        let f = self.frame_set(f, Key::Lhs, Elem::EmptyList)?;
        self.frame_set(f, Key::Rhs, Elem::EmptyList)
    }

    pub fn frame_get(&self, frame: Elem, key: impl Into<Elem>) -> Elem {
        self.map_get(frame, key.into())
    }

    pub fn frame_set(
        &mut self,
        frame: Elem,
        key: impl Into<Elem>,
        value: Elem,
    ) -> Result<Elem, LispError> {
        self.map_set(frame, frame, key.into(), value)
    }

    /// The frame's `parent`, or `None` at a root
    pub fn frame_parent(&self, frame: Elem) -> Option<Elem> {
        match self.frame_get(frame, Key::Parent) {
            Elem::Nil => None,
            parent => Some(parent),
        }
    }

    /// Resolve a binding: the frame's own `env` first, then each ancestor's
    /// `env` along the `parent` chain. Unbound keys resolve to Nil.
    pub fn env_get(&self, frame: Elem, key: Elem) -> Elem {
        let mut cur = Some(frame);
        while let Some(f) = cur {
            let env = self.frame_get(f, Key::Env);
            if self.map_contains_key(env, key) {
                return self.map_get(env, key);
            }
            cur = self.frame_parent(f);
        }
        Elem::Nil
    }

    /// Bind `key` in the frame's own `env`
    pub fn env_set(&mut self, frame: Elem, key: Elem, value: Elem) -> Result<Elem, LispError> {
        let env = self.frame_get(frame, Key::Env);
        let env = self.map_set(frame, env, key, value)?;
        self.frame_set(frame, Key::Env, env)
    }

    /// A fresh frame that will evaluate `rhs`, continuing into `parent`
    /// when it finishes. Allocation goes through `frame`, and the new frame
    /// carries the same allocator handle.
    pub fn new_child_frame(
        &mut self,
        frame: Elem,
        parent: Elem,
        rhs: Elem,
    ) -> Result<Elem, LispError> {
        let alloc = self.frame_get(frame, Key::Alloc);
        let mut nf = Elem::EmptyMap;
        for (key, value) in [
            (Key::Parent, parent),
            (Key::Env, Elem::EmptyMap),
            (Key::Lhs, Elem::EmptyList),
            (Key::Rhs, rhs),
            (Key::Alloc, alloc),
        ] {
            nf = self.map_set(frame, nf, key.into(), value)?;
        }
        Ok(nf)
    }
}
