//! Trampolined evaluator
//!
//! Evaluation never recurses on the Rust stack. The active frame's `lhs`
//! and `rhs` decide what happens next:
//!
//! - **Literal**: `rhs` is not a List. It moves into `lhs` and `rhs`
//!   becomes `()`.
//! - **Consume**: `rhs` is a non-empty List. A nested List suspends the
//!   frame and pushes a child for it. An atom is resolved (identifiers via
//!   `env_get`) and pushed onto `lhs`, which therefore runs backwards.
//! - **Reduce**: `rhs` is `()`. `lhs` is reversed into argument order and
//!   its head applied to the rest.
//! - **Return**: the value of a finished frame is pushed onto its parent's
//!   `lhs`, or becomes the root's `lhs` when there is no parent.
//!
//! Two identifiers are special when they open a list: `(fn (params) body)`
//! builds a closure, and `(quote term)` yields `term` unevaluated.
//!
//! Frames that finish without raising an Error hand their map nodes and
//! `lhs` accumulator back to the arena. Any Error created while a frame was
//! live may reference it, so such frames are left alone.

use crate::config::RuntimeConfig;
use plisp_core::{Arena, Elem, ElemType, Function, Key, LispError, Native};
use std::sync::Arc;
use tracing::{debug, trace};

pub const MSG_EXPECTED_FUNCTION: &str = "Expected function";
pub const MSG_MALFORMED_FN: &str = "Malformed fn: expected (fn (params...) body)";

/// Outcome of one evaluator transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Keep going with this frame
    Continue(Elem),
    /// The root finished; its `lhs` holds the result
    Done(Elem),
}

pub struct Evaluator<'a> {
    arena: &'a mut Arena,
    max_steps: Option<u64>,
    recycle: bool,
    steps: u64,
    /// `errors_raised` when each live frame started, innermost last
    marks: Vec<u64>,
    /// Frame version owned by the caller; recycling never goes below it
    base: Elem,
}

impl<'a> Evaluator<'a> {
    pub fn new(arena: &'a mut Arena, config: &RuntimeConfig) -> Self {
        Evaluator {
            arena,
            max_steps: config.max_steps,
            recycle: config.recycle,
            steps: 0,
            marks: Vec::new(),
            base: Elem::Nil,
        }
    }

    /// Keep `base` and everything older than it out of recycling
    pub fn with_base(mut self, base: Elem) -> Self {
        self.base = base;
        self
    }

    /// Transitions taken so far
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Run `frame` to completion, returning the final root frame
    pub fn run(&mut self, frame: Elem) -> Result<Elem, LispError> {
        if self.base == Elem::Nil {
            self.base = frame;
        }
        self.marks.clear();
        self.marks.push(self.arena.errors_raised());
        let mut frame = frame;
        loop {
            if let Some(limit) = self.max_steps
                && self.steps >= limit
            {
                debug!(steps = self.steps, "step limit reached");
                return Err(LispError::StepLimit { steps: self.steps });
            }
            match self.step(frame)? {
                Step::Continue(next) => frame = next,
                Step::Done(done) => {
                    debug!(steps = self.steps, "evaluation finished");
                    return Ok(done);
                }
            }
        }
    }

    /// Take one transition from `frame`
    pub fn step(&mut self, frame: Elem) -> Result<Step, LispError> {
        self.steps += 1;
        let rhs = self.arena.frame_get(frame, Key::Rhs);
        trace!(step = self.steps, rhs = %self.arena.display(rhs), "step");

        if !self.arena.is_list(rhs) {
            let frame = self.arena.frame_set(frame, Key::Lhs, rhs)?;
            let frame = self.arena.frame_set(frame, Key::Rhs, Elem::EmptyList)?;
            return Ok(Step::Continue(frame));
        }

        match self.arena.list_head(rhs) {
            Some((value, rest)) => self.consume(frame, value, rest),
            None => self.reduce(frame),
        }
    }

    fn consume(&mut self, frame: Elem, value: Elem, rest: Elem) -> Result<Step, LispError> {
        let lhs = self.arena.frame_get(frame, Key::Lhs);

        if lhs == Elem::EmptyList && self.arena.is_type(value, ElemType::Ident) {
            match self.arena.bytes(value) {
                Some(b"fn") => return self.special_fn(frame, rest),
                Some(b"quote") => {
                    let term = self.arena.list_head(rest).map_or(Elem::Nil, |(t, _)| t);
                    return self.return_value(frame, term);
                }
                _ => {}
            }
        }

        if self.arena.is_list(value) {
            let suspended = self.arena.frame_set(frame, Key::Rhs, rest)?;
            let child = self.arena.new_child_frame(suspended, suspended, value)?;
            self.marks.push(self.arena.errors_raised());
            debug!(depth = self.marks.len(), "push frame");
            return Ok(Step::Continue(child));
        }

        let value = self.resolve(frame, value);
        let lhs = self.arena.list_add(frame, lhs, value)?;
        let frame = self.arena.frame_set(frame, Key::Lhs, lhs)?;
        let frame = self.arena.frame_set(frame, Key::Rhs, rest)?;
        Ok(Step::Continue(frame))
    }

    fn special_fn(&mut self, frame: Elem, rest: Elem) -> Result<Step, LispError> {
        let mut parts = self.arena.list_iter(rest);
        let (params, body) = (parts.next(), parts.next());
        let (Some(params), Some(body)) = (params, body) else {
            return Err(self.eval_error(frame, MSG_MALFORMED_FN)?);
        };
        if !self.arena.is_list(params) {
            return Err(self.eval_error(frame, MSG_MALFORMED_FN)?);
        }
        let closure = self
            .arena
            .new_function(frame, Function::Closure { params, body })?;
        debug!(params = self.arena.list_len(params), "closure created");
        self.return_value(frame, closure)
    }

    fn reduce(&mut self, frame: Elem) -> Result<Step, LispError> {
        let lhs = self.arena.frame_get(frame, Key::Lhs);
        if !self.arena.is_list(lhs) {
            // left there by the literal transition
            let value = self.resolve(frame, lhs);
            return self.return_value(frame, value);
        }

        let args = self.arena.list_reverse(frame, lhs)?;
        let Some((head, rest)) = self.arena.list_head(args) else {
            return self.return_value(frame, Elem::EmptyList);
        };
        match self.arena.function(head).cloned() {
            Some(Function::Native(native)) => self.apply_native(frame, native, args, rest),
            Some(Function::Closure { params, body }) => {
                self.apply_closure(frame, params, body, args, rest)
            }
            None => Err(self.eval_error(frame, MSG_EXPECTED_FUNCTION)?),
        }
    }

    fn apply_native(
        &mut self,
        frame: Elem,
        native: Arc<dyn Native>,
        args: Elem,
        rest: Elem,
    ) -> Result<Step, LispError> {
        let call = self.arena.new_child_frame(frame, frame, rest)?;
        debug!(name = native.name(), "apply native");
        let value = native.call(self.arena, call)?;
        if self.is_clean() && self.arena.is_scalar(value) {
            let freed =
                self.arena.free_map_spine(call, self.base) + self.arena.free_list_spine(args);
            trace!(freed, "native call recycled");
        }
        self.return_value(frame, value)
    }

    /// The closure's frame takes the reducing frame's place in the chain
    fn apply_closure(
        &mut self,
        frame: Elem,
        params: Elem,
        body: Elem,
        args: Elem,
        rest: Elem,
    ) -> Result<Step, LispError> {
        let (n_params, n_args) = (self.arena.list_len(params), self.arena.list_len(rest));
        if n_params != n_args {
            debug!(params = n_params, args = n_args, "arity mismatch, missing arguments are nil");
        }
        // every formal is bound so it shadows outer names, even as nil
        let mut actuals = self.arena.list_iter(rest);
        let bindings: Vec<(Elem, Elem)> = self
            .arena
            .list_iter(params)
            .map(|p| (p, actuals.next().unwrap_or(Elem::Nil)))
            .collect();

        let parent = self.arena.frame_get(frame, Key::Parent);
        let mut env = self.arena.frame_get(frame, Key::Env);
        let callee = self.arena.new_child_frame(frame, parent, body)?;
        for (param, arg) in bindings {
            env = self.arena.map_bind(callee, env, param, arg)?;
        }
        let callee = self.arena.frame_set(callee, Key::Env, env)?;
        debug!(bound = n_params, "apply closure");

        if self.is_clean() {
            self.release_frame(frame);
            self.arena.free_list_spine(args);
        }
        if let Some(mark) = self.marks.last_mut() {
            *mark = self.arena.errors_raised();
        }
        Ok(Step::Continue(callee))
    }

    fn return_value(&mut self, frame: Elem, value: Elem) -> Result<Step, LispError> {
        let clean = self.is_clean();
        let Some(parent) = self.arena.frame_parent(frame) else {
            let lhs = self.arena.frame_get(frame, Key::Lhs);
            let done = self.arena.frame_set(frame, Key::Lhs, value)?;
            if clean && done != frame && self.arena.is_list(lhs) {
                self.arena.free_list_spine(lhs);
            }
            return Ok(Step::Done(done));
        };

        let plhs = self.arena.frame_get(parent, Key::Lhs);
        let plhs = self.arena.list_add(parent, plhs, value)?;
        let resumed = self.arena.frame_set(parent, Key::Lhs, plhs)?;
        // a Map result might be one of this frame's own versions
        if clean && !self.arena.is_type(value, ElemType::Map) {
            self.release_frame(frame);
        }
        self.marks.pop();
        debug!(depth = self.marks.len(), "return");
        Ok(Step::Continue(resumed))
    }

    fn resolve(&self, frame: Elem, value: Elem) -> Elem {
        if self.arena.is_type(value, ElemType::Ident) {
            self.arena.env_get(frame, value)
        } else {
            value
        }
    }

    /// No Error value has been created since the current frame started
    fn is_clean(&self) -> bool {
        self.recycle
            && self
                .marks
                .last()
                .is_some_and(|mark| *mark == self.arena.errors_raised())
    }

    fn release_frame(&mut self, frame: Elem) {
        let lhs = self.arena.frame_get(frame, Key::Lhs);
        let mut freed = 0;
        if self.arena.is_list(lhs) {
            freed += self.arena.free_list_spine(lhs);
        }
        freed += self.arena.free_map_spine(frame, self.base);
        trace!(freed, "frame recycled");
    }

    fn eval_error(&mut self, frame: Elem, msg: &str) -> Result<LispError, LispError> {
        let error = self.arena.new_error(frame, msg)?;
        debug!(msg, "evaluation failed");
        Ok(LispError::Eval {
            message: msg.to_string(),
            error,
        })
    }
}

/// Evaluate `frame`'s `rhs` with default limits. The result is the
/// returned frame's `lhs`.
pub fn frame_eval(arena: &mut Arena, frame: Elem) -> Result<Elem, LispError> {
    Evaluator::new(arena, &RuntimeConfig::default()).run(frame)
}
