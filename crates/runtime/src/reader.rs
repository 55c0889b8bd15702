//! Reader: text to terms
//!
//! Recursive descent over a reader frame. All parser state lives in that
//! frame, never in the Rust call:
//!
//! - `input`: the source text (String)
//! - `pos`: byte offset of the current character (Int)
//! - `curr_char`: byte at `pos` (Int), nil once the input is used up
//! - `expr`: the term most recently read
//! - `error`: nil, or the Error value of the first failure
//!
//! Grammar:
//! ```text
//! term   := map | set | list | string | symbol | ident | int
//! map    := "{" (term term)* "}"
//! set    := "#{" term* "}"
//! list   := "(" term* ")"
//! string := '"' byte* '"'          no escape processing
//! symbol := ":" byte*              up to whitespace or a bracket
//! ident  := (alpha | _-?!) (alnum | _-?!)*
//! int    := digit+                 must fit in 32 bits
//! ```
//!
//! Every scanning step returns a new version of the reader frame. Once
//! `error` is set, callers stop at their next `reader_has_error` check.

use crate::config::RuntimeConfig;
use plisp_core::{Arena, Elem, Key, LispError};
use tracing::{debug, trace};

const IDENT_SPECIALS: &[u8] = b"_-?!";

pub const MSG_END_OF_INPUT: &str = "Unexpected end of input.";
pub const MSG_NOT_RECOGNISED: &str = "Symbol not recognised.";
pub const MSG_TOO_DEEP: &str = "Nesting too deep.";
pub const MSG_INT_RANGE: &str = "Integer out of range.";
pub const MSG_MAP_VALUE: &str = "Map literal is missing a value.";
pub const MSG_INPUT_TOO_LONG: &str = "Input too long.";

fn is_space(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\n' | b'\r')
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || IDENT_SPECIALS.contains(&c)
}

fn is_ident_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || IDENT_SPECIALS.contains(&c)
}

fn is_delimiter(c: u8) -> bool {
    is_space(c) || matches!(c, b'(' | b')' | b'{' | b'}' | b'"')
}

// ── Reader frame primitives ──

/// A reader frame over `text`, allocating through `frame`
pub fn new_reader_frame(arena: &mut Arena, frame: Elem, text: &str) -> Result<Elem, LispError> {
    if u32::try_from(text.len()).is_err() {
        return Err(input_too_long(arena, frame, text.len())?);
    }
    let input = arena.new_string(frame, text.as_bytes())?;
    reader_frame_at(arena, frame, input, 0)
}

fn input_too_long(arena: &mut Arena, frame: Elem, pos: usize) -> Result<LispError, LispError> {
    let error = arena.new_error(frame, MSG_INPUT_TOO_LONG)?;
    Ok(LispError::Parse {
        message: MSG_INPUT_TOO_LONG.to_string(),
        pos,
        error,
    })
}

/// `pos` as an Int; offsets past 32 bits are a ParseError
fn pos_int(arena: &mut Arena, rf: Elem, pos: usize) -> Result<Elem, LispError> {
    match u32::try_from(pos) {
        Ok(p) => arena.new_int(rf, p),
        Err(_) => Err(input_too_long(arena, rf, pos)?),
    }
}

/// A reader frame over an existing `input` String, positioned at `pos`
pub fn reader_frame_at(
    arena: &mut Arena,
    frame: Elem,
    input: Elem,
    pos: usize,
) -> Result<Elem, LispError> {
    let alloc = arena.frame_get(frame, Key::Alloc);
    let rf = arena.map_set(frame, Elem::EmptyMap, Key::Alloc.into(), alloc)?;
    let rf = arena.frame_set(rf, Key::Parent, frame)?;
    let rf = arena.frame_set(rf, Key::Input, input)?;
    let pos_elem = pos_int(arena, rf, pos)?;
    let rf = arena.frame_set(rf, Key::Pos, pos_elem)?;
    let curr = arena.bytes(input).and_then(|b| b.get(pos).copied());
    let curr = match curr {
        Some(c) => arena.new_int(rf, c as u32)?,
        None => Elem::Nil,
    };
    arena.frame_set(rf, Key::CurrChar, curr)
}

pub fn reader_pos(arena: &Arena, rf: Elem) -> usize {
    arena
        .int_value(arena.frame_get(rf, Key::Pos))
        .unwrap_or_default() as usize
}

pub fn curr_char(arena: &Arena, rf: Elem) -> Option<u8> {
    arena
        .int_value(arena.frame_get(rf, Key::CurrChar))
        .map(|c| c as u8)
}

fn input_len(arena: &Arena, rf: Elem) -> usize {
    arena
        .bytes(arena.frame_get(rf, Key::Input))
        .map_or(0, |b| b.len())
}

fn input_slice(arena: &Arena, rf: Elem, start: usize, end: usize) -> Vec<u8> {
    arena
        .bytes(arena.frame_get(rf, Key::Input))
        .and_then(|b| b.get(start..end))
        .map(<[u8]>::to_vec)
        .unwrap_or_default()
}

pub fn reader_has_error(arena: &Arena, rf: Elem) -> bool {
    arena.frame_get(rf, Key::Error) != Elem::Nil
}

/// Record a parse failure in the reader frame
pub fn reader_error(arena: &mut Arena, rf: Elem, msg: &str) -> Result<Elem, LispError> {
    debug!(pos = reader_pos(arena, rf), msg, "parse error");
    let err = arena.new_error(rf, msg)?;
    arena.frame_set(rf, Key::Error, err)
}

/// Advance one byte. Moving past the end of the input is an error.
pub fn next_char(arena: &mut Arena, rf: Elem) -> Result<Elem, LispError> {
    let pos = reader_pos(arena, rf);
    let len = input_len(arena, rf);
    if pos >= len {
        return reader_error(arena, rf, MSG_END_OF_INPUT);
    }
    let pos = pos + 1;
    let next = arena
        .bytes(arena.frame_get(rf, Key::Input))
        .and_then(|b| b.get(pos).copied());
    let pos_elem = pos_int(arena, rf, pos)?;
    let rf = arena.frame_set(rf, Key::Pos, pos_elem)?;
    match next {
        // unchanged character: keep the existing Int
        Some(c) if curr_char(arena, rf) == Some(c) => Ok(rf),
        Some(c) => {
            let c = arena.new_int(rf, c as u32)?;
            arena.frame_set(rf, Key::CurrChar, c)
        }
        None => arena.frame_set(rf, Key::CurrChar, Elem::Nil),
    }
}

pub fn skip_whitespace(arena: &mut Arena, mut rf: Elem) -> Result<Elem, LispError> {
    while let Some(c) = curr_char(arena, rf) {
        if !is_space(c) {
            break;
        }
        rf = next_char(arena, rf)?;
    }
    Ok(rf)
}

fn set_expr(arena: &mut Arena, rf: Elem, expr: Elem) -> Result<Elem, LispError> {
    arena.frame_set(rf, Key::Expr, expr)
}

/// Advance while `pred` holds; returns the frame and the bytes passed over
fn scan_while(
    arena: &mut Arena,
    mut rf: Elem,
    pred: impl Fn(u8) -> bool,
) -> Result<(Elem, Vec<u8>), LispError> {
    let start = reader_pos(arena, rf);
    while let Some(c) = curr_char(arena, rf) {
        if !pred(c) {
            break;
        }
        rf = next_char(arena, rf)?;
    }
    let end = reader_pos(arena, rf);
    Ok((rf, input_slice(arena, rf, start, end)))
}

/// Reads terms out of text, within the configured limits
#[derive(Debug, Clone)]
pub struct Reader {
    max_depth: usize,
    recycle: bool,
}

impl Default for Reader {
    fn default() -> Self {
        Reader::new(&RuntimeConfig::default())
    }
}

impl Reader {
    pub fn new(config: &RuntimeConfig) -> Self {
        Reader {
            max_depth: config.max_read_depth,
            recycle: config.recycle,
        }
    }

    /// Read the first term of `text`
    pub fn read(&self, arena: &mut Arena, frame: Elem, text: &str) -> Result<Elem, LispError> {
        let rf = new_reader_frame(arena, frame, text)?;
        let rf = self.read_term(arena, rf, 0)?;
        self.check(arena, rf)?;
        let expr = arena.frame_get(rf, Key::Expr);
        self.release(arena, rf, true);
        Ok(expr)
    }

    /// Read every term of `text`, in order
    pub fn read_all(
        &self,
        arena: &mut Arena,
        frame: Elem,
        text: &str,
    ) -> Result<Vec<Elem>, LispError> {
        let mut rf = new_reader_frame(arena, frame, text)?;
        let mut terms = Vec::new();
        loop {
            rf = skip_whitespace(arena, rf)?;
            if curr_char(arena, rf).is_none() {
                break;
            }
            rf = self.read_term(arena, rf, 0)?;
            self.check(arena, rf)?;
            terms.push(arena.frame_get(rf, Key::Expr));
            rf = self.restart(arena, rf)?;
        }
        self.release(arena, rf, true);
        Ok(terms)
    }

    fn check(&self, arena: &Arena, rf: Elem) -> Result<(), LispError> {
        if !reader_has_error(arena, rf) {
            return Ok(());
        }
        let error = arena.frame_get(rf, Key::Error);
        Err(LispError::Parse {
            message: arena.error_message(error).unwrap_or_default(),
            pos: reader_pos(arena, rf),
            error,
        })
    }

    /// Continue reading from a fresh frame at the same position, so that
    /// scanning state does not pile up across top-level terms
    fn restart(&self, arena: &mut Arena, rf: Elem) -> Result<Elem, LispError> {
        if !self.recycle {
            return Ok(rf);
        }
        let parent = arena.frame_get(rf, Key::Parent);
        let input = arena.frame_get(rf, Key::Input);
        let pos = reader_pos(arena, rf);
        let fresh = reader_frame_at(arena, parent, input, pos)?;
        self.release(arena, rf, false);
        Ok(fresh)
    }

    /// Hand the reader frame's own cells back to the arena.
    ///
    /// Only `input` and the `pos`/`curr_char` Ints belong to the reader
    /// frame alone; terms under `expr` are the caller's.
    fn release(&self, arena: &mut Arena, rf: Elem, with_input: bool) {
        if !self.recycle {
            return;
        }
        let owned: Vec<Elem> = arena
            .map_iter(rf)
            .filter(|(k, _)| {
                arena.elem_eq(*k, Key::Pos.into())
                    || arena.elem_eq(*k, Key::CurrChar.into())
                    || (with_input && arena.elem_eq(*k, Key::Input.into()))
            })
            .map(|(_, v)| v)
            .collect();
        let mut freed = 0;
        for v in owned {
            if arena.free(v) {
                freed += 1;
            }
        }
        freed += arena.free_map_spine(rf, Elem::EmptyMap);
        debug!(freed, "reader frame recycled");
    }

    /// Read one term at the current position into `expr`
    pub fn read_term(&self, arena: &mut Arena, rf: Elem, depth: usize) -> Result<Elem, LispError> {
        let rf = skip_whitespace(arena, rf)?;
        if reader_has_error(arena, rf) {
            return Ok(rf);
        }
        let Some(c) = curr_char(arena, rf) else {
            return reader_error(arena, rf, MSG_END_OF_INPUT);
        };
        trace!(pos = reader_pos(arena, rf), ch = %(c as char), "read term");
        match c {
            b'(' | b'{' | b'#' if depth >= self.max_depth => reader_error(arena, rf, MSG_TOO_DEEP),
            b'(' => self.read_list(arena, rf, depth + 1),
            b'{' => self.read_map(arena, rf, depth + 1),
            b'#' => self.read_set(arena, rf, depth + 1),
            b'"' => read_string(arena, rf),
            b':' => read_symbol(arena, rf),
            c if c.is_ascii_digit() => read_int(arena, rf),
            c if is_ident_start(c) => read_ident(arena, rf),
            _ => reader_error(arena, rf, MSG_NOT_RECOGNISED),
        }
    }

    /// Read terms until `close`, handing each to `f`. The opening bracket
    /// has already been consumed.
    fn read_until(
        &self,
        arena: &mut Arena,
        mut rf: Elem,
        close: u8,
        depth: usize,
        mut f: impl FnMut(&mut Arena, Elem, Elem) -> Result<Elem, LispError>,
    ) -> Result<Elem, LispError> {
        loop {
            rf = skip_whitespace(arena, rf)?;
            if reader_has_error(arena, rf) {
                return Ok(rf);
            }
            match curr_char(arena, rf) {
                None => return reader_error(arena, rf, MSG_END_OF_INPUT),
                Some(c) if c == close => return next_char(arena, rf),
                Some(_) => {
                    rf = self.read_term(arena, rf, depth)?;
                    if reader_has_error(arena, rf) {
                        return Ok(rf);
                    }
                    let expr = arena.frame_get(rf, Key::Expr);
                    rf = f(arena, rf, expr)?;
                }
            }
        }
    }

    fn read_list(&self, arena: &mut Arena, rf: Elem, depth: usize) -> Result<Elem, LispError> {
        let rf = next_char(arena, rf)?;
        let mut acc = Elem::EmptyList;
        let rf = self.read_until(arena, rf, b')', depth, |arena, rf, expr| {
            acc = arena.list_add(rf, acc, expr)?;
            Ok(rf)
        })?;
        if reader_has_error(arena, rf) {
            return Ok(rf);
        }
        // head insertion collected the terms backwards
        let list = arena.list_reverse(rf, acc)?;
        if self.recycle {
            arena.free_list_spine(acc);
        }
        set_expr(arena, rf, list)
    }

    fn read_set(&self, arena: &mut Arena, rf: Elem, depth: usize) -> Result<Elem, LispError> {
        let rf = next_char(arena, rf)?;
        if reader_has_error(arena, rf) {
            return Ok(rf);
        }
        if curr_char(arena, rf) != Some(b'{') {
            return reader_error(arena, rf, MSG_NOT_RECOGNISED);
        }
        let rf = next_char(arena, rf)?;
        let mut set = Elem::EmptySet;
        let rf = self.read_until(arena, rf, b'}', depth, |arena, rf, expr| {
            set = arena.set_add(rf, set, expr)?;
            Ok(rf)
        })?;
        if reader_has_error(arena, rf) {
            return Ok(rf);
        }
        set_expr(arena, rf, set)
    }

    fn read_map(&self, arena: &mut Arena, rf: Elem, depth: usize) -> Result<Elem, LispError> {
        let rf = next_char(arena, rf)?;
        let mut map = Elem::EmptyMap;
        let mut key: Option<Elem> = None;
        let rf = self.read_until(arena, rf, b'}', depth, |arena, rf, expr| {
            match key.take() {
                None => key = Some(expr),
                Some(k) => map = arena.map_set(rf, map, k, expr)?,
            }
            Ok(rf)
        })?;
        if reader_has_error(arena, rf) {
            return Ok(rf);
        }
        if key.is_some() {
            return reader_error(arena, rf, MSG_MAP_VALUE);
        }
        set_expr(arena, rf, map)
    }
}

fn read_string(arena: &mut Arena, rf: Elem) -> Result<Elem, LispError> {
    let rf = next_char(arena, rf)?;
    let (rf, bytes) = scan_while(arena, rf, |c| c != b'"')?;
    if curr_char(arena, rf).is_none() {
        return reader_error(arena, rf, MSG_END_OF_INPUT);
    }
    let rf = next_char(arena, rf)?;
    let s = arena.new_string(rf, &bytes)?;
    set_expr(arena, rf, s)
}

fn read_symbol(arena: &mut Arena, rf: Elem) -> Result<Elem, LispError> {
    let rf = next_char(arena, rf)?;
    let (rf, bytes) = scan_while(arena, rf, |c| !is_delimiter(c))?;
    let sym = arena.new_symbol(rf, &bytes)?;
    set_expr(arena, rf, sym)
}

fn read_ident(arena: &mut Arena, rf: Elem) -> Result<Elem, LispError> {
    let (rf, bytes) = scan_while(arena, rf, is_ident_char)?;
    let term = match bytes.as_slice() {
        b"nil" => Elem::Nil,
        b"true" => Elem::True,
        b"false" => Elem::False,
        _ => arena.new_ident(rf, &bytes)?,
    };
    set_expr(arena, rf, term)
}

fn read_int(arena: &mut Arena, rf: Elem) -> Result<Elem, LispError> {
    let (rf, digits) = scan_while(arena, rf, |c| c.is_ascii_digit())?;
    let value = std::str::from_utf8(&digits)
        .ok()
        .and_then(|s| s.parse::<u32>().ok());
    match value {
        Some(n) => {
            let n = arena.new_int(rf, n)?;
            set_expr(arena, rf, n)
        }
        None => reader_error(arena, rf, MSG_INT_RANGE),
    }
}

/// Read one term with the default limits
pub fn reader_read(arena: &mut Arena, frame: Elem, text: &str) -> Result<Elem, LispError> {
    Reader::default().read(arena, frame, text)
}

/// Read every term with the default limits
pub fn reader_read_all(
    arena: &mut Arena,
    frame: Elem,
    text: &str,
) -> Result<Vec<Elem>, LispError> {
    Reader::default().read_all(arena, frame, text)
}
