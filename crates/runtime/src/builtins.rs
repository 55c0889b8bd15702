//! Builtin natives
//!
//! Each builtin reads its evaluated arguments from the call frame's `rhs`.
//! Arguments of the wrong type do not abort evaluation: the builtin returns
//! an Error value instead, which flows on as ordinary data.
//!
//! # Overflow Behavior
//!
//! Arithmetic uses **wrapping semantics** on 32-bit unsigned integers:
//! - `add`: 4294967295 + 1 wraps to 0
//! - `sub`: 0 - 1 wraps to 4294967295
//! - `mul`: overflow wraps around

use plisp_core::{Arena, Elem, ElemType, Function, Key, LispError, Native, print_elem};
use std::io::Write;
use std::sync::{Arc, Mutex};
use tracing::warn;

pub const MSG_EXPECTED_INT: &str = "Expected Int";
pub const MSG_EXPECTED_STRING: &str = "Expected String";
pub const MSG_INDEX_RANGE: &str = "Index out of range";
pub const MSG_LENGTH_RANGE: &str = "Length out of range";

/// Shared sink for `println`
pub type Output = Arc<Mutex<Box<dyn Write + Send>>>;

pub fn stdout_output() -> Output {
    Arc::new(Mutex::new(Box::new(std::io::stdout())))
}

fn args(arena: &Arena, frame: Elem) -> Vec<Elem> {
    arena.list_iter(arena.frame_get(frame, Key::Rhs)).collect()
}

fn ints(arena: &Arena, args: &[Elem]) -> Option<Vec<u32>> {
    args.iter().map(|a| arena.int_value(*a)).collect()
}

fn string_arg(arena: &Arena, arg: Option<&Elem>) -> Option<Vec<u8>> {
    let arg = *arg?;
    if arena.type_of(arg) != ElemType::String {
        return None;
    }
    arena.bytes(arg).map(<[u8]>::to_vec)
}

/// A length as an Int, or an Error value when it does not fit in 32 bits
fn length_int(arena: &mut Arena, frame: Elem, len: usize) -> Result<Elem, LispError> {
    match u32::try_from(len) {
        Ok(n) => arena.new_int(frame, n),
        Err(_) => arena.new_error(frame, MSG_LENGTH_RANGE),
    }
}

/// Write each argument on its own line. Strings are written raw, anything
/// else in printed form. The call frame is discarded once `println`
/// returns Nil, which leaves the caller with nothing pending.
pub struct Println {
    out: Output,
}

impl Println {
    pub fn new(out: Output) -> Self {
        Println { out }
    }
}

impl Native for Println {
    fn name(&self) -> &str {
        "println"
    }

    fn call(&self, arena: &mut Arena, frame: Elem) -> Result<Elem, LispError> {
        let mut text = Vec::new();
        for arg in args(arena, frame) {
            match arena.type_of(arg) {
                ElemType::String => {
                    text.extend_from_slice(arena.bytes(arg).unwrap_or_default())
                }
                _ => text.extend_from_slice(print_elem(arena, arg).as_bytes()),
            }
            text.push(b'\n');
        }
        let mut out = match self.out.lock() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = out.write_all(&text).and_then(|_| out.flush()) {
            warn!(error = %e, "println: write failed");
        }
        Ok(Elem::Nil)
    }
}

#[derive(Debug, Clone, Copy)]
enum ArithOp {
    Add,
    Sub,
    Mul,
}

/// `add`, `sub` and `mul` over any number of Ints
pub struct Arith {
    op: ArithOp,
}

impl Native for Arith {
    fn name(&self) -> &str {
        match self.op {
            ArithOp::Add => "add",
            ArithOp::Sub => "sub",
            ArithOp::Mul => "mul",
        }
    }

    fn call(&self, arena: &mut Arena, frame: Elem) -> Result<Elem, LispError> {
        let args = args(arena, frame);
        let Some(ns) = ints(arena, &args) else {
            return arena.new_error(frame, MSG_EXPECTED_INT);
        };
        let result = match (self.op, ns.split_first()) {
            (ArithOp::Add, _) => ns.iter().fold(0u32, |a, b| a.wrapping_add(*b)),
            (ArithOp::Mul, _) => ns.iter().fold(1u32, |a, b| a.wrapping_mul(*b)),
            (ArithOp::Sub, None) => 0,
            (ArithOp::Sub, Some((first, rest))) => {
                rest.iter().fold(*first, |a, b| a.wrapping_sub(*b))
            }
        };
        arena.new_int(frame, result)
    }
}

/// `lt`: true when the Int arguments strictly increase
pub struct Less;

impl Native for Less {
    fn name(&self) -> &str {
        "lt"
    }

    fn call(&self, arena: &mut Arena, frame: Elem) -> Result<Elem, LispError> {
        let args = args(arena, frame);
        let Some(ns) = ints(arena, &args) else {
            return arena.new_error(frame, MSG_EXPECTED_INT);
        };
        Ok(Elem::bool(ns.windows(2).all(|w| w[0] < w[1])))
    }
}

/// `eq`: true when all arguments are structurally equal
pub struct Equal;

impl Native for Equal {
    fn name(&self) -> &str {
        "eq"
    }

    fn call(&self, arena: &mut Arena, frame: Elem) -> Result<Elem, LispError> {
        let args = args(arena, frame);
        Ok(Elem::bool(
            args.windows(2).all(|w| arena.elem_eq(w[0], w[1])),
        ))
    }
}

/// `list`: its arguments, as a List
pub struct List;

impl Native for List {
    fn name(&self) -> &str {
        "list"
    }

    fn call(&self, arena: &mut Arena, frame: Elem) -> Result<Elem, LispError> {
        Ok(arena.frame_get(frame, Key::Rhs))
    }
}

/// `str-len`: byte length of a String
pub struct StrLen;

impl Native for StrLen {
    fn name(&self) -> &str {
        "str-len"
    }

    fn call(&self, arena: &mut Arena, frame: Elem) -> Result<Elem, LispError> {
        let args = args(arena, frame);
        match string_arg(arena, args.first()) {
            Some(s) => length_int(arena, frame, s.len()),
            None => arena.new_error(frame, MSG_EXPECTED_STRING),
        }
    }
}

/// `str-at`: byte at an index of a String, as an Int
pub struct StrAt;

impl Native for StrAt {
    fn name(&self) -> &str {
        "str-at"
    }

    fn call(&self, arena: &mut Arena, frame: Elem) -> Result<Elem, LispError> {
        let args = args(arena, frame);
        let Some(s) = string_arg(arena, args.first()) else {
            return arena.new_error(frame, MSG_EXPECTED_STRING);
        };
        let Some(index) = args.get(1).and_then(|i| arena.int_value(*i)) else {
            return arena.new_error(frame, MSG_EXPECTED_INT);
        };
        match s.get(index as usize) {
            Some(&byte) => arena.new_int(frame, byte as u32),
            None => arena.new_error(frame, MSG_INDEX_RANGE),
        }
    }
}

/// Every builtin, with `println` writing to `out`
pub fn builtins(out: Output) -> Vec<Arc<dyn Native>> {
    vec![
        Arc::new(Println::new(out)) as Arc<dyn Native>,
        Arc::new(Arith { op: ArithOp::Add }),
        Arc::new(Arith { op: ArithOp::Sub }),
        Arc::new(Arith { op: ArithOp::Mul }),
        Arc::new(Less),
        Arc::new(Equal),
        Arc::new(List),
        Arc::new(StrLen),
        Arc::new(StrAt),
    ]
}

/// Bind `native` under its name in the frame's `env`
pub fn install(arena: &mut Arena, frame: Elem, native: Arc<dyn Native>) -> Result<Elem, LispError> {
    let name = arena.new_ident(frame, native.name().as_bytes())?;
    let f = arena.new_function(frame, Function::Native(native))?;
    arena.env_set(frame, name, f)
}

/// Bind every builtin in the frame's `env`
pub fn install_builtins(arena: &mut Arena, frame: Elem, out: Output) -> Result<Elem, LispError> {
    builtins(out)
        .into_iter()
        .try_fold(frame, |frame, native| install(arena, frame, native))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::frame_eval;
    use crate::reader::reader_read;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn setup() -> (Arena, Elem, Capture) {
        let mut arena = Arena::new(4000);
        let frame = arena.new_root_frame().unwrap();
        let capture = Capture::default();
        let out: Output = Arc::new(Mutex::new(Box::new(capture.clone())));
        let frame = install_builtins(&mut arena, frame, out).unwrap();
        (arena, frame, capture)
    }

    fn eval(text: &str) -> (String, String) {
        let (mut arena, frame, capture) = setup();
        let term = reader_read(&mut arena, frame, text).unwrap();
        let frame = arena.frame_set(frame, Key::Rhs, term).unwrap();
        let done = frame_eval(&mut arena, frame).unwrap();
        let value = print_elem(&arena, arena.frame_get(done, Key::Lhs));
        let written = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        (value, written)
    }

    fn value(text: &str) -> String {
        eval(text).0
    }

    fn error_msg(text: &str) -> Option<String> {
        let (mut arena, frame, _) = setup();
        let term = reader_read(&mut arena, frame, text).unwrap();
        let frame = arena.frame_set(frame, Key::Rhs, term).unwrap();
        let done = frame_eval(&mut arena, frame).unwrap();
        arena.error_message(arena.frame_get(done, Key::Lhs))
    }

    #[test]
    fn test_println_writes_raw_strings() {
        let (value, written) = eval("(println \"hello\")");
        assert_eq!(written, "hello\n");
        assert_eq!(value, "nil");
    }

    #[test]
    fn test_println_leaves_nothing_pending() {
        let (mut arena, frame, capture) = setup();
        let term = reader_read(&mut arena, frame, "(println \"x\")").unwrap();
        let frame = arena.frame_set(frame, Key::Rhs, term).unwrap();
        let done = frame_eval(&mut arena, frame).unwrap();
        assert_eq!(arena.frame_get(done, Key::Rhs), Elem::EmptyList);
        assert_eq!(arena.frame_get(done, Key::Lhs), Elem::Nil);
        assert_eq!(capture.0.lock().unwrap().as_slice(), b"x\n");
    }

    #[test]
    fn test_println_prints_other_values() {
        let (_, written) = eval("(println 1 :k (list 2 \"s\"))");
        assert_eq!(written, "1\n:k\n(2 \"s\")\n");
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(value("(add 1 2 3)"), "6");
        assert_eq!(value("(sub 10 3 2)"), "5");
        assert_eq!(value("(mul 2 (add 1 2))"), "6");
        assert_eq!(value("(add)"), "0");
    }

    #[test]
    fn test_arithmetic_wraps() {
        assert_eq!(value("(add 4294967295 1)"), "0");
        assert_eq!(value("(sub 0 1)"), "4294967295");
    }

    #[test]
    fn test_comparison() {
        assert_eq!(value("(lt 1 2 3)"), "true");
        assert_eq!(value("(lt 2 2)"), "false");
        assert_eq!(value("(eq (list 1 2) (list 1 2))"), "true");
        assert_eq!(value("(eq \"a\" \"b\")"), "false");
    }

    #[test]
    fn test_string_ops() {
        assert_eq!(value("(str-len \"hello\")"), "5");
        assert_eq!(value("(str-at \"abc\" 1)"), "98");
    }

    #[test]
    fn test_length_past_32_bits_is_error_value() {
        let (mut arena, frame, _) = setup();
        let err = length_int(&mut arena, frame, u32::MAX as usize + 1).unwrap();
        assert_eq!(arena.error_message(err).as_deref(), Some(MSG_LENGTH_RANGE));
        let n = length_int(&mut arena, frame, 12).unwrap();
        assert_eq!(arena.int_value(n), Some(12));
    }

    #[test]
    fn test_type_errors_are_values() {
        assert_eq!(error_msg("(add 1 \"x\")").as_deref(), Some(MSG_EXPECTED_INT));
        assert_eq!(error_msg("(lt :a 1)").as_deref(), Some(MSG_EXPECTED_INT));
        assert_eq!(error_msg("(str-len 3)").as_deref(), Some(MSG_EXPECTED_STRING));
        assert_eq!(error_msg("(str-at \"abc\" 3)").as_deref(), Some(MSG_INDEX_RANGE));
    }

    #[test]
    fn test_error_value_flows_as_data() {
        let (value, written) = eval("(println (add :x))");
        assert_eq!(value, "nil");
        assert!(written.starts_with("<err: "), "{}", written);
        assert!(written.contains("Expected Int"));
    }

    #[test]
    fn test_install_binds_names() {
        let (arena, frame, _) = setup();
        let names: Vec<String> = arena
            .map_visible(arena.frame_get(frame, Key::Env))
            .into_iter()
            .map(|(k, _)| print_elem(&arena, k))
            .collect();
        for name in ["println", "add", "sub", "mul", "lt", "eq", "list", "str-len", "str-at"] {
            assert!(names.iter().any(|n| n == name), "missing {}", name);
        }
    }
}
