//! Printer for values
//!
//! Output grammar:
//! ```text
//! nil  true  false  42  "text"  :sym  ident
//! (a b c)  #{a b}  {key value ...}
//! <fn:ID>  <alloc:ID>  <err: {msg "..." frame {...}}>
//! ```
//!
//! Strings are written between quotes without escaping. Maps show only the
//! first occurrence of each key, oldest binding first: the same output as
//! printing the map's trim, without allocating it.

use crate::arena::Arena;
use crate::value::{Cell, Elem};
use std::fmt::{self, Write};

/// Print a value to a string
pub fn print_elem(arena: &Arena, elem: Elem) -> String {
    let mut buf = String::new();
    // Writing into a String cannot fail
    let _ = write_elem(arena, elem, &mut buf);
    buf
}

/// `Display` adapter pairing a value with its arena
pub struct Printed<'a> {
    arena: &'a Arena,
    elem: Elem,
}

impl fmt::Display for Printed<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_elem(self.arena, self.elem, f)
    }
}

impl Arena {
    pub fn display(&self, elem: Elem) -> Printed<'_> {
        Printed { arena: self, elem }
    }
}

pub fn write_elem<W: Write>(arena: &Arena, elem: Elem, out: &mut W) -> fmt::Result {
    match elem {
        Elem::Nil => out.write_str("nil"),
        Elem::True => out.write_str("true"),
        Elem::False => out.write_str("false"),
        Elem::EmptyList => out.write_str("()"),
        Elem::EmptySet => out.write_str("#{}"),
        Elem::EmptyMap => out.write_str("{}"),
        Elem::Key(key) => write!(out, ":{}", key.as_str()),
        Elem::Alloc(id) => write!(out, "<alloc:{}>", id.get()),
        Elem::Cell(id) => match arena.cell(elem) {
            Some(Cell::Int(i)) => write!(out, "{i}"),
            Some(Cell::String(b)) => write!(out, "\"{}\"", String::from_utf8_lossy(b)),
            Some(Cell::Ident(b)) => out.write_str(&String::from_utf8_lossy(b)),
            Some(Cell::Symbol(b)) => write!(out, ":{}", String::from_utf8_lossy(b)),
            Some(Cell::List { .. }) => write_seq(arena, elem, "(", out),
            Some(Cell::Set { .. }) => write_seq(arena, elem, "#{", out),
            Some(Cell::Map { .. }) => write_map(arena, elem, out),
            Some(Cell::Error(map)) => {
                out.write_str("<err: ")?;
                write_elem(arena, *map, out)?;
                out.write_str(">")
            }
            Some(Cell::Function(_)) => write!(out, "<fn:{}>", id.index()),
            Some(Cell::Free { .. }) | None => {
                panic!("printing freed or foreign cell {}", id.index())
            }
        },
    }
}

fn write_seq<W: Write>(arena: &Arena, seq: Elem, open: &str, out: &mut W) -> fmt::Result {
    out.write_str(open)?;
    for (i, v) in arena.list_iter(seq).enumerate() {
        if i > 0 {
            out.write_char(' ')?;
        }
        write_elem(arena, v, out)?;
    }
    out.write_char(if open == "(" { ')' } else { '}' })
}

fn write_map<W: Write>(arena: &Arena, map: Elem, out: &mut W) -> fmt::Result {
    out.write_char('{')?;
    for (i, (k, v)) in arena.map_visible(map).into_iter().rev().enumerate() {
        if i > 0 {
            out.write_char(' ')?;
        }
        write_elem(arena, k, out)?;
        out.write_char(' ')?;
        write_elem(arena, v, out)?;
    }
    out.write_char('}')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Function, Key};

    fn setup() -> (Arena, Elem) {
        let mut arena = Arena::new(200);
        let frame = arena.new_root_frame().unwrap();
        (arena, frame)
    }

    #[test]
    fn test_print_atoms() {
        let (mut arena, frame) = setup();
        let s = arena.new_string(frame, b"hello").unwrap();
        let sym = arena.new_symbol(frame, b"sym").unwrap();
        let id = arena.new_ident(frame, b"println").unwrap();
        let n = arena.new_int(frame, 42).unwrap();
        assert_eq!(print_elem(&arena, s), "\"hello\"");
        assert_eq!(print_elem(&arena, sym), ":sym");
        assert_eq!(print_elem(&arena, id), "println");
        assert_eq!(print_elem(&arena, n), "42");
        assert_eq!(print_elem(&arena, Elem::Nil), "nil");
        assert_eq!(print_elem(&arena, Elem::True), "true");
        assert_eq!(print_elem(&arena, Key::Env.into()), ":env");
    }

    #[test]
    fn test_strings_are_not_escaped() {
        let (mut arena, frame) = setup();
        let s = arena.new_string(frame, b"a\"b").unwrap();
        assert_eq!(print_elem(&arena, s), "\"a\"b\"");
    }

    #[test]
    fn test_print_collections() {
        let (mut arena, frame) = setup();
        let a = arena.new_int(frame, 1).unwrap();
        let b = arena.new_int(frame, 2).unwrap();
        let l = arena.list_from_slice(frame, &[a, b]).unwrap();
        assert_eq!(print_elem(&arena, l), "(1 2)");
        assert_eq!(print_elem(&arena, Elem::EmptyList), "()");

        let s = arena.set_add(frame, Elem::EmptySet, a).unwrap();
        let s = arena.set_add(frame, s, b).unwrap();
        assert_eq!(print_elem(&arena, s), "#{2 1}");
        assert_eq!(print_elem(&arena, Elem::EmptySet), "#{}");
    }

    #[test]
    fn test_print_map_hides_shadowed_bindings() {
        let (mut arena, frame) = setup();
        let ka = arena.new_symbol(frame, b"a").unwrap();
        let kb = arena.new_symbol(frame, b"b").unwrap();
        let v: Vec<Elem> = (1..=3).map(|i| arena.new_int(frame, i).unwrap()).collect();
        let m = arena.map_set(frame, Elem::EmptyMap, ka, v[0]).unwrap();
        let m = arena.map_set(frame, m, kb, v[1]).unwrap();
        let m = arena.map_set(frame, m, ka, v[2]).unwrap();
        assert_eq!(print_elem(&arena, m), "{:b 2 :a 3}");

        let trimmed = arena.map_trim(frame, m).unwrap();
        let direct: Vec<(Elem, Elem)> = arena.map_iter(trimmed).collect();
        assert_eq!(direct.len(), 2);
        // trim rebuilds by head insertion, so its own chain runs b then a
        assert_eq!(direct[0].0, kb);
        assert_eq!(print_elem(&arena, trimmed), "{:a 3 :b 2}");
    }

    #[test]
    fn test_print_root_frame() {
        let (arena, frame) = setup();
        let printed = print_elem(&arena, frame);
        let id = arena.id().get();
        assert_eq!(
            printed,
            format!("{{:alloc <alloc:{id}> :env {{}} :lhs () :rhs ()}}")
        );
    }

    #[test]
    fn test_print_error_and_function() {
        let (mut arena, frame) = setup();
        let err = arena.new_error(frame, "Expected function").unwrap();
        let printed = print_elem(&arena, err);
        assert!(printed.starts_with("<err: {:frame {"));
        assert!(printed.ends_with(":msg \"Expected function\"}>"));

        let body = arena.new_ident(frame, b"x").unwrap();
        let f = arena
            .new_function(
                frame,
                Function::Closure {
                    params: Elem::EmptyList,
                    body,
                },
            )
            .unwrap();
        let Elem::Cell(id) = f else { unreachable!() };
        assert_eq!(arena.display(f).to_string(), format!("<fn:{}>", id.index()));
    }
}
