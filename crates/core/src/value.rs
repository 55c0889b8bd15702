//! Value model
//!
//! Every value the interpreter talks about is an [`Elem`]: a small `Copy`
//! reference that is either one of the process-wide sentinels (Nil, True,
//! False, the three empty collections, the well-known frame symbols, an
//! allocator handle) or a handle to a [`Cell`] living in an [`Arena`].
//!
//! `Elem`'s derived `PartialEq` is *identity*: two elems are `==` when they
//! are the same sentinel or the same arena slot. Structural equality lives in
//! [`Arena::elem_eq`].
//!
//! [`Arena`]: crate::arena::Arena
//! [`Arena::elem_eq`]: crate::arena::Arena::elem_eq

use crate::arena::{Arena, ArenaId};
use crate::error::LispError;
use std::fmt;
use std::sync::Arc;

/// Index of a cell inside one arena's backing table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(pub(crate) u32);

impl CellId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Symbols the frame model uses as map keys.
///
/// These are static, like the singletons, and never take an arena cell.
/// They compare structurally equal to any arena Symbol with the same bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Alloc,
    Env,
    Lhs,
    Rhs,
    Parent,
    Input,
    Pos,
    CurrChar,
    Expr,
    Error,
    Msg,
    Frame,
}

impl Key {
    pub const ALL: [Key; 12] = [
        Key::Alloc,
        Key::Env,
        Key::Lhs,
        Key::Rhs,
        Key::Parent,
        Key::Input,
        Key::Pos,
        Key::CurrChar,
        Key::Expr,
        Key::Error,
        Key::Msg,
        Key::Frame,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Key::Alloc => "alloc",
            Key::Env => "env",
            Key::Lhs => "lhs",
            Key::Rhs => "rhs",
            Key::Parent => "parent",
            Key::Input => "input",
            Key::Pos => "pos",
            Key::CurrChar => "curr_char",
            Key::Expr => "expr",
            Key::Error => "error",
            Key::Msg => "msg",
            Key::Frame => "frame",
        }
    }

    pub fn as_bytes(self) -> &'static [u8] {
        self.as_str().as_bytes()
    }
}

/// Reference to a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Elem {
    Nil,
    True,
    False,
    EmptyList,
    EmptySet,
    EmptyMap,
    /// Well-known symbol
    Key(Key),
    /// Allocator handle; one per root frame
    Alloc(ArenaId),
    /// Arena-allocated value
    Cell(CellId),
}

impl Elem {
    pub fn bool(b: bool) -> Elem {
        if b { Elem::True } else { Elem::False }
    }

    pub fn is_nil(self) -> bool {
        self == Elem::Nil
    }

    pub fn cell_id(self) -> Option<CellId> {
        match self {
            Elem::Cell(id) => Some(id),
            _ => None,
        }
    }
}

impl From<Key> for Elem {
    fn from(key: Key) -> Self {
        Elem::Key(key)
    }
}

impl From<CellId> for Elem {
    fn from(id: CellId) -> Self {
        Elem::Cell(id)
    }
}

/// Type tag of a value, as seen by `is_type` checks and equality dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElemType {
    Nil,
    True,
    False,
    Int,
    List,
    Set,
    Map,
    String,
    Ident,
    Symbol,
    Error,
    Function,
    Alloc,
}

impl fmt::Display for ElemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElemType::Nil => "nil",
            ElemType::True => "true",
            ElemType::False => "false",
            ElemType::Int => "int",
            ElemType::List => "list",
            ElemType::Set => "set",
            ElemType::Map => "map",
            ElemType::String => "string",
            ElemType::Ident => "ident",
            ElemType::Symbol => "symbol",
            ElemType::Error => "error",
            ElemType::Function => "function",
            ElemType::Alloc => "alloc",
        };
        f.write_str(name)
    }
}

/// A builtin implemented in Rust.
///
/// Natives receive a call frame whose `rhs` holds the evaluated arguments in
/// order and whose `parent` is the frame that reduced the call. They return
/// the call's result value. Type failures should be reported by returning an
/// Error value (see [`Arena::new_error`]); `Err` is reserved for failures of
/// the interpreter itself, such as arena exhaustion.
///
/// [`Arena::new_error`]: crate::arena::Arena::new_error
pub trait Native: Send + Sync {
    fn name(&self) -> &str;

    fn call(&self, arena: &mut Arena, frame: Elem) -> Result<Elem, LispError>;
}

/// Callable payload of a Function cell
#[derive(Clone)]
pub enum Function {
    Native(Arc<dyn Native>),
    /// Parameter list and body, both kept as plain data
    Closure { params: Elem, body: Elem },
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Native(native) => write!(f, "Native({})", native.name()),
            Function::Closure { params, body } => f
                .debug_struct("Closure")
                .field("params", params)
                .field("body", body)
                .finish(),
        }
    }
}

/// Contents of one arena slot
#[derive(Debug, Clone)]
pub enum Cell {
    /// On the free list; links to the next free slot
    Free { next: Option<CellId> },
    Int(u32),
    List { value: Elem, next: Elem },
    Set { value: Elem, next: Elem },
    Map { key: Elem, value: Elem, next: Elem },
    String(Box<[u8]>),
    Ident(Box<[u8]>),
    Symbol(Box<[u8]>),
    /// Diagnostic map carrying at least `msg` and `frame`
    Error(Elem),
    Function(Function),
}

impl Cell {
    pub fn elem_type(&self) -> Option<ElemType> {
        Some(match self {
            Cell::Free { .. } => return None,
            Cell::Int(_) => ElemType::Int,
            Cell::List { .. } => ElemType::List,
            Cell::Set { .. } => ElemType::Set,
            Cell::Map { .. } => ElemType::Map,
            Cell::String(_) => ElemType::String,
            Cell::Ident(_) => ElemType::Ident,
            Cell::Symbol(_) => ElemType::Symbol,
            Cell::Error(_) => ElemType::Error,
            Cell::Function(_) => ElemType::Function,
        })
    }

    /// Bytes of a String, Ident or Symbol
    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            Cell::String(b) | Cell::Ident(b) | Cell::Symbol(b) => Some(b),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels_compare_by_identity() {
        assert_eq!(Elem::Nil, Elem::Nil);
        assert_ne!(Elem::EmptyList, Elem::EmptySet);
        assert_ne!(Elem::EmptySet, Elem::EmptyMap);
        assert_ne!(Elem::Cell(CellId(1)), Elem::Cell(CellId(2)));
    }

    #[test]
    fn test_key_names_are_distinct() {
        for (i, a) in Key::ALL.iter().enumerate() {
            for b in &Key::ALL[i + 1..] {
                assert_ne!(a.as_str(), b.as_str());
            }
        }
        assert_eq!(Key::CurrChar.as_str(), "curr_char");
    }

    #[test]
    fn test_cell_type_tags() {
        assert_eq!(Cell::Int(3).elem_type(), Some(ElemType::Int));
        assert_eq!(Cell::Free { next: None }.elem_type(), None);
        let sym = Cell::Symbol(b"env".to_vec().into_boxed_slice());
        assert_eq!(sym.bytes(), Some(&b"env"[..]));
        assert_eq!(Cell::Int(1).bytes(), None);
    }
}
