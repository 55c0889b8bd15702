//! Arena Allocator - fixed-capacity cell table with a LIFO free list
//!
//! Every non-singleton value lives in exactly one arena, addressed by a
//! [`CellId`] index. The table is reserved once, up front, and never grows
//! past its capacity.
//!
//! Design:
//! - `allocate` draws from the free list first, then from the next unused
//!   slot, and otherwise returns the Nil sentinel (never panics)
//! - `try_alloc` is the checked variant used by everything else in the crate
//! - `free` pushes one cell back onto the free list; the freed slot's link
//!   field threads the list
//! - Dropping the arena releases the table and every byte buffer owned by
//!   String/Ident/Symbol cells in one pass
//!
//! Each arena carries a process-unique [`ArenaId`]. The root frame stores it
//! under the `alloc` key as an allocator handle, and [`Arena::frame_alloc`]
//! refuses frames whose handle names another arena.

use crate::error::LispError;
use crate::value::{Cell, CellId, Elem, ElemType, Function, Key};
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, warn};

/// Cells reserved by a root arena unless configured otherwise
pub const DEFAULT_CAPACITY: usize = 1000;

static NEXT_ARENA_ID: AtomicU32 = AtomicU32::new(1);

/// Process-unique identity of an arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArenaId(u32);

impl ArenaId {
    fn next() -> Self {
        ArenaId(NEXT_ARENA_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

/// Arena statistics for debugging/monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaStats {
    pub capacity: usize,
    /// Cells currently holding a value
    pub live: usize,
    /// Cells waiting on the free list
    pub free: usize,
    /// Most cells ever live at once
    pub high_water: usize,
}

pub struct Arena {
    id: ArenaId,
    capacity: usize,
    table: Vec<Cell>,
    free_list: Option<CellId>,
    free_count: usize,
    high_water: usize,
    errors_raised: u64,
}

impl Default for Arena {
    fn default() -> Self {
        Arena::new(DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena")
            .field("id", &self.id)
            .field("stats", &self.stats())
            .finish()
    }
}

impl Arena {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.min(u32::MAX as usize);
        let id = ArenaId::next();
        debug!(arena = id.get(), capacity, "arena created");
        Arena {
            id,
            capacity,
            table: Vec::with_capacity(capacity),
            free_list: None,
            free_count: 0,
            high_water: 0,
            errors_raised: 0,
        }
    }

    pub fn id(&self) -> ArenaId {
        self.id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The allocator handle frames of this arena carry under `alloc`
    pub fn handle(&self) -> Elem {
        Elem::Alloc(self.id)
    }

    /// Store `cell` in a fresh slot.
    ///
    /// Returns the Nil sentinel when the arena is full. Callers that cannot
    /// treat Nil as "out of memory" should use [`Arena::try_alloc`].
    pub fn allocate(&mut self, cell: Cell) -> Elem {
        if let Some(id) = self.free_list {
            let slot = &mut self.table[id.index()];
            self.free_list = match slot {
                Cell::Free { next } => *next,
                _ => panic!("arena free list points at a live cell"),
            };
            *slot = cell;
            self.free_count -= 1;
            self.note_live();
            return Elem::Cell(id);
        }
        if self.table.len() < self.capacity {
            let id = CellId(self.table.len() as u32);
            self.table.push(cell);
            self.note_live();
            return Elem::Cell(id);
        }
        warn!(
            arena = self.id.get(),
            capacity = self.capacity,
            "arena exhausted"
        );
        Elem::Nil
    }

    /// Checked allocation
    pub fn try_alloc(&mut self, cell: Cell) -> Result<Elem, LispError> {
        match self.allocate(cell) {
            Elem::Nil => Err(LispError::ArenaExhausted {
                capacity: self.capacity,
            }),
            elem => Ok(elem),
        }
    }

    /// Allocate through a frame's own allocator handle.
    ///
    /// This is the one allocation path for values created while reading or
    /// evaluating: the frame must carry this arena's handle under `alloc`.
    pub fn frame_alloc(&mut self, frame: Elem, cell: Cell) -> Result<Elem, LispError> {
        if self.map_get(frame, Key::Alloc.into()) != self.handle() {
            return Err(LispError::ForeignFrame);
        }
        self.try_alloc(cell)
    }

    /// Return one cell to the free list.
    ///
    /// Sentinels and already-free cells are ignored; returns whether a cell
    /// was actually released.
    pub fn free(&mut self, elem: Elem) -> bool {
        let Elem::Cell(id) = elem else {
            return false;
        };
        let Some(slot) = self.table.get_mut(id.index()) else {
            return false;
        };
        if matches!(slot, Cell::Free { .. }) {
            debug_assert!(false, "double free of cell {}", id.index());
            return false;
        }
        *slot = Cell::Free {
            next: self.free_list,
        };
        self.free_list = Some(id);
        self.free_count += 1;
        true
    }

    fn note_live(&mut self) {
        let live = self.table.len() - self.free_count;
        if live > self.high_water {
            self.high_water = live;
        }
    }

    pub fn stats(&self) -> ArenaStats {
        ArenaStats {
            capacity: self.capacity,
            live: self.table.len() - self.free_count,
            free: self.free_count,
            high_water: self.high_water,
        }
    }

    /// Number of Error values created so far
    pub fn errors_raised(&self) -> u64 {
        self.errors_raised
    }

    // ── Access ──

    /// The cell behind `elem`, or `None` for sentinels
    pub fn cell(&self, elem: Elem) -> Option<&Cell> {
        match elem {
            Elem::Cell(id) => self.table.get(id.index()),
            _ => None,
        }
    }

    pub fn type_of(&self, elem: Elem) -> ElemType {
        match elem {
            Elem::Nil => ElemType::Nil,
            Elem::True => ElemType::True,
            Elem::False => ElemType::False,
            Elem::EmptyList => ElemType::List,
            Elem::EmptySet => ElemType::Set,
            Elem::EmptyMap => ElemType::Map,
            Elem::Key(_) => ElemType::Symbol,
            Elem::Alloc(_) => ElemType::Alloc,
            Elem::Cell(id) => match self.table.get(id.index()).and_then(Cell::elem_type) {
                Some(t) => t,
                None => panic!("use of freed or foreign cell {}", id.index()),
            },
        }
    }

    pub fn is_type(&self, elem: Elem, t: ElemType) -> bool {
        self.type_of(elem) == t
    }

    pub fn is_list(&self, elem: Elem) -> bool {
        self.is_type(elem, ElemType::List)
    }

    pub fn is_error(&self, elem: Elem) -> bool {
        self.is_type(elem, ElemType::Error)
    }

    pub fn is_fn(&self, elem: Elem) -> bool {
        self.is_type(elem, ElemType::Function)
    }

    /// Nil, booleans, Int and the byte-string kinds
    pub fn is_scalar(&self, elem: Elem) -> bool {
        matches!(
            self.type_of(elem),
            ElemType::Nil
                | ElemType::True
                | ElemType::False
                | ElemType::Int
                | ElemType::String
                | ElemType::Ident
                | ElemType::Symbol
        )
    }

    pub fn int_value(&self, elem: Elem) -> Option<u32> {
        match self.cell(elem)? {
            Cell::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Bytes of a String, Ident or Symbol (including the well-known keys)
    pub fn bytes(&self, elem: Elem) -> Option<&[u8]> {
        match elem {
            Elem::Key(key) => Some(key.as_bytes()),
            _ => self.cell(elem)?.bytes(),
        }
    }

    pub fn function(&self, elem: Elem) -> Option<&Function> {
        match self.cell(elem)? {
            Cell::Function(f) => Some(f),
            _ => None,
        }
    }

    /// The diagnostic map inside an Error value
    pub fn error_map(&self, elem: Elem) -> Option<Elem> {
        match self.cell(elem)? {
            Cell::Error(m) => Some(*m),
            _ => None,
        }
    }

    /// The `msg` of an Error value, as text
    pub fn error_message(&self, elem: Elem) -> Option<String> {
        let map = self.error_map(elem)?;
        let msg = self.map_get(map, Key::Msg.into());
        self.bytes(msg)
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    // ── Construction ──

    pub fn new_int(&mut self, frame: Elem, i: u32) -> Result<Elem, LispError> {
        self.frame_alloc(frame, Cell::Int(i))
    }

    pub fn new_string(&mut self, frame: Elem, s: &[u8]) -> Result<Elem, LispError> {
        self.frame_alloc(frame, Cell::String(s.into()))
    }

    pub fn new_ident(&mut self, frame: Elem, s: &[u8]) -> Result<Elem, LispError> {
        self.frame_alloc(frame, Cell::Ident(s.into()))
    }

    pub fn new_symbol(&mut self, frame: Elem, s: &[u8]) -> Result<Elem, LispError> {
        self.frame_alloc(frame, Cell::Symbol(s.into()))
    }

    pub fn new_function(&mut self, frame: Elem, f: Function) -> Result<Elem, LispError> {
        self.frame_alloc(frame, Cell::Function(f))
    }

    /// Build an Error value whose map carries `msg` and the active `frame`
    pub fn new_error(&mut self, frame: Elem, msg: &str) -> Result<Elem, LispError> {
        let text = self.new_string(frame, msg.as_bytes())?;
        let map = self.map_set(frame, Elem::EmptyMap, Key::Frame.into(), frame)?;
        let map = self.map_set(frame, map, Key::Msg.into(), text)?;
        let err = self.frame_alloc(frame, Cell::Error(map))?;
        self.errors_raised += 1;
        debug!(arena = self.id.get(), msg, "error value created");
        Ok(err)
    }

    /// Release the whole arena, returning its final statistics
    pub fn release(self) -> ArenaStats {
        let stats = self.stats();
        debug!(
            arena = self.id.get(),
            live = stats.live,
            high_water = stats.high_water,
            "arena released"
        );
        stats
    }
}
