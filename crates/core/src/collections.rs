//! Persistent collections over the arena
//!
//! List, Set and Map are singly linked chains of arena cells ending in one
//! of the empty sentinels. Adding always allocates a new head that points at
//! the old chain, so every older version stays valid and shares its tail
//! with the newer ones.
//!
//! - List: plain cons chain
//! - Set: cons chain with a membership check on insert
//! - Map: key/value chain; lookups return the nearest match to the head, so
//!   a later insert shadows earlier nodes for the same key
//!
//! Lookups and equality only read the arena and take no frame. Operations
//! that allocate take the frame whose allocator they draw from.

use crate::arena::Arena;
use crate::error::LispError;
use crate::value::{Cell, Elem, ElemType};
use std::iter::FusedIterator;

/// Walks the members of a List or Set from the head
pub struct ListIter<'a> {
    arena: &'a Arena,
    cur: Elem,
}

impl Iterator for ListIter<'_> {
    type Item = Elem;

    fn next(&mut self) -> Option<Elem> {
        match self.arena.cell(self.cur)? {
            Cell::List { value, next } | Cell::Set { value, next } => {
                self.cur = *next;
                Some(*value)
            }
            _ => None,
        }
    }
}

impl FusedIterator for ListIter<'_> {}

/// Walks every node of a Map, shadowed ones included
pub struct MapIter<'a> {
    arena: &'a Arena,
    cur: Elem,
}

impl Iterator for MapIter<'_> {
    type Item = (Elem, Elem);

    fn next(&mut self) -> Option<(Elem, Elem)> {
        match self.arena.cell(self.cur)? {
            Cell::Map { key, value, next } => {
                self.cur = *next;
                Some((*key, *value))
            }
            _ => None,
        }
    }
}

impl FusedIterator for MapIter<'_> {}

impl Arena {
    // ── Emptiness (identity with the sentinels) ──

    pub fn list_is_empty(&self, l: Elem) -> bool {
        l == Elem::EmptyList
    }

    pub fn set_is_empty(&self, s: Elem) -> bool {
        s == Elem::EmptySet
    }

    pub fn map_is_empty(&self, m: Elem) -> bool {
        m == Elem::EmptyMap
    }

    // ── Node access ──

    /// `(value, next)` of a non-empty List
    pub fn list_head(&self, l: Elem) -> Option<(Elem, Elem)> {
        match self.cell(l)? {
            Cell::List { value, next } => Some((*value, *next)),
            _ => None,
        }
    }

    /// `(value, next)` of a non-empty Set
    pub fn set_head(&self, s: Elem) -> Option<(Elem, Elem)> {
        match self.cell(s)? {
            Cell::Set { value, next } => Some((*value, *next)),
            _ => None,
        }
    }

    /// `(key, value, next)` of a non-empty Map
    pub fn map_node(&self, m: Elem) -> Option<(Elem, Elem, Elem)> {
        match self.cell(m)? {
            Cell::Map { key, value, next } => Some((*key, *value, *next)),
            _ => None,
        }
    }

    pub fn list_iter(&self, l: Elem) -> ListIter<'_> {
        ListIter { arena: self, cur: l }
    }

    pub fn map_iter(&self, m: Elem) -> MapIter<'_> {
        MapIter { arena: self, cur: m }
    }

    pub fn list_len(&self, l: Elem) -> usize {
        self.list_iter(l).count()
    }

    // ── Insertion ──

    pub fn list_add(&mut self, frame: Elem, l: Elem, v: Elem) -> Result<Elem, LispError> {
        self.frame_alloc(frame, Cell::List { value: v, next: l })
    }

    /// Returns `s` itself when `v` is already a member
    pub fn set_add(&mut self, frame: Elem, s: Elem, v: Elem) -> Result<Elem, LispError> {
        if self.set_contains(s, v) {
            return Ok(s);
        }
        self.frame_alloc(frame, Cell::Set { value: v, next: s })
    }

    /// Returns `m` itself when `k` already maps to a value equal to `v`
    pub fn map_set(
        &mut self,
        frame: Elem,
        m: Elem,
        k: Elem,
        v: Elem,
    ) -> Result<Elem, LispError> {
        if self.elem_eq(self.map_get(m, k), v) {
            return Ok(m);
        }
        self.frame_alloc(
            frame,
            Cell::Map {
                key: k,
                value: v,
                next: m,
            },
        )
    }

    /// Like [`map_set`](Self::map_set), but an absent key always gets a
    /// node, even for Nil. Used where the binding itself must shadow.
    pub fn map_bind(
        &mut self,
        frame: Elem,
        m: Elem,
        k: Elem,
        v: Elem,
    ) -> Result<Elem, LispError> {
        if self.map_contains_key(m, k) && self.elem_eq(self.map_get(m, k), v) {
            return Ok(m);
        }
        self.frame_alloc(
            frame,
            Cell::Map {
                key: k,
                value: v,
                next: m,
            },
        )
    }

    /// Build a List holding `items` in order
    pub fn list_from_slice(&mut self, frame: Elem, items: &[Elem]) -> Result<Elem, LispError> {
        let mut l = Elem::EmptyList;
        for v in items.iter().rev() {
            l = self.list_add(frame, l, *v)?;
        }
        Ok(l)
    }

    // ── Lookup ──

    pub fn list_contains(&self, l: Elem, x: Elem) -> bool {
        self.list_iter(l).any(|v| self.elem_eq(v, x))
    }

    pub fn set_contains(&self, s: Elem, x: Elem) -> bool {
        self.list_iter(s).any(|v| self.elem_eq(v, x))
    }

    pub fn map_contains_key(&self, m: Elem, k: Elem) -> bool {
        self.map_iter(m).any(|(key, _)| self.elem_eq(key, k))
    }

    /// Value of the nearest node whose key equals `k`, else Nil
    pub fn map_get(&self, m: Elem, k: Elem) -> Elem {
        self.map_iter(m)
            .find(|(key, _)| self.elem_eq(*key, k))
            .map_or(Elem::Nil, |(_, v)| v)
    }

    /// First occurrence of every key, nearest-to-head first
    pub fn map_visible(&self, m: Elem) -> Vec<(Elem, Elem)> {
        let mut seen: Vec<(Elem, Elem)> = Vec::new();
        for (k, v) in self.map_iter(m) {
            if !seen.iter().any(|(s, _)| self.elem_eq(*s, k)) {
                seen.push((k, v));
            }
        }
        seen
    }

    // ── Copying ──

    /// Copy `l` with its members in reverse order
    pub fn list_reverse(&mut self, frame: Elem, l: Elem) -> Result<Elem, LispError> {
        let mut out = Elem::EmptyList;
        let mut cur = l;
        while let Some((value, next)) = self.list_head(cur) {
            out = self.list_add(frame, out, value)?;
            cur = next;
        }
        Ok(out)
    }

    /// A Map with only the first occurrence of each key of `m`
    pub fn map_trim(&mut self, frame: Elem, m: Elem) -> Result<Elem, LispError> {
        let mut out = Elem::EmptyMap;
        let mut cur = m;
        while let Some((k, v, next)) = self.map_node(cur) {
            if !self.map_contains_key(out, k) {
                out = self.map_set(frame, out, k, v)?;
            }
            cur = next;
        }
        Ok(out)
    }

    // ── Recycling ──

    /// Free the cons cells of a List or Set chain, leaving its members alone
    pub fn free_list_spine(&mut self, l: Elem) -> usize {
        let mut freed = 0;
        let mut cur = l;
        while let Some(Cell::List { next, .. } | Cell::Set { next, .. }) = self.cell(cur) {
            let next = *next;
            if self.free(cur) {
                freed += 1;
            }
            cur = next;
        }
        freed
    }

    /// Free the nodes of a Map chain from its head down to (not including)
    /// `stop`, leaving keys and values alone
    pub fn free_map_spine(&mut self, m: Elem, stop: Elem) -> usize {
        let mut freed = 0;
        let mut cur = m;
        while cur != stop {
            let Some((_, _, next)) = self.map_node(cur) else {
                break;
            };
            if self.free(cur) {
                freed += 1;
            }
            cur = next;
        }
        freed
    }

    // ── Equality ──

    /// Structural equality.
    ///
    /// Identical references are always equal. Otherwise the type tags must
    /// match; Nil, Error, Function and allocator handles are only ever
    /// equal to themselves.
    pub fn elem_eq(&self, a: Elem, b: Elem) -> bool {
        if a == b {
            return true;
        }
        let ta = self.type_of(a);
        if ta != self.type_of(b) {
            return false;
        }
        match ta {
            ElemType::Nil
            | ElemType::True
            | ElemType::False
            | ElemType::Error
            | ElemType::Function
            | ElemType::Alloc => false,
            ElemType::Int => self.int_value(a) == self.int_value(b),
            ElemType::String | ElemType::Ident | ElemType::Symbol => {
                self.bytes(a) == self.bytes(b)
            }
            ElemType::List => self.list_eq(a, b),
            ElemType::Set => self.set_eq(a, b),
            ElemType::Map => self.map_eq(a, b),
        }
    }

    /// Same length and pairwise-equal members
    pub fn list_eq(&self, a: Elem, b: Elem) -> bool {
        let (mut a, mut b) = (a, b);
        loop {
            if a == b {
                return true;
            }
            match (self.list_head(a), self.list_head(b)) {
                (Some((va, na)), Some((vb, nb))) => {
                    if !self.elem_eq(va, vb) {
                        return false;
                    }
                    a = na;
                    b = nb;
                }
                _ => return false,
            }
        }
    }

    /// Every member of `a` is in `b`
    pub fn set_subset_eq(&self, a: Elem, b: Elem) -> bool {
        a == b || self.list_iter(a).all(|v| self.set_contains(b, v))
    }

    pub fn set_eq(&self, a: Elem, b: Elem) -> bool {
        self.set_subset_eq(a, b) && self.set_subset_eq(b, a)
    }

    /// Every visible binding of `a` is visible with an equal value in `b`
    pub fn map_submap_eq(&self, a: Elem, b: Elem) -> bool {
        a == b
            || self
                .map_visible(a)
                .into_iter()
                .all(|(k, v)| self.elem_eq(self.map_get(b, k), v))
    }

    pub fn map_eq(&self, a: Elem, b: Elem) -> bool {
        self.map_submap_eq(a, b) && self.map_submap_eq(b, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Key;

    fn setup() -> (Arena, Elem) {
        let mut arena = Arena::new(500);
        let frame = arena.new_root_frame().unwrap();
        (arena, frame)
    }

    fn ints(arena: &mut Arena, frame: Elem, xs: &[u32]) -> Vec<Elem> {
        xs.iter().map(|x| arena.new_int(frame, *x).unwrap()).collect()
    }

    #[test]
    fn test_list_add_shares_tail() {
        let (mut arena, frame) = setup();
        let v = ints(&mut arena, frame, &[1, 2, 3]);
        let l = arena.list_from_slice(frame, &v).unwrap();
        let before: Vec<Elem> = arena.list_iter(l).collect();

        let x = arena.new_int(frame, 9).unwrap();
        let l2 = arena.list_add(frame, l, x).unwrap();

        assert_ne!(l, l2);
        assert_eq!(arena.list_head(l2), Some((x, l)));
        let after: Vec<Elem> = arena.list_iter(l).collect();
        assert_eq!(before, after);
        assert_eq!(arena.list_len(l2), 4);
    }

    #[test]
    fn test_emptiness_is_identity() {
        let (mut arena, frame) = setup();
        assert!(arena.list_is_empty(Elem::EmptyList));
        assert!(!arena.list_is_empty(Elem::EmptySet));
        let one = arena.new_int(frame, 1).unwrap();
        let l = arena.list_add(frame, Elem::EmptyList, one).unwrap();
        assert!(!arena.list_is_empty(l));
        assert!(arena.map_is_empty(Elem::EmptyMap));
        assert!(arena.set_is_empty(Elem::EmptySet));
    }

    #[test]
    fn test_map_shadowing() {
        let (mut arena, frame) = setup();
        let k = arena.new_symbol(frame, b"k").unwrap();
        let v = ints(&mut arena, frame, &[1, 2]);
        let m = arena.map_set(frame, Elem::EmptyMap, k, v[0]).unwrap();
        let m = arena.map_set(frame, m, k, v[1]).unwrap();
        assert_eq!(arena.map_get(m, k), v[1]);
        // the shadowed node is still in the chain
        assert_eq!(arena.map_iter(m).count(), 2);
    }

    #[test]
    fn test_map_set_same_value_is_noop() {
        let (mut arena, frame) = setup();
        let k = arena.new_symbol(frame, b"k").unwrap();
        let v = ints(&mut arena, frame, &[7, 7]);
        let m = arena.map_set(frame, Elem::EmptyMap, k, v[0]).unwrap();
        // structurally equal, different cell
        let m2 = arena.map_set(frame, m, k, v[1]).unwrap();
        assert_eq!(m, m2);
    }

    #[test]
    fn test_map_get_missing_is_nil() {
        let (mut arena, frame) = setup();
        let k = arena.new_symbol(frame, b"missing").unwrap();
        assert_eq!(arena.map_get(Elem::EmptyMap, k), Elem::Nil);
        assert_eq!(arena.map_get(frame, k), Elem::Nil);
    }

    #[test]
    fn test_symbol_cell_matches_well_known_key() {
        let (mut arena, frame) = setup();
        let env = arena.new_symbol(frame, b"env").unwrap();
        assert!(arena.elem_eq(env, Key::Env.into()));
        assert_eq!(arena.map_get(frame, env), Elem::EmptyMap);
        // an Ident with the same bytes is a different type
        let ident = arena.new_ident(frame, b"env").unwrap();
        assert!(!arena.elem_eq(ident, Key::Env.into()));
    }

    #[test]
    fn test_set_dedup() {
        let (mut arena, frame) = setup();
        let v = ints(&mut arena, frame, &[5, 5]);
        let s = arena.set_add(frame, Elem::EmptySet, v[0]).unwrap();
        assert!(arena.set_contains(s, v[0]));
        let s2 = arena.set_add(frame, s, v[0]).unwrap();
        assert_eq!(s, s2);
        // equal by value counts as a duplicate too
        let s3 = arena.set_add(frame, s, v[1]).unwrap();
        assert_eq!(s, s3);
    }

    #[test]
    fn test_set_equality_ignores_order() {
        let (mut arena, frame) = setup();
        let v = ints(&mut arena, frame, &[1, 2, 3]);
        let mut a = Elem::EmptySet;
        let mut b = Elem::EmptySet;
        for x in &v {
            a = arena.set_add(frame, a, *x).unwrap();
        }
        for x in v.iter().rev() {
            b = arena.set_add(frame, b, *x).unwrap();
        }
        assert!(arena.elem_eq(a, b));

        let smaller = arena.set_add(frame, Elem::EmptySet, v[0]).unwrap();
        assert!(!arena.elem_eq(a, smaller));
        assert!(arena.set_subset_eq(smaller, a));
    }

    #[test]
    fn test_reverse_twice_is_equal() {
        let (mut arena, frame) = setup();
        for xs in [&[][..], &[1][..], &[1, 2, 3, 4][..]] {
            let v = ints(&mut arena, frame, xs);
            let l = arena.list_from_slice(frame, &v).unwrap();
            let r = arena.list_reverse(frame, l).unwrap();
            let rr = arena.list_reverse(frame, r).unwrap();
            assert!(arena.elem_eq(l, rr));
            if xs.len() > 1 {
                assert!(!arena.elem_eq(l, r));
            }
        }
    }

    #[test]
    fn test_list_eq_length_mismatch() {
        let (mut arena, frame) = setup();
        let v = ints(&mut arena, frame, &[1, 2, 3]);
        let long = arena.list_from_slice(frame, &v).unwrap();
        let short = arena.list_from_slice(frame, &v[..2]).unwrap();
        assert!(!arena.elem_eq(long, short));
        assert!(!arena.elem_eq(short, long));
        assert!(!arena.elem_eq(Elem::EmptyList, short));
    }

    #[test]
    fn test_contains_on_long_list() {
        let mut arena = Arena::new(40_000);
        let frame = arena.new_root_frame().unwrap();
        let mut l = Elem::EmptyList;
        for i in 0..10_000 {
            let x = arena.new_int(frame, i).unwrap();
            l = arena.list_add(frame, l, x).unwrap();
        }
        let needle = arena.new_int(frame, 0).unwrap();
        assert!(arena.list_contains(l, needle));
        let r = arena.list_reverse(frame, l).unwrap();
        assert!(!arena.elem_eq(l, r));
    }

    #[test]
    fn test_map_equality_uses_visible_bindings() {
        let (mut arena, frame) = setup();
        let k = arena.new_symbol(frame, b"k").unwrap();
        let v = ints(&mut arena, frame, &[1, 2]);
        let shadowed = arena.map_set(frame, Elem::EmptyMap, k, v[0]).unwrap();
        let shadowed = arena.map_set(frame, shadowed, k, v[1]).unwrap();
        let plain = arena.map_set(frame, Elem::EmptyMap, k, v[1]).unwrap();
        assert!(arena.elem_eq(shadowed, plain));
    }

    #[test]
    fn test_trim_drops_shadowed_nodes() {
        let (mut arena, frame) = setup();
        let a = arena.new_symbol(frame, b"a").unwrap();
        let b = arena.new_symbol(frame, b"b").unwrap();
        let v = ints(&mut arena, frame, &[1, 2, 3]);
        let m = arena.map_set(frame, Elem::EmptyMap, a, v[0]).unwrap();
        let m = arena.map_set(frame, m, b, v[1]).unwrap();
        let m = arena.map_set(frame, m, a, v[2]).unwrap();
        assert_eq!(arena.map_iter(m).count(), 3);

        let t = arena.map_trim(frame, m).unwrap();
        assert_eq!(arena.map_iter(t).count(), 2);
        assert_eq!(arena.map_get(t, a), v[2]);
        assert_eq!(arena.map_get(t, b), v[1]);
        assert!(arena.elem_eq(t, m));
    }

    #[test]
    fn test_error_and_function_never_equal_unless_identical() {
        let (mut arena, frame) = setup();
        let e1 = arena.new_error(frame, "boom").unwrap();
        let e2 = arena.new_error(frame, "boom").unwrap();
        assert!(arena.elem_eq(e1, e1));
        assert!(!arena.elem_eq(e1, e2));
        assert!(arena.elem_eq(Elem::Nil, Elem::Nil));
        assert!(!arena.elem_eq(Elem::True, Elem::False));
    }

    #[test]
    fn test_free_list_spine_keeps_members() {
        let (mut arena, frame) = setup();
        let v = ints(&mut arena, frame, &[1, 2, 3]);
        let l = arena.list_from_slice(frame, &v).unwrap();
        assert_eq!(arena.free_list_spine(l), 3);
        assert_eq!(arena.int_value(v[2]), Some(3));
    }

    #[test]
    fn test_free_map_spine_stops_at_base() {
        let (mut arena, frame) = setup();
        let k = arena.new_symbol(frame, b"k").unwrap();
        let v = ints(&mut arena, frame, &[1, 2]);
        let base = arena.map_set(frame, Elem::EmptyMap, k, v[0]).unwrap();
        let top = arena.map_set(frame, base, k, v[1]).unwrap();
        assert_eq!(arena.free_map_spine(top, base), 1);
        assert_eq!(arena.map_get(base, k), v[0]);
    }
}
