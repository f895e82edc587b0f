//! Symbols: identifiers for goals, operators and every other value the
//! decision core compares.
//!
//! A [`SymbolId`] is an opaque, niche-optimized handle. The
//! [`SymbolAllocator`] hands them out monotonically, and the [`SymbolTable`]
//! keeps the human-readable names used by scenarios and traces.

use std::collections::HashMap;
use std::num::NonZeroU64;

use serde::{Deserialize, Serialize};

use crate::error::{DecideError, DecideResult};

/// Unique, niche-optimized identifier for a symbol.
///
/// Uses `NonZeroU64` so that `Option<SymbolId>` is the same size as `SymbolId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct SymbolId(NonZeroU64);

impl SymbolId {
    /// Create a `SymbolId` from a raw `u64`.
    ///
    /// Returns `None` if `raw` is zero.
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(SymbolId)
    }

    /// Get the underlying `u64` value.
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl std::fmt::Display for SymbolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sym:{}", self.0)
    }
}

/// Monotonic symbol ID allocator.
///
/// The decision core is single-threaded, so a plain counter is enough.
/// IDs start at 1 and are never reused.
#[derive(Debug, Clone)]
pub struct SymbolAllocator {
    next: u64,
}

impl SymbolAllocator {
    /// Create a new allocator that starts from ID 1.
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Create an allocator that resumes from a given ID.
    pub fn starting_from(start: u64) -> Self {
        Self { next: start.max(1) }
    }

    /// Allocate the next symbol ID.
    pub fn next_id(&mut self) -> DecideResult<SymbolId> {
        let id = SymbolId::new(self.next).ok_or(DecideError::SymbolsExhausted)?;
        self.next = self.next.checked_add(1).unwrap_or(0);
        Ok(id)
    }

    /// Return the next ID that *would* be allocated, without consuming it.
    pub fn peek_next(&self) -> u64 {
        self.next
    }
}

impl Default for SymbolAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Bidirectional name ↔ [`SymbolId`] table.
///
/// Names are case-sensitive; `O1` and `o1` are different operators.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    allocator: SymbolAllocator,
    by_name: HashMap<String, SymbolId>,
    names: HashMap<SymbolId, String>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `name`, allocating a fresh symbol the first time it is seen.
    pub fn intern(&mut self, name: &str) -> DecideResult<SymbolId> {
        if let Some(&id) = self.by_name.get(name) {
            return Ok(id);
        }
        let id = self.allocator.next_id()?;
        self.by_name.insert(name.to_string(), id);
        self.names.insert(id, name.to_string());
        Ok(id)
    }

    /// Allocate an anonymous symbol, named after its raw ID with `prefix`.
    pub fn fresh(&mut self, prefix: char) -> DecideResult<SymbolId> {
        let id = self.allocator.next_id()?;
        let name = format!("{prefix}{}", id.get());
        self.by_name.insert(name.clone(), id);
        self.names.insert(id, name);
        Ok(id)
    }

    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.by_name.get(name).copied()
    }

    pub fn name(&self, id: SymbolId) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    /// Display name for `id`, falling back to its raw form.
    pub fn display(&self, id: SymbolId) -> String {
        self.name(id)
            .map(str::to_string)
            .unwrap_or_else(|| id.to_string())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_id_niche_optimization() {
        assert_eq!(
            std::mem::size_of::<Option<SymbolId>>(),
            std::mem::size_of::<SymbolId>()
        );
    }

    #[test]
    fn symbol_id_zero_is_none() {
        assert!(SymbolId::new(0).is_none());
        assert_eq!(SymbolId::new(42).unwrap().get(), 42);
    }

    #[test]
    fn allocator_produces_sequential_ids() {
        let mut alloc = SymbolAllocator::new();
        assert_eq!(alloc.next_id().unwrap().get(), 1);
        assert_eq!(alloc.next_id().unwrap().get(), 2);
        assert_eq!(alloc.peek_next(), 3);
    }

    #[test]
    fn allocator_exhaustion_is_an_error() {
        let mut alloc = SymbolAllocator::starting_from(u64::MAX);
        assert_eq!(alloc.next_id().unwrap().get(), u64::MAX);
        assert!(matches!(
            alloc.next_id(),
            Err(DecideError::SymbolsExhausted)
        ));
    }

    #[test]
    fn table_interns_names_once() {
        let mut table = SymbolTable::new();
        let a = table.intern("O1").unwrap();
        let b = table.intern("O1").unwrap();
        let c = table.intern("O2").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(table.name(c), Some("O2"));
        assert_eq!(table.lookup("O1"), Some(a));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn fresh_symbols_are_named_by_prefix() {
        let mut table = SymbolTable::new();
        table.intern("top").unwrap();
        let s = table.fresh('S').unwrap();
        assert_eq!(table.display(s), "S2");
        assert_eq!(table.lookup("S2"), Some(s));
    }

    #[test]
    fn symbol_id_display() {
        let id = SymbolId::new(42).unwrap();
        assert_eq!(id.to_string(), "sym:42");
    }
}
