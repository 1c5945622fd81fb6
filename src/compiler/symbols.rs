//! Flat, single-scope symbol table.
//!
//! Blocks and branch bodies do not open a scope: a `let` inside a loop
//! body declares (or re-declares) the same variable the rest of the
//! program sees. A variable's type is whatever was last stored into it in
//! program order; the slot never changes once assigned.
//!
//! Slot 0 holds `main`'s `String[]` argument and is never visible to the
//! program: `args` is an ordinary identifier that must be declared first.

use crate::compiler::types::SemType;
use std::collections::HashMap;

/// Local slots the generated `main` reserves before any user variable.
/// Slot 0 holds the `String[]` program arguments.
pub const RESERVED_SLOTS: u16 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub ty: SemType,
    pub slot: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndefinedVariable(pub String);

/// The frame has no slot left; `max_locals` is a `u16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFull;

#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    entries: HashMap<String, Symbol>,
    // Declaration order, for deterministic listings.
    order: Vec<String>,
    // Slots handed out past the reserved ones, variables and scanner alike.
    allocated: u16,
    scanner: Option<u16>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `name`, or re-type it if it already exists. Returns its slot.
    pub fn define(&mut self, name: &str, ty: SemType) -> Result<u16, FrameFull> {
        if let Some(sym) = self.entries.get_mut(name) {
            sym.ty = ty;
            return Ok(sym.slot);
        }
        let slot = self.allocate()?;
        self.entries.insert(name.to_string(), Symbol { ty, slot });
        self.order.push(name.to_string());
        tracing::trace!(name, slot, %ty, "declared variable");
        Ok(slot)
    }

    /// Slot of the shared `java.util.Scanner`, allocated on first use.
    pub fn scanner_slot(&mut self) -> Result<u16, FrameFull> {
        if let Some(slot) = self.scanner {
            return Ok(slot);
        }
        let slot = self.allocate()?;
        self.scanner = Some(slot);
        tracing::trace!(slot, "allocated scanner slot");
        Ok(slot)
    }

    /// The scanner's slot, if any `read` asked for one.
    pub fn scanner(&self) -> Option<u16> {
        self.scanner
    }

    pub fn get(&self, name: &str) -> Result<SemType, UndefinedVariable> {
        self.lookup(name).map(|sym| sym.ty)
    }

    /// Re-type an existing variable. Unlike `define`, never creates one.
    pub fn assign(&mut self, name: &str, ty: SemType) -> Result<u16, UndefinedVariable> {
        let sym = self
            .entries
            .get_mut(name)
            .ok_or_else(|| UndefinedVariable(name.to_string()))?;
        sym.ty = ty;
        Ok(sym.slot)
    }

    pub fn index(&self, name: &str) -> Result<u16, UndefinedVariable> {
        self.lookup(name).map(|sym| sym.slot)
    }

    /// Number of distinct user variables.
    pub fn slot_count(&self) -> usize {
        self.order.len()
    }

    /// Locals the frame needs: reserved slots, one per variable, and the
    /// scanner when there is one.
    pub fn frame_locals(&self) -> u16 {
        // `allocate` keeps this sum within u16.
        RESERVED_SLOTS + self.allocated
    }

    /// Variables in declaration order with their current type and slot.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Symbol)> + '_ {
        self.order
            .iter()
            .filter_map(|name| self.entries.get(name).map(|sym| (name.as_str(), sym)))
    }

    // The highest slot must leave `frame_locals` representable.
    fn allocate(&mut self) -> Result<u16, FrameFull> {
        let slot = RESERVED_SLOTS.checked_add(self.allocated).ok_or(FrameFull)?;
        if slot == u16::MAX {
            return Err(FrameFull);
        }
        self.allocated += 1;
        Ok(slot)
    }

    fn lookup(&self, name: &str) -> Result<&Symbol, UndefinedVariable> {
        self.entries
            .get(name)
            .ok_or_else(|| UndefinedVariable(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_assigns_increasing_slots() {
        let mut table = SymbolTable::new();
        assert_eq!(table.define("x", SemType::Numeric), Ok(1));
        assert_eq!(table.define("y", SemType::Str), Ok(2));
        assert_eq!(table.slot_count(), 2);
        assert_eq!(table.frame_locals(), 3);
    }

    #[test]
    fn redefine_keeps_slot_and_updates_type() {
        let mut table = SymbolTable::new();
        let slot = table.define("x", SemType::Numeric).unwrap();
        assert_eq!(table.define("x", SemType::Bool), Ok(slot));
        assert_eq!(table.get("x"), Ok(SemType::Bool));
        assert_eq!(table.slot_count(), 1);
    }

    #[test]
    fn assign_requires_declaration() {
        let mut table = SymbolTable::new();
        assert_eq!(
            table.assign("ghost", SemType::Str),
            Err(UndefinedVariable("ghost".into()))
        );
        assert_eq!(table.slot_count(), 0);

        table.define("name", SemType::Numeric).unwrap();
        assert_eq!(table.assign("name", SemType::Str), Ok(1));
        assert_eq!(table.get("name"), Ok(SemType::Str));
    }

    #[test]
    fn lookups_fail_for_unknown_names() {
        let table = SymbolTable::new();
        assert!(table.get("z").is_err());
        assert!(table.index("z").is_err());
    }

    #[test]
    fn iter_follows_declaration_order() {
        let mut table = SymbolTable::new();
        table.define("b", SemType::Numeric).unwrap();
        table.define("a", SemType::Bool).unwrap();
        table.define("b", SemType::Str).unwrap();
        let names: Vec<_> = table.iter().map(|(n, s)| (n, s.slot, s.ty)).collect();
        assert_eq!(names, vec![("b", 1, SemType::Str), ("a", 2, SemType::Bool)]);
    }

    #[test]
    fn scanner_slot_is_allocated_once() {
        let mut table = SymbolTable::new();
        table.define("a", SemType::Str).unwrap();
        assert_eq!(table.scanner(), None);
        assert_eq!(table.scanner_slot(), Ok(2));
        table.define("b", SemType::Numeric).unwrap();
        assert_eq!(table.scanner_slot(), Ok(2));
        assert_eq!(table.index("b"), Ok(3));
        assert_eq!(table.slot_count(), 2);
        assert_eq!(table.frame_locals(), 4);
        assert_eq!(table.iter().count(), 2);
    }

    #[test]
    fn frame_full_rejects_the_slot_past_the_limit() {
        let mut table = SymbolTable::new();
        for i in 0..u16::MAX - RESERVED_SLOTS {
            table.define(&format!("v{}", i), SemType::Numeric).unwrap();
        }
        assert_eq!(table.frame_locals(), u16::MAX);
        assert_eq!(table.define("overflow", SemType::Numeric), Err(FrameFull));
        assert_eq!(table.scanner_slot(), Err(FrameFull));
        // Existing names still re-declare into their slot.
        assert_eq!(table.define("v0", SemType::Bool), Ok(1));
        assert_eq!(table.frame_locals(), u16::MAX);
    }
}
