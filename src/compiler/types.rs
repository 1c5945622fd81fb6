//! Semantic types and the per-expression type side table.

use crate::compiler::ast::ExprId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// The three value types of the language. No subtyping, no coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SemType {
    Numeric,
    Str,
    Bool,
}

impl SemType {
    /// JVM field descriptor of the value's runtime representation.
    pub fn descriptor(self) -> &'static str {
        match self {
            SemType::Numeric => "F",
            SemType::Str => "Ljava/lang/String;",
            SemType::Bool => "Z",
        }
    }

    /// Prefix of the load/store opcode family (`fload`, `astore`, ...).
    pub fn opcode_prefix(self) -> char {
        match self {
            SemType::Numeric => 'f',
            SemType::Str => 'a',
            SemType::Bool => 'i',
        }
    }
}

impl fmt::Display for SemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SemType::Numeric => write!(f, "double"),
            SemType::Str => write!(f, "str"),
            SemType::Bool => write!(f, "bool"),
        }
    }
}

/// Inferred type of every expression node generated so far.
///
/// Entries are written once, right after a node's code is emitted and
/// before its parent reads it.
#[derive(Debug, Default, Clone)]
pub struct TypeTracker {
    types: HashMap<ExprId, SemType>,
}

impl TypeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, id: ExprId, ty: SemType) -> SemType {
        debug_assert!(
            self.types.get(&id).map_or(true, |prev| *prev == ty),
            "expression {} re-typed",
            id
        );
        self.types.insert(id, ty);
        ty
    }

    pub fn get(&self, id: ExprId) -> Option<SemType> {
        self.types.get(&id).copied()
    }

    pub(crate) fn len(&self) -> usize {
        self.types.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptors_match_jvm_types() {
        assert_eq!(SemType::Numeric.descriptor(), "F");
        assert_eq!(SemType::Str.descriptor(), "Ljava/lang/String;");
        assert_eq!(SemType::Bool.descriptor(), "Z");
    }

    #[test]
    fn tracker_keys_by_identity() {
        let mut types = TypeTracker::new();
        types.record(ExprId(0), SemType::Numeric);
        types.record(ExprId(1), SemType::Str);
        assert_eq!(types.get(ExprId(0)), Some(SemType::Numeric));
        assert_eq!(types.get(ExprId(1)), Some(SemType::Str));
        assert_eq!(types.get(ExprId(2)), None);
        assert_eq!(types.len(), 2);
    }
}
