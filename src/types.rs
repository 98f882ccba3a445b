//! Runtime types and the types cache.
//!
//! # Lattice Structure
//!
//! [`TypeSet`] is a **powerset lattice** over the finite set of [`Type`]s.
//!
//! *   **Bottom** (`⊥`): the empty set, an expression that cannot evaluate.
//! *   **Top** (`⊤`): any type. An expression typed `⊤` is *untyped*: its runtime types are not known,
//!     which is the case for every expression before type inference ran.
//! *   **Order** (`⊑`): subset inclusion.
//!
//! The lattice has finite height, so widening is the join.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::lattice::Lattice;
use crate::program::{ExprId, ProcedureId};
use crate::symbolic::OperandKind;

/// A concrete runtime type of the analyzed language.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Type {
    Integer,
    Float,
    Boolean,
    String,
    Object,
    Null,
    /// Reference to an object in memory.
    Pointer,
}

impl Type {
    pub fn is_numeric(self) -> bool {
        matches!(self, Type::Integer | Type::Float)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Type::Integer => "int",
            Type::Float => "float",
            Type::Boolean => "bool",
            Type::String => "string",
            Type::Object => "object",
            Type::Null => "null",
            Type::Pointer => "pointer",
        };
        write!(f, "{}", s)
    }
}

/// Set of possible runtime types.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TypeSet {
    Bottom,
    /// Invariant: never empty, an empty set is `Bottom`.
    Set(BTreeSet<Type>),
    Top,
}

/// Classification of a type set used by operator preconditions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DynamicType {
    /// Runtime types unknown, or too heterogeneous to classify.
    Untyped,
    /// Every possible type is numeric.
    Numeric,
    /// Exactly one non-numeric type.
    Exact(Type),
}

impl TypeSet {
    pub fn single(t: Type) -> Self {
        TypeSet::Set(BTreeSet::from([t]))
    }

    pub fn from_types(types: &[Type]) -> Self {
        if types.is_empty() {
            TypeSet::Bottom
        } else {
            TypeSet::Set(types.iter().copied().collect())
        }
    }

    /// May the value have type `t`?
    pub fn may_be(&self, t: Type) -> bool {
        match self {
            TypeSet::Bottom => false,
            TypeSet::Top => true,
            TypeSet::Set(s) => s.contains(&t),
        }
    }

    pub fn is_exactly(&self, t: Type) -> bool {
        matches!(self, TypeSet::Set(s) if s.len() == 1 && s.contains(&t))
    }

    /// Restriction to numeric types.
    pub fn numeric_part(&self) -> TypeSet {
        match self {
            TypeSet::Bottom => TypeSet::Bottom,
            TypeSet::Top => TypeSet::from_types(&[Type::Integer, Type::Float]),
            TypeSet::Set(s) => {
                let numeric: Vec<Type> = s.iter().copied().filter(|t| t.is_numeric()).collect();
                TypeSet::from_types(&numeric)
            }
        }
    }

    pub fn dynamic_type(&self) -> DynamicType {
        match self {
            TypeSet::Bottom | TypeSet::Top => DynamicType::Untyped,
            TypeSet::Set(s) if s.iter().all(|t| t.is_numeric()) => DynamicType::Numeric,
            TypeSet::Set(s) if s.len() == 1 => match s.iter().next() {
                Some(&t) => DynamicType::Exact(t),
                None => DynamicType::Untyped,
            },
            TypeSet::Set(_) => DynamicType::Untyped,
        }
    }

    /// Can a value of these types be an operand of kind `kind`?
    ///
    /// Untyped values are always accepted, otherwise the dynamic type must match the kind.
    pub fn admits(&self, kind: OperandKind) -> bool {
        match (self.dynamic_type(), kind) {
            (DynamicType::Untyped, _) => true,
            (DynamicType::Numeric, OperandKind::Numeric) => true,
            (DynamicType::Exact(Type::String), OperandKind::String) => true,
            (DynamicType::Exact(Type::Boolean), OperandKind::Boolean) => true,
            _ => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Type> + '_ {
        let set = match self {
            TypeSet::Set(s) => Some(s),
            _ => None,
        };
        set.into_iter().flat_map(|s| s.iter().copied())
    }
}

impl fmt::Display for TypeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSet::Bottom => write!(f, "⊥"),
            TypeSet::Top => write!(f, "⊤"),
            TypeSet::Set(s) => {
                write!(f, "{{")?;
                for (i, t) in s.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", t)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl Lattice for TypeSet {
    fn bottom() -> Self {
        TypeSet::Bottom
    }

    fn top() -> Self {
        TypeSet::Top
    }

    fn is_bottom(&self) -> bool {
        matches!(self, TypeSet::Bottom)
    }

    fn is_top(&self) -> bool {
        matches!(self, TypeSet::Top)
    }

    fn leq(&self, other: &Self) -> bool {
        match (self, other) {
            (TypeSet::Bottom, _) => true,
            (_, TypeSet::Top) => true,
            (TypeSet::Top, _) => false,
            (_, TypeSet::Bottom) => false,
            (TypeSet::Set(s1), TypeSet::Set(s2)) => s1.is_subset(s2),
        }
    }

    fn lub(&self, other: &Self) -> Self {
        match (self, other) {
            (TypeSet::Bottom, e) | (e, TypeSet::Bottom) => e.clone(),
            (TypeSet::Top, _) | (_, TypeSet::Top) => TypeSet::Top,
            (TypeSet::Set(s1), TypeSet::Set(s2)) => TypeSet::Set(s1.union(s2).copied().collect()),
        }
    }

    fn widening(&self, other: &Self) -> Self {
        self.lub(other)
    }

    fn glb(&self, other: &Self) -> Self {
        match (self, other) {
            (TypeSet::Bottom, _) | (_, TypeSet::Bottom) => TypeSet::Bottom,
            (TypeSet::Top, e) | (e, TypeSet::Top) => e.clone(),
            (TypeSet::Set(s1), TypeSet::Set(s2)) => {
                let common: Vec<Type> = s1.intersection(s2).copied().collect();
                TypeSet::from_types(&common)
            }
        }
    }
}

/// Cache of the types known to one analysis run.
///
/// The runner clears it at the start of every run, registers the program's types after finalization,
/// and fills the runtime types of expressions after type inference. Fixpoints only read it.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    program_types: BTreeSet<Type>,
    runtime_types: BTreeMap<(ProcedureId, ExprId), TypeSet>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.program_types.clear();
        self.runtime_types.clear();
    }

    pub fn register_types(&mut self, types: impl IntoIterator<Item = Type>) {
        self.program_types.extend(types);
    }

    pub fn program_types(&self) -> &BTreeSet<Type> {
        &self.program_types
    }

    pub fn set_runtime_types(&mut self, procedure: &ProcedureId, expr: ExprId, types: TypeSet) {
        self.runtime_types.insert((procedure.clone(), expr), types);
    }

    /// Runtime types of an expression, untyped (`⊤`) when unknown.
    pub fn runtime_types(&self, procedure: &ProcedureId, expr: ExprId) -> TypeSet {
        self.runtime_types
            .get(&(procedure.clone(), expr))
            .cloned()
            .unwrap_or(TypeSet::Top)
    }

    pub fn has_runtime_types(&self) -> bool {
        !self.runtime_types.is_empty()
    }

    pub fn runtime_types_len(&self) -> usize {
        self.runtime_types.len()
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::lattice::laws::check_lattice_laws;

    #[test]
    fn test_type_set_lattice() {
        check_lattice_laws(&[
            TypeSet::Bottom,
            TypeSet::single(Type::Integer),
            TypeSet::single(Type::String),
            TypeSet::from_types(&[Type::Integer, Type::Float]),
            TypeSet::from_types(&[Type::String, Type::Null]),
            TypeSet::Top,
        ]);
    }

    #[test]
    fn test_dynamic_type() {
        assert_eq!(TypeSet::Top.dynamic_type(), DynamicType::Untyped);
        assert_eq!(
            TypeSet::from_types(&[Type::Integer, Type::Float]).dynamic_type(),
            DynamicType::Numeric
        );
        assert_eq!(TypeSet::single(Type::String).dynamic_type(), DynamicType::Exact(Type::String));
        assert_eq!(
            TypeSet::from_types(&[Type::String, Type::Integer]).dynamic_type(),
            DynamicType::Untyped
        );
    }

    #[test]
    fn test_admits() {
        let string = TypeSet::single(Type::String);
        assert!(!string.admits(OperandKind::Numeric));
        assert!(string.admits(OperandKind::String));
        assert!(TypeSet::Top.admits(OperandKind::Numeric));
        assert!(TypeSet::single(Type::Integer).admits(OperandKind::Numeric));
        assert!(!TypeSet::single(Type::Integer).admits(OperandKind::Boolean));
        assert!(TypeSet::from_types(&[Type::String, Type::Integer]).admits(OperandKind::Numeric));
    }

    #[test]
    fn test_registry_lifecycle() {
        let main = ProcedureId::new("main");
        let mut registry = TypeRegistry::new();
        assert_eq!(registry.runtime_types(&main, ExprId(0)), TypeSet::Top);

        registry.register_types([Type::Integer, Type::String]);
        registry.set_runtime_types(&main, ExprId(0), TypeSet::single(Type::Integer));
        assert_eq!(registry.runtime_types(&main, ExprId(0)), TypeSet::single(Type::Integer));
        assert!(registry.has_runtime_types());

        registry.clear();
        assert!(!registry.has_runtime_types());
        assert!(registry.program_types().is_empty());
        assert_eq!(registry.runtime_types(&main, ExprId(0)), TypeSet::Top);
    }
}
