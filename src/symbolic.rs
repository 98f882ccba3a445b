//! Symbolic expressions: the language abstract domains understand.
//!
//! Surface [expressions][crate::program::Expression] are compiled by the evaluator into
//! [`SymbolicExpression`] trees before any domain sees them. A symbolic expression is immutable and
//! carries the set of runtime types it may evaluate to.
//!
//! Heap-shaped variants ([`ExprKind::HeapAllocation`], [`ExprKind::HeapReference`],
//! [`ExprKind::HeapDereference`]) are rewritten by the heap domain into heap-free expressions that
//! only mention [`Identifier`]s; value domains never see them.

use std::collections::BTreeSet;
use std::fmt;

use crate::lattice::Lattice;
use crate::types::{Type, TypeSet};

/// Name of the identifier holding a procedure's return value.
pub const RETURN_SLOT: &str = "$ret";

/// Token identifying a call boundary; identifiers of the caller are renamed with it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeToken(String);

impl ScopeToken {
    pub fn new(name: impl Into<String>) -> Self {
        ScopeToken(name.into())
    }
}

impl fmt::Display for ScopeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IdentifierKind {
    /// Program variable, living on the stack of its procedure.
    Variable,
    /// Abstract memory location. A weak location summarizes several concrete ones.
    HeapLocation { weak: bool },
    /// Pointer to the heap location with the same name.
    MemoryPointer,
}

/// A name the value domains associate abstract values with.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identifier {
    pub name: String,
    pub kind: IdentifierKind,
    /// Call boundary this identifier was moved out of, if any.
    pub scope: Option<ScopeToken>,
}

impl Identifier {
    pub fn variable(name: impl Into<String>) -> Self {
        Identifier {
            name: name.into(),
            kind: IdentifierKind::Variable,
            scope: None,
        }
    }

    pub fn heap_location(name: impl Into<String>, weak: bool) -> Self {
        Identifier {
            name: name.into(),
            kind: IdentifierKind::HeapLocation { weak },
            scope: None,
        }
    }

    pub fn pointer_to(location: &Identifier) -> Self {
        Identifier {
            name: location.name.clone(),
            kind: IdentifierKind::MemoryPointer,
            scope: None,
        }
    }

    pub fn return_slot() -> Self {
        Identifier::variable(RETURN_SLOT)
    }

    pub fn is_variable(&self) -> bool {
        matches!(self.kind, IdentifierKind::Variable)
    }

    pub fn is_heap_location(&self) -> bool {
        matches!(self.kind, IdentifierKind::HeapLocation { .. })
    }

    /// Weak identifiers may only be updated by joining with their previous value.
    pub fn is_weak(&self) -> bool {
        matches!(self.kind, IdentifierKind::HeapLocation { weak: true })
    }

    pub fn is_return_slot(&self) -> bool {
        self.is_variable() && self.scope.is_none() && self.name == RETURN_SLOT
    }

    /// Location a memory pointer points to, if this is one.
    pub fn pointed_location(&self, weak: bool) -> Option<Identifier> {
        match self.kind {
            IdentifierKind::MemoryPointer => Some(Identifier::heap_location(self.name.clone(), weak)),
            _ => None,
        }
    }

    /// Move a variable out of scope. Heap locations and pointers are global and stay unchanged.
    pub fn push_scope(&self, token: &ScopeToken) -> Identifier {
        if self.is_variable() && self.scope.is_none() {
            Identifier {
                scope: Some(token.clone()),
                ..self.clone()
            }
        } else {
            self.clone()
        }
    }

    /// Bring back a variable scoped with `token`.
    ///
    /// Returns `None` for unscoped variables, which do not exist in the outer scope.
    pub fn pop_scope(&self, token: &ScopeToken) -> Option<Identifier> {
        if !self.is_variable() {
            return Some(self.clone());
        }
        match &self.scope {
            Some(t) if t == token => Some(Identifier {
                scope: None,
                ..self.clone()
            }),
            Some(_) => Some(self.clone()),
            None => None,
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            IdentifierKind::Variable => write!(f, "{}", self.name)?,
            IdentifierKind::HeapLocation { weak: false } => write!(f, "heap[s]:{}", self.name)?,
            IdentifierKind::HeapLocation { weak: true } => write!(f, "heap[w]:{}", self.name)?,
            IdentifierKind::MemoryPointer => write!(f, "ref${}", self.name)?,
        }
        if let Some(scope) = &self.scope {
            write!(f, "@{}", scope)?;
        }
        Ok(())
    }
}

/// Literal value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Constant {
    Int(i64),
    Bool(bool),
    Str(String),
    Null,
}

impl Constant {
    pub fn static_type(&self) -> Type {
        match self {
            Constant::Int(_) => Type::Integer,
            Constant::Bool(_) => Type::Boolean,
            Constant::Str(_) => Type::String,
            Constant::Null => Type::Null,
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(n) => write!(f, "{}", n),
            Constant::Bool(b) => write!(f, "{}", b),
            Constant::Str(s) => write!(f, "\"{}\"", s),
            Constant::Null => write!(f, "null"),
        }
    }
}

/// Kind of operands an operator requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    Numeric,
    String,
    Boolean,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UnaryOperator {
    Neg,
    Not,
    StrLen,
}

impl UnaryOperator {
    pub fn operand_kind(self) -> Option<OperandKind> {
        match self {
            UnaryOperator::Neg => Some(OperandKind::Numeric),
            UnaryOperator::Not => Some(OperandKind::Boolean),
            UnaryOperator::StrLen => Some(OperandKind::String),
        }
    }

    /// Runtime types of the result given the types of the operand.
    pub fn result_types(self, arg: &TypeSet) -> TypeSet {
        if arg.is_bottom() {
            return TypeSet::Bottom;
        }
        match self {
            UnaryOperator::Neg => arg.numeric_part(),
            UnaryOperator::Not => TypeSet::single(Type::Boolean),
            UnaryOperator::StrLen => TypeSet::single(Type::Integer),
        }
    }
}

impl fmt::Display for UnaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOperator::Neg => write!(f, "-"),
            UnaryOperator::Not => write!(f, "!"),
            UnaryOperator::StrLen => write!(f, "strlen"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Concat,
    Contains,
    StartsWith,
    EndsWith,
}

impl BinaryOperator {
    pub fn is_arithmetic(self) -> bool {
        use BinaryOperator::*;
        matches!(self, Add | Sub | Mul | Div | Rem)
    }

    pub fn is_comparison(self) -> bool {
        use BinaryOperator::*;
        matches!(self, Eq | Ne | Lt | Le | Gt | Ge)
    }

    /// Required operand kind, `None` when operands of any type are accepted.
    pub fn operand_kind(self) -> Option<OperandKind> {
        use BinaryOperator::*;
        match self {
            Add | Sub | Mul | Div | Rem | Lt | Le | Gt | Ge => Some(OperandKind::Numeric),
            And | Or => Some(OperandKind::Boolean),
            Concat | Contains | StartsWith | EndsWith => Some(OperandKind::String),
            Eq | Ne => None,
        }
    }

    /// Operator `op'` such that `a op' b` holds exactly when `a op b` does not.
    pub fn negate(self) -> Option<BinaryOperator> {
        use BinaryOperator::*;
        match self {
            Eq => Some(Ne),
            Ne => Some(Eq),
            Lt => Some(Ge),
            Le => Some(Gt),
            Gt => Some(Le),
            Ge => Some(Lt),
            _ => None,
        }
    }

    /// Operator `op'` such that `b op' a` holds exactly when `a op b` does.
    pub fn flip(self) -> BinaryOperator {
        use BinaryOperator::*;
        match self {
            Lt => Gt,
            Le => Ge,
            Gt => Lt,
            Ge => Le,
            other => other,
        }
    }

    /// Runtime types of the result given the types of the operands.
    pub fn result_types(self, left: &TypeSet, right: &TypeSet) -> TypeSet {
        if left.is_bottom() || right.is_bottom() {
            return TypeSet::Bottom;
        }
        if self.is_arithmetic() {
            let l = left.numeric_part();
            let r = right.numeric_part();
            if l.is_bottom() || r.is_bottom() {
                return TypeSet::Bottom;
            }
            return l.lub(&r);
        }
        match self {
            BinaryOperator::Concat => TypeSet::single(Type::String),
            _ => TypeSet::single(Type::Boolean),
        }
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use BinaryOperator::*;
        let s = match self {
            Add => "+",
            Sub => "-",
            Mul => "*",
            Div => "/",
            Rem => "%",
            Eq => "==",
            Ne => "!=",
            Lt => "<",
            Le => "<=",
            Gt => ">",
            Ge => ">=",
            And => "&&",
            Or => "||",
            Concat => "++",
            Contains => "contains",
            StartsWith => "startsWith",
            EndsWith => "endsWith",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TernaryOperator {
    /// `substring(s, begin, end)`
    Substring,
    /// `replace(s, pattern, replacement)`
    Replace,
}

impl TernaryOperator {
    pub fn operand_kinds(self) -> [OperandKind; 3] {
        match self {
            TernaryOperator::Substring => [OperandKind::String, OperandKind::Numeric, OperandKind::Numeric],
            TernaryOperator::Replace => [OperandKind::String; 3],
        }
    }

    pub fn result_types(self, operands: [&TypeSet; 3]) -> TypeSet {
        if operands.iter().any(|t| t.is_bottom()) {
            TypeSet::Bottom
        } else {
            TypeSet::single(Type::String)
        }
    }
}

impl fmt::Display for TernaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TernaryOperator::Substring => write!(f, "substring"),
            TernaryOperator::Replace => write!(f, "replace"),
        }
    }
}

/// A typed symbolic expression.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SymbolicExpression {
    pub kind: ExprKind,
    /// Runtime types the expression may evaluate to. `Top` means untyped.
    pub types: TypeSet,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExprKind {
    Constant(Constant),
    Identifier(Identifier),
    /// Creation of a fresh memory location at an allocation site.
    HeapAllocation { site: String },
    /// Address of the memory location denoted by the inner expression.
    HeapReference(Box<SymbolicExpression>),
    /// Memory location pointed to by the inner expression.
    HeapDereference(Box<SymbolicExpression>),
    Unary(UnaryOperator, Box<SymbolicExpression>),
    Binary(BinaryOperator, Box<SymbolicExpression>, Box<SymbolicExpression>),
    Ternary(
        TernaryOperator,
        Box<SymbolicExpression>,
        Box<SymbolicExpression>,
        Box<SymbolicExpression>,
    ),
    /// Evaluate the inner expression with the caller's identifiers moved out of scope.
    PushScope(ScopeToken, Box<SymbolicExpression>),
    /// Evaluate the inner expression with identifiers of the given scope brought back.
    PopScope(ScopeToken, Box<SymbolicExpression>),
    /// No-op expression.
    Skip,
}

impl SymbolicExpression {
    pub fn new(kind: ExprKind, types: TypeSet) -> Self {
        SymbolicExpression { kind, types }
    }

    pub fn constant(value: Constant) -> Self {
        let types = TypeSet::single(value.static_type());
        SymbolicExpression::new(ExprKind::Constant(value), types)
    }

    pub fn identifier(id: Identifier, types: TypeSet) -> Self {
        SymbolicExpression::new(ExprKind::Identifier(id), types)
    }

    pub fn variable(name: impl Into<String>) -> Self {
        SymbolicExpression::identifier(Identifier::variable(name), TypeSet::Top)
    }

    pub fn skip() -> Self {
        SymbolicExpression::new(ExprKind::Skip, TypeSet::Top)
    }

    pub fn unary(op: UnaryOperator, arg: SymbolicExpression, types: TypeSet) -> Self {
        SymbolicExpression::new(ExprKind::Unary(op, Box::new(arg)), types)
    }

    pub fn binary(op: BinaryOperator, left: SymbolicExpression, right: SymbolicExpression, types: TypeSet) -> Self {
        SymbolicExpression::new(ExprKind::Binary(op, Box::new(left), Box::new(right)), types)
    }

    pub fn as_identifier(&self) -> Option<&Identifier> {
        match &self.kind {
            ExprKind::Identifier(id) => Some(id),
            _ => None,
        }
    }

    /// Whether the expression (or any sub-expression) needs a heap domain to be rewritten.
    pub fn mentions_heap(&self) -> bool {
        match &self.kind {
            ExprKind::HeapAllocation { .. } | ExprKind::HeapReference(_) | ExprKind::HeapDereference(_) => true,
            ExprKind::Constant(_) | ExprKind::Identifier(_) | ExprKind::Skip => false,
            ExprKind::Unary(_, a) | ExprKind::PushScope(_, a) | ExprKind::PopScope(_, a) => a.mentions_heap(),
            ExprKind::Binary(_, a, b) => a.mentions_heap() || b.mentions_heap(),
            ExprKind::Ternary(_, a, b, c) => a.mentions_heap() || b.mentions_heap() || c.mentions_heap(),
        }
    }

    /// Rewrite every identifier of the expression.
    pub fn map_identifiers(&self, f: &mut impl FnMut(&Identifier) -> Identifier) -> SymbolicExpression {
        let kind = match &self.kind {
            ExprKind::Identifier(id) => ExprKind::Identifier(f(id)),
            ExprKind::Constant(_) | ExprKind::HeapAllocation { .. } | ExprKind::Skip => self.kind.clone(),
            ExprKind::HeapReference(a) => ExprKind::HeapReference(Box::new(a.map_identifiers(f))),
            ExprKind::HeapDereference(a) => ExprKind::HeapDereference(Box::new(a.map_identifiers(f))),
            ExprKind::Unary(op, a) => ExprKind::Unary(*op, Box::new(a.map_identifiers(f))),
            ExprKind::Binary(op, a, b) => {
                let a = a.map_identifiers(f);
                let b = b.map_identifiers(f);
                ExprKind::Binary(*op, Box::new(a), Box::new(b))
            }
            ExprKind::Ternary(op, a, b, c) => {
                let a = a.map_identifiers(f);
                let b = b.map_identifiers(f);
                let c = c.map_identifiers(f);
                ExprKind::Ternary(*op, Box::new(a), Box::new(b), Box::new(c))
            }
            ExprKind::PushScope(t, a) => ExprKind::PushScope(t.clone(), Box::new(a.map_identifiers(f))),
            ExprKind::PopScope(t, a) => ExprKind::PopScope(t.clone(), Box::new(a.map_identifiers(f))),
        };
        SymbolicExpression::new(kind, self.types.clone())
    }

    /// Eliminate scope markers by renaming the identifiers below them.
    ///
    /// A variable under `PopScope(t, _)` that is not scoped with `t` does not exist in the outer scope
    /// and is left untouched, so that it evaluates to top.
    pub fn resolve_scopes(&self) -> SymbolicExpression {
        match &self.kind {
            ExprKind::PushScope(token, inner) => inner.resolve_scopes().map_identifiers(&mut |id| id.push_scope(token)),
            ExprKind::PopScope(token, inner) => inner
                .resolve_scopes()
                .map_identifiers(&mut |id| id.pop_scope(token).unwrap_or_else(|| id.clone())),
            ExprKind::Constant(_) | ExprKind::Identifier(_) | ExprKind::HeapAllocation { .. } | ExprKind::Skip => {
                self.clone()
            }
            ExprKind::HeapReference(a) => self.with_kind(ExprKind::HeapReference(Box::new(a.resolve_scopes()))),
            ExprKind::HeapDereference(a) => self.with_kind(ExprKind::HeapDereference(Box::new(a.resolve_scopes()))),
            ExprKind::Unary(op, a) => self.with_kind(ExprKind::Unary(*op, Box::new(a.resolve_scopes()))),
            ExprKind::Binary(op, a, b) => self.with_kind(ExprKind::Binary(
                *op,
                Box::new(a.resolve_scopes()),
                Box::new(b.resolve_scopes()),
            )),
            ExprKind::Ternary(op, a, b, c) => self.with_kind(ExprKind::Ternary(
                *op,
                Box::new(a.resolve_scopes()),
                Box::new(b.resolve_scopes()),
                Box::new(c.resolve_scopes()),
            )),
        }
    }

    fn with_kind(&self, kind: ExprKind) -> SymbolicExpression {
        SymbolicExpression::new(kind, self.types.clone())
    }

    /// Logical negation, pushed through comparisons and connectives where possible.
    pub fn negate(&self) -> SymbolicExpression {
        let boolean = TypeSet::single(Type::Boolean);
        match &self.kind {
            ExprKind::Constant(Constant::Bool(b)) => SymbolicExpression::constant(Constant::Bool(!b)),
            ExprKind::Unary(UnaryOperator::Not, inner) => (**inner).clone(),
            ExprKind::Binary(BinaryOperator::And, a, b) => {
                SymbolicExpression::binary(BinaryOperator::Or, a.negate(), b.negate(), boolean)
            }
            ExprKind::Binary(BinaryOperator::Or, a, b) => {
                SymbolicExpression::binary(BinaryOperator::And, a.negate(), b.negate(), boolean)
            }
            ExprKind::Binary(op, a, b) => match op.negate() {
                Some(neg) => SymbolicExpression::binary(neg, (**a).clone(), (**b).clone(), self.types.clone()),
                None => SymbolicExpression::unary(UnaryOperator::Not, self.clone(), boolean),
            },
            _ => SymbolicExpression::unary(UnaryOperator::Not, self.clone(), boolean),
        }
    }
}

impl fmt::Display for SymbolicExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Constant(c) => write!(f, "{}", c),
            ExprKind::Identifier(id) => write!(f, "{}", id),
            ExprKind::HeapAllocation { site } => write!(f, "new {}", site),
            ExprKind::HeapReference(a) => write!(f, "&({})", a),
            ExprKind::HeapDereference(a) => write!(f, "*({})", a),
            ExprKind::Unary(op, a) => write!(f, "{}({})", op, a),
            ExprKind::Binary(op, a, b) => write!(f, "{} {} {}", a, op, b),
            ExprKind::Ternary(op, a, b, c) => write!(f, "{}({}, {}, {})", op, a, b, c),
            ExprKind::PushScope(t, a) => write!(f, "push[{}]({})", t, a),
            ExprKind::PopScope(t, a) => write!(f, "pop[{}]({})", t, a),
            ExprKind::Skip => write!(f, "skip"),
        }
    }
}

/// Set of symbolic expressions, joined by union.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpressionSet(BTreeSet<SymbolicExpression>);

impl ExpressionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(expr: SymbolicExpression) -> Self {
        let mut set = Self::new();
        set.insert(expr);
        set
    }

    pub fn insert(&mut self, expr: SymbolicExpression) {
        self.0.insert(expr);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SymbolicExpression> {
        self.0.iter()
    }

    pub fn contains(&self, expr: &SymbolicExpression) -> bool {
        self.0.contains(expr)
    }

    pub fn is_subset(&self, other: &ExpressionSet) -> bool {
        self.0.is_subset(&other.0)
    }

    pub fn union(&self, other: &ExpressionSet) -> ExpressionSet {
        ExpressionSet(self.0.union(&other.0).cloned().collect())
    }
}

impl FromIterator<SymbolicExpression> for ExpressionSet {
    fn from_iter<I: IntoIterator<Item = SymbolicExpression>>(iter: I) -> Self {
        ExpressionSet(iter.into_iter().collect())
    }
}

impl IntoIterator for ExpressionSet {
    type Item = SymbolicExpression;
    type IntoIter = std::collections::btree_set::IntoIter<SymbolicExpression>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for ExpressionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", e)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_scope_round_trip() {
        let token = ScopeToken::new("main@n2");
        let x = Identifier::variable("x");
        let loc = Identifier::heap_location("A", false);

        let pushed = x.push_scope(&token);
        assert_eq!(pushed.to_string(), "x@main@n2");
        assert_eq!(loc.push_scope(&token), loc);
        assert_eq!(pushed.pop_scope(&token), Some(x.clone()));
        assert_eq!(x.pop_scope(&token), None);
    }

    #[test]
    fn test_resolve_scopes() {
        let token = ScopeToken::new("f@n0");
        let sum = SymbolicExpression::binary(
            BinaryOperator::Add,
            SymbolicExpression::variable("a"),
            SymbolicExpression::constant(Constant::Int(1)),
            TypeSet::Top,
        );
        let scoped = SymbolicExpression::new(ExprKind::PushScope(token.clone(), Box::new(sum)), TypeSet::Top);
        assert_eq!(scoped.resolve_scopes().to_string(), "a@f@n0 + 1");

        let back = SymbolicExpression::new(ExprKind::PopScope(token, Box::new(scoped)), TypeSet::Top);
        assert_eq!(back.resolve_scopes().to_string(), "a + 1");
    }

    #[test]
    fn test_negate_comparisons() {
        let lt = SymbolicExpression::binary(
            BinaryOperator::Lt,
            SymbolicExpression::variable("i"),
            SymbolicExpression::constant(Constant::Int(10)),
            TypeSet::single(Type::Boolean),
        );
        assert_eq!(lt.negate().to_string(), "i >= 10");
        assert_eq!(lt.negate().negate(), lt);

        let both = SymbolicExpression::binary(BinaryOperator::And, lt.clone(), lt.clone(), TypeSet::Top);
        assert_eq!(both.negate().to_string(), "i >= 10 || i >= 10");

        let flag = SymbolicExpression::variable("b");
        assert_eq!(flag.negate().to_string(), "!(b)");
        assert_eq!(flag.negate().negate(), flag);
    }

    #[test]
    fn test_result_types() {
        let int = TypeSet::single(Type::Integer);
        let float = TypeSet::single(Type::Float);
        assert_eq!(BinaryOperator::Mul.result_types(&int, &int), int);
        assert_eq!(
            BinaryOperator::Add.result_types(&int, &float),
            TypeSet::from_types(&[Type::Integer, Type::Float])
        );
        assert_eq!(BinaryOperator::Lt.result_types(&int, &TypeSet::Top), TypeSet::single(Type::Boolean));
        assert_eq!(
            BinaryOperator::Mul.result_types(&TypeSet::single(Type::String), &int),
            TypeSet::Bottom
        );
        assert!(!SymbolicExpression::variable("x").mentions_heap());
    }
}
