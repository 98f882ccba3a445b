//! Non-relational environments: pointwise lifting of a value lattice to identifiers.
//!
//! An [`Environment<L>`] maps [`Identifier`]s to abstract values of `L`. Identifiers that are not in
//! the map are unconstrained (`⊤`), so the map only stores informative values. The map is shared
//! behind an [`Arc`] and copied on write: updates are functional, and a state queued in a working set
//! never observes later updates of "the same" state.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::SemanticError;
use crate::heap::HeapReplacement;
use crate::lattice::{Lattice, Satisfiability};
use crate::state::ValueDomain;
use crate::symbolic::{
    BinaryOperator, Constant, ExprKind, Identifier, IdentifierKind, ScopeToken, SymbolicExpression, TernaryOperator, UnaryOperator,
};
use crate::types::TypeSet;

/// Abstract value of a single identifier, evaluated without looking at other identifiers.
///
/// Every evaluation receives the runtime types of the evaluated expression. The environment
/// guarantees that operators are never evaluated on bottom operands.
pub trait NonRelationalValue: Lattice + fmt::Display {
    fn eval_constant(constant: &Constant, types: &TypeSet) -> Self;

    /// Value of a pointer to a memory location.
    fn eval_pointer(types: &TypeSet) -> Self {
        let _ = types;
        Self::top()
    }

    fn eval_unary(op: UnaryOperator, arg: &Self, types: &TypeSet) -> Self;

    fn eval_binary(op: BinaryOperator, left: &Self, right: &Self, types: &TypeSet) -> Self;

    fn eval_ternary(op: TernaryOperator, first: &Self, second: &Self, third: &Self, types: &TypeSet) -> Self {
        let _ = (op, first, second, third, types);
        Self::top()
    }

    /// Does `left op right` hold?
    fn satisfies_binary(op: BinaryOperator, left: &Self, right: &Self) -> Satisfiability {
        let _ = (op, left, right);
        Satisfiability::Unknown
    }

    /// Refine both operands assuming `left op right` holds.
    fn refine_binary(op: BinaryOperator, left: &Self, right: &Self) -> (Self, Self) {
        let _ = op;
        (left.clone(), right.clone())
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Environment<L> {
    map: Arc<BTreeMap<Identifier, L>>,
    is_bottom: bool,
}

impl<L: Lattice> Environment<L> {
    pub fn new() -> Self {
        Environment {
            map: Arc::new(BTreeMap::new()),
            is_bottom: false,
        }
    }

    /// Value of an identifier; `⊤` when unconstrained, `⊥` in the bottom environment.
    pub fn get(&self, id: &Identifier) -> L {
        if self.is_bottom {
            return L::bottom();
        }
        self.map.get(id).cloned().unwrap_or_else(L::top)
    }

    /// Functional update. Setting `⊥` makes the whole environment bottom; setting `⊤` removes the key.
    pub fn set(&self, id: Identifier, value: L) -> Self {
        if self.is_bottom {
            return self.clone();
        }
        if value.is_bottom() {
            return Self::bottom();
        }
        let mut result = self.clone();
        if value.is_top() {
            if result.map.contains_key(&id) {
                Arc::make_mut(&mut result.map).remove(&id);
            }
        } else {
            Arc::make_mut(&mut result.map).insert(id, value);
        }
        result
    }

    pub fn contains(&self, id: &Identifier) -> bool {
        self.map.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Identifier, &L)> {
        self.map.iter()
    }

    pub fn forget(&self, id: &Identifier) -> Self {
        self.forget_if(|other| other == id)
    }

    pub fn forget_if(&self, pred: impl Fn(&Identifier) -> bool) -> Self {
        if self.is_bottom || !self.map.keys().any(&pred) {
            return self.clone();
        }
        let map = self
            .map
            .iter()
            .filter(|(id, _)| !pred(id))
            .map(|(id, v)| (id.clone(), v.clone()))
            .collect();
        Environment {
            map: Arc::new(map),
            is_bottom: false,
        }
    }

    /// Rename keys; entries mapped to `None` are dropped, colliding entries are joined.
    fn rename(&self, f: impl Fn(&Identifier) -> Option<Identifier>) -> Self {
        if self.is_bottom {
            return self.clone();
        }
        let mut map: BTreeMap<Identifier, L> = BTreeMap::new();
        for (id, value) in self.map.iter() {
            if let Some(renamed) = f(id) {
                let joined = match map.get(&renamed) {
                    Some(prev) => prev.lub(value),
                    None => value.clone(),
                };
                map.insert(renamed, joined);
            }
        }
        Environment {
            map: Arc::new(map),
            is_bottom: false,
        }
    }

    pub fn push_scope(&self, token: &ScopeToken) -> Self {
        self.rename(|id| Some(id.push_scope(token)))
    }

    /// Bring back identifiers scoped with `token`; unscoped variables are dropped.
    pub fn pop_scope(&self, token: &ScopeToken) -> Self {
        self.rename(|id| id.pop_scope(token))
    }

    /// Variables of `caller` together with the heap knowledge and return slot of `self`.
    pub fn restore_frame(&self, caller: &Self) -> Self {
        if self.is_bottom || caller.is_bottom {
            return Self::bottom();
        }
        let mut map: BTreeMap<Identifier, L> = caller
            .map
            .iter()
            .filter(|(id, _)| id.is_variable())
            .map(|(id, v)| (id.clone(), v.clone()))
            .collect();
        map.remove(&Identifier::return_slot());
        for (id, value) in self.map.iter() {
            if !id.is_variable() || id.is_return_slot() {
                map.insert(id.clone(), value.clone());
            }
        }
        Environment {
            map: Arc::new(map),
            is_bottom: false,
        }
    }

    /// Join the values of the sources into the targets, then forget sources that are not targets.
    pub fn apply_replacement(&self, replacement: &HeapReplacement) -> Self {
        if self.is_bottom {
            return self.clone();
        }
        let value = replacement
            .sources()
            .iter()
            .map(|id| self.get(id))
            .fold(L::bottom(), |acc, v| acc.lub(&v));
        let mut result = self.forget_if(|id| replacement.ids_to_forget().any(|f| f == id));
        if value.is_bottom() {
            return result;
        }
        for target in replacement.targets() {
            let joined = if self.contains(target) { self.get(target).lub(&value) } else { value.clone() };
            result = result.set(target.clone(), joined);
        }
        result
    }

    /// Combine two non-bottom environments key by key.
    ///
    /// Keys missing on one side are `⊤` there, and `op(v, ⊤)` is `⊤` for join-like operators, so
    /// only common keys are kept.
    fn combine_common(&self, other: &Self, op: impl Fn(&L, &L) -> L) -> Self {
        let mut map = BTreeMap::new();
        for (id, v1) in self.map.iter() {
            if let Some(v2) = other.map.get(id) {
                let v = op(v1, v2);
                if !v.is_top() {
                    map.insert(id.clone(), v);
                }
            }
        }
        Environment {
            map: Arc::new(map),
            is_bottom: false,
        }
    }
}

impl<L: Lattice> Default for Environment<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: Lattice> Lattice for Environment<L> {
    fn bottom() -> Self {
        Environment {
            map: Arc::new(BTreeMap::new()),
            is_bottom: true,
        }
    }

    fn top() -> Self {
        Self::new()
    }

    fn is_bottom(&self) -> bool {
        self.is_bottom
    }

    fn is_top(&self) -> bool {
        !self.is_bottom && self.map.is_empty()
    }

    fn leq(&self, other: &Self) -> bool {
        if self.is_bottom {
            return true;
        }
        if other.is_bottom {
            return false;
        }
        if Arc::ptr_eq(&self.map, &other.map) {
            return true;
        }
        other.map.iter().all(|(id, v2)| self.get(id).leq(v2))
    }

    fn lub(&self, other: &Self) -> Self {
        if self.is_bottom {
            return other.clone();
        }
        if other.is_bottom || Arc::ptr_eq(&self.map, &other.map) {
            return self.clone();
        }
        self.combine_common(other, |a, b| a.lub(b))
    }

    fn widening(&self, other: &Self) -> Self {
        if self.is_bottom {
            return other.clone();
        }
        if other.is_bottom {
            return self.clone();
        }
        self.combine_common(other, |a, b| a.widening(b))
    }

    fn glb(&self, other: &Self) -> Self {
        if self.is_bottom || other.is_bottom {
            return Self::bottom();
        }
        let mut result = self.clone();
        for (id, v2) in other.map.iter() {
            result = result.set(id.clone(), self.get(id).glb(v2));
            if result.is_bottom {
                break;
            }
        }
        result
    }
}

impl<L: NonRelationalValue> Environment<L> {
    /// Evaluate a heap-free expression.
    pub fn eval(&self, expr: &SymbolicExpression) -> Result<L, SemanticError> {
        if self.is_bottom {
            return Ok(L::bottom());
        }
        let types = &expr.types;
        Ok(match &expr.kind {
            ExprKind::Constant(c) => L::eval_constant(c, types),
            ExprKind::Identifier(id) if id.kind == IdentifierKind::MemoryPointer => L::eval_pointer(types),
            ExprKind::Identifier(id) => self.get(id),
            ExprKind::HeapAllocation { .. } | ExprKind::HeapReference(_) | ExprKind::HeapDereference(_) => {
                return Err(SemanticError::UnrewrittenHeapExpression(expr.to_string()));
            }
            ExprKind::Unary(op, arg) => {
                let v = self.eval(arg)?;
                if v.is_bottom() {
                    return Ok(L::bottom());
                }
                L::eval_unary(*op, &v, types)
            }
            ExprKind::Binary(op, left, right) => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                if l.is_bottom() || r.is_bottom() {
                    return Ok(L::bottom());
                }
                L::eval_binary(*op, &l, &r, types)
            }
            ExprKind::Ternary(op, a, b, c) => {
                let a = self.eval(a)?;
                let b = self.eval(b)?;
                let c = self.eval(c)?;
                if a.is_bottom() || b.is_bottom() || c.is_bottom() {
                    return Ok(L::bottom());
                }
                L::eval_ternary(*op, &a, &b, &c, types)
            }
            ExprKind::PushScope(..) | ExprKind::PopScope(..) => self.eval(&expr.resolve_scopes())?,
            ExprKind::Skip => L::top(),
        })
    }

    fn satisfies_expr(&self, expr: &SymbolicExpression) -> Result<Satisfiability, SemanticError> {
        if self.is_bottom {
            return Ok(Satisfiability::Bottom);
        }
        Ok(match &expr.kind {
            ExprKind::Constant(Constant::Bool(b)) => Satisfiability::from_bool(*b),
            ExprKind::Unary(UnaryOperator::Not, inner) => self.satisfies_expr(inner)?.negate(),
            ExprKind::Binary(BinaryOperator::And, a, b) => self.satisfies_expr(a)?.and(self.satisfies_expr(b)?),
            ExprKind::Binary(BinaryOperator::Or, a, b) => self.satisfies_expr(a)?.or(self.satisfies_expr(b)?),
            ExprKind::Binary(op, a, b) => {
                let l = self.eval(a)?;
                let r = self.eval(b)?;
                if l.is_bottom() || r.is_bottom() {
                    Satisfiability::Bottom
                } else {
                    L::satisfies_binary(*op, &l, &r)
                }
            }
            ExprKind::PushScope(..) | ExprKind::PopScope(..) => self.satisfies_expr(&expr.resolve_scopes())?,
            _ => {
                if self.eval(expr)?.is_bottom() {
                    Satisfiability::Bottom
                } else {
                    Satisfiability::Unknown
                }
            }
        })
    }

    fn assume_expr(&self, expr: &SymbolicExpression) -> Result<Self, SemanticError> {
        if self.is_bottom {
            return Ok(self.clone());
        }
        match self.satisfies_expr(expr)? {
            Satisfiability::Bottom | Satisfiability::NotSatisfied => return Ok(Self::bottom()),
            Satisfiability::Satisfied => return Ok(self.clone()),
            Satisfiability::Unknown => {}
        }
        match &expr.kind {
            ExprKind::Unary(UnaryOperator::Not, inner) => {
                let negated = inner.negate();
                if negated == *expr {
                    Ok(self.clone())
                } else {
                    self.assume_expr(&negated)
                }
            }
            ExprKind::Binary(BinaryOperator::And, a, b) => self.assume_expr(a)?.assume_expr(b),
            ExprKind::Binary(BinaryOperator::Or, a, b) => Ok(self.assume_expr(a)?.lub(&self.assume_expr(b)?)),
            ExprKind::Binary(op, a, b) => {
                let l = self.eval(a)?;
                let r = self.eval(b)?;
                let (l, r) = L::refine_binary(*op, &l, &r);
                let mut result = self.clone();
                if let Some(id) = a.as_identifier() {
                    result = result.set(id.clone(), result.get(id).glb(&l));
                }
                if let Some(id) = b.as_identifier() {
                    result = result.set(id.clone(), result.get(id).glb(&r));
                }
                Ok(result)
            }
            ExprKind::PushScope(..) | ExprKind::PopScope(..) => self.assume_expr(&expr.resolve_scopes()),
            _ => Ok(self.clone()),
        }
    }
}

impl<L: NonRelationalValue> ValueDomain for Environment<L> {
    fn assign(&self, id: &Identifier, expr: &SymbolicExpression) -> Result<Self, SemanticError> {
        if self.is_bottom {
            return Ok(self.clone());
        }
        let value = self.eval(expr)?;
        Ok(self.set(id.clone(), value))
    }

    fn small_step_semantics(&self, expr: &SymbolicExpression) -> Result<Self, SemanticError> {
        if self.is_bottom || matches!(expr.kind, ExprKind::Skip) {
            return Ok(self.clone());
        }
        if self.eval(expr)?.is_bottom() {
            Ok(Self::bottom())
        } else {
            Ok(self.clone())
        }
    }

    fn assume(&self, expr: &SymbolicExpression) -> Result<Self, SemanticError> {
        self.assume_expr(expr)
    }

    fn satisfies(&self, expr: &SymbolicExpression) -> Result<Satisfiability, SemanticError> {
        self.satisfies_expr(expr)
    }

    fn forget_identifier(&self, id: &Identifier) -> Self {
        self.forget(id)
    }

    fn forget_identifiers_if(&self, pred: &dyn Fn(&Identifier) -> bool) -> Self {
        self.forget_if(pred)
    }

    fn push_scope(&self, token: &ScopeToken) -> Self {
        Environment::push_scope(self, token)
    }

    fn pop_scope(&self, token: &ScopeToken) -> Self {
        Environment::pop_scope(self, token)
    }

    fn apply_replacement(&self, replacement: &HeapReplacement) -> Result<Self, SemanticError> {
        Ok(Environment::apply_replacement(self, replacement))
    }

    fn restore_frame(&self, caller: &Self) -> Self {
        Environment::restore_frame(self, caller)
    }
}

impl<L: fmt::Display> fmt::Display for Environment<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_bottom {
            return write!(f, "⊥");
        }
        write!(f, "{{")?;
        for (i, (id, v)) in self.map.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", id, v)?;
        }
        write!(f, "}}")
    }
}

impl<L: fmt::Debug> fmt::Debug for Environment<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_bottom {
            return write!(f, "⊥");
        }
        f.debug_map().entries(self.map.iter()).finish()
    }
}
