//! Monolithic heap: the whole memory is a single weak location.

use std::fmt;

use super::{rewrite_expression, HeapDomain, HeapRewriter, HeapSemantics};
use crate::error::SemanticError;
use crate::lattice::Lattice;
use crate::symbolic::{ExprKind, ExpressionSet, Identifier, IdentifierKind, ScopeToken, SymbolicExpression};
use crate::types::{Type, TypeSet};

/// Name of the single location of the monolithic heap.
pub const HEAP_LOCATION: &str = "heap";

/// Every memory access reads or writes the same weak location, so no aliasing is ever lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonolithicHeap {
    Bottom,
    Top,
}

impl MonolithicHeap {
    pub fn location() -> Identifier {
        Identifier::heap_location(HEAP_LOCATION, true)
    }
}

struct MonolithicRewriter;

impl MonolithicRewriter {
    fn location_expr(types: &TypeSet) -> SymbolicExpression {
        SymbolicExpression::identifier(MonolithicHeap::location(), types.clone())
    }
}

impl HeapRewriter for MonolithicRewriter {
    fn rewrite_leaf(&mut self, expr: &SymbolicExpression) -> Result<Vec<SymbolicExpression>, SemanticError> {
        match &expr.kind {
            ExprKind::Identifier(_) => Ok(vec![expr.clone()]),
            ExprKind::HeapAllocation { .. } => Ok(vec![Self::location_expr(&expr.types)]),
            ExprKind::HeapReference(inner) => {
                let mut result = Vec::new();
                for loc in rewrite_expression(self, inner)? {
                    match loc.as_identifier() {
                        Some(id) if id.is_heap_location() => result.push(SymbolicExpression::identifier(
                            Identifier::pointer_to(id),
                            TypeSet::single(Type::Pointer),
                        )),
                        _ => return Err(SemanticError::UnsupportedHeapExpression(expr.to_string())),
                    }
                }
                Ok(result)
            }
            ExprKind::HeapDereference(inner) => {
                let mut result = Vec::new();
                for target in rewrite_expression(self, inner)? {
                    match &target.kind {
                        // Dereferencing a literal never yields a location.
                        ExprKind::Constant(_) => {}
                        ExprKind::Identifier(id) if id.kind == IdentifierKind::MemoryPointer || id.is_variable() => {
                            result.push(Self::location_expr(&expr.types));
                        }
                        _ => return Err(SemanticError::UnsupportedHeapExpression(expr.to_string())),
                    }
                }
                result.dedup();
                Ok(result)
            }
            _ => Ok(vec![expr.clone()]),
        }
    }
}

impl Lattice for MonolithicHeap {
    fn bottom() -> Self {
        MonolithicHeap::Bottom
    }

    fn top() -> Self {
        MonolithicHeap::Top
    }

    fn is_bottom(&self) -> bool {
        matches!(self, MonolithicHeap::Bottom)
    }

    fn is_top(&self) -> bool {
        matches!(self, MonolithicHeap::Top)
    }

    fn leq(&self, other: &Self) -> bool {
        self.is_bottom() || other.is_top()
    }

    fn lub(&self, other: &Self) -> Self {
        if self.is_top() || other.is_top() {
            MonolithicHeap::Top
        } else {
            MonolithicHeap::Bottom
        }
    }

    fn widening(&self, other: &Self) -> Self {
        self.lub(other)
    }

    fn glb(&self, other: &Self) -> Self {
        if self.is_bottom() || other.is_bottom() {
            MonolithicHeap::Bottom
        } else {
            MonolithicHeap::Top
        }
    }
}

impl HeapDomain for MonolithicHeap {
    fn rewrite(&self, expr: &SymbolicExpression) -> Result<ExpressionSet, SemanticError> {
        if self.is_bottom() {
            return Ok(ExpressionSet::new());
        }
        Ok(rewrite_expression(&mut MonolithicRewriter, expr)?.into_iter().collect())
    }

    fn small_step_semantics(&self, expr: &SymbolicExpression) -> Result<HeapSemantics<Self>, SemanticError> {
        let rewritten = self.rewrite(expr)?;
        let state = if rewritten.is_empty() { MonolithicHeap::Bottom } else { *self };
        Ok(HeapSemantics {
            state,
            rewritten,
            substitution: Vec::new(),
        })
    }

    fn assign(&self, _id: &Identifier, _expr: &SymbolicExpression) -> Result<Self, SemanticError> {
        Ok(*self)
    }

    fn forget_identifier(&self, _id: &Identifier) -> Self {
        *self
    }

    fn forget_identifiers_if(&self, _pred: &dyn Fn(&Identifier) -> bool) -> Self {
        *self
    }

    fn push_scope(&self, _token: &ScopeToken) -> Self {
        *self
    }

    fn pop_scope(&self, _token: &ScopeToken) -> Self {
        *self
    }

    fn restore_frame(&self, caller: &Self) -> Self {
        self.glb(caller)
    }
}

impl fmt::Display for MonolithicHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonolithicHeap::Bottom => write!(f, "⊥"),
            MonolithicHeap::Top => write!(f, "monolith"),
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::symbolic::{BinaryOperator, Constant};

    fn alloc(site: &str) -> SymbolicExpression {
        SymbolicExpression::new(ExprKind::HeapAllocation { site: site.into() }, TypeSet::single(Type::Object))
    }

    fn deref(inner: SymbolicExpression) -> SymbolicExpression {
        SymbolicExpression::new(ExprKind::HeapDereference(Box::new(inner)), TypeSet::Top)
    }

    #[test]
    fn test_every_location_is_the_heap() {
        let heap = MonolithicHeap::Top;
        let reference = SymbolicExpression::new(ExprKind::HeapReference(Box::new(alloc("A"))), TypeSet::Top);
        let rewritten = heap.rewrite(&reference).unwrap();
        assert_eq!(rewritten.iter().map(|e| e.to_string()).collect::<Vec<_>>(), vec!["ref$heap"]);

        let read = SymbolicExpression::binary(
            BinaryOperator::Add,
            deref(SymbolicExpression::variable("p")),
            SymbolicExpression::constant(Constant::Int(1)),
            TypeSet::Top,
        );
        let rewritten = heap.rewrite(&read).unwrap();
        assert_eq!(rewritten.iter().map(|e| e.to_string()).collect::<Vec<_>>(), vec!["heap[w]:heap + 1"]);
    }

    #[test]
    fn test_malformed_dereference_is_bottom() {
        let heap = MonolithicHeap::Top;
        let bad = deref(SymbolicExpression::constant(Constant::Int(3)));
        let sem = heap.small_step_semantics(&bad).unwrap();
        assert!(sem.state.is_bottom());
        assert!(sem.rewritten.is_empty());
    }

    #[test]
    fn test_unsupported_reference() {
        let heap = MonolithicHeap::Top;
        let bad = SymbolicExpression::new(
            ExprKind::HeapReference(Box::new(SymbolicExpression::variable("x"))),
            TypeSet::Top,
        );
        assert!(matches!(heap.rewrite(&bad), Err(SemanticError::UnsupportedHeapExpression(_))));
    }
}
