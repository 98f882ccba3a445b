//! Heap domains: memory identity and aliasing.
//!
//! A [`HeapDomain`] turns expressions that access memory into heap-free expressions over
//! [`Identifier`]s, so that value domains never reason about memory layout. Besides the rewritten
//! expressions, the heap may report [`HeapReplacement`]s: identifiers whose values must be moved or
//! joined in the value domain because the heap abstraction changed (for example when an allocation
//! site starts to summarize several objects).

use std::collections::BTreeSet;
use std::fmt;

use crate::error::SemanticError;
use crate::lattice::Lattice;
use crate::symbolic::{ExprKind, ExpressionSet, Identifier, ScopeToken, SymbolicExpression};

pub mod monolithic;
pub mod point_based;

pub use monolithic::MonolithicHeap;
pub use point_based::{LocationSet, PointBasedHeap};

/// Substitution induced by a heap update: every target receives the join of the sources' values,
/// and sources that are not targets are forgotten.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeapReplacement {
    sources: BTreeSet<Identifier>,
    targets: BTreeSet<Identifier>,
}

impl HeapReplacement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_source(&mut self, id: Identifier) {
        self.sources.insert(id);
    }

    pub fn add_target(&mut self, id: Identifier) {
        self.targets.insert(id);
    }

    pub fn sources(&self) -> &BTreeSet<Identifier> {
        &self.sources
    }

    pub fn targets(&self) -> &BTreeSet<Identifier> {
        &self.targets
    }

    pub fn ids_to_forget(&self) -> impl Iterator<Item = &Identifier> {
        self.sources.difference(&self.targets)
    }
}

impl fmt::Display for HeapReplacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |ids: &BTreeSet<Identifier>| ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(", ");
        write!(f, "{{{}}} -> {{{}}}", join(&self.sources), join(&self.targets))
    }
}

/// Outcome of the small-step semantics of a heap domain.
#[derive(Debug, Clone)]
pub struct HeapSemantics<H> {
    pub state: H,
    /// Heap-free expressions equivalent to the evaluated one. Empty when the expression is malformed.
    pub rewritten: ExpressionSet,
    pub substitution: Vec<HeapReplacement>,
}

pub trait HeapDomain: Lattice + fmt::Display {
    /// Heap-free expressions equivalent to `expr`, without updating the heap.
    ///
    /// An empty set means that the expression cannot evaluate (for instance, dereferencing a
    /// constant).
    fn rewrite(&self, expr: &SymbolicExpression) -> Result<ExpressionSet, SemanticError>;

    /// Evaluate `expr`, updating the heap (allocations) and rewriting it.
    ///
    /// Malformed expressions yield a bottom heap, never an error.
    fn small_step_semantics(&self, expr: &SymbolicExpression) -> Result<HeapSemantics<Self>, SemanticError>;

    /// Record that `id` now holds the (heap-free) value `expr`.
    fn assign(&self, id: &Identifier, expr: &SymbolicExpression) -> Result<Self, SemanticError>;

    fn assume(&self, expr: &SymbolicExpression) -> Result<Self, SemanticError> {
        let _ = expr;
        Ok(self.clone())
    }

    fn forget_identifier(&self, id: &Identifier) -> Self;

    fn forget_identifiers_if(&self, pred: &dyn Fn(&Identifier) -> bool) -> Self;

    fn push_scope(&self, token: &ScopeToken) -> Self;

    fn pop_scope(&self, token: &ScopeToken) -> Self;

    /// Heap of `self` (the callee) with the stack-related knowledge of `caller`.
    fn restore_frame(&self, caller: &Self) -> Self;
}

/// Leaf rewriting of a heap domain, lifted to whole expressions by [`rewrite_expression`].
pub(crate) trait HeapRewriter {
    /// Rewrite identifiers and heap-shaped expressions. Returning an empty vector marks the
    /// expression as malformed.
    fn rewrite_leaf(&mut self, expr: &SymbolicExpression) -> Result<Vec<SymbolicExpression>, SemanticError>;
}

/// Rewrite every heap-shaped sub-expression of `expr`, combining alternatives of sub-expressions.
pub(crate) fn rewrite_expression<R: HeapRewriter>(
    rewriter: &mut R,
    expr: &SymbolicExpression,
) -> Result<Vec<SymbolicExpression>, SemanticError> {
    let types = &expr.types;
    Ok(match &expr.kind {
        ExprKind::Constant(_) | ExprKind::Skip => vec![expr.clone()],
        ExprKind::Identifier(_)
        | ExprKind::HeapAllocation { .. }
        | ExprKind::HeapReference(_)
        | ExprKind::HeapDereference(_) => rewriter.rewrite_leaf(expr)?,
        ExprKind::PushScope(..) | ExprKind::PopScope(..) => rewrite_expression(rewriter, &expr.resolve_scopes())?,
        ExprKind::Unary(op, arg) => rewrite_expression(rewriter, arg)?
            .into_iter()
            .map(|a| SymbolicExpression::new(ExprKind::Unary(*op, Box::new(a)), types.clone()))
            .collect(),
        ExprKind::Binary(op, left, right) => {
            let lefts = rewrite_expression(rewriter, left)?;
            let rights = rewrite_expression(rewriter, right)?;
            let mut result = Vec::with_capacity(lefts.len() * rights.len());
            for l in &lefts {
                for r in &rights {
                    let kind = ExprKind::Binary(*op, Box::new(l.clone()), Box::new(r.clone()));
                    result.push(SymbolicExpression::new(kind, types.clone()));
                }
            }
            result
        }
        ExprKind::Ternary(op, a, b, c) => {
            let firsts = rewrite_expression(rewriter, a)?;
            let seconds = rewrite_expression(rewriter, b)?;
            let thirds = rewrite_expression(rewriter, c)?;
            let mut result = Vec::new();
            for x in &firsts {
                for y in &seconds {
                    for z in &thirds {
                        let kind = ExprKind::Ternary(*op, Box::new(x.clone()), Box::new(y.clone()), Box::new(z.clone()));
                        result.push(SymbolicExpression::new(kind, types.clone()));
                    }
                }
            }
            result
        }
    })
}
