//! Abstract states: a heap domain and a value domain behind one set of transfer functions.
//!
//! [`AbstractState`] is the product `{execution, heap, value}` the fixpoint engine stores at every
//! program point. The heap domain rewrites memory-shaped expressions into heap-free ones first, then
//! the value domain evaluates the rewritten expressions, after joining the values of identifiers the
//! heap substituted. [`AnalysisState`] pairs a state with the symbolic expressions computed by the
//! last evaluated expression.

use std::fmt;

use crate::error::SemanticError;
use crate::heap::{HeapDomain, HeapReplacement};
use crate::lattice::{Lattice, Satisfiability};
use crate::symbolic::{ExprKind, ExpressionSet, Identifier, ScopeToken, SymbolicExpression};

/// Value domain over heap-free expressions.
pub trait ValueDomain: Lattice + fmt::Display {
    /// Bind `id` to the value of `expr`.
    fn assign(&self, id: &Identifier, expr: &SymbolicExpression) -> Result<Self, SemanticError>;

    /// Evaluate `expr` for its effects. Bottom if `expr` cannot evaluate.
    fn small_step_semantics(&self, expr: &SymbolicExpression) -> Result<Self, SemanticError>;

    /// Refine the domain assuming `expr` holds.
    fn assume(&self, expr: &SymbolicExpression) -> Result<Self, SemanticError>;

    fn satisfies(&self, expr: &SymbolicExpression) -> Result<Satisfiability, SemanticError>;

    fn forget_identifier(&self, id: &Identifier) -> Self;

    fn forget_identifiers_if(&self, pred: &dyn Fn(&Identifier) -> bool) -> Self;

    fn push_scope(&self, token: &ScopeToken) -> Self;

    fn pop_scope(&self, token: &ScopeToken) -> Self;

    fn apply_replacement(&self, replacement: &HeapReplacement) -> Result<Self, SemanticError>;

    /// Knowledge of `self` (a callee exit) on non-stack identifiers, with the variables of `caller`.
    fn restore_frame(&self, caller: &Self) -> Self;
}

/// Whether a program point is reachable at all, independently of the sub-domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExecutionState {
    Bottom,
    Regular,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AbstractState<H, V> {
    execution: ExecutionState,
    heap: H,
    value: V,
}

impl<H: HeapDomain, V: ValueDomain> AbstractState<H, V> {
    /// Reachable state with the given components; bottom as soon as one of them is.
    pub fn new(heap: H, value: V) -> Self {
        if heap.is_bottom() || value.is_bottom() {
            return Self::bottom();
        }
        AbstractState {
            execution: ExecutionState::Regular,
            heap,
            value,
        }
    }

    pub fn execution(&self) -> ExecutionState {
        self.execution
    }

    pub fn heap(&self) -> &H {
        &self.heap
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    /// Evaluate `expr`, returning the new state and the heap-free expressions it computes.
    pub fn small_step_semantics(&self, expr: &SymbolicExpression) -> Result<(Self, ExpressionSet), SemanticError> {
        if self.is_bottom() {
            return Ok((self.clone(), ExpressionSet::new()));
        }
        let sem = self.heap.small_step_semantics(expr)?;
        if sem.rewritten.is_empty() || sem.state.is_bottom() {
            return Ok((Self::bottom(), ExpressionSet::new()));
        }
        let mut value = self.value.clone();
        for replacement in &sem.substitution {
            log::trace!("Applying heap replacement {}", replacement);
            value = value.apply_replacement(replacement)?;
        }
        let mut result = V::bottom();
        for rewritten in sem.rewritten.iter() {
            result = result.lub(&value.small_step_semantics(rewritten)?);
        }
        Ok((Self::new(sem.state, result), sem.rewritten))
    }

    /// Heap-free identifiers denoted by an assignment target.
    fn targets(&self, target: &SymbolicExpression) -> Result<Vec<Identifier>, SemanticError> {
        if let Some(id) = target.as_identifier() {
            return Ok(vec![id.clone()]);
        }
        let mut ids = Vec::new();
        for rewritten in self.heap.rewrite(target)?.iter() {
            match rewritten.as_identifier() {
                Some(id) => ids.push(id.clone()),
                None => return Err(SemanticError::InvalidAssignmentTarget(target.to_string())),
            }
        }
        Ok(ids)
    }

    /// Bind `target` to `expr`.
    ///
    /// When the target denotes several identifiers, or a weak location, the update is weak: the
    /// result is joined with the current state.
    pub fn assign(&self, target: &SymbolicExpression, expr: &SymbolicExpression) -> Result<Self, SemanticError> {
        if self.is_bottom() {
            return Ok(self.clone());
        }
        let targets = self.targets(target)?;
        let values = self.heap.rewrite(expr)?;
        let mut result = Self::bottom();
        for id in &targets {
            for value in values.iter() {
                let heap = self.heap.assign(id, value)?;
                let assigned = self.value.assign(id, value)?;
                result = result.lub(&Self::new(heap, assigned));
            }
        }
        if targets.len() > 1 || targets.iter().any(Identifier::is_weak) {
            result = result.lub(self);
        }
        Ok(result)
    }

    /// Refine the state assuming `expr` holds. Bottom if `expr` cannot hold.
    pub fn assume(&self, expr: &SymbolicExpression) -> Result<Self, SemanticError> {
        if self.is_bottom() {
            return Ok(self.clone());
        }
        match self.satisfies(expr)? {
            Satisfiability::Bottom | Satisfiability::NotSatisfied => return Ok(Self::bottom()),
            Satisfiability::Satisfied | Satisfiability::Unknown => {}
        }
        let mut result = Self::bottom();
        for rewritten in self.heap.rewrite(expr)?.iter() {
            let heap = self.heap.assume(rewritten)?;
            let value = self.value.assume(rewritten)?;
            result = result.lub(&Self::new(heap, value));
        }
        Ok(result)
    }

    pub fn satisfies(&self, expr: &SymbolicExpression) -> Result<Satisfiability, SemanticError> {
        if self.is_bottom() {
            return Ok(Satisfiability::Bottom);
        }
        let mut result = Satisfiability::Bottom;
        for rewritten in self.heap.rewrite(expr)?.iter() {
            result = result.lub(&self.value.satisfies(rewritten)?);
        }
        Ok(result)
    }

    fn map(&self, heap: impl FnOnce(&H) -> H, value: impl FnOnce(&V) -> V) -> Self {
        if self.is_bottom() {
            return self.clone();
        }
        Self::new(heap(&self.heap), value(&self.value))
    }

    pub fn forget_identifier(&self, id: &Identifier) -> Self {
        self.map(|h| h.forget_identifier(id), |v| v.forget_identifier(id))
    }

    pub fn forget_identifiers_if(&self, pred: impl Fn(&Identifier) -> bool) -> Self {
        self.map(|h| h.forget_identifiers_if(&pred), |v| v.forget_identifiers_if(&pred))
    }

    pub fn push_scope(&self, token: &ScopeToken) -> Self {
        self.map(|h| h.push_scope(token), |v| v.push_scope(token))
    }

    pub fn pop_scope(&self, token: &ScopeToken) -> Self {
        self.map(|h| h.pop_scope(token), |v| v.pop_scope(token))
    }

    /// Callee exit state `self` seen from `caller`: caller variables, callee heap and return slot.
    pub fn restore_frame(&self, caller: &Self) -> Self {
        if self.is_bottom() || caller.is_bottom() {
            return Self::bottom();
        }
        Self::new(self.heap.restore_frame(&caller.heap), self.value.restore_frame(&caller.value))
    }

    /// Lose every piece of memory knowledge, as after a call to unknown code.
    pub fn havoc_heap(&self) -> Self {
        if self.is_bottom() {
            return self.clone();
        }
        Self::new(H::top(), self.value.forget_identifiers_if(&|id| !id.is_variable()))
    }
}

impl<H: HeapDomain, V: ValueDomain> Lattice for AbstractState<H, V> {
    fn bottom() -> Self {
        AbstractState {
            execution: ExecutionState::Bottom,
            heap: H::bottom(),
            value: V::bottom(),
        }
    }

    fn top() -> Self {
        AbstractState {
            execution: ExecutionState::Regular,
            heap: H::top(),
            value: V::top(),
        }
    }

    fn is_bottom(&self) -> bool {
        self.execution == ExecutionState::Bottom
    }

    fn is_top(&self) -> bool {
        !self.is_bottom() && self.heap.is_top() && self.value.is_top()
    }

    fn leq(&self, other: &Self) -> bool {
        if self.is_bottom() {
            return true;
        }
        if other.is_bottom() {
            return false;
        }
        self.heap.leq(&other.heap) && self.value.leq(&other.value)
    }

    fn lub(&self, other: &Self) -> Self {
        if self.is_bottom() {
            return other.clone();
        }
        if other.is_bottom() {
            return self.clone();
        }
        Self::new(self.heap.lub(&other.heap), self.value.lub(&other.value))
    }

    fn widening(&self, other: &Self) -> Self {
        if self.is_bottom() {
            return other.clone();
        }
        if other.is_bottom() {
            return self.clone();
        }
        Self::new(self.heap.widening(&other.heap), self.value.widening(&other.value))
    }

    fn glb(&self, other: &Self) -> Self {
        if self.is_bottom() || other.is_bottom() {
            return Self::bottom();
        }
        Self::new(self.heap.glb(&other.heap), self.value.glb(&other.value))
    }
}

impl<H: fmt::Display, V: fmt::Display> fmt::Display for AbstractState<H, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.execution {
            ExecutionState::Bottom => write!(f, "⊥"),
            ExecutionState::Regular => write!(f, "heap: {}, value: {}", self.heap, self.value),
        }
    }
}

/// An abstract state together with the expressions computed to reach it.
///
/// Ordered by the state only; the computed expressions of a join are the union of both sides.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisState<H, V> {
    pub state: AbstractState<H, V>,
    pub computed: ExpressionSet,
}

impl<H: HeapDomain, V: ValueDomain> AnalysisState<H, V> {
    pub fn new(state: AbstractState<H, V>, computed: ExpressionSet) -> Self {
        AnalysisState { state, computed }
    }

    /// The same state, with nothing computed.
    pub fn from_state(state: AbstractState<H, V>) -> Self {
        Self::new(state, ExpressionSet::new())
    }

    pub fn small_step_semantics(&self, expr: &SymbolicExpression) -> Result<Self, SemanticError> {
        let (state, computed) = self.state.small_step_semantics(expr)?;
        Ok(Self::new(state, computed))
    }

    /// Assign `expr` to `target`; the target is the computed expression.
    pub fn assign(&self, target: &SymbolicExpression, expr: &SymbolicExpression) -> Result<Self, SemanticError> {
        let state = self.state.assign(target, expr)?;
        Ok(Self::new(state, ExpressionSet::single(target.clone())))
    }

    pub fn assume(&self, expr: &SymbolicExpression) -> Result<Self, SemanticError> {
        Ok(Self::new(self.state.assume(expr)?, self.computed.clone()))
    }

    /// Whether the expressions computed last are the skip expression only.
    pub fn computed_skip(&self) -> bool {
        self.computed.len() == 1 && self.computed.iter().all(|e| matches!(e.kind, ExprKind::Skip))
    }
}

impl<H: HeapDomain, V: ValueDomain> Lattice for AnalysisState<H, V> {
    fn bottom() -> Self {
        Self::from_state(AbstractState::bottom())
    }

    fn top() -> Self {
        Self::from_state(AbstractState::top())
    }

    fn is_bottom(&self) -> bool {
        self.state.is_bottom()
    }

    fn is_top(&self) -> bool {
        self.state.is_top()
    }

    fn leq(&self, other: &Self) -> bool {
        self.state.leq(&other.state)
    }

    fn lub(&self, other: &Self) -> Self {
        Self::new(self.state.lub(&other.state), self.computed.union(&other.computed))
    }

    fn widening(&self, other: &Self) -> Self {
        Self::new(self.state.widening(&other.state), self.computed.union(&other.computed))
    }

    fn glb(&self, other: &Self) -> Self {
        Self::new(self.state.glb(&other.state), self.computed.union(&other.computed))
    }
}

impl<H: fmt::Display, V: fmt::Display> fmt::Display for AnalysisState<H, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} computed {}", self.state, self.computed)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::domains::Interval;
    use crate::environment::Environment;
    use crate::heap::{MonolithicHeap, PointBasedHeap};
    use crate::lattice::laws::check_lattice_laws;
    use crate::symbolic::{BinaryOperator, Constant};
    use crate::types::{Type, TypeSet};

    type PointState = AbstractState<PointBasedHeap, Environment<Interval>>;
    type MonoState = AbstractState<MonolithicHeap, Environment<Interval>>;

    fn int(n: i64) -> SymbolicExpression {
        SymbolicExpression::constant(Constant::Int(n))
    }

    fn var(name: &str) -> SymbolicExpression {
        SymbolicExpression::variable(name)
    }

    fn new_object(site: &str) -> SymbolicExpression {
        let alloc = SymbolicExpression::new(ExprKind::HeapAllocation { site: site.into() }, TypeSet::single(Type::Object));
        SymbolicExpression::new(ExprKind::HeapReference(Box::new(alloc)), TypeSet::single(Type::Pointer))
    }

    fn deref(inner: SymbolicExpression) -> SymbolicExpression {
        SymbolicExpression::new(ExprKind::HeapDereference(Box::new(inner)), TypeSet::Top)
    }

    fn interval_of(state: &PointState, id: &Identifier) -> Interval {
        state.value().get(id)
    }

    fn allocate(state: &PointState, target: &str, site: &str) -> PointState {
        let (allocated, computed) = state.small_step_semantics(&new_object(site)).unwrap();
        let mut result = PointState::bottom();
        for pointer in computed.iter() {
            result = result.lub(&allocated.assign(&var(target), pointer).unwrap());
        }
        result
    }

    #[test]
    fn test_abstract_state_lattice() {
        let start = MonoState::new(MonolithicHeap::Top, Environment::new());
        let x1 = start.assign(&var("x"), &int(1)).unwrap();
        let x5 = start.assign(&var("x"), &int(5)).unwrap();
        let y2 = start.assign(&var("y"), &int(2)).unwrap();
        check_lattice_laws(&[MonoState::bottom(), MonoState::top(), x1, x5, y2]);
    }

    #[test]
    fn test_bottom_component_makes_state_unreachable() {
        let state = MonoState::new(MonolithicHeap::Top, Environment::bottom());
        assert!(state.is_bottom());
        assert_eq!(state.execution(), ExecutionState::Bottom);
    }

    #[test]
    fn test_store_and_load_through_pointer() {
        let state = allocate(&PointState::new(PointBasedHeap::new(), Environment::new()), "p", "A");
        let state = state.assign(&deref(var("p")), &int(7)).unwrap();

        let strong = Identifier::heap_location("A", false);
        assert_eq!(interval_of(&state, &strong), Interval::constant(7));

        let (loaded, computed) = state.small_step_semantics(&deref(var("p"))).unwrap();
        assert!(!loaded.is_bottom());
        assert_eq!(computed.iter().map(|e| e.to_string()).collect::<Vec<_>>(), vec!["heap[s]:A"]);
    }

    #[test]
    fn test_reallocation_joins_strong_into_weak() {
        let state = allocate(&PointState::new(PointBasedHeap::new(), Environment::new()), "p", "A");
        let state = state.assign(&deref(var("p")), &int(1)).unwrap();
        let state = allocate(&state, "q", "A");

        let weak = Identifier::heap_location("A", true);
        assert_eq!(interval_of(&state, &weak), Interval::constant(1));
        assert!(!state.value().contains(&Identifier::heap_location("A", false)));

        // Stores into a weak location are joined with its previous value.
        let state = state.assign(&deref(var("q")), &int(5)).unwrap();
        assert_eq!(interval_of(&state, &weak), Interval::new(1, 5));
    }

    #[test]
    fn test_assume_refutes_branch() {
        let state = MonoState::new(MonolithicHeap::Top, Environment::new());
        let state = state.assign(&var("x"), &int(3)).unwrap();
        let cond = SymbolicExpression::binary(BinaryOperator::Gt, var("x"), int(5), TypeSet::single(Type::Boolean));
        assert_eq!(state.satisfies(&cond).unwrap(), Satisfiability::NotSatisfied);
        assert!(state.assume(&cond).unwrap().is_bottom());
        assert!(!state.assume(&cond.negate()).unwrap().is_bottom());
    }

    #[test]
    fn test_havoc_heap_keeps_variables() {
        let state = allocate(&PointState::new(PointBasedHeap::new(), Environment::new()), "p", "A");
        let state = state.assign(&deref(var("p")), &int(7)).unwrap();
        let state = state.assign(&var("x"), &int(1)).unwrap();

        let havoc = state.havoc_heap();
        assert!(havoc.heap().is_top());
        assert_eq!(interval_of(&havoc, &Identifier::variable("x")), Interval::constant(1));
        assert!(!havoc.value().contains(&Identifier::heap_location("A", false)));
    }
}
