//! Transfer functions: from statements to abstract-state transformations.
//!
//! The [`Evaluator`] compiles the surface [`Expression`]s of a node into [`SymbolicExpression`]s,
//! bottom-up, and feeds them to the abstract state. Every operator first checks the runtime types of
//! its operands: an operand whose types are known and incompatible with the operator prunes that
//! evaluation (its contribution is bottom), while untyped operands always pass. Calls are delegated
//! to a [`CallHandler`].

use crate::error::SemanticError;
use crate::heap::HeapDomain;
use crate::lattice::Lattice;
use crate::program::{CallTarget, ExprId, Expression, ExpressionKind, Node, NodeId, Procedure, ProcedureId, Statement};
use crate::state::{AbstractState, AnalysisState, ValueDomain};
use crate::symbolic::{ExprKind, ExpressionSet, Identifier, OperandKind, ScopeToken, SymbolicExpression};
use crate::types::{Type, TypeRegistry, TypeSet};

/// A call expression, located in its caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    pub caller: ProcedureId,
    pub node: NodeId,
    pub expr: ExprId,
    pub target: CallTarget,
}

impl CallSite {
    /// Token renaming the caller's identifiers while the callee runs.
    pub fn scope_token(&self) -> ScopeToken {
        ScopeToken::new(format!("{}@{}", self.caller, self.node))
    }

    /// Caller variable receiving the value returned by the call.
    pub fn result_identifier(&self) -> Identifier {
        Identifier::variable(format!("call_ret@{}", self.expr))
    }
}

/// Computes the state after a call, given the state after the evaluation of its arguments.
pub trait CallHandler<H, V> {
    fn call(
        &self,
        site: &CallSite,
        state: &AnalysisState<H, V>,
        args: &[ExpressionSet],
    ) -> Result<AnalysisState<H, V>, SemanticError>;
}

/// Handler for code without calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCalls;

impl<H, V> CallHandler<H, V> for NoCalls {
    fn call(
        &self,
        site: &CallSite,
        _state: &AnalysisState<H, V>,
        _args: &[ExpressionSet],
    ) -> Result<AnalysisState<H, V>, SemanticError> {
        Err(SemanticError::NoCallHandler(site.target.to_string()))
    }
}

/// Entry state of a callee: formals bound to the actual arguments, caller identifiers dropped.
pub fn bind_call<H: HeapDomain, V: ValueDomain>(
    caller: &AbstractState<H, V>,
    token: &ScopeToken,
    formals: &[String],
    args: &[ExpressionSet],
) -> Result<AbstractState<H, V>, SemanticError> {
    let mut state = caller.push_scope(token);
    for (formal, actuals) in formals.iter().zip(args) {
        let target = SymbolicExpression::identifier(Identifier::variable(formal.clone()), TypeSet::Top);
        let mut bound = AbstractState::bottom();
        for actual in actuals.iter() {
            let scoped = SymbolicExpression::new(
                ExprKind::PushScope(token.clone(), Box::new(actual.clone())),
                actual.types.clone(),
            );
            bound = bound.lub(&state.assign(&target, &scoped)?);
        }
        state = bound;
    }
    Ok(state.forget_identifiers_if(|id| id.scope.is_some()))
}

/// State after returning from a callee whose exit state is `exit`.
///
/// The caller frame is restored and the callee's return slot is moved into the call's result
/// identifier, which becomes the computed expression.
pub fn return_from_call<H: HeapDomain, V: ValueDomain>(
    exit: &AbstractState<H, V>,
    caller: &AbstractState<H, V>,
    site: &CallSite,
    types: &TypeSet,
) -> Result<AnalysisState<H, V>, SemanticError> {
    if exit.is_bottom() || caller.is_bottom() {
        return Ok(AnalysisState::bottom());
    }
    let result = SymbolicExpression::identifier(site.result_identifier(), types.clone());
    let returned = SymbolicExpression::identifier(Identifier::return_slot(), types.clone());
    let state = exit
        .restore_frame(caller)
        .assign(&result, &returned)?
        .forget_identifier(&Identifier::return_slot());
    Ok(AnalysisState::new(state, ExpressionSet::single(result)))
}

/// State after a call to code that is not available: the result is unknown, and so is the heap.
pub fn open_call_result<H: HeapDomain, V: ValueDomain>(
    caller: &AbstractState<H, V>,
    site: &CallSite,
    types: &TypeSet,
) -> AnalysisState<H, V> {
    if caller.is_bottom() {
        return AnalysisState::bottom();
    }
    let result = site.result_identifier();
    let state = caller.havoc_heap().forget_identifier(&result);
    AnalysisState::new(state, ExpressionSet::single(SymbolicExpression::identifier(result, types.clone())))
}

/// Outcome of the evaluation of one node.
#[derive(Debug, Clone)]
pub struct NodeSemantics<H, V> {
    pub exit: AnalysisState<H, V>,
    /// State after each (sub-)expression of the node, in evaluation order.
    pub expressions: Vec<(ExprId, AnalysisState<H, V>)>,
}

/// Transfer functions of the nodes of one procedure.
pub struct Evaluator<'a, H, V> {
    procedure: &'a Procedure,
    registry: &'a TypeRegistry,
    calls: &'a dyn CallHandler<H, V>,
}

impl<'a, H: HeapDomain, V: ValueDomain> Evaluator<'a, H, V> {
    pub fn new(procedure: &'a Procedure, registry: &'a TypeRegistry, calls: &'a dyn CallHandler<H, V>) -> Self {
        Evaluator {
            procedure,
            registry,
            calls,
        }
    }

    fn types_of(&self, expr: &Expression) -> TypeSet {
        self.registry.runtime_types(self.procedure.id(), expr.id)
    }

    pub fn eval_node(&self, node: &Node, entry: &AnalysisState<H, V>) -> Result<NodeSemantics<H, V>, SemanticError> {
        let mut expressions = Vec::new();
        if entry.is_bottom() {
            return Ok(NodeSemantics {
                exit: AnalysisState::bottom(),
                expressions,
            });
        }
        let exit = match &node.statement {
            Statement::Assign { target, value } => self.eval_assignment(node.id, target, value, entry, &mut expressions)?,
            Statement::Condition(expr) | Statement::Expr(expr) => self.eval(node.id, expr, entry, &mut expressions)?,
            Statement::Return(Some(expr)) => {
                let value = self.eval(node.id, expr, entry, &mut expressions)?;
                let slot = SymbolicExpression::identifier(Identifier::return_slot(), self.types_of(expr));
                let mut result = AnalysisState::bottom();
                for returned in value.computed.iter() {
                    result = result.lub(&value.assign(&slot, returned)?);
                }
                result
            }
            Statement::Return(None) | Statement::Skip => entry.small_step_semantics(&SymbolicExpression::skip())?,
        };
        Ok(NodeSemantics { exit, expressions })
    }

    fn eval_assignment(
        &self,
        node: NodeId,
        target: &Expression,
        value: &Expression,
        entry: &AnalysisState<H, V>,
        record: &mut Vec<(ExprId, AnalysisState<H, V>)>,
    ) -> Result<AnalysisState<H, V>, SemanticError> {
        let values = self.eval(node, value, entry, record)?;
        let (state, targets) = match &target.kind {
            ExpressionKind::Variable(name) => {
                let id = SymbolicExpression::identifier(Identifier::variable(name.clone()), self.types_of(target));
                (values.clone(), vec![id])
            }
            ExpressionKind::Deref(inner) => {
                let pointers = self.eval(node, inner, &values, record)?;
                let targets = pointers
                    .computed
                    .iter()
                    .map(|p| SymbolicExpression::new(ExprKind::HeapDereference(Box::new(p.clone())), self.types_of(target)))
                    .collect();
                (pointers, targets)
            }
            _ => return Err(SemanticError::InvalidAssignmentTarget(target.to_string())),
        };
        let mut result = AnalysisState::bottom();
        for t in &targets {
            for v in values.computed.iter() {
                result = result.lub(&state.assign(t, v)?);
            }
        }
        record.push((target.id, result.clone()));
        Ok(result)
    }

    /// Whether `operand` may be used where `kind` is expected.
    fn admits(operand: &SymbolicExpression, kind: Option<OperandKind>) -> bool {
        match kind {
            Some(kind) => operand.types.admits(kind),
            None => true,
        }
    }

    fn eval(
        &self,
        node: NodeId,
        expr: &Expression,
        state: &AnalysisState<H, V>,
        record: &mut Vec<(ExprId, AnalysisState<H, V>)>,
    ) -> Result<AnalysisState<H, V>, SemanticError> {
        if state.is_bottom() {
            return Ok(AnalysisState::bottom());
        }
        let types = self.types_of(expr);
        let result = match &expr.kind {
            ExpressionKind::Literal(c) => state.small_step_semantics(&SymbolicExpression::constant(c.clone()))?,
            ExpressionKind::Variable(name) => {
                let id = SymbolicExpression::identifier(Identifier::variable(name.clone()), types);
                state.small_step_semantics(&id)?
            }
            ExpressionKind::Unary { op, arg } => {
                let arg = self.eval(node, arg, state, record)?;
                let mut result = AnalysisState::bottom();
                for a in arg.computed.iter() {
                    if !Self::admits(a, op.operand_kind()) {
                        log::trace!("Operand {} of {} has incompatible types {}", a, op, a.types);
                        continue;
                    }
                    let unary = SymbolicExpression::unary(*op, a.clone(), types.clone());
                    result = result.lub(&arg.small_step_semantics(&unary)?);
                }
                result
            }
            ExpressionKind::Binary { op, left, right } => {
                let lefts = self.eval(node, left, state, record)?;
                let rights = self.eval(node, right, &lefts, record)?;
                let mut result = AnalysisState::bottom();
                for l in lefts.computed.iter() {
                    for r in rights.computed.iter() {
                        if !Self::admits(l, op.operand_kind()) || !Self::admits(r, op.operand_kind()) {
                            log::trace!("Operands {} and {} of {} have incompatible types", l, r, op);
                            continue;
                        }
                        let binary = SymbolicExpression::binary(*op, l.clone(), r.clone(), types.clone());
                        result = result.lub(&rights.small_step_semantics(&binary)?);
                    }
                }
                result
            }
            ExpressionKind::Ternary { op, first, second, third } => {
                let firsts = self.eval(node, first, state, record)?;
                let seconds = self.eval(node, second, &firsts, record)?;
                let thirds = self.eval(node, third, &seconds, record)?;
                let kinds = op.operand_kinds();
                let mut result = AnalysisState::bottom();
                for a in firsts.computed.iter() {
                    for b in seconds.computed.iter() {
                        for c in thirds.computed.iter() {
                            let operands = [a, b, c];
                            if operands.iter().zip(kinds).any(|(o, k)| !Self::admits(o, Some(k))) {
                                log::trace!("Operands of {} have incompatible types", op);
                                continue;
                            }
                            let kind = ExprKind::Ternary(*op, Box::new(a.clone()), Box::new(b.clone()), Box::new(c.clone()));
                            let ternary = SymbolicExpression::new(kind, types.clone());
                            result = result.lub(&thirds.small_step_semantics(&ternary)?);
                        }
                    }
                }
                result
            }
            ExpressionKind::Call { target, args } => {
                let mut current = state.clone();
                let mut actuals = Vec::with_capacity(args.len());
                for arg in args {
                    current = self.eval(node, arg, &current, record)?;
                    actuals.push(current.computed.clone());
                }
                if current.is_bottom() {
                    AnalysisState::bottom()
                } else {
                    let site = CallSite {
                        caller: self.procedure.id().clone(),
                        node,
                        expr: expr.id,
                        target: target.clone(),
                    };
                    self.calls.call(&site, &current, &actuals)?
                }
            }
            ExpressionKind::New(name) => {
                let site = format!("{}@{}:{}", name, self.procedure.id(), expr.id);
                let allocation = SymbolicExpression::new(ExprKind::HeapAllocation { site }, TypeSet::single(Type::Object));
                let reference = SymbolicExpression::new(ExprKind::HeapReference(Box::new(allocation)), types);
                state.small_step_semantics(&reference)?
            }
            ExpressionKind::Deref(inner) => {
                let pointers = self.eval(node, inner, state, record)?;
                let mut result = AnalysisState::bottom();
                for p in pointers.computed.iter() {
                    let deref = SymbolicExpression::new(ExprKind::HeapDereference(Box::new(p.clone())), types.clone());
                    result = result.lub(&pointers.small_step_semantics(&deref)?);
                }
                result
            }
        };
        record.push((expr.id, result.clone()));
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::domains::Interval;
    use crate::environment::Environment;
    use crate::heap::{MonolithicHeap, PointBasedHeap};
    use crate::program::ProcedureBuilder;
    use crate::symbolic::BinaryOperator;

    type IntervalState = AnalysisState<MonolithicHeap, Environment<Interval>>;

    fn entry() -> IntervalState {
        AnalysisState::from_state(AbstractState::new(MonolithicHeap::Top, Environment::new()))
    }

    fn get(state: &IntervalState, name: &str) -> Interval {
        state.state.value().get(&Identifier::variable(name))
    }

    #[test]
    fn test_assignment_of_product() {
        let mut b = ProcedureBuilder::new("main");
        let x = b.var("x");
        let two = b.int(2);
        let three = b.int(3);
        let product = b.binary(BinaryOperator::Mul, two, three);
        let product_id = product.id;
        let node = b.add_node(Statement::Assign { target: x, value: product });
        let procedure = b.build();

        let registry = TypeRegistry::new();
        let evaluator = Evaluator::new(&procedure, &registry, &NoCalls);
        let sem = evaluator.eval_node(&procedure.nodes()[node.0], &entry()).unwrap();
        assert_eq!(get(&sem.exit, "x"), Interval::constant(6));
        assert_eq!(sem.exit.computed.iter().map(|e| e.to_string()).collect::<Vec<_>>(), vec!["x"]);
        assert!(sem.expressions.iter().any(|(id, _)| *id == product_id));
    }

    #[test]
    fn test_incompatible_operand_prunes_branch() {
        let mut b = ProcedureBuilder::new("main");
        let x = b.var("x");
        let text = b.string("a");
        let two = b.int(2);
        let product = b.binary(BinaryOperator::Mul, text, two);
        let node = b.add_node(Statement::Assign { target: x, value: product });
        let procedure = b.build();

        let registry = TypeRegistry::new();
        let evaluator = Evaluator::new(&procedure, &registry, &NoCalls);
        let sem = evaluator.eval_node(&procedure.nodes()[node.0], &entry()).unwrap();
        assert!(sem.exit.is_bottom());
    }

    #[test]
    fn test_untyped_operand_passes() {
        let mut b = ProcedureBuilder::new("main");
        let x = b.var("x");
        let y = b.var("y");
        let two = b.int(2);
        let product = b.binary(BinaryOperator::Mul, y, two);
        let node = b.add_node(Statement::Assign { target: x, value: product });
        let procedure = b.build();

        let registry = TypeRegistry::new();
        let evaluator = Evaluator::new(&procedure, &registry, &NoCalls);
        let sem = evaluator.eval_node(&procedure.nodes()[node.0], &entry()).unwrap();
        assert!(!sem.exit.is_bottom());
        assert!(get(&sem.exit, "x").is_top());
    }

    #[test]
    fn test_calls_need_a_handler() {
        let mut b = ProcedureBuilder::new("main");
        let call = b.call("f", vec![]);
        let node = b.add_node(Statement::Expr(call));
        let procedure = b.build();

        let registry = TypeRegistry::new();
        let evaluator = Evaluator::new(&procedure, &registry, &NoCalls);
        let err = evaluator.eval_node(&procedure.nodes()[node.0], &entry()).unwrap_err();
        assert_eq!(err, SemanticError::NoCallHandler("f".to_string()));
    }

    #[test]
    fn test_store_through_new_object() {
        // p = new A; *p = 4; x = *p
        let mut b = ProcedureBuilder::new("main");
        let p = b.var("p");
        let object = b.new_object("A");
        let alloc = b.add_node(Statement::Assign { target: p, value: object });
        let p = b.var("p");
        let target = b.deref(p);
        let four = b.int(4);
        let store = b.add_node(Statement::Assign { target, value: four });
        let x = b.var("x");
        let p = b.var("p");
        let load = b.deref(p);
        let read = b.add_node(Statement::Assign { target: x, value: load });
        let procedure = b.build();

        let registry = TypeRegistry::new();
        let evaluator = Evaluator::new(&procedure, &registry, &NoCalls);
        let mut state: AnalysisState<PointBasedHeap, Environment<Interval>> =
            AnalysisState::from_state(AbstractState::new(PointBasedHeap::new(), Environment::new()));
        for node in [alloc, store, read] {
            state = evaluator.eval_node(&procedure.nodes()[node.0], &state).unwrap().exit;
        }
        assert_eq!(state.state.value().get(&Identifier::variable("x")), Interval::constant(4));
    }

    #[test]
    fn test_bind_and_return() {
        let caller = AbstractState::new(MonolithicHeap::Top, Environment::<Interval>::new())
            .assign(&SymbolicExpression::variable("a"), &SymbolicExpression::constant(crate::symbolic::Constant::Int(3)))
            .unwrap();
        let site = CallSite {
            caller: ProcedureId::new("main"),
            node: NodeId(1),
            expr: ExprId(4),
            target: CallTarget::Static(ProcedureId::new("id")),
        };
        let args = vec![ExpressionSet::single(SymbolicExpression::variable("a"))];
        let entry = bind_call(&caller, &site.scope_token(), &["n".to_string()], &args).unwrap();
        assert_eq!(entry.value().get(&Identifier::variable("n")), Interval::constant(3));
        assert!(!entry.value().contains(&Identifier::variable("a")));

        let exit = entry
            .assign(&SymbolicExpression::identifier(Identifier::return_slot(), TypeSet::Top), &SymbolicExpression::variable("n"))
            .unwrap();
        let returned = return_from_call(&exit, &caller, &site, &TypeSet::Top).unwrap();
        let result = site.result_identifier();
        assert_eq!(returned.state.value().get(&result), Interval::constant(3));
        assert_eq!(returned.state.value().get(&Identifier::variable("a")), Interval::constant(3));
        assert!(!returned.state.value().contains(&Identifier::variable("n")));
        assert!(!returned.state.value().contains(&Identifier::return_slot()));
    }
}
