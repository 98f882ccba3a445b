//! Worklist fixpoint over the CFG of one procedure.
//!
//! Every node has an entry and an exit state, bottom until first reached. Popping a node applies its
//! transfer function to its entry state; the result is joined into the node's exit state and pushed
//! along the outgoing edges (branch edges assume the condition, or its negation). A successor whose
//! entry state grows is queued again. At loop heads, once the entry state has been updated
//! `widening_threshold` times, widening replaces the join.
//!
//! The engine bounds its own work: exceeding `max_iterations` node visits, or `max_working_set`
//! pending nodes, aborts the fixpoint with a dedicated error.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use crate::config::{AnalysisConfig, WorkingSetKind};
use crate::error::{FixpointError, SemanticError};
use crate::heap::HeapDomain;
use crate::lattice::Lattice;
use crate::program::{EdgeKind, ExprId, NodeId, Procedure, ProcedureId};
use crate::semantics::{CallHandler, Evaluator};
use crate::state::{AbstractState, AnalysisState, ValueDomain};
use crate::types::TypeRegistry;

/// Pending elements, without duplicates.
#[derive(Debug, Clone)]
pub struct WorkingSet<T> {
    kind: WorkingSetKind,
    items: VecDeque<T>,
    members: BTreeSet<T>,
}

impl<T: Ord + Clone> WorkingSet<T> {
    pub fn new(kind: WorkingSetKind) -> Self {
        WorkingSet {
            kind,
            items: VecDeque::new(),
            members: BTreeSet::new(),
        }
    }

    /// Add `item` unless it is already pending. Returns whether it was added.
    pub fn push(&mut self, item: T) -> bool {
        if !self.members.insert(item.clone()) {
            return false;
        }
        self.items.push_back(item);
        true
    }

    pub fn pop(&mut self) -> Option<T> {
        let item = match self.kind {
            WorkingSetKind::Fifo => self.items.pop_front(),
            WorkingSetKind::Lifo => self.items.pop_back(),
        }?;
        self.members.remove(&item);
        Some(item)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Identifies one analyzed invocation of a procedure.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CallContext {
    /// Shared by every caller.
    Insensitive,
    /// The call at `node` of `caller`.
    CallSite { caller: ProcedureId, node: NodeId },
}

impl fmt::Display for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallContext::Insensitive => write!(f, "insensitive"),
            CallContext::CallSite { caller, node } => write!(f, "{}@{}", caller, node),
        }
    }
}

/// Converged states of one procedure under one calling context.
#[derive(Debug, Clone)]
pub struct CfgResults<H, V> {
    procedure: ProcedureId,
    context: CallContext,
    exit_nodes: Vec<NodeId>,
    entry_states: BTreeMap<NodeId, AnalysisState<H, V>>,
    exit_states: BTreeMap<NodeId, AnalysisState<H, V>>,
    expression_states: BTreeMap<ExprId, AnalysisState<H, V>>,
    iterations: usize,
}

impl<H: HeapDomain, V: ValueDomain> CfgResults<H, V> {
    pub fn procedure(&self) -> &ProcedureId {
        &self.procedure
    }

    pub fn context(&self) -> &CallContext {
        &self.context
    }

    /// Node visits performed by the fixpoint that produced these results.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// State before `node`; `None` if the node is unreachable.
    pub fn state_before(&self, node: NodeId) -> Option<&AnalysisState<H, V>> {
        self.entry_states.get(&node)
    }

    /// State after `node`; `None` if the node is unreachable.
    pub fn state_after(&self, node: NodeId) -> Option<&AnalysisState<H, V>> {
        self.exit_states.get(&node)
    }

    pub fn state_after_expression(&self, expr: ExprId) -> Option<&AnalysisState<H, V>> {
        self.expression_states.get(&expr)
    }

    pub fn reachable_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.entry_states.keys().copied()
    }

    pub fn expression_states(&self) -> impl Iterator<Item = (ExprId, &AnalysisState<H, V>)> {
        self.expression_states.iter().map(|(id, s)| (*id, s))
    }

    /// Join of the states after the exit nodes of the procedure.
    pub fn exit_state(&self) -> AnalysisState<H, V> {
        self.exit_nodes
            .iter()
            .filter_map(|n| self.exit_states.get(n))
            .fold(AnalysisState::bottom(), |acc, s| acc.lub(s))
    }

    /// Pointwise join with results of the same procedure, computed under another context.
    pub fn lub(&self, other: &Self) -> Self {
        fn join<K: Ord + Copy, H: HeapDomain, V: ValueDomain>(
            a: &BTreeMap<K, AnalysisState<H, V>>,
            b: &BTreeMap<K, AnalysisState<H, V>>,
        ) -> BTreeMap<K, AnalysisState<H, V>> {
            let mut result = a.clone();
            for (k, v) in b {
                let joined = match a.get(k) {
                    Some(prev) => prev.lub(v),
                    None => v.clone(),
                };
                result.insert(*k, joined);
            }
            result
        }

        let context = if self.context == other.context {
            self.context.clone()
        } else {
            CallContext::Insensitive
        };
        CfgResults {
            procedure: self.procedure.clone(),
            context,
            exit_nodes: self.exit_nodes.clone(),
            entry_states: join(&self.entry_states, &other.entry_states),
            exit_states: join(&self.exit_states, &other.exit_states),
            expression_states: join(&self.expression_states, &other.expression_states),
            iterations: self.iterations + other.iterations,
        }
    }
}

/// Filter `state` through an edge.
fn traverse<H: HeapDomain, V: ValueDomain>(
    state: &AnalysisState<H, V>,
    kind: EdgeKind,
) -> Result<AnalysisState<H, V>, SemanticError> {
    if kind == EdgeKind::Sequential || state.computed.is_empty() {
        return Ok(state.clone());
    }
    let mut result = AnalysisState::bottom();
    for condition in state.computed.iter() {
        let condition = match kind {
            EdgeKind::False => condition.negate(),
            _ => condition.clone(),
        };
        result = result.lub(&state.assume(&condition)?);
    }
    Ok(result)
}

/// Fixpoint computation over one procedure, started from a given entry state.
pub struct CfgFixpoint<'a, H, V> {
    procedure: &'a Procedure,
    evaluator: Evaluator<'a, H, V>,
    config: &'a AnalysisConfig,
    context: CallContext,
    entry_states: BTreeMap<NodeId, AnalysisState<H, V>>,
    exit_states: BTreeMap<NodeId, AnalysisState<H, V>>,
    expression_states: BTreeMap<ExprId, AnalysisState<H, V>>,
    updates: BTreeMap<NodeId, usize>,
    working: WorkingSet<NodeId>,
    iterations: usize,
}

impl<'a, H: HeapDomain, V: ValueDomain> CfgFixpoint<'a, H, V> {
    pub fn new(
        procedure: &'a Procedure,
        registry: &'a TypeRegistry,
        calls: &'a dyn CallHandler<H, V>,
        config: &'a AnalysisConfig,
        context: CallContext,
        entry_state: AbstractState<H, V>,
    ) -> Self {
        let mut working = WorkingSet::new(config.working_set);
        let mut entry_states = BTreeMap::new();
        let mut updates = BTreeMap::new();
        if !procedure.is_open() {
            entry_states.insert(procedure.entry(), AnalysisState::from_state(entry_state));
            updates.insert(procedure.entry(), 1);
            working.push(procedure.entry());
        }
        CfgFixpoint {
            procedure,
            evaluator: Evaluator::new(procedure, registry, calls),
            config,
            context,
            entry_states,
            exit_states: BTreeMap::new(),
            expression_states: BTreeMap::new(),
            updates,
            working,
            iterations: 0,
        }
    }

    pub fn state_before(&self, node: NodeId) -> Option<&AnalysisState<H, V>> {
        self.entry_states.get(&node)
    }

    pub fn state_after(&self, node: NodeId) -> Option<&AnalysisState<H, V>> {
        self.exit_states.get(&node)
    }

    pub fn is_done(&self) -> bool {
        self.working.is_empty()
    }

    fn fault(&self, node: NodeId, source: SemanticError) -> FixpointError {
        FixpointError::Semantic {
            procedure: self.procedure.id().clone(),
            node,
            source,
        }
    }

    /// Process one pending node. Returns `false` once the working set is empty.
    pub fn step(&mut self) -> Result<bool, FixpointError> {
        let Some(id) = self.working.pop() else {
            return Ok(false);
        };
        self.iterations += 1;
        if self.iterations > self.config.max_iterations {
            return Err(FixpointError::NonTermination {
                procedure: self.procedure.id().clone(),
                iterations: self.config.max_iterations,
            });
        }
        let Some(node) = self.procedure.node(id) else {
            return Ok(true);
        };

        let entry = self.entry_states.get(&id).cloned().unwrap_or_else(AnalysisState::bottom);
        let sem = self.evaluator.eval_node(node, &entry).map_err(|e| self.fault(id, e))?;
        for (expr, state) in sem.expressions {
            let joined = match self.expression_states.get(&expr) {
                Some(prev) => prev.lub(&state),
                None => state,
            };
            self.expression_states.insert(expr, joined);
        }
        let exit = match self.exit_states.get(&id) {
            Some(prev) => AnalysisState::new(prev.state.lub(&sem.exit.state), sem.exit.computed),
            None => sem.exit,
        };
        log::trace!("{}: {} => {}", id, node.statement, exit);

        for &(succ, kind) in self.procedure.successors(id) {
            let propagated = traverse(&exit, kind).map_err(|e| self.fault(id, e))?;
            if propagated.is_bottom() {
                continue;
            }
            let propagated = AnalysisState::from_state(propagated.state);
            let updated = match self.entry_states.get(&succ) {
                Some(old) if propagated.leq(old) => continue,
                Some(old) => {
                    let count = self.updates.entry(succ).or_insert(0);
                    let widen = self.procedure.is_loop_head(succ) && *count >= self.config.widening_threshold;
                    *count += 1;
                    if widen {
                        log::debug!("Widening at {} of '{}'", succ, self.procedure.id());
                        old.widening(&propagated)
                    } else {
                        old.lub(&propagated)
                    }
                }
                None => {
                    self.updates.insert(succ, 1);
                    propagated
                }
            };
            self.entry_states.insert(succ, updated);
            self.working.push(succ);
            if self.working.len() > self.config.max_working_set {
                return Err(FixpointError::WorkingSetOverflow {
                    procedure: self.procedure.id().clone(),
                    limit: self.config.max_working_set,
                });
            }
        }
        self.exit_states.insert(id, exit);
        Ok(true)
    }

    /// Iterate until the working set is empty.
    pub fn run(mut self) -> Result<CfgResults<H, V>, FixpointError> {
        while self.step()? {}
        log::debug!(
            "Fixpoint over '{}' ({}) converged after {} iterations",
            self.procedure.id(),
            self.context,
            self.iterations
        );
        Ok(CfgResults {
            procedure: self.procedure.id().clone(),
            context: self.context,
            exit_nodes: self.procedure.exit_nodes(),
            entry_states: self.entry_states,
            exit_states: self.exit_states,
            expression_states: self.expression_states,
            iterations: self.iterations,
        })
    }
}
