//! Whole-program fixpoint over the call graph.
//!
//! [`ContextBasedAnalysis`] keeps, for every `(procedure, context)` pair, an entry state (the join of
//! the states bound by its callers) and a summary (the join of its exit states). Procedures are run
//! from a worklist: running a procedure evaluates its calls against the current summaries of the
//! callees (bottom if not yet computed) and records the callees' entry states. A callee whose entry
//! grows is run again; a procedure whose summary grows re-schedules its callers. Entry states and
//! summaries are widened once they have been updated `widening_threshold` times, so recursive
//! procedures converge.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

use crate::callgraph::{CallGraph, Resolution};
use crate::config::{AnalysisConfig, ContextSensitivity};
use crate::error::{CallGraphError, FixpointError, SemanticError};
use crate::fixpoint::{CfgFixpoint, CfgResults, WorkingSet};
use crate::heap::HeapDomain;
use crate::lattice::Lattice;
use crate::program::{ProcedureId, Program};
use crate::semantics::{bind_call, open_call_result, return_from_call, CallHandler, CallSite};
use crate::state::{AbstractState, AnalysisState, ValueDomain};
use crate::symbolic::ExpressionSet;
use crate::types::TypeRegistry;

pub use crate::fixpoint::CallContext;

/// Results of every analyzed procedure, under every context it was analyzed in.
#[derive(Debug, Clone)]
pub struct AnalysisResults<H, V> {
    results: BTreeMap<ProcedureId, Vec<CfgResults<H, V>>>,
}

impl<H: HeapDomain, V: ValueDomain> AnalysisResults<H, V> {
    pub fn new() -> Self {
        AnalysisResults { results: BTreeMap::new() }
    }

    pub fn insert(&mut self, results: CfgResults<H, V>) {
        self.results.entry(results.procedure().clone()).or_default().push(results);
    }

    /// Results of `procedure`, one per context. Empty if the procedure was never reached.
    pub fn results_of(&self, procedure: &ProcedureId) -> &[CfgResults<H, V>] {
        self.results.get(procedure).map(|r| r.as_slice()).unwrap_or(&[])
    }

    /// Context-insensitive view of the results of `procedure`.
    pub fn joined(&self, procedure: &ProcedureId) -> Option<CfgResults<H, V>> {
        let mut all = self.results_of(procedure).iter();
        let first = all.next()?.clone();
        Some(all.fold(first, |acc, r| acc.lub(r)))
    }

    pub fn procedures(&self) -> impl Iterator<Item = &ProcedureId> {
        self.results.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CfgResults<H, V>> {
        self.results.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.results.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

impl<H: HeapDomain, V: ValueDomain> Default for AnalysisResults<H, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Orchestration of the per-procedure fixpoints of a whole program.
pub trait InterproceduralAnalysis<H, V> {
    /// Analyze every procedure reachable from the entry points of `program`, starting each entry
    /// point in `entry_state`.
    fn fixpoint(
        &self,
        program: &Program,
        callgraph: &dyn CallGraph,
        registry: &TypeRegistry,
        config: &AnalysisConfig,
        entry_state: &AbstractState<H, V>,
    ) -> Result<AnalysisResults<H, V>, FixpointError>;
}

type Key = (ProcedureId, CallContext);

/// Interprocedural analysis with per-context summaries.
///
/// The context of a call is given by [`AnalysisConfig::context_sensitivity`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextBasedAnalysis;

impl ContextBasedAnalysis {
    pub fn new() -> Self {
        ContextBasedAnalysis
    }
}

/// Calls evaluated against the summaries known so far.
struct SummaryCalls<'a, H, V> {
    program: &'a Program,
    callgraph: &'a dyn CallGraph,
    registry: &'a TypeRegistry,
    sensitivity: ContextSensitivity,
    summaries: &'a BTreeMap<Key, AbstractState<H, V>>,
    /// Callee entry states bound during the run.
    requests: RefCell<Vec<(Key, AbstractState<H, V>)>>,
}

impl<H: HeapDomain, V: ValueDomain> CallHandler<H, V> for SummaryCalls<'_, H, V> {
    fn call(
        &self,
        site: &CallSite,
        state: &AnalysisState<H, V>,
        args: &[ExpressionSet],
    ) -> Result<AnalysisState<H, V>, SemanticError> {
        let unknown = || SemanticError::UnknownCallSite {
            caller: site.caller.clone(),
            node: site.node,
        };
        let resolutions = self.callgraph.resolve(&site.caller, site.expr).ok_or_else(unknown)?;
        let types = self.registry.runtime_types(&site.caller, site.expr);
        let token = site.scope_token();

        let mut result = AnalysisState::bottom();
        for resolution in resolutions {
            match resolution {
                Resolution::Open(id) => {
                    log::trace!("Open call to '{}' at {} of '{}'", id, site.node, site.caller);
                    result = result.lub(&open_call_result(&state.state, site, &types));
                }
                Resolution::Procedure(id) => {
                    let callee = self.program.procedure(id).ok_or_else(unknown)?;
                    let entry = bind_call(&state.state, &token, callee.params(), args)?;
                    let context = match self.sensitivity {
                        ContextSensitivity::Insensitive => CallContext::Insensitive,
                        ContextSensitivity::CallSite => CallContext::CallSite {
                            caller: site.caller.clone(),
                            node: site.node,
                        },
                    };
                    let key = (id.clone(), context);
                    if let Some(exit) = self.summaries.get(&key) {
                        result = result.lub(&return_from_call(exit, &state.state, site, &types)?);
                    }
                    self.requests.borrow_mut().push((key, entry));
                }
            }
        }
        Ok(result)
    }
}

/// Join `update` into the table entry at `key`, widening after `threshold` updates.
/// Returns whether the entry changed.
fn update_table<H: HeapDomain, V: ValueDomain>(
    table: &mut BTreeMap<Key, AbstractState<H, V>>,
    counts: &mut BTreeMap<Key, usize>,
    key: &Key,
    update: AbstractState<H, V>,
    threshold: usize,
) -> bool {
    let updated = match table.get(key) {
        Some(old) if update.leq(old) => return false,
        Some(old) => {
            let count = counts.entry(key.clone()).or_insert(0);
            let widen = *count >= threshold;
            *count += 1;
            if widen {
                log::debug!("Widening at '{}' ({})", key.0, key.1);
                old.widening(&update)
            } else {
                old.lub(&update)
            }
        }
        None => {
            if update.is_bottom() {
                return false;
            }
            counts.insert(key.clone(), 1);
            update
        }
    };
    table.insert(key.clone(), updated);
    true
}

impl<H: HeapDomain, V: ValueDomain> InterproceduralAnalysis<H, V> for ContextBasedAnalysis {
    fn fixpoint(
        &self,
        program: &Program,
        callgraph: &dyn CallGraph,
        registry: &TypeRegistry,
        config: &AnalysisConfig,
        entry_state: &AbstractState<H, V>,
    ) -> Result<AnalysisResults<H, V>, FixpointError> {
        if !callgraph.is_initialized() {
            return Err(CallGraphError::NotInitialized.into());
        }

        let mut entries: BTreeMap<Key, AbstractState<H, V>> = BTreeMap::new();
        let mut entry_updates: BTreeMap<Key, usize> = BTreeMap::new();
        let mut summaries: BTreeMap<Key, AbstractState<H, V>> = BTreeMap::new();
        let mut summary_updates: BTreeMap<Key, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<Key, BTreeSet<Key>> = BTreeMap::new();
        let mut results: BTreeMap<Key, CfgResults<H, V>> = BTreeMap::new();
        let mut working = WorkingSet::new(config.working_set);

        // Entry points in call-graph order, callees first.
        let mut entry_points: Vec<&ProcedureId> = program.entry_points().iter().collect();
        let rank = |id: &ProcedureId| callgraph.sccs().iter().position(|scc| scc.contains(id));
        entry_points.sort_by_key(|id| rank(*id));
        for id in entry_points {
            let key = (id.clone(), CallContext::Insensitive);
            entries.insert(key.clone(), entry_state.clone());
            working.push(key);
        }

        let mut runs = 0;
        while let Some(key) = working.pop() {
            runs += 1;
            if runs > config.max_procedure_iterations {
                return Err(FixpointError::InterproceduralNonTermination {
                    iterations: config.max_procedure_iterations,
                });
            }
            let Some(procedure) = program.procedure(&key.0) else {
                continue;
            };
            if procedure.is_open() {
                continue;
            }
            let Some(entry) = entries.get(&key).cloned() else {
                continue;
            };
            log::debug!("Analyzing '{}' ({})", key.0, key.1);

            let handler = SummaryCalls {
                program,
                callgraph,
                registry,
                sensitivity: config.context_sensitivity,
                summaries: &summaries,
                requests: RefCell::new(Vec::new()),
            };
            let cfg_results = CfgFixpoint::new(procedure, registry, &handler, config, key.1.clone(), entry).run()?;
            let requests = handler.requests.into_inner();

            for (callee, callee_entry) in requests {
                dependents.entry(callee.clone()).or_default().insert(key.clone());
                let threshold = config.widening_threshold;
                if update_table(&mut entries, &mut entry_updates, &callee, callee_entry, threshold) {
                    working.push(callee);
                }
            }

            let exit = cfg_results.exit_state().state;
            results.insert(key.clone(), cfg_results);
            if update_table(&mut summaries, &mut summary_updates, &key, exit, config.widening_threshold) {
                for caller in dependents.get(&key).into_iter().flatten() {
                    working.push(caller.clone());
                }
            }
        }
        log::debug!("Interprocedural fixpoint converged after {} procedure runs", runs);

        let mut all = AnalysisResults::new();
        for (_, r) in results {
            all.insert(r);
        }
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::callgraph::NameBasedCallGraph;
    use crate::domains::Interval;
    use crate::environment::Environment;
    use crate::heap::MonolithicHeap;
    use crate::program::{NodeId, Procedure, ProcedureBuilder, Statement};
    use crate::symbolic::{BinaryOperator, Identifier};

    type Env = Environment<Interval>;

    fn start() -> AbstractState<MonolithicHeap, Env> {
        AbstractState::new(MonolithicHeap::Top, Env::new())
    }

    /// `identity(n) { return n }`
    fn identity() -> Procedure {
        let mut b = ProcedureBuilder::new("identity");
        b.param("n");
        let n = b.var("n");
        b.add_node(Statement::Return(Some(n)));
        b.build()
    }

    /// `main() { a = identity(1); b = identity(7) }`
    fn two_calls() -> Procedure {
        let mut b = ProcedureBuilder::new("main");
        let a = b.var("a");
        let one = b.int(1);
        let first = b.call("identity", vec![one]);
        let n0 = b.add_node(Statement::Assign { target: a, value: first });
        let v = b.var("b");
        let seven = b.int(7);
        let second = b.call("identity", vec![seven]);
        let n1 = b.add_node(Statement::Assign { target: v, value: second });
        b.sequence(&[n0, n1]);
        b.build()
    }

    fn analyze(config: &AnalysisConfig, procedures: Vec<Procedure>) -> AnalysisResults<MonolithicHeap, Env> {
        let mut program = Program::new();
        for p in procedures {
            program.add_procedure(p).unwrap();
        }
        program.add_entry_point("main").unwrap();
        program.finalize().unwrap();
        let mut cg = NameBasedCallGraph::new();
        cg.init(&program).unwrap();
        ContextBasedAnalysis::new()
            .fixpoint(&program, &cg, &TypeRegistry::new(), config, &start())
            .unwrap()
    }

    fn value_after(results: &AnalysisResults<MonolithicHeap, Env>, node: usize, var: &str) -> Interval {
        let main = results.joined(&ProcedureId::new("main")).unwrap();
        main.state_after(NodeId(node)).unwrap().state.value().get(&Identifier::variable(var))
    }

    #[test]
    fn test_insensitive_summaries_are_shared() {
        let results = analyze(&AnalysisConfig::default(), vec![identity(), two_calls()]);
        assert_eq!(value_after(&results, 1, "a"), Interval::new(1, 7));
        assert_eq!(value_after(&results, 1, "b"), Interval::new(1, 7));
        assert_eq!(results.results_of(&ProcedureId::new("identity")).len(), 1);
    }

    #[test]
    fn test_call_site_contexts_are_separate() {
        let config = AnalysisConfig::default().with_context_sensitivity(ContextSensitivity::CallSite);
        let results = analyze(&config, vec![identity(), two_calls()]);
        assert_eq!(value_after(&results, 1, "a"), Interval::constant(1));
        assert_eq!(value_after(&results, 1, "b"), Interval::constant(7));
        assert_eq!(results.results_of(&ProcedureId::new("identity")).len(), 2);
    }

    #[test]
    fn test_recursion_converges() {
        // count(n) { if (n > 0) { return count(n - 1) } else { return 0 } }
        let mut b = ProcedureBuilder::new("count");
        b.param("n");
        let n = b.var("n");
        let zero = b.int(0);
        let cmp = b.binary(BinaryOperator::Gt, n, zero);
        let cond = b.add_node(Statement::Condition(cmp));
        let n = b.var("n");
        let one = b.int(1);
        let dec = b.binary(BinaryOperator::Sub, n, one);
        let call = b.call("count", vec![dec]);
        let recurse = b.add_node(Statement::Return(Some(call)));
        let zero = b.int(0);
        let base = b.add_node(Statement::Return(Some(zero)));
        b.branch(cond, recurse, base);
        let count = b.build();

        let mut b = ProcedureBuilder::new("main");
        let r = b.var("r");
        let ten = b.int(10);
        let call = b.call("count", vec![ten]);
        b.add_node(Statement::Assign { target: r, value: call });
        let main = b.build();

        let config = AnalysisConfig::default().with_widening_threshold(2);
        let results = analyze(&config, vec![count, main]);
        assert_eq!(value_after(&results, 0, "r"), Interval::constant(0));
    }

    #[test]
    fn test_unreached_procedures_have_no_results() {
        let mut b = ProcedureBuilder::new("unused");
        b.add_node(Statement::Skip);
        let results = analyze(&AnalysisConfig::default(), vec![identity(), two_calls(), b.build()]);
        assert!(results.results_of(&ProcedureId::new("unused")).is_empty());
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_requires_initialized_call_graph() {
        let mut program = Program::new();
        program.add_procedure(two_calls()).unwrap();
        program.add_procedure(identity()).unwrap();
        program.finalize().unwrap();
        let cg = NameBasedCallGraph::new();
        let err = ContextBasedAnalysis::new()
            .fixpoint(&program, &cg, &TypeRegistry::new(), &AnalysisConfig::default(), &start())
            .unwrap_err();
        assert_eq!(err, FixpointError::CallGraph(CallGraphError::NotInitialized));
    }
}
