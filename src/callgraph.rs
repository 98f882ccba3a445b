//! Call graph of a finalized program.
//!
//! Nodes are procedures, edges are call sites. Every call expression is resolved once, when the
//! graph is built, to one or more targets:
//! - a static target names exactly one procedure, which must accept the given number of arguments;
//! - a dynamic target names a method, and resolves to every procedure with that method name and
//!   arity, across units.
//!
//! Targets without a body are [open][Resolution::Open]. A call with no target is a construction
//! error.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::CallGraphError;
use crate::program::{CallTarget, ExprId, ExpressionKind, Procedure, ProcedureId, Program};

/// A resolved target of a call.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Resolution {
    Procedure(ProcedureId),
    /// Procedure without body; the call result is unknown.
    Open(ProcedureId),
}

impl Resolution {
    pub fn target(&self) -> &ProcedureId {
        match self {
            Resolution::Procedure(id) | Resolution::Open(id) => id,
        }
    }
}

pub trait CallGraph {
    /// Build the graph. Calling `init` again rebuilds it from scratch.
    fn init(&mut self, program: &Program) -> Result<(), CallGraphError>;

    fn is_initialized(&self) -> bool;

    /// Targets of the call expression `call` of `caller`.
    fn resolve(&self, caller: &ProcedureId, call: ExprId) -> Option<&[Resolution]>;

    fn callees(&self, caller: &ProcedureId) -> Vec<ProcedureId>;

    fn callers(&self, callee: &ProcedureId) -> Vec<ProcedureId>;

    /// Strongly connected components, callees before their callers.
    fn sccs(&self) -> &[Vec<ProcedureId>];

    /// Whether `procedure` may call itself, directly or not.
    fn is_recursive(&self, procedure: &ProcedureId) -> bool;
}

/// Call graph resolving calls by procedure name and arity.
#[derive(Debug, Clone, Default)]
pub struct NameBasedCallGraph {
    initialized: bool,
    resolutions: BTreeMap<(ProcedureId, ExprId), Vec<Resolution>>,
    callees: BTreeMap<ProcedureId, BTreeSet<ProcedureId>>,
    callers: BTreeMap<ProcedureId, BTreeSet<ProcedureId>>,
    sccs: Vec<Vec<ProcedureId>>,
    recursive: BTreeSet<ProcedureId>,
}

impl NameBasedCallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn resolution(procedure: &Procedure) -> Resolution {
        if procedure.is_open() {
            Resolution::Open(procedure.id().clone())
        } else {
            Resolution::Procedure(procedure.id().clone())
        }
    }

    fn resolve_target(program: &Program, target: &CallTarget, arity: usize) -> Vec<Resolution> {
        match target {
            CallTarget::Static(id) => program
                .procedure(id)
                .filter(|p| p.arity() == arity)
                .map(Self::resolution)
                .into_iter()
                .collect(),
            CallTarget::Dynamic(name) => program
                .procedures()
                .filter(|p| p.id().method_name() == name && p.arity() == arity)
                .map(Self::resolution)
                .collect(),
        }
    }

    /// Tarjan's algorithm over the callee relation.
    fn compute_sccs(&mut self, nodes: &[ProcedureId]) {
        struct Tarjan<'g> {
            callees: &'g BTreeMap<ProcedureId, BTreeSet<ProcedureId>>,
            index: BTreeMap<ProcedureId, usize>,
            lowlink: BTreeMap<ProcedureId, usize>,
            stack: Vec<ProcedureId>,
            on_stack: BTreeSet<ProcedureId>,
            sccs: Vec<Vec<ProcedureId>>,
        }

        impl Tarjan<'_> {
            fn visit(&mut self, v: &ProcedureId) {
                let idx = self.index.len();
                self.index.insert(v.clone(), idx);
                self.lowlink.insert(v.clone(), idx);
                self.stack.push(v.clone());
                self.on_stack.insert(v.clone());

                let callees = self.callees;
                for w in callees.get(v).into_iter().flatten() {
                    if !self.index.contains_key(w) {
                        self.visit(w);
                        let low = self.lowlink[v].min(self.lowlink[w]);
                        self.lowlink.insert(v.clone(), low);
                    } else if self.on_stack.contains(w) {
                        let low = self.lowlink[v].min(self.index[w]);
                        self.lowlink.insert(v.clone(), low);
                    }
                }

                if self.lowlink[v] == self.index[v] {
                    let mut scc = Vec::new();
                    while let Some(w) = self.stack.pop() {
                        self.on_stack.remove(&w);
                        let done = &w == v;
                        scc.push(w);
                        if done {
                            break;
                        }
                    }
                    scc.sort();
                    self.sccs.push(scc);
                }
            }
        }

        let mut tarjan = Tarjan {
            callees: &self.callees,
            index: BTreeMap::new(),
            lowlink: BTreeMap::new(),
            stack: Vec::new(),
            on_stack: BTreeSet::new(),
            sccs: Vec::new(),
        };
        for v in nodes {
            if !tarjan.index.contains_key(v) {
                tarjan.visit(v);
            }
        }
        let sccs = tarjan.sccs;

        self.recursive.clear();
        for scc in &sccs {
            let cyclic = scc.len() > 1 || self.callees.get(&scc[0]).is_some_and(|c| c.contains(&scc[0]));
            if cyclic {
                self.recursive.extend(scc.iter().cloned());
            }
        }
        self.sccs = sccs;
    }
}

impl CallGraph for NameBasedCallGraph {
    fn init(&mut self, program: &Program) -> Result<(), CallGraphError> {
        if !program.is_finalized() {
            return Err(CallGraphError::ProgramNotFinalized);
        }
        *self = Self::default();

        let nodes: Vec<ProcedureId> = program.procedures().map(|p| p.id().clone()).collect();
        for procedure in program.procedures() {
            let caller = procedure.id();
            for (_, call) in procedure.calls() {
                let ExpressionKind::Call { target, args } = &call.kind else {
                    continue;
                };
                let resolved = Self::resolve_target(program, target, args.len());
                if resolved.is_empty() {
                    return Err(CallGraphError::UnresolvedCall {
                        caller: caller.clone(),
                        target: target.to_string(),
                    });
                }
                log::debug!("Call {} in '{}' resolved to {} target(s)", call, caller, resolved.len());
                for r in &resolved {
                    if let Resolution::Open(id) = r {
                        log::warn!("Call to open procedure '{}' in '{}' returns top", id, caller);
                    }
                    self.callees.entry(caller.clone()).or_default().insert(r.target().clone());
                    self.callers.entry(r.target().clone()).or_default().insert(caller.clone());
                }
                self.resolutions.insert((caller.clone(), call.id), resolved);
            }
        }

        self.compute_sccs(&nodes);
        for id in &self.recursive {
            log::debug!("Procedure '{}' is recursive", id);
        }
        self.initialized = true;
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn resolve(&self, caller: &ProcedureId, call: ExprId) -> Option<&[Resolution]> {
        self.resolutions.get(&(caller.clone(), call)).map(|r| r.as_slice())
    }

    fn callees(&self, caller: &ProcedureId) -> Vec<ProcedureId> {
        self.callees.get(caller).into_iter().flatten().cloned().collect()
    }

    fn callers(&self, callee: &ProcedureId) -> Vec<ProcedureId> {
        self.callers.get(callee).into_iter().flatten().cloned().collect()
    }

    fn sccs(&self) -> &[Vec<ProcedureId>] {
        &self.sccs
    }

    fn is_recursive(&self, procedure: &ProcedureId) -> bool {
        self.recursive.contains(procedure)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::program::{ProcedureBuilder, Statement};

    fn returning(name: &str, value: i64) -> Procedure {
        let mut b = ProcedureBuilder::new(name);
        let v = b.int(value);
        b.add_node(Statement::Return(Some(v)));
        b.build()
    }

    fn calling(name: &str, callee: &str, dynamic: bool) -> Procedure {
        let mut b = ProcedureBuilder::new(name);
        let x = b.var("x");
        let call = if dynamic { b.dynamic_call(callee, vec![]) } else { b.call(callee, vec![]) };
        b.add_node(Statement::Assign { target: x, value: call });
        b.build()
    }

    fn finalized(procedures: Vec<Procedure>) -> Program {
        let mut program = Program::new();
        for p in procedures {
            program.add_procedure(p).unwrap();
        }
        program.finalize().unwrap();
        program
    }

    #[test]
    fn test_dynamic_call_resolves_all_candidates() {
        let program = finalized(vec![
            returning("A::get", 1),
            returning("B::get", 5),
            calling("main", "get", true),
        ]);
        let mut cg = NameBasedCallGraph::new();
        cg.init(&program).unwrap();

        let main = ProcedureId::new("main");
        let targets = cg.resolve(&main, ExprId(1)).unwrap();
        assert_eq!(
            targets,
            &[
                Resolution::Procedure(ProcedureId::new("A::get")),
                Resolution::Procedure(ProcedureId::new("B::get"))
            ]
        );
        assert_eq!(cg.callers(&ProcedureId::new("A::get")), vec![main.clone()]);
        assert!(!cg.is_recursive(&main));
        // Callees come first.
        assert_eq!(cg.sccs().last().unwrap(), &vec![main]);
    }

    #[test]
    fn test_static_call_checks_arity() {
        let mut b = ProcedureBuilder::new("main");
        let arg = b.int(1);
        let call = b.call("f", vec![arg]);
        b.add_node(Statement::Expr(call));
        let program = finalized(vec![returning("f", 0), b.build()]);

        let mut cg = NameBasedCallGraph::new();
        assert_eq!(
            cg.init(&program),
            Err(CallGraphError::UnresolvedCall {
                caller: ProcedureId::new("main"),
                target: "f".to_string()
            })
        );
        assert!(!cg.is_initialized());
    }

    #[test]
    fn test_open_procedures_and_unfinalized_programs() {
        let mut program = Program::new();
        program.add_procedure(Procedure::external("lib::input", &[])).unwrap();
        program.add_procedure(calling("main", "lib::input", false)).unwrap();

        let mut cg = NameBasedCallGraph::new();
        assert_eq!(cg.init(&program), Err(CallGraphError::ProgramNotFinalized));

        program.finalize().unwrap();
        cg.init(&program).unwrap();
        assert_eq!(
            cg.resolve(&ProcedureId::new("main"), ExprId(1)).unwrap(),
            &[Resolution::Open(ProcedureId::new("lib::input"))]
        );
    }

    #[test]
    fn test_recursion_is_detected() {
        let program = finalized(vec![
            calling("even", "odd", false),
            calling("odd", "even", false),
            calling("loop", "loop", false),
            calling("main", "even", false),
        ]);
        let mut cg = NameBasedCallGraph::new();
        cg.init(&program).unwrap();

        assert!(cg.is_recursive(&ProcedureId::new("even")));
        assert!(cg.is_recursive(&ProcedureId::new("odd")));
        assert!(cg.is_recursive(&ProcedureId::new("loop")));
        assert!(!cg.is_recursive(&ProcedureId::new("main")));

        let position = |name: &str| {
            cg.sccs()
                .iter()
                .position(|scc| scc.contains(&ProcedureId::new(name)))
                .unwrap()
        };
        assert_eq!(position("even"), position("odd"));
        assert!(position("even") < position("main"));
    }
}
