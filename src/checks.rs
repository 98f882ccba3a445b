//! Checks turning programs and analysis results into warnings.
//!
//! A [`SyntacticCheck`] inspects the program before any fixpoint runs; a [`SemanticCheck`] also
//! sees the converged [`CfgResults`] of every procedure, once per analyzed context. Both report
//! through a [`CheckTool`].

use std::fmt;

use crate::fixpoint::CfgResults;
use crate::heap::HeapDomain;
use crate::interprocedural::AnalysisResults;
use crate::program::{Node, NodeId, Procedure, ProcedureId, Program};
use crate::state::ValueDomain;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Warning {
    pub procedure: Option<ProcedureId>,
    pub node: Option<NodeId>,
    pub message: String,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.procedure, self.node) {
            (Some(p), Some(n)) => write!(f, "[{}:{}] {}", p, n, self.message),
            (Some(p), None) => write!(f, "[{}] {}", p, self.message),
            _ => write!(f, "{}", self.message),
        }
    }
}

/// Collects the warnings raised by checks.
#[derive(Debug, Clone, Default)]
pub struct CheckTool {
    warnings: Vec<Warning>,
}

impl CheckTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.push(None, None, message.into());
    }

    pub fn warn_on(&mut self, procedure: &ProcedureId, message: impl Into<String>) {
        self.push(Some(procedure.clone()), None, message.into());
    }

    pub fn warn_on_node(&mut self, procedure: &ProcedureId, node: NodeId, message: impl Into<String>) {
        self.push(Some(procedure.clone()), Some(node), message.into());
    }

    fn push(&mut self, procedure: Option<ProcedureId>, node: Option<NodeId>, message: String) {
        let warning = Warning {
            procedure,
            node,
            message,
        };
        log::debug!("Warning: {}", warning);
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Sorted, deduplicated warnings.
    pub fn into_warnings(mut self) -> Vec<Warning> {
        self.warnings.sort();
        self.warnings.dedup();
        self.warnings
    }
}

/// Check over the program structure.
pub trait SyntacticCheck {
    fn before_execution(&mut self, _tool: &mut CheckTool) {}

    fn visit_procedure(&mut self, _tool: &mut CheckTool, _procedure: &Procedure) {}

    fn visit_node(&mut self, tool: &mut CheckTool, procedure: &Procedure, node: &Node);

    fn after_execution(&mut self, _tool: &mut CheckTool) {}
}

/// Check over analysis results.
pub trait SemanticCheck<H, V> {
    fn before_execution(&mut self, _tool: &mut CheckTool) {}

    fn visit(&mut self, tool: &mut CheckTool, procedure: &Procedure, node: &Node, results: &CfgResults<H, V>);

    fn after_execution(&mut self, _tool: &mut CheckTool) {}
}

pub fn run_syntactic_checks(program: &Program, checks: &mut [Box<dyn SyntacticCheck>]) -> Vec<Warning> {
    let mut tool = CheckTool::new();
    for check in checks.iter_mut() {
        check.before_execution(&mut tool);
        for procedure in program.procedures() {
            check.visit_procedure(&mut tool, procedure);
            for node in procedure.nodes() {
                check.visit_node(&mut tool, procedure, node);
            }
        }
        check.after_execution(&mut tool);
    }
    tool.into_warnings()
}

/// Run `checks` on every reachable node of every analyzed procedure.
pub fn run_semantic_checks<H: HeapDomain, V: ValueDomain>(
    program: &Program,
    results: &AnalysisResults<H, V>,
    checks: &mut [Box<dyn SemanticCheck<H, V>>],
) -> Vec<Warning> {
    let mut tool = CheckTool::new();
    for check in checks.iter_mut() {
        check.before_execution(&mut tool);
        for procedure in program.procedures() {
            for cfg in results.results_of(procedure.id()) {
                for id in cfg.reachable_nodes() {
                    if let Some(node) = procedure.node(id) {
                        check.visit(&mut tool, procedure, node, cfg);
                    }
                }
            }
        }
        check.after_execution(&mut tool);
    }
    tool.into_warnings()
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::program::{ExpressionKind, ProcedureBuilder, Statement};
    use crate::symbolic::BinaryOperator;

    struct Divisions;

    impl SyntacticCheck for Divisions {
        fn visit_node(&mut self, tool: &mut CheckTool, procedure: &Procedure, node: &Node) {
            for expr in node.statement.expressions() {
                expr.walk(&mut |e| {
                    if let ExpressionKind::Binary { op: BinaryOperator::Div, .. } = e.kind {
                        tool.warn_on_node(procedure.id(), node.id, format!("division: {}", e));
                    }
                });
            }
        }
    }

    #[test]
    fn test_syntactic_check_reports_nodes() {
        let mut b = ProcedureBuilder::new("main");
        let x = b.var("x");
        let one = b.int(1);
        let y = b.var("y");
        let div = b.binary(BinaryOperator::Div, one, y);
        b.add_node(Statement::Assign { target: x, value: div });
        let mut program = Program::new();
        program.add_procedure(b.build()).unwrap();
        program.finalize().unwrap();

        let mut checks: Vec<Box<dyn SyntacticCheck>> = vec![Box::new(Divisions)];
        let warnings = run_syntactic_checks(&program, &mut checks);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].to_string(), "[main:n0] division: (1 / y)");
    }

    #[test]
    fn test_warnings_are_sorted_and_deduplicated() {
        let mut tool = CheckTool::new();
        let main = ProcedureId::new("main");
        tool.warn_on_node(&main, NodeId(2), "b");
        tool.warn_on_node(&main, NodeId(1), "a");
        tool.warn_on_node(&main, NodeId(2), "b");
        tool.warn("global");
        let warnings = tool.into_warnings();
        let rendered: Vec<String> = warnings.iter().map(|w| w.to_string()).collect();
        assert_eq!(rendered, vec!["global", "[main:n1] a", "[main:n2] b"]);
    }
}
