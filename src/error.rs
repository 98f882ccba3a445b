//! Error taxonomy of the analysis engine.
//!
//! Only genuine faults are errors. Reaching erroneous or unreachable code (for example a definite type
//! mismatch on an operator) is modelled by a `Bottom` abstract state instead.

use thiserror::Error;

use crate::program::{NodeId, ProcedureId};

/// Invalid configuration values, detected before anything runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("widening threshold must be a positive integer")]
    ZeroWideningThreshold,
    #[error("the `{0}` budget must be a positive integer")]
    ZeroBudget(&'static str),
}

/// Failures while validating and finalizing a program.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgramError {
    #[error("procedure '{0}' is defined more than once")]
    DuplicateProcedure(ProcedureId),
    #[error("procedure '{0}' has no nodes")]
    EmptyProcedure(ProcedureId),
    #[error("entry node {node} of '{procedure}' does not exist")]
    MissingEntry { procedure: ProcedureId, node: NodeId },
    #[error("edge {from} -> {to} of '{procedure}' references a missing node")]
    DanglingEdge { procedure: ProcedureId, from: NodeId, to: NodeId },
    #[error("branch node {node} of '{procedure}' must have exactly one true and one false edge")]
    MalformedBranch { procedure: ProcedureId, node: NodeId },
    #[error("node {node} of '{procedure}' is not a branch but has branch-labelled outgoing edges")]
    UnexpectedBranchEdge { procedure: ProcedureId, node: NodeId },
    #[error("entry point '{0}' is not a procedure of the program")]
    UnknownEntryPoint(ProcedureId),
    #[error("program is finalized and cannot be modified")]
    AlreadyFinalized,
}

/// Failures while building or querying the call graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallGraphError {
    #[error("call to '{target}' in '{caller}' cannot be resolved")]
    UnresolvedCall { caller: ProcedureId, target: String },
    #[error("call graph queried before being initialized")]
    NotInitialized,
    #[error("program must be finalized before building its call graph")]
    ProgramNotFinalized,
}

/// Domain-level semantic faults raised while applying transfer functions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SemanticError {
    #[error("heap expression '{0}' reached a value domain without being rewritten")]
    UnrewrittenHeapExpression(String),
    #[error("heap expression '{0}' is not supported by the heap domain")]
    UnsupportedHeapExpression(String),
    #[error("'{0}' cannot be the target of an assignment")]
    InvalidAssignmentTarget(String),
    #[error("no call handler is available to evaluate the call to '{0}'")]
    NoCallHandler(String),
    #[error("call at node {node} of '{caller}' was not registered in the call graph")]
    UnknownCallSite { caller: ProcedureId, node: NodeId },
}

/// Failures of a fixpoint computation, either per CFG or at the call-graph level.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FixpointError {
    #[error("semantic fault at node {node} of '{procedure}'")]
    Semantic {
        procedure: ProcedureId,
        node: NodeId,
        #[source]
        source: SemanticError,
    },
    #[error("fixpoint over '{procedure}' did not converge within {iterations} iterations")]
    NonTermination { procedure: ProcedureId, iterations: usize },
    #[error("working set of '{procedure}' exceeded {limit} pending nodes")]
    WorkingSetOverflow { procedure: ProcedureId, limit: usize },
    #[error("interprocedural fixpoint did not converge within {iterations} procedure runs")]
    InterproceduralNonTermination { iterations: usize },
    #[error("call graph query failed")]
    CallGraph(#[from] CallGraphError),
}

/// Phase of the analysis pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    TypeInference,
    Analysis,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::TypeInference => write!(f, "type inference"),
            Phase::Analysis => write!(f, "analysis"),
        }
    }
}

/// The single terminating failure of an analysis run.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("invalid analysis configuration")]
    Configuration(#[from] ConfigError),
    #[error("unable to finalize target program")]
    Finalization(#[from] ProgramError),
    #[error("exception while building the call graph for the input program")]
    CallGraph(#[from] CallGraphError),
    #[error("exception during fixpoint computation ({phase})")]
    Fixpoint {
        phase: Phase,
        #[source]
        source: FixpointError,
    },
    #[error("unable to compute type information for '{procedure}'")]
    TypePropagation {
        procedure: ProcedureId,
        #[source]
        source: SemanticError,
    },
}
