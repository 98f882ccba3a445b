//! The analysis pipeline.
//!
//! [`AnalysisRunner::run`] executes, in order:
//! 1. clearing of the types cache, finalization of the program and registration of its types;
//! 2. the optional dump of the input CFGs;
//! 3. syntactic checks;
//! 4. construction of the call graph;
//! 5. the optional type-inference fixpoint, whose per-expression runtime types are stored in the
//!    [`TypeRegistry`] for the operators of the main analysis;
//! 6. the main fixpoint and the optional dump of its results;
//! 7. semantic checks.
//!
//! Construction and fixpoint failures abort the run. Missing ingredients (no checks, no abstract
//! state for a phase) and dump failures only produce log warnings.

use std::time::Instant;

use crate::callgraph::{CallGraph, NameBasedCallGraph};
use crate::checks::{run_semantic_checks, run_syntactic_checks, SemanticCheck, SyntacticCheck, Warning};
use crate::config::AnalysisConfig;
use crate::domains::TypeEnvironment;
use crate::dot::{results_to_dot, DumpSink};
use crate::error::{AnalysisError, FixpointError, Phase};
use crate::heap::{HeapDomain, MonolithicHeap};
use crate::interprocedural::{AnalysisResults, ContextBasedAnalysis, InterproceduralAnalysis};
use crate::lattice::Lattice;
use crate::program::Program;
use crate::state::{AbstractState, ValueDomain};
use crate::types::{TypeRegistry, TypeSet};

/// Abstract state of the type-inference phase.
pub type TypeState = AbstractState<MonolithicHeap, TypeEnvironment>;

/// Everything a run produced.
#[derive(Debug)]
pub struct AnalysisReport<H, V> {
    pub warnings: Vec<Warning>,
    /// Results of the type-inference phase, if it ran.
    pub type_results: Option<AnalysisResults<MonolithicHeap, TypeEnvironment>>,
    /// Results of the main analysis, if it ran.
    pub results: Option<AnalysisResults<H, V>>,
}

pub struct AnalysisRunner<H, V> {
    config: AnalysisConfig,
    state: Option<AbstractState<H, V>>,
    type_state: Option<TypeState>,
    callgraph: Box<dyn CallGraph>,
    syntactic_checks: Vec<Box<dyn SyntacticCheck>>,
    semantic_checks: Vec<Box<dyn SemanticCheck<H, V>>>,
    sink: Option<Box<dyn DumpSink>>,
}

impl<H: HeapDomain, V: ValueDomain> AnalysisRunner<H, V> {
    /// Runner with a name-based call graph and the default type-inference state, but no state for
    /// the main analysis.
    pub fn new(config: AnalysisConfig) -> Self {
        AnalysisRunner {
            config,
            state: None,
            type_state: Some(AbstractState::new(MonolithicHeap::Top, TypeEnvironment::new())),
            callgraph: Box::new(NameBasedCallGraph::new()),
            syntactic_checks: Vec::new(),
            semantic_checks: Vec::new(),
            sink: None,
        }
    }

    /// Entry state of the main analysis.
    pub fn with_state(mut self, state: AbstractState<H, V>) -> Self {
        self.state = Some(state);
        self
    }

    /// Entry state of the type-inference phase; `None` skips the phase.
    pub fn with_type_state(mut self, state: Option<TypeState>) -> Self {
        self.type_state = state;
        self
    }

    pub fn with_call_graph(mut self, callgraph: Box<dyn CallGraph>) -> Self {
        self.callgraph = callgraph;
        self
    }

    pub fn with_syntactic_check(mut self, check: Box<dyn SyntacticCheck>) -> Self {
        self.syntactic_checks.push(check);
        self
    }

    pub fn with_semantic_check(mut self, check: Box<dyn SemanticCheck<H, V>>) -> Self {
        self.semantic_checks.push(check);
        self
    }

    pub fn with_dump_sink(mut self, sink: Box<dyn DumpSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    fn dump(&mut self, name: &str, contents: Result<String, std::fmt::Error>) {
        let Some(sink) = self.sink.as_mut() else {
            log::warn!("Dump of '{}' requested, but no dump sink is configured", name);
            return;
        };
        let result = match contents {
            Ok(contents) => sink.dump(name, &contents),
            Err(e) => Err(std::io::Error::other(e)),
        };
        if let Err(e) = result {
            log::error!("Exception while dumping '{}': {}", name, e);
        }
    }

    fn dump_results<H2: HeapDomain, V2: ValueDomain>(
        &mut self,
        program: &Program,
        results: &AnalysisResults<H2, V2>,
        prefix: &str,
    ) {
        for procedure in program.procedures() {
            for (i, cfg) in results.results_of(procedure.id()).iter().enumerate() {
                let name = format!("{}{}_{}", prefix, procedure.id(), i);
                self.dump(&name, results_to_dot(procedure, cfg));
            }
        }
    }

    /// Store the joined runtime types of every evaluated expression in `registry`.
    fn propagate_types(
        program: &Program,
        results: &AnalysisResults<MonolithicHeap, TypeEnvironment>,
        registry: &mut TypeRegistry,
    ) -> Result<(), AnalysisError> {
        for procedure in program.procedures().filter(|p| !p.is_open()) {
            let Some(joined) = results.joined(procedure.id()) else {
                log::warn!("No type information for '{}': it is never reached", procedure.id());
                continue;
            };
            for (expr, state) in joined.expression_states() {
                if state.is_bottom() {
                    continue;
                }
                let mut types = TypeSet::bottom();
                for computed in state.computed.iter() {
                    let inferred = state.state.value().eval(computed).map_err(|source| AnalysisError::TypePropagation {
                        procedure: procedure.id().clone(),
                        source,
                    })?;
                    types = types.lub(&inferred);
                }
                registry.set_runtime_types(procedure.id(), expr, types);
            }
        }
        Ok(())
    }

    fn fixpoint_failure(phase: Phase, source: FixpointError) -> AnalysisError {
        log::error!("Exception during fixpoint computation ({}): {}", phase, source);
        AnalysisError::Fixpoint { phase, source }
    }

    pub fn run(&mut self, program: &mut Program, registry: &mut TypeRegistry) -> Result<AnalysisReport<H, V>, AnalysisError> {
        self.config.validate()?;
        let mut warnings = Vec::new();
        registry.clear();

        let start = Instant::now();
        log::info!("Finalizing input program");
        program.finalize()?;
        registry.register_types(program.registered_types().iter().copied());
        log::info!("Finalized input program in {:?}", start.elapsed());

        if self.config.dump_cfgs {
            for procedure in program.procedures().filter(|p| !p.is_open()) {
                self.dump(procedure.id().as_str(), procedure.to_dot());
            }
        }

        if self.syntactic_checks.is_empty() {
            log::warn!("There are no syntactic checks to execute");
        } else {
            warnings.extend(run_syntactic_checks(program, &mut self.syntactic_checks));
        }

        log::info!("Building the call graph");
        self.callgraph.init(program)?;

        let analysis = ContextBasedAnalysis::new();
        let mut type_results = None;
        if !self.config.infer_types {
            log::warn!("Type inference disabled: operands of the analysis are untyped");
        } else if let Some(type_state) = &self.type_state {
            let start = Instant::now();
            log::info!("Computing type information");
            let results = analysis
                .fixpoint(program, self.callgraph.as_ref(), registry, &self.config, type_state)
                .map_err(|e| Self::fixpoint_failure(Phase::TypeInference, e))?;
            Self::propagate_types(program, &results, registry)?;
            log::info!(
                "Computed type information in {:?} ({} typed expressions)",
                start.elapsed(),
                registry.runtime_types_len()
            );
            if self.config.dump_type_inference {
                self.dump_results(program, &results, "typing_");
            }
            type_results = Some(results);
        } else {
            log::warn!("No abstract state for type inference: the phase is skipped");
        }

        let mut results = None;
        if let Some(state) = &self.state {
            let start = Instant::now();
            log::info!("Computing fixpoint over the whole program");
            let main = analysis
                .fixpoint(program, self.callgraph.as_ref(), registry, &self.config, state)
                .map_err(|e| Self::fixpoint_failure(Phase::Analysis, e))?;
            log::info!("Computed fixpoint in {:?}", start.elapsed());
            if self.config.dump_analysis {
                self.dump_results(program, &main, "analysis_");
            }
            results = Some(main);
        } else {
            log::warn!("No abstract state to run the analysis: the phase is skipped");
        }

        if self.semantic_checks.is_empty() {
            log::warn!("There are no semantic checks to execute");
        } else if let Some(results) = &results {
            warnings.extend(run_semantic_checks(program, results, &mut self.semantic_checks));
        } else {
            log::warn!("Semantic checks skipped: no analysis results");
        }

        Ok(AnalysisReport {
            warnings,
            type_results,
            results,
        })
    }
}
