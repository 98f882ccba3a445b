//! # absint-rs: abstract interpretation over control-flow graphs
//!
//! **`absint-rs`** is a static analysis engine. Programs are given as procedures whose bodies are
//! control-flow graphs (CFGs) of statements, and are analyzed by computing, for every node, a sound
//! over-approximation of the states that may reach it.
//!
//! ## Key Features
//!
//! - **Composable domains**: an [`AbstractState`][crate::state::AbstractState] pairs a heap domain
//!   (see [`heap`]) with a value domain, usually a non-relational
//!   [`Environment`][crate::environment::Environment] over a value lattice (see [`domains`]).
//! - **Two phases**: a type-inference fixpoint computes the runtime types of every expression,
//!   then the main analysis uses them to rule out impossible operand combinations.
//! - **Interprocedural**: calls are resolved by a [`CallGraph`][crate::callgraph::CallGraph] and
//!   analyzed with per-context summaries, recursion included.
//! - **Termination**: widening at loop heads, after a configurable number of updates, plus hard
//!   iteration budgets reported as errors.
//!
//! ## Basic Usage
//!
//! ```rust
//! use absint_rs::config::AnalysisConfig;
//! use absint_rs::domains::Interval;
//! use absint_rs::environment::Environment;
//! use absint_rs::heap::MonolithicHeap;
//! use absint_rs::program::{ProcedureBuilder, ProcedureId, Program, Statement};
//! use absint_rs::runner::AnalysisRunner;
//! use absint_rs::state::AbstractState;
//! use absint_rs::symbolic::{BinaryOperator, Identifier};
//! use absint_rs::types::TypeRegistry;
//!
//! // x = 2 * 3
//! let mut b = ProcedureBuilder::new("main");
//! let x = b.var("x");
//! let two = b.int(2);
//! let three = b.int(3);
//! let product = b.binary(BinaryOperator::Mul, two, three);
//! b.add_node(Statement::Assign { target: x, value: product });
//!
//! let mut program = Program::new();
//! program.add_procedure(b.build()).unwrap();
//!
//! let state = AbstractState::new(MonolithicHeap::Top, Environment::<Interval>::new());
//! let mut runner = AnalysisRunner::new(AnalysisConfig::default()).with_state(state);
//! let report = runner.run(&mut program, &mut TypeRegistry::new()).unwrap();
//!
//! let results = report.results.unwrap();
//! let main = results.joined(&ProcedureId::new("main")).unwrap();
//! let exit = main.exit_state();
//! assert_eq!(exit.state.value().get(&Identifier::variable("x")), Interval::constant(6));
//! ```
//!
//! ## Core Components
//!
//! - **[`lattice`]**, **[`domains`]**, **[`heap`]**, **[`state`]**: the abstract domains.
//! - **[`program`]**, **[`symbolic`]**: the analyzed program and the expressions domains reason on.
//! - **[`semantics`]**, **[`fixpoint`]**: statement semantics and the per-procedure fixpoint.
//! - **[`callgraph`]**, **[`interprocedural`]**: whole-program analysis.
//! - **[`runner`]**: the pipeline, from program finalization to checks.
//! - **[`checks`]**, **[`dot`]**: warnings and Graphviz dumps.

pub mod callgraph;
pub mod checks;
pub mod config;
pub mod domains;
pub mod dot;
pub mod environment;
pub mod error;
pub mod fixpoint;
pub mod heap;
pub mod interprocedural;
pub mod lattice;
pub mod program;
pub mod runner;
pub mod semantics;
pub mod state;
pub mod symbolic;
pub mod types;
