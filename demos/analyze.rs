//! Interval analysis of a small built-in program, with a division-by-zero check.
//!
//! ```text
//! scale(v) { return v * 2 }
//!
//! main() {
//!     i = 0
//!     while (i < bound) { i = i + 1 }
//!     q = 100 / i
//!     k = scale(i)
//!     r = 100 / (k - 2 * bound)
//! }
//! ```

use std::path::PathBuf;

use clap::Parser;

use absint_rs::checks::{CheckTool, SemanticCheck};
use absint_rs::config::{AnalysisConfig, ContextSensitivity, WorkingSetKind};
use absint_rs::domains::Interval;
use absint_rs::dot::DirectorySink;
use absint_rs::environment::Environment;
use absint_rs::fixpoint::CfgResults;
use absint_rs::heap::MonolithicHeap;
use absint_rs::lattice::Lattice;
use absint_rs::program::{EdgeKind, ExpressionKind, Node, Procedure, ProcedureBuilder, ProcedureId, Program, Statement};
use absint_rs::runner::AnalysisRunner;
use absint_rs::state::AbstractState;
use absint_rs::symbolic::{BinaryOperator, Identifier};
use absint_rs::types::TypeRegistry;

type Env = Environment<Interval>;

#[derive(Debug, Parser)]
#[command(author, version)]
struct Cli {
    /// Loop bound.
    #[arg(value_name = "INT", default_value = "10")]
    bound: i64,

    /// Number of updates of a loop head before widening.
    #[clap(long, value_name = "INT", default_value = "5")]
    widening_threshold: usize,

    /// Process the working set in LIFO order.
    #[clap(long)]
    lifo: bool,

    /// Analyze each call site in its own context.
    #[clap(long)]
    call_site: bool,

    /// Disable the type-inference phase.
    #[clap(long)]
    no_types: bool,

    /// Directory receiving DOT dumps of the CFGs and of the results.
    #[clap(long, value_name = "DIR")]
    dump: Option<PathBuf>,
}

/// Warns on divisions whose divisor may be zero.
struct DivisionByZero;

impl SemanticCheck<MonolithicHeap, Env> for DivisionByZero {
    fn visit(&mut self, tool: &mut CheckTool, procedure: &Procedure, node: &Node, results: &CfgResults<MonolithicHeap, Env>) {
        for expr in node.statement.expressions() {
            expr.walk(&mut |e| {
                let ExpressionKind::Binary { op: BinaryOperator::Div, right, .. } = &e.kind else {
                    return;
                };
                let Some(divisor) = results.state_after_expression(right.id) else {
                    return;
                };
                for computed in divisor.computed.iter() {
                    if let Ok(value) = divisor.state.value().eval(computed) {
                        if value.contains(0) {
                            tool.warn_on_node(procedure.id(), node.id, format!("divisor {} may be zero: {}", right, value));
                        }
                    }
                }
            });
        }
    }
}

fn build_program(bound: i64) -> color_eyre::Result<Program> {
    let mut scale = ProcedureBuilder::new("scale");
    scale.param("v");
    let v = scale.var("v");
    let two = scale.int(2);
    let product = scale.binary(BinaryOperator::Mul, v, two);
    scale.add_node(Statement::Return(Some(product)));

    let mut b = ProcedureBuilder::new("main");
    let i = b.var("i");
    let zero = b.int(0);
    let init = b.add_node(Statement::Assign { target: i, value: zero });

    let i = b.var("i");
    let limit = b.int(bound);
    let cmp = b.binary(BinaryOperator::Lt, i, limit);
    let head = b.add_node(Statement::Condition(cmp));

    let i = b.var("i");
    let i_rhs = b.var("i");
    let one = b.int(1);
    let inc = b.binary(BinaryOperator::Add, i_rhs, one);
    let body = b.add_node(Statement::Assign { target: i, value: inc });

    let q = b.var("q");
    let hundred = b.int(100);
    let i = b.var("i");
    let div = b.binary(BinaryOperator::Div, hundred, i);
    let quotient = b.add_node(Statement::Assign { target: q, value: div });

    let k = b.var("k");
    let i = b.var("i");
    let call = b.call("scale", vec![i]);
    let scaled = b.add_node(Statement::Assign { target: k, value: call });

    let r = b.var("r");
    let hundred = b.int(100);
    let k = b.var("k");
    let two = b.int(2);
    let limit = b.int(bound);
    let double = b.binary(BinaryOperator::Mul, two, limit);
    let diff = b.binary(BinaryOperator::Sub, k, double);
    let div = b.binary(BinaryOperator::Div, hundred, diff);
    let rest = b.add_node(Statement::Assign { target: r, value: div });

    b.add_edge(init, head, EdgeKind::Sequential);
    b.branch(head, body, quotient);
    b.add_edge(body, head, EdgeKind::Sequential);
    b.sequence(&[quotient, scaled, rest]);

    let mut program = Program::new();
    program.add_procedure(scale.build())?;
    program.add_procedure(b.build())?;
    program.add_entry_point("main")?;
    Ok(program)
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let time_total = std::time::Instant::now();

    let args = Cli::parse();
    println!("args = {:?}", args);

    let dumping = args.dump.is_some();
    let config = AnalysisConfig::default()
        .with_type_inference(!args.no_types)
        .with_widening_threshold(args.widening_threshold)
        .with_working_set(if args.lifo { WorkingSetKind::Lifo } else { WorkingSetKind::Fifo })
        .with_context_sensitivity(if args.call_site {
            ContextSensitivity::CallSite
        } else {
            ContextSensitivity::Insensitive
        })
        .with_dumps(dumping, dumping, dumping);

    let mut runner = AnalysisRunner::new(config)
        .with_state(AbstractState::new(MonolithicHeap::Top, Env::new()))
        .with_semantic_check(Box::new(DivisionByZero));
    if let Some(dir) = args.dump {
        runner = runner.with_dump_sink(Box::new(DirectorySink::new(dir)));
    }

    let mut program = build_program(args.bound)?;
    let mut registry = TypeRegistry::new();
    let report = runner.run(&mut program, &mut registry)?;

    if let Some(results) = &report.results {
        for id in [ProcedureId::new("main"), ProcedureId::new("scale")] {
            let Some(cfg) = results.joined(&id) else {
                println!("{}: unreachable", id);
                continue;
            };
            let exit = cfg.exit_state();
            println!("{} (after {} iterations):", id, cfg.iterations());
            for var in ["i", "q", "k", "r", "v"] {
                let value = exit.state.value().get(&Identifier::variable(var));
                if !value.is_top() {
                    println!("  {} = {}", var, value);
                }
            }
        }
    }

    println!("{} warning(s)", report.warnings.len());
    for warning in &report.warnings {
        println!("- {}", warning);
    }

    println!("Done in {:.3} s", time_total.elapsed().as_secs_f64());
    Ok(())
}
