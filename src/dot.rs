//! CFG to DOT (Graphviz) conversion, and sinks receiving the dumps.
//!
//! The generated DOT output follows these conventions:
//! - **Nodes** are boxes labelled with their statement, optionally followed by extra text (the
//!   abstract states of an analysis, for instance)
//! - The **entry node** is drawn with a bold double border
//! - **Loop heads** (where the fixpoint widens) are filled
//! - **Edges**:
//!   - Sequential edges are plain arrows
//!   - True edges are solid green
//!   - False edges are dashed red
//!
//! # Examples
//!
//! ```
//! use absint_rs::program::{ProcedureBuilder, Program, ProcedureId, Statement};
//!
//! let mut b = ProcedureBuilder::new("main");
//! b.add_node(Statement::Skip);
//! let mut program = Program::new();
//! program.add_procedure(b.build()).unwrap();
//! program.finalize().unwrap();
//!
//! let main = program.procedure(&ProcedureId::new("main")).unwrap();
//! let dot = main.to_dot().unwrap();
//! assert!(dot.starts_with("digraph \"main\" {"));
//! // Render with: dot -Tpng main.dot -o main.png
//! ```

use std::fmt::Write as _;
use std::path::PathBuf;

use crate::fixpoint::CfgResults;
use crate::heap::HeapDomain;
use crate::program::{EdgeKind, NodeId, Procedure};
use crate::state::ValueDomain;

/// Configuration options for DOT output generation.
#[derive(Debug, Clone)]
pub struct DotConfig {
    /// Shape for nodes (default: "box")
    pub node_shape: &'static str,
    /// Fill color of loop heads (default: "lightgrey")
    pub loop_head_color: &'static str,
    /// Style for true edges (default: "solid")
    pub true_edge_style: &'static str,
    /// Color of true edges (default: "darkgreen")
    pub true_edge_color: &'static str,
    /// Style for false edges (default: "dashed")
    pub false_edge_style: &'static str,
    /// Color of false edges (default: "red")
    pub false_edge_color: &'static str,
}

impl Default for DotConfig {
    fn default() -> Self {
        Self {
            node_shape: "box",
            loop_head_color: "lightgrey",
            true_edge_style: "solid",
            true_edge_color: "darkgreen",
            false_edge_style: "dashed",
            false_edge_color: "red",
        }
    }
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\l"),
            c => escaped.push(c),
        }
    }
    escaped
}

impl Procedure {
    pub fn to_dot(&self) -> Result<String, std::fmt::Error> {
        self.to_dot_with_labels(&DotConfig::default(), |_| None)
    }

    /// Render the CFG, appending `labels(node)` (if any) below each statement.
    pub fn to_dot_with_labels(
        &self,
        config: &DotConfig,
        labels: impl Fn(NodeId) -> Option<String>,
    ) -> Result<String, std::fmt::Error> {
        let mut dot = String::new();
        writeln!(dot, "digraph \"{}\" {{", escape(self.id().as_str()))?;
        writeln!(dot, "node [shape={}, fontname=monospace];", config.node_shape)?;

        for node in self.nodes() {
            let mut label = format!("{}: {}", node.id, node.statement);
            if let Some(extra) = labels(node.id) {
                label.push('\n');
                label.push_str(&extra);
            }
            let mut attrs = format!("label=\"{}\\l\"", escape(&label));
            let mut styles = Vec::new();
            if node.id == self.entry() {
                attrs.push_str(", peripheries=2");
                styles.push("bold");
            }
            if self.is_loop_head(node.id) {
                write!(attrs, ", fillcolor={}", config.loop_head_color)?;
                styles.push("filled");
            }
            if !styles.is_empty() {
                write!(attrs, ", style=\"{}\"", styles.join(","))?;
            }
            writeln!(dot, "{} [{}];", node.id, attrs)?;
        }

        for edge in self.edges() {
            match edge.kind {
                EdgeKind::Sequential => writeln!(dot, "{} -> {};", edge.from, edge.to)?,
                EdgeKind::True => writeln!(
                    dot,
                    "{} -> {} [style={}, color={}];",
                    edge.from, edge.to, config.true_edge_style, config.true_edge_color
                )?,
                EdgeKind::False => writeln!(
                    dot,
                    "{} -> {} [style={}, color={}];",
                    edge.from, edge.to, config.false_edge_style, config.false_edge_color
                )?,
            }
        }

        writeln!(dot, "}}")?;
        Ok(dot)
    }
}

/// Render the CFG of `procedure`, labelling each node with the states before and after it.
pub fn results_to_dot<H: HeapDomain, V: ValueDomain>(
    procedure: &Procedure,
    results: &CfgResults<H, V>,
) -> Result<String, std::fmt::Error> {
    procedure.to_dot_with_labels(&DotConfig::default(), |node| {
        let before = results.state_before(node)?;
        let after = results.state_after(node)?;
        Some(format!("pre: {}\npost: {}", before.state, after.state))
    })
}

/// Receiver of textual dumps.
pub trait DumpSink {
    fn dump(&mut self, name: &str, contents: &str) -> std::io::Result<()>;
}

/// Writes each dump to `<directory>/<name>.dot`.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    directory: PathBuf,
}

impl DirectorySink {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        DirectorySink {
            directory: directory.into(),
        }
    }

    fn file_name(name: &str) -> String {
        let stem: String = name
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
            .collect();
        format!("{}.dot", stem)
    }
}

impl DumpSink for DirectorySink {
    fn dump(&mut self, name: &str, contents: &str) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.directory)?;
        let path = self.directory.join(Self::file_name(name));
        log::debug!("Writing {}", path.display());
        std::fs::write(path, contents)
    }
}

/// Keeps dumps in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub dumps: Vec<(String, String)>,
}

impl DumpSink for MemorySink {
    fn dump(&mut self, name: &str, contents: &str) -> std::io::Result<()> {
        self.dumps.push((name.to_string(), contents.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::program::{ProcedureBuilder, ProcedureId, Program, Statement};
    use crate::symbolic::BinaryOperator;

    fn branching() -> Program {
        let mut b = ProcedureBuilder::new("A::run");
        let x = b.var("x");
        let zero = b.int(0);
        let cmp = b.binary(BinaryOperator::Lt, x, zero);
        let cond = b.add_node(Statement::Condition(cmp));
        let then = b.add_node(Statement::Skip);
        let other = b.add_node(Statement::Return(None));
        b.branch(cond, then, other);
        b.add_edge(then, cond, EdgeKind::Sequential);
        let mut program = Program::new();
        program.add_procedure(b.build()).unwrap();
        program.finalize().unwrap();
        program
    }

    #[test]
    fn test_to_dot_edges_and_nodes() {
        let program = branching();
        let run = program.procedure(&ProcedureId::new("A::run")).unwrap();
        let dot = run.to_dot().unwrap();

        assert!(dot.starts_with("digraph \"A::run\" {"));
        assert!(dot.ends_with("}\n"));
        assert!(dot.contains("n0 -> n1 [style=solid, color=darkgreen];"));
        assert!(dot.contains("n0 -> n2 [style=dashed, color=red];"));
        assert!(dot.contains("n1 -> n0;"));
        // The entry is also the loop head.
        assert!(dot.contains("peripheries=2"));
        assert!(dot.contains("fillcolor=lightgrey"));
    }

    #[test]
    fn test_labels_are_escaped() {
        let program = branching();
        let run = program.procedure(&ProcedureId::new("A::run")).unwrap();
        let dot = run
            .to_dot_with_labels(&DotConfig::default(), |n| (n == NodeId(1)).then(|| "say \"hi\"".to_string()))
            .unwrap();
        assert!(dot.contains("say \\\"hi\\\""));
    }

    #[test]
    fn test_sinks() {
        let mut memory = MemorySink::default();
        memory.dump("main", "digraph {}").unwrap();
        assert_eq!(memory.dumps, vec![("main".to_string(), "digraph {}".to_string())]);

        assert_eq!(DirectorySink::file_name("A::run"), "A__run.dot");
    }
}
