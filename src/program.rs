//! Control-flow graph representation of analyzed programs.
//!
//! A [`Program`] is a set of [`Procedure`]s. Every procedure is a graph of [`Node`]s, each holding
//! one [`Statement`], connected by [`Edge`]s labelled with an [`EdgeKind`]. Programs are built by a
//! front end (or by hand, with [`ProcedureBuilder`]) and then [finalized][Program::finalize], which
//! validates the graphs and freezes them for the analysis.
//!
//! # Examples
//!
//! ```
//! use absint_rs::program::{EdgeKind, ProcedureBuilder, Program, Statement};
//! use absint_rs::symbolic::BinaryOperator;
//!
//! let mut b = ProcedureBuilder::new("main");
//! let x = b.var("x");
//! let two = b.int(2);
//! let three = b.int(3);
//! let product = b.binary(BinaryOperator::Mul, two, three);
//! let assign = b.add_node(Statement::Assign { target: x, value: product });
//! let ret = b.add_node(Statement::Return(None));
//! b.add_edge(assign, ret, EdgeKind::Sequential);
//!
//! let mut program = Program::new();
//! program.add_procedure(b.build()).unwrap();
//! program.finalize().unwrap();
//! assert!(program.is_finalized());
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::ProgramError;
use crate::symbolic::{BinaryOperator, Constant, TernaryOperator, UnaryOperator};
use crate::types::Type;

/// Unique name of a procedure, optionally qualified by its unit (`Unit::method`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcedureId(String);

impl ProcedureId {
    pub fn new(name: impl Into<String>) -> Self {
        ProcedureId(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the procedure without its unit qualifier.
    pub fn method_name(&self) -> &str {
        match self.0.rfind("::") {
            Some(pos) => &self.0[pos + 2..],
            None => &self.0,
        }
    }
}

impl fmt::Display for ProcedureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProcedureId {
    fn from(name: &str) -> Self {
        ProcedureId::new(name)
    }
}

/// Index of a node inside its procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Identifier of a surface expression, unique inside its procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExprId(pub usize);

impl fmt::Display for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Kind of a control-flow edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EdgeKind {
    Sequential,
    True,
    False,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    pub kind: EdgeKind,
}

/// How a call names its callee.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CallTarget {
    /// Fully qualified procedure name, resolved to exactly one procedure.
    Static(ProcedureId),
    /// Unqualified method name, resolved to every procedure with that name and arity.
    Dynamic(String),
}

impl fmt::Display for CallTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallTarget::Static(id) => write!(f, "{}", id),
            CallTarget::Dynamic(name) => write!(f, "?::{}", name),
        }
    }
}

/// Surface expression, as produced by a front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression {
    pub id: ExprId,
    pub kind: ExpressionKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpressionKind {
    Literal(Constant),
    Variable(String),
    Unary {
        op: UnaryOperator,
        arg: Box<Expression>,
    },
    Binary {
        op: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Ternary {
        op: TernaryOperator,
        first: Box<Expression>,
        second: Box<Expression>,
        third: Box<Expression>,
    },
    Call {
        target: CallTarget,
        args: Vec<Expression>,
    },
    /// Allocation of a new object at the named allocation site.
    New(String),
    Deref(Box<Expression>),
}

impl Expression {
    /// Visit this expression and all its sub-expressions, children first.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Expression)) {
        match &self.kind {
            ExpressionKind::Literal(_) | ExpressionKind::Variable(_) | ExpressionKind::New(_) => {}
            ExpressionKind::Unary { arg, .. } => arg.walk(f),
            ExpressionKind::Binary { left, right, .. } => {
                left.walk(f);
                right.walk(f);
            }
            ExpressionKind::Ternary { first, second, third, .. } => {
                first.walk(f);
                second.walk(f);
                third.walk(f);
            }
            ExpressionKind::Call { args, .. } => {
                for arg in args {
                    arg.walk(f);
                }
            }
            ExpressionKind::Deref(inner) => inner.walk(f),
        }
        f(self);
    }

    /// Static type of a literal, `None` for any other expression.
    pub fn literal_type(&self) -> Option<Type> {
        match &self.kind {
            ExpressionKind::Literal(c) => Some(c.static_type()),
            _ => None,
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExpressionKind::Literal(c) => write!(f, "{}", c),
            ExpressionKind::Variable(name) => write!(f, "{}", name),
            ExpressionKind::Unary { op, arg } => write!(f, "{}({})", op, arg),
            ExpressionKind::Binary { op, left, right } => write!(f, "({} {} {})", left, op, right),
            ExpressionKind::Ternary { op, first, second, third } => {
                write!(f, "{}({}, {}, {})", op, first, second, third)
            }
            ExpressionKind::Call { target, args } => {
                write!(f, "{}(", target)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            ExpressionKind::New(site) => write!(f, "new {}", site),
            ExpressionKind::Deref(inner) => write!(f, "*{}", inner),
        }
    }
}

/// Statement held by a CFG node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Assign { target: Expression, value: Expression },
    /// Branch condition: the node must have one `True` and one `False` outgoing edge.
    Condition(Expression),
    Expr(Expression),
    Return(Option<Expression>),
    Skip,
}

impl Statement {
    /// Top-level expressions of this statement.
    pub fn expressions(&self) -> Vec<&Expression> {
        match self {
            Statement::Assign { target, value } => vec![target, value],
            Statement::Condition(e) | Statement::Expr(e) | Statement::Return(Some(e)) => vec![e],
            Statement::Return(None) | Statement::Skip => vec![],
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Assign { target, value } => write!(f, "{} = {}", target, value),
            Statement::Condition(e) => write!(f, "if {}", e),
            Statement::Expr(e) => write!(f, "{}", e),
            Statement::Return(Some(e)) => write!(f, "return {}", e),
            Statement::Return(None) => write!(f, "return"),
            Statement::Skip => write!(f, "skip"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub statement: Statement,
}

/// A procedure: either a CFG with a single entry node, or an open (external) procedure without body.
#[derive(Debug, Clone)]
pub struct Procedure {
    id: ProcedureId,
    params: Vec<String>,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    entry: NodeId,
    open: bool,
    successors: Vec<Vec<(NodeId, EdgeKind)>>,
    predecessors: Vec<Vec<NodeId>>,
    loop_heads: BTreeSet<NodeId>,
}

impl Procedure {
    /// Declare a procedure whose body is not available. Calls to it are open calls.
    pub fn external(id: impl Into<String>, params: &[&str]) -> Self {
        Procedure {
            id: ProcedureId::new(id),
            params: params.iter().map(|p| p.to_string()).collect(),
            nodes: Vec::new(),
            edges: Vec::new(),
            entry: NodeId(0),
            open: true,
            successors: Vec::new(),
            predecessors: Vec::new(),
            loop_heads: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> &ProcedureId {
        &self.id
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn entry(&self) -> NodeId {
        self.entry
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn successors(&self, id: NodeId) -> &[(NodeId, EdgeKind)] {
        self.successors.get(id.0).map(|s| s.as_slice()).unwrap_or(&[])
    }

    pub fn predecessors(&self, id: NodeId) -> &[NodeId] {
        self.predecessors.get(id.0).map(|p| p.as_slice()).unwrap_or(&[])
    }

    /// Targets of back edges, where the fixpoint applies widening.
    pub fn loop_heads(&self) -> &BTreeSet<NodeId> {
        &self.loop_heads
    }

    pub fn is_loop_head(&self, id: NodeId) -> bool {
        self.loop_heads.contains(&id)
    }

    /// Nodes without successors; their exit states form the procedure's exit state.
    pub fn exit_nodes(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .map(|n| n.id)
            .filter(|&id| self.successors(id).is_empty())
            .collect()
    }

    /// All call expressions of the procedure, with the node that contains them.
    pub fn calls(&self) -> Vec<(NodeId, &Expression)> {
        let mut calls = Vec::new();
        for node in &self.nodes {
            for expr in node.statement.expressions() {
                expr.walk(&mut |e| {
                    if matches!(e.kind, ExpressionKind::Call { .. }) {
                        calls.push((node.id, e));
                    }
                });
            }
        }
        calls
    }

    fn validate(&mut self) -> Result<(), ProgramError> {
        if self.open {
            return Ok(());
        }
        if self.nodes.is_empty() {
            return Err(ProgramError::EmptyProcedure(self.id.clone()));
        }
        if self.node(self.entry).is_none() {
            return Err(ProgramError::MissingEntry {
                procedure: self.id.clone(),
                node: self.entry,
            });
        }

        let n = self.nodes.len();
        let mut successors = vec![Vec::new(); n];
        let mut predecessors = vec![Vec::new(); n];
        for edge in &self.edges {
            if edge.from.0 >= n || edge.to.0 >= n {
                return Err(ProgramError::DanglingEdge {
                    procedure: self.id.clone(),
                    from: edge.from,
                    to: edge.to,
                });
            }
            successors[edge.from.0].push((edge.to, edge.kind));
            predecessors[edge.to.0].push(edge.from);
        }

        for node in &self.nodes {
            let out = &successors[node.id.0];
            let trues = out.iter().filter(|(_, k)| *k == EdgeKind::True).count();
            let falses = out.iter().filter(|(_, k)| *k == EdgeKind::False).count();
            if matches!(node.statement, Statement::Condition(_)) {
                if trues != 1 || falses != 1 || out.len() != 2 {
                    return Err(ProgramError::MalformedBranch {
                        procedure: self.id.clone(),
                        node: node.id,
                    });
                }
            } else if trues + falses > 0 {
                return Err(ProgramError::UnexpectedBranchEdge {
                    procedure: self.id.clone(),
                    node: node.id,
                });
            }
        }

        self.loop_heads = back_edge_targets(self.entry, &successors);
        self.successors = successors;
        self.predecessors = predecessors;
        Ok(())
    }
}

/// Targets of DFS back edges reachable from `entry`.
fn back_edge_targets(entry: NodeId, successors: &[Vec<(NodeId, EdgeKind)>]) -> BTreeSet<NodeId> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        White,
        Grey,
        Black,
    }

    let mut heads = BTreeSet::new();
    let mut marks = vec![Mark::White; successors.len()];
    // Explicit stack of (node, index of the next successor to visit).
    let mut stack = vec![(entry, 0usize)];
    marks[entry.0] = Mark::Grey;

    while let Some((node, next)) = stack.last_mut() {
        let node = *node;
        if let Some(&(succ, _)) = successors[node.0].get(*next) {
            *next += 1;
            match marks[succ.0] {
                Mark::White => {
                    marks[succ.0] = Mark::Grey;
                    stack.push((succ, 0));
                }
                Mark::Grey => {
                    heads.insert(succ);
                }
                Mark::Black => {}
            }
        } else {
            marks[node.0] = Mark::Black;
            stack.pop();
        }
    }

    heads
}

/// Incremental construction of a [`Procedure`].
///
/// Expressions built through the builder receive fresh [`ExprId`]s, unique inside the procedure.
#[derive(Debug, Clone)]
pub struct ProcedureBuilder {
    id: ProcedureId,
    params: Vec<String>,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    entry: Option<NodeId>,
    next_expr: usize,
}

impl ProcedureBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        ProcedureBuilder {
            id: ProcedureId::new(id),
            params: Vec::new(),
            nodes: Vec::new(),
            edges: Vec::new(),
            entry: None,
            next_expr: 0,
        }
    }

    pub fn param(&mut self, name: impl Into<String>) -> &mut Self {
        self.params.push(name.into());
        self
    }

    /// Add a node; the first node added is the entry unless [`set_entry`][Self::set_entry] is used.
    pub fn add_node(&mut self, statement: Statement) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node { id, statement });
        id
    }

    pub fn set_entry(&mut self, node: NodeId) -> &mut Self {
        self.entry = Some(node);
        self
    }

    pub fn add_edge(&mut self, from: NodeId, to: NodeId, kind: EdgeKind) -> &mut Self {
        self.edges.push(Edge { from, to, kind });
        self
    }

    /// Chain nodes with sequential edges.
    pub fn sequence(&mut self, nodes: &[NodeId]) -> &mut Self {
        for pair in nodes.windows(2) {
            self.add_edge(pair[0], pair[1], EdgeKind::Sequential);
        }
        self
    }

    /// Connect a condition node to its two branch targets.
    pub fn branch(&mut self, condition: NodeId, on_true: NodeId, on_false: NodeId) -> &mut Self {
        self.add_edge(condition, on_true, EdgeKind::True);
        self.add_edge(condition, on_false, EdgeKind::False)
    }

    pub fn expr(&mut self, kind: ExpressionKind) -> Expression {
        let id = ExprId(self.next_expr);
        self.next_expr += 1;
        Expression { id, kind }
    }

    pub fn int(&mut self, value: i64) -> Expression {
        self.expr(ExpressionKind::Literal(Constant::Int(value)))
    }

    pub fn bool(&mut self, value: bool) -> Expression {
        self.expr(ExpressionKind::Literal(Constant::Bool(value)))
    }

    pub fn string(&mut self, value: impl Into<String>) -> Expression {
        self.expr(ExpressionKind::Literal(Constant::Str(value.into())))
    }

    pub fn null(&mut self) -> Expression {
        self.expr(ExpressionKind::Literal(Constant::Null))
    }

    pub fn var(&mut self, name: impl Into<String>) -> Expression {
        self.expr(ExpressionKind::Variable(name.into()))
    }

    pub fn unary(&mut self, op: UnaryOperator, arg: Expression) -> Expression {
        self.expr(ExpressionKind::Unary { op, arg: Box::new(arg) })
    }

    pub fn binary(&mut self, op: BinaryOperator, left: Expression, right: Expression) -> Expression {
        self.expr(ExpressionKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn ternary(&mut self, op: TernaryOperator, first: Expression, second: Expression, third: Expression) -> Expression {
        self.expr(ExpressionKind::Ternary {
            op,
            first: Box::new(first),
            second: Box::new(second),
            third: Box::new(third),
        })
    }

    pub fn call(&mut self, target: impl Into<String>, args: Vec<Expression>) -> Expression {
        self.expr(ExpressionKind::Call {
            target: CallTarget::Static(ProcedureId::new(target)),
            args,
        })
    }

    pub fn dynamic_call(&mut self, method: impl Into<String>, args: Vec<Expression>) -> Expression {
        self.expr(ExpressionKind::Call {
            target: CallTarget::Dynamic(method.into()),
            args,
        })
    }

    pub fn new_object(&mut self, site: impl Into<String>) -> Expression {
        self.expr(ExpressionKind::New(site.into()))
    }

    pub fn deref(&mut self, inner: Expression) -> Expression {
        self.expr(ExpressionKind::Deref(Box::new(inner)))
    }

    pub fn build(self) -> Procedure {
        Procedure {
            id: self.id,
            params: self.params,
            nodes: self.nodes,
            edges: self.edges,
            entry: self.entry.unwrap_or(NodeId(0)),
            open: false,
            successors: Vec::new(),
            predecessors: Vec::new(),
            loop_heads: BTreeSet::new(),
        }
    }
}

/// A whole program: its procedures, entry points and registered types.
#[derive(Debug, Clone, Default)]
pub struct Program {
    procedures: BTreeMap<ProcedureId, Procedure>,
    entry_points: Vec<ProcedureId>,
    types: BTreeSet<Type>,
    finalized: bool,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_procedure(&mut self, procedure: Procedure) -> Result<(), ProgramError> {
        if self.finalized {
            return Err(ProgramError::AlreadyFinalized);
        }
        if self.procedures.contains_key(procedure.id()) {
            return Err(ProgramError::DuplicateProcedure(procedure.id().clone()));
        }
        self.procedures.insert(procedure.id().clone(), procedure);
        Ok(())
    }

    pub fn add_entry_point(&mut self, id: impl Into<String>) -> Result<(), ProgramError> {
        if self.finalized {
            return Err(ProgramError::AlreadyFinalized);
        }
        self.entry_points.push(ProcedureId::new(id));
        Ok(())
    }

    /// Validate every procedure, compute loop heads and collect the program's types.
    ///
    /// Finalizing an already finalized program is a no-op. When no entry point was declared, every
    /// procedure with a body is an entry point.
    pub fn finalize(&mut self) -> Result<(), ProgramError> {
        if self.finalized {
            log::debug!("Program already finalized");
            return Ok(());
        }

        for procedure in self.procedures.values_mut() {
            procedure.validate()?;
        }

        if self.entry_points.is_empty() {
            self.entry_points = self.procedures.values().filter(|p| !p.is_open()).map(|p| p.id().clone()).collect();
        }
        for entry in &self.entry_points {
            if !self.procedures.contains_key(entry) {
                return Err(ProgramError::UnknownEntryPoint(entry.clone()));
            }
        }

        let mut types = BTreeSet::new();
        for procedure in self.procedures.values() {
            for node in procedure.nodes() {
                for expr in node.statement.expressions() {
                    expr.walk(&mut |e| match &e.kind {
                        ExpressionKind::Literal(c) => {
                            types.insert(c.static_type());
                        }
                        ExpressionKind::New(_) => {
                            types.insert(Type::Object);
                            types.insert(Type::Pointer);
                        }
                        _ => {}
                    });
                }
            }
        }
        self.types = types;
        self.finalized = true;
        Ok(())
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn procedures(&self) -> impl Iterator<Item = &Procedure> {
        self.procedures.values()
    }

    pub fn procedure(&self, id: &ProcedureId) -> Option<&Procedure> {
        self.procedures.get(id)
    }

    pub fn entry_points(&self) -> &[ProcedureId] {
        &self.entry_points
    }

    /// Types appearing in the program, available after finalization.
    pub fn registered_types(&self) -> &BTreeSet<Type> {
        &self.types
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    fn counting_loop() -> Procedure {
        // i = 0; while (i < 10) { i = i + 1 }; return
        let mut b = ProcedureBuilder::new("main");
        let i = b.var("i");
        let zero = b.int(0);
        let init = b.add_node(Statement::Assign { target: i, value: zero });
        let i = b.var("i");
        let ten = b.int(10);
        let cmp = b.binary(BinaryOperator::Lt, i, ten);
        let head = b.add_node(Statement::Condition(cmp));
        let i = b.var("i");
        let i2 = b.var("i");
        let one = b.int(1);
        let inc = b.binary(BinaryOperator::Add, i2, one);
        let body = b.add_node(Statement::Assign { target: i, value: inc });
        let exit = b.add_node(Statement::Return(None));
        b.sequence(&[init, head]);
        b.branch(head, body, exit);
        b.add_edge(body, head, EdgeKind::Sequential);
        b.build()
    }

    #[test]
    fn test_loop_heads() {
        let mut program = Program::new();
        program.add_procedure(counting_loop()).unwrap();
        program.finalize().unwrap();

        let main = program.procedure(&ProcedureId::new("main")).unwrap();
        assert_eq!(main.loop_heads().iter().copied().collect::<Vec<_>>(), vec![NodeId(1)]);
        assert_eq!(main.exit_nodes(), vec![NodeId(3)]);
        assert_eq!(main.predecessors(NodeId(1)), &[NodeId(0), NodeId(2)]);
        assert!(program.registered_types().contains(&Type::Integer));
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let mut program = Program::new();
        program.add_procedure(counting_loop()).unwrap();
        program.finalize().unwrap();
        let heads = program.procedure(&ProcedureId::new("main")).unwrap().loop_heads().clone();

        program.finalize().unwrap();
        assert_eq!(program.procedure(&ProcedureId::new("main")).unwrap().loop_heads(), &heads);
        assert_eq!(program.entry_points(), &[ProcedureId::new("main")]);
        assert_eq!(
            program.add_procedure(ProcedureBuilder::new("other").build()),
            Err(ProgramError::AlreadyFinalized)
        );
    }

    #[test]
    fn test_branch_invariants() {
        let mut b = ProcedureBuilder::new("f");
        let c = b.bool(true);
        let cond = b.add_node(Statement::Condition(c));
        let next = b.add_node(Statement::Skip);
        b.add_edge(cond, next, EdgeKind::True);
        let mut program = Program::new();
        program.add_procedure(b.build()).unwrap();
        assert_eq!(
            program.finalize(),
            Err(ProgramError::MalformedBranch {
                procedure: ProcedureId::new("f"),
                node: NodeId(0)
            })
        );

        let mut b = ProcedureBuilder::new("g");
        let first = b.add_node(Statement::Skip);
        let second = b.add_node(Statement::Skip);
        b.add_edge(first, second, EdgeKind::False);
        let mut program = Program::new();
        program.add_procedure(b.build()).unwrap();
        assert!(matches!(program.finalize(), Err(ProgramError::UnexpectedBranchEdge { .. })));
    }

    #[test]
    fn test_dangling_edge_and_entry() {
        let mut b = ProcedureBuilder::new("f");
        let only = b.add_node(Statement::Skip);
        b.add_edge(only, NodeId(7), EdgeKind::Sequential);
        let mut program = Program::new();
        program.add_procedure(b.build()).unwrap();
        assert!(matches!(program.finalize(), Err(ProgramError::DanglingEdge { to: NodeId(7), .. })));

        let mut b = ProcedureBuilder::new("g");
        b.add_node(Statement::Skip);
        b.set_entry(NodeId(4));
        let mut program = Program::new();
        program.add_procedure(b.build()).unwrap();
        assert!(matches!(program.finalize(), Err(ProgramError::MissingEntry { .. })));
    }

    #[test]
    fn test_duplicates_and_entry_points() {
        let mut program = Program::new();
        program.add_procedure(ProcedureBuilder::new("f").build()).unwrap();
        assert_eq!(
            program.add_procedure(ProcedureBuilder::new("f").build()),
            Err(ProgramError::DuplicateProcedure(ProcedureId::new("f")))
        );
        assert_eq!(program.finalize(), Err(ProgramError::EmptyProcedure(ProcedureId::new("f"))));

        let mut program = Program::new();
        program.add_procedure(Procedure::external("lib::read", &["fd"])).unwrap();
        program.add_entry_point("main").unwrap();
        assert_eq!(program.finalize(), Err(ProgramError::UnknownEntryPoint(ProcedureId::new("main"))));
    }

    #[test]
    fn test_calls_and_method_names() {
        let mut b = ProcedureBuilder::new("A::run");
        let x = b.var("x");
        let arg = b.int(1);
        let call = b.dynamic_call("step", vec![arg]);
        b.add_node(Statement::Assign { target: x, value: call });
        let proc = b.build();

        assert_eq!(proc.id().method_name(), "run");
        let calls = proc.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, NodeId(0));
        assert_eq!(calls[0].1.to_string(), "?::step(1)");
    }
}
