// Graph IR consumed by the NPU lowering passes
//
// Functions are DAGs stored in a petgraph StableGraph. Nodes are immutable once
// added and may be shared by any number of consumers, so per-node state
// computed by the passes lives in side tables keyed by `ExprId`.

use crate::ir::types::{ElemType, Type};
use crate::{CompilerError, Result};
use petgraph::stable_graph::{NodeIndex, StableGraph};
use petgraph::visit::{DfsPostOrder, EdgeRef, IntoEdgeReferences, Reversed};
use std::collections::{BTreeMap, HashMap};

/// Node identifier in the graph (petgraph NodeIndex)
///
/// Identity, not structural equality: two calls with identical operands are
/// distinct nodes.
pub type ExprId = NodeIndex;

/// Data edge from an argument to its consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Argument {
    /// Position of the argument in the consumer's argument list
    pub slot: usize,
}

/// Scalar literal held by a constant node
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal {
    F32(f32),
    I32(i32),
}

impl Literal {
    pub fn dtype(self) -> ElemType {
        match self {
            Literal::F32(_) => ElemType::Float32,
            Literal::I32(_) => ElemType::Int32,
        }
    }
}

/// Call attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Int(i64),
    Ints(Vec<i64>),
}

/// Call attributes, ordered by name
pub type Attrs = BTreeMap<String, AttrValue>;

/// What a node computes
#[derive(Debug, Clone)]
pub enum ExprKind {
    /// Function parameter
    Var { name: String },
    Constant(Literal),
    /// Operator call; arguments are the node's `args`
    Call { op: String, attrs: Attrs },
    /// Tuple construction; fields are the node's `args`
    Tuple,
    /// Projection of field `index` out of `args[0]`
    TupleGetItem { index: usize },
    /// Nested function, only ever treated as a leaf
    Function(Box<Function>),
}

/// A node in the computation graph
#[derive(Debug, Clone)]
pub struct IrNode {
    pub kind: ExprKind,
    /// Ordered argument nodes (call operands, tuple fields, projected tuple)
    pub args: Vec<ExprId>,
    /// Resolved static type
    pub ty: Type,
}

impl IrNode {
    /// Short name used in diagnostics and graph dumps
    pub fn label(&self) -> &str {
        match &self.kind {
            ExprKind::Var { name } => name,
            ExprKind::Constant(_) => "constant",
            ExprKind::Call { op, .. } => op,
            ExprKind::Tuple => "tuple",
            ExprKind::TupleGetItem { .. } => "tuple_get_item",
            ExprKind::Function(_) => "fn",
        }
    }

    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        match &self.kind {
            ExprKind::Call { attrs, .. } => attrs.get(name),
            _ => None,
        }
    }
}

/// Function computation graph using petgraph
#[derive(Debug, Clone, Default)]
pub struct IrGraph {
    graph: StableGraph<IrNode, Argument>,
}

impl IrGraph {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self {
            graph: StableGraph::new(),
        }
    }

    /// Get node by ID
    pub fn node(&self, id: ExprId) -> Option<&IrNode> {
        self.graph.node_weight(id)
    }

    /// Get node by ID, failing with an `InvalidGraph` error when absent
    pub fn expect_node(&self, id: ExprId) -> Result<&IrNode> {
        self.node(id).ok_or_else(|| {
            CompilerError::InvalidGraph(format!("node %{} does not exist", id.index()))
        })
    }

    pub fn contains(&self, id: ExprId) -> bool {
        self.graph.contains_node(id)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Add a function parameter
    pub fn add_var(&mut self, name: impl Into<String>, ty: Type) -> ExprId {
        self.graph.add_node(IrNode {
            kind: ExprKind::Var { name: name.into() },
            args: Vec::new(),
            ty,
        })
    }

    /// Add a scalar constant
    pub fn add_constant(&mut self, value: Literal) -> ExprId {
        self.graph.add_node(IrNode {
            kind: ExprKind::Constant(value),
            args: Vec::new(),
            ty: Type::tensor(Vec::new(), value.dtype()),
        })
    }

    /// Start building an operator call
    pub fn add_call(&mut self, op: impl Into<String>) -> NewCall<'_> {
        NewCall::new(self, op.into())
    }

    /// Add a tuple of existing nodes; its type is derived from the fields
    pub fn add_tuple(&mut self, fields: &[ExprId]) -> Result<ExprId> {
        let mut types = Vec::with_capacity(fields.len());
        for &field in fields {
            types.push(self.expect_node(field)?.ty.clone());
        }
        Ok(self.insert(ExprKind::Tuple, fields.to_vec(), Type::Tuple(types)))
    }

    /// Project field `index` out of a tuple-typed node
    pub fn add_tuple_get_item(&mut self, tuple: ExprId, index: usize) -> Result<ExprId> {
        let ty = {
            let node = self.expect_node(tuple)?;
            let fields = node.ty.as_tuple().ok_or_else(|| {
                CompilerError::InvalidGraph(format!(
                    "tuple_get_item on non-tuple node %{} of type {}",
                    tuple.index(),
                    node.ty
                ))
            })?;
            fields.get(index).cloned().ok_or_else(|| {
                CompilerError::InvalidGraph(format!(
                    "tuple_get_item index {} out of range for {}-field tuple %{}",
                    index,
                    fields.len(),
                    tuple.index()
                ))
            })?
        };
        Ok(self.insert(ExprKind::TupleGetItem { index }, vec![tuple], ty))
    }

    /// Embed a nested function as an opaque leaf node
    pub fn add_function(&mut self, function: Function) -> ExprId {
        self.graph.add_node(IrNode {
            kind: ExprKind::Function(Box::new(function)),
            args: Vec::new(),
            ty: Type::Func,
        })
    }

    fn insert(&mut self, kind: ExprKind, args: Vec<ExprId>, ty: Type) -> ExprId {
        let id = self.graph.add_node(IrNode {
            kind,
            args: args.clone(),
            ty,
        });
        for (slot, arg) in args.into_iter().enumerate() {
            self.graph.add_edge(arg, id, Argument { slot });
        }
        id
    }

    /// Nodes reachable from `root` against the data flow, arguments first
    ///
    /// Every node appears once regardless of how many consumers share it.
    pub fn post_order(&self, root: ExprId) -> Vec<ExprId> {
        let reversed = Reversed(&self.graph);
        let mut dfs = DfsPostOrder::new(reversed, root);
        let mut order = Vec::new();
        while let Some(id) = dfs.next(reversed) {
            order.push(id);
        }
        order
    }

    /// Export to Graphviz DOT format
    pub fn visualize_dot(&self) -> String {
        use std::fmt::Write;
        let mut dot = String::new();
        let _ = writeln!(dot, "digraph IrGraph {{");
        let _ = writeln!(dot, "  rankdir=TB;");
        let _ = writeln!(dot, "  node [shape=box, style=rounded];");

        for id in self.graph.node_indices() {
            let node = &self.graph[id];
            let color = match node.kind {
                ExprKind::Var { .. } => "lightyellow",
                ExprKind::Constant(_) => "lightgray",
                ExprKind::Call { .. } => "lightgreen",
                ExprKind::Tuple | ExprKind::TupleGetItem { .. } => "lightblue",
                ExprKind::Function(_) => "white",
            };
            let _ = writeln!(
                dot,
                "  node{} [label=\"%{} {}\\n{}\", fillcolor={}, style=filled];",
                id.index(),
                id.index(),
                node.label(),
                node.ty,
                color
            );
        }

        for edge in self.graph.edge_references() {
            let _ = writeln!(
                dot,
                "  node{} -> node{} [label=\"arg{}\"];",
                edge.source().index(),
                edge.target().index(),
                edge.weight().slot
            );
        }

        let _ = writeln!(dot, "}}");
        dot
    }

    /// Get graph statistics
    pub fn statistics(&self) -> GraphStatistics {
        let mut op_counts: HashMap<String, usize> = HashMap::new();
        for id in self.graph.node_indices() {
            if let ExprKind::Call { op, .. } = &self.graph[id].kind {
                *op_counts.entry(op.clone()).or_insert(0) += 1;
            }
        }

        GraphStatistics {
            total_nodes: self.graph.node_count(),
            total_edges: self.graph.edge_count(),
            op_counts,
        }
    }

    /// Access the underlying petgraph
    pub fn petgraph(&self) -> &StableGraph<IrNode, Argument> {
        &self.graph
    }
}

/// Builder for adding operator calls to the graph
pub struct NewCall<'a> {
    graph: &'a mut IrGraph,
    op: String,
    attrs: Attrs,
    args: Vec<ExprId>,
    ty: Option<Type>,
}

impl<'a> NewCall<'a> {
    fn new(graph: &'a mut IrGraph, op: String) -> Self {
        Self {
            graph,
            op,
            attrs: Attrs::new(),
            args: Vec::new(),
            ty: None,
        }
    }

    /// Append an argument
    pub fn arg(mut self, id: ExprId) -> Self {
        self.args.push(id);
        self
    }

    /// Set an attribute
    pub fn attr(mut self, name: impl Into<String>, value: AttrValue) -> Self {
        self.attrs.insert(name.into(), value);
        self
    }

    /// Set the call's (already checked) result type
    pub fn ty(mut self, ty: Type) -> Self {
        self.ty = Some(ty);
        self
    }

    /// Finish building and add to graph
    pub fn finish(self) -> Result<ExprId> {
        for &arg in &self.args {
            self.graph.expect_node(arg)?;
        }
        let ty = self.ty.ok_or_else(|| {
            CompilerError::InvalidGraph(format!("call to '{}' has no result type", self.op))
        })?;
        let kind = ExprKind::Call {
            op: self.op,
            attrs: self.attrs,
        };
        Ok(self.graph.insert(kind, self.args, ty))
    }
}

/// A function: a graph with ordered parameters and a body
#[derive(Debug, Clone)]
pub struct Function {
    graph: IrGraph,
    params: Vec<ExprId>,
    body: ExprId,
    global_symbol: Option<String>,
}

impl Function {
    /// Wrap a graph as a function, checking that params are vars and the body exists
    pub fn new(graph: IrGraph, params: Vec<ExprId>, body: ExprId) -> Result<Self> {
        for &param in &params {
            let node = graph.expect_node(param)?;
            if !matches!(node.kind, ExprKind::Var { .. }) {
                return Err(CompilerError::InvalidGraph(format!(
                    "parameter %{} is a {} node, expected a var",
                    param.index(),
                    node.label()
                )));
            }
        }
        graph.expect_node(body)?;

        Ok(Self {
            graph,
            params,
            body,
            global_symbol: None,
        })
    }

    /// Set the external name the function is compiled under
    pub fn with_global_symbol(mut self, name: impl Into<String>) -> Self {
        self.global_symbol = Some(name.into());
        self
    }

    pub fn graph(&self) -> &IrGraph {
        &self.graph
    }

    pub fn params(&self) -> &[ExprId] {
        &self.params
    }

    pub fn body(&self) -> ExprId {
        self.body
    }

    pub fn global_symbol(&self) -> Option<&str> {
        self.global_symbol.as_deref()
    }

    /// Static type of the function body
    pub fn ret_type(&self) -> &Type {
        // `new` checked the body exists and nodes are never removed
        &self.graph.petgraph()[self.body].ty
    }
}

/// Graph statistics
#[derive(Debug, Clone)]
pub struct GraphStatistics {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub op_counts: HashMap<String, usize>,
}

impl std::fmt::Display for GraphStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} nodes, {} edges",
            self.total_nodes, self.total_edges
        )?;

        let mut sorted_ops: Vec<_> = self.op_counts.iter().collect();
        sorted_ops.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (op, count) in sorted_ops {
            write!(f, ", {}x {}", count, op)?;
        }
        Ok(())
    }
}
