//! Tensor descriptor inference
//!
//! Computes, for every node reachable from a function body, one
//! [`TensorDescriptor`] per value the node produces.
//!
//! ## Algorithm
//!
//! 1. Seed the body with descriptors derived from its static type
//! 2. Walk from the body towards the parameters in pre-order
//! 3. Enter a node only once all of its own descriptors are resolved; a node
//!    that is skipped is entered later, when another path completes it
//! 4. Each entered node pushes descriptors onto its arguments:
//!    - calls through their operator's `infer` rule
//!    - tuples hand descriptor `i` to field `i`
//!    - projections write their descriptor into slot `index` of the tuple
//!
//! Every node is entered at most once, which terminates the walk on shared
//! substructure.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::descriptor::{seed_descriptors, TensorDescriptor};
use crate::ir::{ExprId, ExprKind, Function, IrGraph};
use crate::ops::{CallNode, OperatorKind};
use crate::{CompilerError, Result};

/// Descriptors of every value a node produces, keyed by node identity
pub type DescriptorTable = FxHashMap<ExprId, Vec<TensorDescriptor>>;

/// True when `id` has an entry and none of its slots is the sentinel
pub fn is_resolved(table: &DescriptorTable, id: ExprId) -> bool {
    table
        .get(&id)
        .is_some_and(|descs| descs.iter().all(TensorDescriptor::is_resolved))
}

/// Tensor inference pass
#[derive(Debug, Default)]
pub struct TensorInference;

impl TensorInference {
    pub fn new() -> Self {
        Self
    }

    /// Infer descriptors for everything reachable from `function`'s body
    pub fn run(&self, function: &Function) -> Result<DescriptorTable> {
        let graph = function.graph();
        let body = function.body();
        debug!(
            "Inferring tensor descriptors ({} nodes)",
            graph.node_count()
        );

        let mut walk = Walk {
            graph,
            table: DescriptorTable::default(),
            entered: FxHashSet::default(),
            pending: vec![body],
        };

        let seeds = seed_descriptors(function.ret_type()).map_err(|source| {
            CompilerError::InvalidAttributes {
                node: body,
                op: graph
                    .node(body)
                    .map(|n| n.label().to_string())
                    .unwrap_or_default(),
                source,
            }
        })?;
        walk.table.insert(body, seeds);

        while let Some(id) = walk.pending.pop() {
            if walk.entered.contains(&id) || !is_resolved(&walk.table, id) {
                continue;
            }
            walk.entered.insert(id);
            walk.enter(id)?;
        }

        debug!(
            "Inferred descriptors for {} nodes ({} entered)",
            walk.table.len(),
            walk.entered.len()
        );
        Ok(walk.table)
    }
}

struct Walk<'a> {
    graph: &'a IrGraph,
    table: DescriptorTable,
    entered: FxHashSet<ExprId>,
    /// Nodes still to be offered to the guard, top of stack first
    pending: Vec<ExprId>,
}

impl Walk<'_> {
    /// Queue `args` so that the first one is offered first
    fn offer(&mut self, args: &[ExprId]) {
        self.pending.extend(args.iter().rev().copied());
    }

    fn enter(&mut self, id: ExprId) -> Result<()> {
        let graph = self.graph;
        let node = graph.expect_node(id)?;

        match &node.kind {
            ExprKind::Call { op, .. } => {
                let kind = OperatorKind::from_name(op).ok_or_else(|| {
                    CompilerError::UnsupportedOperator {
                        node: id,
                        op: op.clone(),
                    }
                })?;
                let call = CallNode::new(graph, id).ok_or_else(|| {
                    CompilerError::InvalidGraph(format!("node %{} is not a call", id.index()))
                })?;

                let assigned = kind.infer(&call, &self.table).map_err(|source| {
                    CompilerError::InvalidAttributes {
                        node: id,
                        op: op.clone(),
                        source,
                    }
                })?;
                for (arg, descriptors) in assigned {
                    self.table.insert(arg, descriptors);
                }
                self.offer(&node.args);
            }
            ExprKind::Tuple => {
                let fields = self.table.get(&id).cloned().unwrap_or_default();
                for (&field, descriptor) in node.args.iter().zip(fields) {
                    self.table.insert(field, vec![descriptor]);
                }
                self.offer(&node.args);
            }
            ExprKind::TupleGetItem { index } => {
                let tuple = node.args.first().copied().ok_or_else(|| {
                    CompilerError::InvalidGraph(format!(
                        "projection %{} has no tuple argument",
                        id.index()
                    ))
                })?;
                let arity = graph.expect_node(tuple)?.ty.arity();
                let own = self
                    .table
                    .get(&id)
                    .and_then(|descs| descs.first())
                    .cloned()
                    .unwrap_or_default();

                let slots = self.table.entry(tuple).or_default();
                if slots.len() < arity {
                    slots.resize(arity, TensorDescriptor::UNRESOLVED);
                }
                if let Some(slot) = slots.get_mut(*index) {
                    *slot = own;
                }
                self.offer(&[tuple]);
            }
            // Leaves: their descriptors are already final
            ExprKind::Var { .. } | ExprKind::Constant(_) | ExprKind::Function(_) => {}
        }

        Ok(())
    }
}
