//! Network construction
//!
//! Re-walks a function whose descriptors have been inferred and builds the
//! accelerator network for it, parameters first, then every node of the body
//! with arguments before consumers. The operand table records what each node
//! produced; the id maps record where each network input and output sits in
//! the caller's ordering.

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use super::infer::{is_resolved, DescriptorTable};
use crate::error::AttributeError;
use crate::ir::{ExprId, ExprKind, Function, IrGraph};
use crate::ops::{CallNode, ConstructError, OperatorKind};
use crate::support::{Network, NotSupported, Operand, OperandAndId, OperationId, SupportLibrary};
use crate::{CompilerError, Result};

/// An operand together with the operation output it came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProducedOperand {
    pub operand: Operand,
    pub operation_id: OperationId,
    pub output_index: u32,
}

impl ProducedOperand {
    pub fn new(produced: OperandAndId, output_index: u32) -> Self {
        Self {
            operand: produced.operand,
            operation_id: produced.operation_id,
            output_index,
        }
    }

    /// `(operation id, output index)` pair identifying the value
    pub fn id(&self) -> (OperationId, u32) {
        (self.operation_id, self.output_index)
    }
}

/// Operands produced by each node, keyed by node identity
///
/// `None` marks a tuple field that is itself a tuple (or produced nothing);
/// such fields cannot be consumed.
pub type OperandTable = FxHashMap<ExprId, Vec<Option<ProducedOperand>>>;

/// A constructed network with its caller-order bookkeeping
#[derive(Debug)]
pub struct NetworkWithIds<N> {
    pub network: N,
    /// Input operation id → position in the caller's input list
    pub input_ids: FxHashMap<OperationId, u32>,
    /// (operation id, output index) → position in the caller's output list
    pub output_ids: FxHashMap<(OperationId, u32), u32>,
    /// Network inputs in caller order
    pub inputs: Vec<Operand>,
    /// Network outputs in caller order
    pub outputs: Vec<Operand>,
}

/// Network construction pass
#[derive(Debug, Default)]
pub struct NetworkConstruction;

fn rejected(node: ExprId, op: &str) -> impl FnOnce(NotSupported) -> CompilerError + '_ {
    move |err| CompilerError::AcceleratorRejected {
        node,
        op: op.to_string(),
        message: err.reason,
    }
}

fn label(graph: &IrGraph, id: ExprId) -> String {
    graph
        .node(id)
        .map(|node| node.label().to_string())
        .unwrap_or_default()
}

impl NetworkConstruction {
    pub fn new() -> Self {
        Self
    }

    /// Build the network for `function` from its inferred `descriptors`
    pub fn run<S: SupportLibrary>(
        &self,
        support: &S,
        function: &Function,
        descriptors: &DescriptorTable,
    ) -> Result<NetworkWithIds<S::Network>> {
        let graph = function.graph();
        let mut network = support.create_network();
        let mut operands = OperandTable::default();
        let mut input_ids = FxHashMap::default();
        let mut inputs = Vec::new();
        let order = graph.post_order(function.body());

        for &param in function.params() {
            let name = label(graph, param);
            if !order.contains(&param) {
                warn!("Parameter '{}' is never used; it gets no network input", name);
                continue;
            }
            let Some(param_descriptors) = descriptors.get(&param) else {
                return Err(CompilerError::UnresolvedDescriptor { node: param });
            };
            if !is_resolved(descriptors, param) {
                return Err(CompilerError::UnresolvedDescriptor { node: param });
            }

            let mut produced = Vec::with_capacity(param_descriptors.len());
            for descriptor in param_descriptors {
                let input = network
                    .add_input(descriptor)
                    .map_err(rejected(param, &name))?;
                input_ids.insert(input.operation_id, inputs.len() as u32);
                inputs.push(input.operand);
                debug!(
                    "Added input {} for parameter '{}' as operation {}",
                    inputs.len() - 1,
                    name,
                    input.operation_id
                );
                produced.push(Some(ProducedOperand::new(input, 0)));
            }
            operands.insert(param, produced);
        }

        for id in order {
            if operands.contains_key(&id) {
                continue;
            }
            let node = graph.expect_node(id)?;

            match &node.kind {
                ExprKind::Call { op, .. } => {
                    let produced =
                        construct_call(graph, id, op, descriptors, &operands, &mut network)?;
                    operands.insert(id, produced);
                }
                ExprKind::Tuple => {
                    let fields = node
                        .args
                        .iter()
                        .map(|field| match operands.get(field).map(Vec::as_slice) {
                            Some([single]) => *single,
                            _ => None,
                        })
                        .collect();
                    operands.insert(id, fields);
                }
                ExprKind::TupleGetItem { index } => {
                    let item = node
                        .args
                        .first()
                        .and_then(|tuple| operands.get(tuple))
                        .and_then(|fields| fields.get(*index))
                        .copied()
                        .flatten();
                    operands.insert(id, vec![item]);
                }
                ExprKind::Var { name } => {
                    return Err(CompilerError::InvalidGraph(format!(
                        "variable '{}' (%{}) is not a parameter of the function",
                        name,
                        id.index()
                    )));
                }
                // Constants only feed attributes; nested functions stay opaque
                ExprKind::Constant(_) | ExprKind::Function(_) => {}
            }
        }

        let body = function.body();
        let body_operands = operands.get(&body).ok_or_else(|| {
            CompilerError::InvalidGraph(format!(
                "function body %{} produces no network values",
                body.index()
            ))
        })?;

        let mut output_ids = FxHashMap::default();
        let mut outputs = Vec::with_capacity(body_operands.len());
        for (index, produced) in body_operands.iter().copied().enumerate() {
            let produced = produced.ok_or_else(|| CompilerError::InvalidAttributes {
                node: body,
                op: label(graph, body),
                source: AttributeError::new(format!(
                    "output {} is a nested tuple, which is not supported",
                    index
                )),
            })?;
            // Output ids key on the producing operation output, so each
            // value may be returned once
            if let Some(&earlier) = output_ids.get(&produced.id()) {
                return Err(CompilerError::InvalidAttributes {
                    node: body,
                    op: label(graph, body),
                    source: AttributeError::new(format!(
                        "output {} returns the same value as output {}",
                        index, earlier
                    )),
                });
            }
            network
                .add_output(produced.operand)
                .map_err(rejected(body, &label(graph, body)))?;
            output_ids.insert(produced.id(), index as u32);
            outputs.push(produced.operand);
        }

        debug!(
            "Constructed network: {} inputs, {} outputs, {} operations",
            inputs.len(),
            outputs.len(),
            network.operation_count()
        );

        Ok(NetworkWithIds {
            network,
            input_ids,
            output_ids,
            inputs,
            outputs,
        })
    }
}

fn construct_call<N: Network + ?Sized>(
    graph: &IrGraph,
    id: ExprId,
    op: &str,
    descriptors: &DescriptorTable,
    operands: &OperandTable,
    network: &mut N,
) -> Result<Vec<Option<ProducedOperand>>> {
    if !is_resolved(descriptors, id) {
        return Err(CompilerError::UnresolvedDescriptor { node: id });
    }
    let kind = OperatorKind::from_name(op).ok_or_else(|| CompilerError::UnsupportedOperator {
        node: id,
        op: op.to_string(),
    })?;
    let call = CallNode::new(graph, id)
        .ok_or_else(|| CompilerError::InvalidGraph(format!("node %{} is not a call", id.index())))?;

    let produced = kind
        .construct(&call, operands, network)
        .map_err(|err| match err {
            ConstructError::Attributes(source) => CompilerError::InvalidAttributes {
                node: id,
                op: op.to_string(),
                source,
            },
            ConstructError::Rejected(err) => rejected(id, op)(err),
        })?;

    debug!(
        "Added {} (%{}) as operation {} with {} outputs",
        op,
        id.index(),
        produced.operation_id,
        produced.operands.len()
    );

    let operation_id = produced.operation_id;
    Ok(produced
        .operands
        .into_iter()
        .enumerate()
        .map(|(index, operand)| {
            Some(ProducedOperand {
                operand,
                operation_id,
                output_index: index as u32,
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{AttrValue, ElemType, Type};
    use crate::passes::infer::TensorInference;
    use crate::support::ReferenceSupport;

    fn u8_tensor(shape: [i64; 4]) -> Type {
        Type::tensor(shape, ElemType::Uint8)
    }

    fn build(function: &Function) -> Result<NetworkWithIds<crate::support::ReferenceNetwork>> {
        let descriptors = TensorInference::new().run(function)?;
        NetworkConstruction::new().run(&ReferenceSupport::new(), function, &descriptors)
    }

    #[test]
    fn test_identity_function() {
        let mut graph = IrGraph::new();
        let x = graph.add_var("x", u8_tensor([1, 2, 2, 3]));
        let func = Function::new(graph, vec![x], x).unwrap();

        let built = build(&func).unwrap();
        assert_eq!(built.inputs.len(), 1);
        assert_eq!(built.outputs, built.inputs);
        assert_eq!(built.input_ids[&OperationId(0)], 0);
        assert_eq!(built.output_ids[&(OperationId(0), 0)], 0);
    }

    #[test]
    fn test_unused_parameter_gets_no_input() {
        let mut graph = IrGraph::new();
        let x = graph.add_var("x", u8_tensor([1, 2, 2, 3]));
        let unused = graph.add_var("unused", u8_tensor([1, 1, 1, 1]));
        let func = Function::new(graph, vec![unused, x], x).unwrap();

        let built = build(&func).unwrap();
        assert_eq!(built.inputs.len(), 1);
        assert_eq!(built.input_ids.values().copied().collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn test_split_outputs_keep_output_indices() {
        let mut graph = IrGraph::new();
        let x = graph.add_var("x", u8_tensor([1, 1, 1, 6]));
        let split = graph
            .add_call("split")
            .arg(x)
            .attr("axis", AttrValue::Int(3))
            .attr("sections", AttrValue::Int(2))
            .ty(Type::Tuple(vec![u8_tensor([1, 1, 1, 3]); 2]))
            .finish()
            .unwrap();
        let func = Function::new(graph, vec![x], split).unwrap();

        let built = build(&func).unwrap();
        assert_eq!(built.outputs.len(), 2);
        // operation 0 is the input, 1 the split
        assert_eq!(built.output_ids.get(&(OperationId(1), 0)), Some(&0));
        assert_eq!(built.output_ids.get(&(OperationId(1), 1)), Some(&1));
    }

    #[test]
    fn test_partially_projected_split_is_unresolved() {
        let mut graph = IrGraph::new();
        let x = graph.add_var("x", u8_tensor([1, 1, 1, 6]));
        let split = graph
            .add_call("split")
            .arg(x)
            .attr("axis", AttrValue::Int(3))
            .attr("sections", AttrValue::Int(2))
            .ty(Type::Tuple(vec![u8_tensor([1, 1, 1, 3]); 2]))
            .finish()
            .unwrap();
        // only the second piece is consumed, so the split never resolves
        let second = graph.add_tuple_get_item(split, 1).unwrap();
        let func = Function::new(graph, vec![x], second).unwrap();

        let err = build(&func).unwrap_err();
        assert!(matches!(err, CompilerError::UnresolvedDescriptor { node } if node == x));
    }

    #[test]
    fn test_accelerator_rejection_names_the_node() {
        let mut graph = IrGraph::new();
        let x = graph.add_var("x", u8_tensor([1, 1, 1, 6]));
        let split = graph
            .add_call("split")
            .arg(x)
            .attr("axis", AttrValue::Int(3))
            .attr("sections", AttrValue::Int(2))
            .ty(Type::Tuple(vec![u8_tensor([1, 1, 1, 3]); 2]))
            .finish()
            .unwrap();
        let func = Function::new(graph, vec![x], split).unwrap();

        let mut descriptors = TensorInference::new().run(&func).unwrap();
        // a zero extent is refused by the network when the input is added
        descriptors.get_mut(&x).unwrap()[0].shape = [1, 1, 0, 6];

        let err = NetworkConstruction::new()
            .run(&ReferenceSupport::new(), &func, &descriptors)
            .unwrap_err();
        assert!(matches!(err, CompilerError::AcceleratorRejected { node, .. } if node == x));
    }

    #[test]
    fn test_missing_descriptor_is_reported() {
        let mut graph = IrGraph::new();
        let x = graph.add_var("x", u8_tensor([1, 1, 1, 6]));
        let split = graph
            .add_call("split")
            .arg(x)
            .attr("axis", AttrValue::Int(3))
            .attr("sections", AttrValue::Int(2))
            .ty(Type::Tuple(vec![u8_tensor([1, 1, 1, 3]); 2]))
            .finish()
            .unwrap();
        let func = Function::new(graph, vec![x], split).unwrap();

        let mut descriptors = TensorInference::new().run(&func).unwrap();
        descriptors.remove(&split);

        let err = NetworkConstruction::new()
            .run(&ReferenceSupport::new(), &func, &descriptors)
            .unwrap_err();
        assert!(matches!(err, CompilerError::UnresolvedDescriptor { node } if node == split));
    }
}
