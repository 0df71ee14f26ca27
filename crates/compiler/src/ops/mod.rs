//! Operator translators
//!
//! One module per supported source operator. Each provides two pure rules:
//!
//! - `infer`: given the call and the descriptors known so far, derive the
//!   descriptors of the call's arguments (propagation runs against the data flow)
//! - `construct`: given the operands already built for the call's arguments,
//!   add the call to the accelerator network
//!
//! The registry is the closed [`OperatorKind`] enum generated below.

#[macro_use]
pub mod macros;

pub mod concatenate;
pub mod split;

use crate::descriptor::{QuantizationInfo, TensorDescriptor};
use crate::error::AttributeError;
use crate::ir::{AttrValue, ExprId, ExprKind, IrGraph, IrNode, Literal, Type};
use crate::passes::construct::OperandTable;
use crate::support::{NotSupported, Operand};

define_translators! {
    /// Quantized concatenation of a tuple of tensors
    Concatenate("qnn.concatenate") => concatenate,
    /// Split of one tensor into a tuple of pieces
    Split("split") => split,
}

/// Descriptors an `infer` rule assigns, keyed by argument node
pub type ArgumentDescriptors = Vec<(ExprId, Vec<TensorDescriptor>)>;

/// Failure of a `construct` rule
#[derive(Debug)]
pub enum ConstructError {
    /// The call's arguments or attributes cannot be lowered
    Attributes(AttributeError),
    /// The network refused the primitive
    Rejected(NotSupported),
}

impl From<AttributeError> for ConstructError {
    fn from(err: AttributeError) -> Self {
        ConstructError::Attributes(err)
    }
}

impl From<NotSupported> for ConstructError {
    fn from(err: NotSupported) -> Self {
        ConstructError::Rejected(err)
    }
}

/// Read-only view of a call node and the graph it lives in
#[derive(Debug, Clone, Copy)]
pub struct CallNode<'a> {
    pub id: ExprId,
    pub op: &'a str,
    node: &'a IrNode,
    graph: &'a IrGraph,
}

impl<'a> CallNode<'a> {
    /// View `id` as a call; `None` for any other node kind
    pub fn new(graph: &'a IrGraph, id: ExprId) -> Option<Self> {
        let node = graph.node(id)?;
        match &node.kind {
            ExprKind::Call { op, .. } => Some(Self {
                id,
                op,
                node,
                graph,
            }),
            _ => None,
        }
    }

    pub fn ty(&self) -> &'a Type {
        &self.node.ty
    }

    pub fn args(&self) -> &'a [ExprId] {
        &self.node.args
    }

    pub fn graph(&self) -> &'a IrGraph {
        self.graph
    }

    /// Argument `index` and its node
    pub fn arg(&self, index: usize) -> Result<(ExprId, &'a IrNode), AttributeError> {
        let id = self.node.args.get(index).copied().ok_or_else(|| {
            AttributeError::new(format!(
                "expected at least {} arguments, got {}",
                index + 1,
                self.node.args.len()
            ))
        })?;
        let node = self
            .graph
            .node(id)
            .ok_or_else(|| AttributeError::new(format!("argument {} is dangling", index)))?;
        Ok((id, node))
    }

    /// Static tensor fields of a tuple-typed argument
    pub fn tuple_arg_fields(&self, index: usize) -> Result<&'a [Type], AttributeError> {
        let (_, node) = self.arg(index)?;
        node.ty.as_tuple().ok_or_else(|| {
            AttributeError::new(format!(
                "argument {} has type {}, expected a tuple",
                index, node.ty
            ))
        })
    }

    pub fn int_attr(&self, name: &str) -> Result<i64, AttributeError> {
        match self.node.attr(name) {
            Some(AttrValue::Int(value)) => Ok(*value),
            Some(other) => Err(AttributeError::new(format!(
                "{}={:?}, {} must be an integer",
                name, other, name
            ))),
            None => Err(AttributeError::new(format!("missing attribute '{}'", name))),
        }
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.node.attr(name).is_some()
    }

    pub fn ints_attr(&self, name: &str) -> Result<Vec<i64>, AttributeError> {
        match self.node.attr(name) {
            Some(AttrValue::Ints(values)) => Ok(values.clone()),
            Some(other) => Err(AttributeError::new(format!(
                "{}={:?}, {} must be a list of integers",
                name, other, name
            ))),
            None => Err(AttributeError::new(format!("missing attribute '{}'", name))),
        }
    }

    /// Scalar `f32` constant passed as argument `index`
    pub fn f32_arg(&self, index: usize) -> Result<f32, AttributeError> {
        let (id, _) = self.arg(index)?;
        constant_f32(self.graph, id)
    }

    /// Scalar `i32` constant passed as argument `index`
    pub fn i32_arg(&self, index: usize) -> Result<i32, AttributeError> {
        let (id, _) = self.arg(index)?;
        constant_i32(self.graph, id)
    }

    /// Tuple of `f32` constants passed as argument `index`
    pub fn f32_tuple_arg(&self, index: usize) -> Result<Vec<f32>, AttributeError> {
        self.constant_tuple(index, constant_f32)
    }

    /// Tuple of `i32` constants passed as argument `index`
    pub fn i32_tuple_arg(&self, index: usize) -> Result<Vec<i32>, AttributeError> {
        self.constant_tuple(index, constant_i32)
    }

    fn constant_tuple<T>(
        &self,
        index: usize,
        read: fn(&IrGraph, ExprId) -> Result<T, AttributeError>,
    ) -> Result<Vec<T>, AttributeError> {
        let (_, node) = self.arg(index)?;
        if !matches!(node.kind, ExprKind::Tuple) {
            return Err(AttributeError::new(format!(
                "argument {} must be a tuple of constants",
                index
            )));
        }
        node.args.iter().map(|&field| read(self.graph, field)).collect()
    }

    /// Quantization from a (scale, zero point) argument pair
    pub fn quantization_args(
        &self,
        scale_index: usize,
        zero_point_index: usize,
    ) -> Result<QuantizationInfo, AttributeError> {
        let mut err = AttributeError::default();
        let scale = err.absorb(self.f32_arg(scale_index));
        let zero_point = err.absorb(self.i32_arg(zero_point_index));
        match (scale, zero_point) {
            (Some(scale), Some(zero_point)) => Ok(QuantizationInfo::new(zero_point, scale)),
            _ => Err(err),
        }
    }
}

fn constant(graph: &IrGraph, id: ExprId) -> Result<Literal, AttributeError> {
    match graph.node(id).map(|node| &node.kind) {
        Some(ExprKind::Constant(value)) => Ok(*value),
        _ => Err(AttributeError::new(format!(
            "node %{} must be a scalar constant",
            id.index()
        ))),
    }
}

fn constant_f32(graph: &IrGraph, id: ExprId) -> Result<f32, AttributeError> {
    match constant(graph, id)? {
        Literal::F32(value) => Ok(value),
        Literal::I32(value) => Err(AttributeError::new(format!(
            "constant %{}={} must be float32",
            id.index(),
            value
        ))),
    }
}

fn constant_i32(graph: &IrGraph, id: ExprId) -> Result<i32, AttributeError> {
    match constant(graph, id)? {
        Literal::I32(value) => Ok(value),
        Literal::F32(value) => Err(AttributeError::new(format!(
            "constant %{}={} must be int32",
            id.index(),
            value
        ))),
    }
}

/// Resolve a possibly negative axis against `rank`
pub fn normalize_axis(axis: i64, rank: usize) -> Result<u32, AttributeError> {
    let rank = rank as i64;
    let normalized = if axis < 0 { axis + rank } else { axis };
    if normalized < 0 || normalized >= rank {
        return Err(AttributeError::new(format!(
            "axis={}, axis must be in [{}, {})",
            axis, -rank, rank
        )));
    }
    Ok(normalized as u32)
}

/// Every operand built for `arg`, failing on missing entries and nested-tuple placeholders
pub fn argument_operands(operands: &OperandTable, arg: ExprId) -> Result<Vec<Operand>, AttributeError> {
    let entry = operands.get(&arg).ok_or_else(|| {
        AttributeError::new(format!("argument %{} has no operands", arg.index()))
    })?;
    entry
        .iter()
        .enumerate()
        .map(|(i, produced)| {
            produced.as_ref().map(|p| p.operand).ok_or_else(|| {
                AttributeError::new(format!(
                    "field {} of argument %{} is a nested tuple, which is not supported",
                    i,
                    arg.index()
                ))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ElemType;

    #[test]
    fn test_registry_lookup() {
        assert_eq!(
            OperatorKind::from_name("qnn.concatenate"),
            Some(OperatorKind::Concatenate)
        );
        assert_eq!(OperatorKind::from_name("split"), Some(OperatorKind::Split));
        assert_eq!(OperatorKind::from_name("nn.conv2d"), None);

        for kind in OperatorKind::ALL {
            assert_eq!(OperatorKind::from_name(kind.name()), Some(*kind));
        }
    }

    #[test]
    fn test_normalize_axis() {
        assert_eq!(normalize_axis(3, 4).unwrap(), 3);
        assert_eq!(normalize_axis(-1, 4).unwrap(), 3);
        assert_eq!(normalize_axis(-4, 4).unwrap(), 0);
        assert!(normalize_axis(4, 4).is_err());
        assert!(normalize_axis(-5, 4).is_err());
    }

    #[test]
    fn test_call_node_accessors() {
        let mut graph = IrGraph::new();
        let x = graph.add_var("x", Type::tensor([1, 2, 2, 4], ElemType::Uint8));
        let s0 = graph.add_constant(Literal::F32(0.5));
        let s1 = graph.add_constant(Literal::I32(3));
        let scales = graph.add_tuple(&[s0]).unwrap();
        let call = graph
            .add_call("custom")
            .arg(x)
            .arg(scales)
            .arg(s0)
            .arg(s1)
            .attr("axis", AttrValue::Int(-1))
            .ty(Type::tensor([1, 2, 2, 4], ElemType::Uint8))
            .finish()
            .unwrap();

        let view = CallNode::new(&graph, call).unwrap();
        assert_eq!(view.op, "custom");
        assert_eq!(view.int_attr("axis").unwrap(), -1);
        assert!(view.ints_attr("axis").is_err());
        assert!(view.int_attr("sections").is_err());
        assert_eq!(view.f32_tuple_arg(1).unwrap(), vec![0.5]);
        assert_eq!(
            view.quantization_args(2, 3).unwrap(),
            QuantizationInfo::new(3, 0.5)
        );
        // swapped scale and zero point: both problems are reported
        assert_eq!(view.quantization_args(3, 2).unwrap_err().messages().len(), 2);
        assert!(view.arg(4).is_err());

        assert!(CallNode::new(&graph, x).is_none());
    }
}
