//! `split`
//!
//! One tensor argument, attributes `axis` and exactly one of `sections`
//! (equal pieces) or `indices` (split points). Produces a tuple with one field
//! per piece.

use super::{argument_operands, normalize_axis, ArgumentDescriptors, CallNode, ConstructError};
use crate::descriptor::TensorDescriptor;
use crate::error::AttributeError;
use crate::ir::TensorType;
use crate::passes::construct::OperandTable;
use crate::passes::infer::DescriptorTable;
use crate::support::{Network, OperandsAndId, SplitInfo};

const DATA: usize = 0;

/// How the split axis is cut
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pieces {
    /// This many equal pieces
    Sections(i64),
    /// Split points, strictly increasing
    Indices(Vec<i64>),
}

/// Extents of each piece along an axis of length `dim`
pub fn split_sizes(dim: i64, pieces: &Pieces) -> Result<Vec<u32>, AttributeError> {
    let extent = |value: i64| {
        u32::try_from(value)
            .map_err(|_| AttributeError::new(format!("split extent {} is out of range", value)))
    };

    match pieces {
        Pieces::Sections(sections) => {
            if *sections <= 0 {
                return Err(AttributeError::new(format!(
                    "sections={}, sections must be positive",
                    sections
                )));
            }
            if dim % sections != 0 {
                return Err(AttributeError::new(format!(
                    "sections={} does not evenly divide dimension {}",
                    sections, dim
                )));
            }
            let size = extent(dim / sections)?;
            Ok(vec![size; *sections as usize])
        }
        Pieces::Indices(indices) => {
            let mut sizes = Vec::with_capacity(indices.len() + 1);
            let mut previous = 0;
            for &index in indices {
                if index <= previous || index >= dim {
                    return Err(AttributeError::new(format!(
                        "indices={:?}, indices must be strictly increasing within (0, {})",
                        indices, dim
                    )));
                }
                sizes.push(extent(index - previous)?);
                previous = index;
            }
            sizes.push(extent(dim - previous)?);
            Ok(sizes)
        }
    }
}

fn data_tensor<'a>(call: &CallNode<'a>) -> Result<&'a TensorType, AttributeError> {
    let (_, node) = call.arg(DATA)?;
    node.ty.as_tensor().ok_or_else(|| {
        AttributeError::new(format!("input has type {}, expected a tensor", node.ty))
    })
}

fn pieces(call: &CallNode<'_>) -> Result<Pieces, AttributeError> {
    match (call.has_attr("sections"), call.has_attr("indices")) {
        (true, false) => call.int_attr("sections").map(Pieces::Sections),
        (false, true) => call.ints_attr("indices").map(Pieces::Indices),
        _ => Err(AttributeError::new(
            "exactly one of 'sections' or 'indices' must be given",
        )),
    }
}

/// Split parameters for `call` whose input has type `input`
pub fn split_info(call: &CallNode<'_>, input: &TensorType) -> Result<SplitInfo, AttributeError> {
    let mut err = AttributeError::default();
    let axis = err.absorb(
        call.int_attr("axis")
            .and_then(|axis| normalize_axis(axis, input.rank())),
    );
    let pieces = err.absorb(pieces(call));

    let (Some(axis), Some(pieces)) = (axis, pieces) else {
        return Err(err);
    };
    let sizes = split_sizes(input.shape[axis as usize], &pieces)?;

    let outputs = call.ty().arity();
    if sizes.len() != outputs {
        return Err(AttributeError::new(format!(
            "split into {} pieces but the call produces {} values",
            sizes.len(),
            outputs
        )));
    }

    Ok(SplitInfo { axis, sizes })
}

/// Derive the input descriptor from the input's static type and the split's first output
pub fn infer(
    call: &CallNode<'_>,
    descriptors: &DescriptorTable,
) -> Result<ArgumentDescriptors, AttributeError> {
    let (data, _) = call.arg(DATA)?;
    let tensor = data_tensor(call)?;
    let first_output = descriptors
        .get(&call.id)
        .and_then(|descs| descs.first())
        .ok_or_else(|| AttributeError::new("split outputs have no descriptors"))?;

    let mut err = AttributeError::default();
    err.absorb(split_info(call, tensor));
    let input = err.absorb(TensorDescriptor::from_tensor_type(
        tensor,
        first_output.format,
        first_output.quantization.clone(),
    ));

    match input {
        Some(input) if err.is_empty() => Ok(vec![(data, vec![input])]),
        _ => Err(err),
    }
}

/// Split the single operand of `data`
pub fn construct<N: Network + ?Sized>(
    call: &CallNode<'_>,
    operands: &OperandTable,
    network: &mut N,
) -> Result<OperandsAndId, ConstructError> {
    let (data, _) = call.arg(DATA)?;
    let info = split_info(call, data_tensor(call)?)?;
    let inputs = argument_operands(operands, data)?;
    let [input] = inputs.as_slice() else {
        return Err(AttributeError::new(format!(
            "split expects a single input operand, got {}",
            inputs.len()
        ))
        .into());
    };

    Ok(network.add_split(*input, &info)?)
}
