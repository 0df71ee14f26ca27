//! `qnn.concatenate`
//!
//! Arguments: `(data: tuple, input_scales: tuple, input_zero_points: tuple,
//! output_scale, output_zero_point)`, attribute `axis`. Every field of `data`
//! carries its own quantization, taken from the matching constant tuples.

use super::{argument_operands, normalize_axis, ArgumentDescriptors, CallNode, ConstructError};
use crate::descriptor::{DataFormat, QuantizationInfo, TensorDescriptor};
use crate::error::AttributeError;
use crate::ir::Type;
use crate::passes::construct::OperandTable;
use crate::passes::infer::DescriptorTable;
use crate::support::{ConcatenationInfo, Network, OperandsAndId};

const DATA: usize = 0;
const INPUT_SCALES: usize = 1;
const INPUT_ZERO_POINTS: usize = 2;
const OUTPUT_SCALE: usize = 3;
const OUTPUT_ZERO_POINT: usize = 4;

fn axis(call: &CallNode<'_>, fields: &[Type]) -> Result<u32, AttributeError> {
    let axis = call.int_attr("axis")?;
    let rank = fields
        .first()
        .and_then(Type::as_tensor)
        .map(|t| t.rank())
        .ok_or_else(|| AttributeError::new("concatenate requires at least one tensor input"))?;
    normalize_axis(axis, rank)
}

/// Assign every field of `data` its own shape, type and input quantization
pub fn infer(
    call: &CallNode<'_>,
    _descriptors: &DescriptorTable,
) -> Result<ArgumentDescriptors, AttributeError> {
    let (data, _) = call.arg(DATA)?;
    let fields = call.tuple_arg_fields(DATA)?;

    let mut err = AttributeError::default();
    err.absorb(axis(call, fields));
    err.absorb(call.quantization_args(OUTPUT_SCALE, OUTPUT_ZERO_POINT));
    let scales = err.absorb(call.f32_tuple_arg(INPUT_SCALES));
    let zero_points = err.absorb(call.i32_tuple_arg(INPUT_ZERO_POINTS));

    let (Some(scales), Some(zero_points)) = (scales, zero_points) else {
        return Err(err);
    };
    if scales.len() != fields.len() || zero_points.len() != fields.len() {
        err.push(format!(
            "{} inputs but {} scales and {} zero points",
            fields.len(),
            scales.len(),
            zero_points.len()
        ));
        return Err(err);
    }

    let mut descriptors = Vec::with_capacity(fields.len());
    for (i, field) in fields.iter().enumerate() {
        let Some(tensor) = field.as_tensor() else {
            err.push(format!("input {} has type {}, expected a tensor", i, field));
            continue;
        };
        let quantization = QuantizationInfo::new(zero_points[i], scales[i]);
        if let Some(desc) = err.absorb(TensorDescriptor::from_tensor_type(
            tensor,
            DataFormat::Nhwc,
            quantization,
        )) {
            descriptors.push(desc);
        }
    }

    err.into_result(vec![(data, descriptors)])
}

/// Concatenate the operands of `data` along `axis`
pub fn construct<N: Network + ?Sized>(
    call: &CallNode<'_>,
    operands: &OperandTable,
    network: &mut N,
) -> Result<OperandsAndId, ConstructError> {
    let (data, _) = call.arg(DATA)?;
    let fields = call.tuple_arg_fields(DATA)?;

    let mut err = AttributeError::default();
    let axis = err.absorb(axis(call, fields));
    let output_quantization = err.absorb(call.quantization_args(OUTPUT_SCALE, OUTPUT_ZERO_POINT));
    let inputs = err.absorb(argument_operands(operands, data));

    let (Some(axis), Some(output_quantization), Some(inputs)) = (axis, output_quantization, inputs)
    else {
        return Err(err.into());
    };

    let info = ConcatenationInfo {
        axis,
        output_quantization,
    };
    let produced = network.add_concatenation(&inputs, &info)?;
    Ok(OperandsAndId {
        operands: vec![produced.operand],
        operation_id: produced.operation_id,
    })
}
