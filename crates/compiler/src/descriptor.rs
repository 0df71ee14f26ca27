//! Tensor descriptors: the metadata the accelerator needs for every value
//!
//! A descriptor is a plain value. The inference pass stores them per node in a
//! side table, using [`TensorDescriptor::UNRESOLVED`] for slots that have been
//! allocated but not yet inferred.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::AttributeError;
use crate::ir::{ElemType, TensorType, Type};

/// Fixed-rank accelerator shape
pub type TensorShape = [u32; 4];

/// Maximum rank the accelerator accepts
pub const MAX_RANK: usize = 4;

/// Element encoding of an accelerator tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DataType {
    #[default]
    Uint8Quantized,
    Int8Quantized,
    Int32Quantized,
}

impl DataType {
    /// Map an IR element type onto the accelerator's encodings
    pub fn from_elem(dtype: ElemType) -> Result<Self, AttributeError> {
        match dtype {
            ElemType::Uint8 => Ok(DataType::Uint8Quantized),
            ElemType::Int8 => Ok(DataType::Int8Quantized),
            ElemType::Int32 => Ok(DataType::Int32Quantized),
            other => Err(AttributeError::new(format!(
                "dtype={}, dtype must be either uint8, int8 or int32",
                other
            ))),
        }
    }
}

/// Memory layout of an accelerator tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DataFormat {
    #[default]
    Nhwc,
    Nchw,
    /// NHWC in 16x16 bricks
    Nhwcb,
    Hwio,
    Hwim,
}

/// Per-channel quantization scales
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerChannel {
    pub axis: u32,
    pub scales: Vec<f32>,
}

/// Affine quantization parameters: `real = scale * (q - zero_point)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantizationInfo {
    pub zero_point: i32,
    pub scale: f32,
    pub per_channel: Option<PerChannel>,
}

impl QuantizationInfo {
    pub const DEFAULT: QuantizationInfo = QuantizationInfo {
        zero_point: 0,
        scale: 1.0,
        per_channel: None,
    };

    pub fn new(zero_point: i32, scale: f32) -> Self {
        Self {
            zero_point,
            scale,
            per_channel: None,
        }
    }
}

impl Default for QuantizationInfo {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Shape, encoding, layout and quantization of one produced value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorDescriptor {
    pub shape: TensorShape,
    pub data_type: DataType,
    pub format: DataFormat,
    pub quantization: QuantizationInfo,
}

impl TensorDescriptor {
    /// "Not yet inferred" marker
    pub const UNRESOLVED: TensorDescriptor = TensorDescriptor {
        shape: [0; 4],
        data_type: DataType::Uint8Quantized,
        format: DataFormat::Nhwc,
        quantization: QuantizationInfo::DEFAULT,
    };

    pub fn new(
        shape: TensorShape,
        data_type: DataType,
        format: DataFormat,
        quantization: QuantizationInfo,
    ) -> Self {
        Self {
            shape,
            data_type,
            format,
            quantization,
        }
    }

    /// Build a descriptor from an IR tensor type
    ///
    /// Reports rank and element type problems together.
    pub fn from_tensor_type(
        ty: &TensorType,
        format: DataFormat,
        quantization: QuantizationInfo,
    ) -> Result<Self, AttributeError> {
        let mut err = AttributeError::default();
        let shape = err.absorb(tensor_shape(&ty.shape));
        let data_type = err.absorb(DataType::from_elem(ty.dtype));
        match (shape, data_type) {
            (Some(shape), Some(data_type)) if err.is_empty() => {
                Ok(Self::new(shape, data_type, format, quantization))
            }
            _ => Err(err),
        }
    }

    pub fn is_resolved(&self) -> bool {
        *self != Self::UNRESOLVED
    }
}

impl Default for TensorDescriptor {
    fn default() -> Self {
        Self::UNRESOLVED
    }
}

impl fmt::Display for TensorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} {:?} {:?} (zp={}, scale={})",
            self.shape,
            self.data_type,
            self.format,
            self.quantization.zero_point,
            self.quantization.scale
        )
    }
}

/// Convert an IR shape to the accelerator's fixed rank
///
/// Dimensions are left-aligned and the tail is padded with 1.
pub fn tensor_shape(dims: &[i64]) -> Result<TensorShape, AttributeError> {
    if dims.len() > MAX_RANK {
        return Err(AttributeError::new(format!(
            "dimensions={}, dimensions must be <= {}",
            dims.len(),
            MAX_RANK
        )));
    }

    let mut shape = [1u32; 4];
    for (i, &dim) in dims.iter().enumerate() {
        shape[i] = u32::try_from(dim).map_err(|_| {
            AttributeError::new(format!("dimension {}={} is not a valid extent", i, dim))
        })?;
    }
    Ok(shape)
}

/// Descriptors for a function body, derived from its static type
///
/// One NHWC descriptor per produced value with default quantization. The
/// result is always resolved, which lets the guarded inference walk enter
/// the body.
pub fn seed_descriptors(ty: &Type) -> Result<Vec<TensorDescriptor>, AttributeError> {
    let fields: Vec<&Type> = match ty {
        Type::Tuple(fields) => fields.iter().collect(),
        other => vec![other],
    };

    let mut err = AttributeError::default();
    let mut descriptors = Vec::with_capacity(fields.len());
    for (i, field) in fields.into_iter().enumerate() {
        match field.as_tensor() {
            Some(tensor) => {
                if let Some(desc) = err.absorb(TensorDescriptor::from_tensor_type(
                    tensor,
                    DataFormat::Nhwc,
                    QuantizationInfo::default(),
                )) {
                    descriptors.push(desc);
                }
            }
            None => err.push(format!("output {} has type {}, expected a tensor", i, field)),
        }
    }
    err.into_result(descriptors)
}
