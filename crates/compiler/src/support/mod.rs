//! Interfaces of the accelerator support library
//!
//! The support library owns the accelerator graph (`Network`), compiles it,
//! and reports the buffer layout of the result (`CompiledNetwork`). This crate
//! only drives those interfaces; [`reference`] provides a software
//! implementation for hosts without the vendor library.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::descriptor::{QuantizationInfo, TensorDescriptor};

pub mod options;
pub mod reference;

pub use options::{BlockConfig, CompilationOptions, DebugOptions, Strategy};
pub use reference::{BufferOrder, ReferenceCompiledNetwork, ReferenceNetwork, ReferenceSupport};

/// Identifier the network assigns to every operation it creates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperationId(pub u32);

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle to a value produced inside a network
///
/// Handles are only meaningful to the network that issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Operand(u32);

impl Operand {
    pub fn from_index(index: u32) -> Self {
        Self(index)
    }

    pub fn index(self) -> u32 {
        self.0
    }
}

/// A single produced operand and the operation that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperandAndId {
    pub operand: Operand,
    pub operation_id: OperationId,
}

/// All operands of a multi-output operation, in output-index order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperandsAndId {
    pub operands: Vec<Operand>,
    pub operation_id: OperationId,
}

/// Parameters of a concatenation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcatenationInfo {
    pub axis: u32,
    pub output_quantization: QuantizationInfo,
}

/// Parameters of a split; `sizes` are the extents of the pieces along `axis`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitInfo {
    pub axis: u32,
    pub sizes: Vec<u32>,
}

/// Raised by a network primitive that refuses the requested configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct NotSupported {
    pub reason: String,
}

impl NotSupported {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Accelerator graph under construction
pub trait Network {
    fn add_input(&mut self, descriptor: &TensorDescriptor) -> Result<OperandAndId, NotSupported>;

    /// Mark `operand` as a network output, returning the id of the output operation
    fn add_output(&mut self, operand: Operand) -> Result<OperationId, NotSupported>;

    fn add_concatenation(
        &mut self,
        inputs: &[Operand],
        info: &ConcatenationInfo,
    ) -> Result<OperandAndId, NotSupported>;

    fn add_split(&mut self, input: Operand, info: &SplitInfo) -> Result<OperandsAndId, NotSupported>;

    /// Number of operations created so far (inputs and outputs included)
    fn operation_count(&self) -> usize;
}

/// Input buffer of a compiled network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputBufferInfo {
    /// Input operation this buffer feeds
    pub source_operation_id: OperationId,
    /// Size in bytes
    pub size: u32,
}

/// Output buffer of a compiled network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputBufferInfo {
    /// Operation whose output lands in this buffer
    pub source_operation_id: OperationId,
    pub source_operation_output_index: u32,
    /// Size in bytes
    pub size: u32,
}

/// Result of compiling a network
///
/// The buffer lists are in the compiler's own order, which need not match the
/// order inputs and outputs were added.
pub trait CompiledNetwork {
    fn input_buffer_infos(&self) -> &[InputBufferInfo];
    fn output_buffer_infos(&self) -> &[OutputBufferInfo];
}

/// Entry points of the accelerator support library
pub trait SupportLibrary {
    type Network: Network;
    type Compiled: CompiledNetwork;

    fn create_network(&self) -> Self::Network;

    /// Compile `network`, returning every candidate the compiler produced
    fn compile(
        &self,
        network: &Self::Network,
        options: &CompilationOptions,
    ) -> crate::Result<Vec<Self::Compiled>>;
}
