//! # NPU Lowering Compiler
//!
//! Lowers functions of a type-checked graph IR into networks for an NPU
//! support library, compiles them, and records how the compiled buffers map
//! back onto the function's parameters and results.
//!
//! ## Compilation Flow
//!
//! ```text
//! Function → TensorInference → NetworkConstruction → SupportLibrary::compile → reconcile
//! ```
//!
//! ### Step 1: Tensor inference
//!
//! - Seed the function body from its static type
//! - Walk towards the parameters, pushing descriptors onto arguments
//! - Tuples are entered only once every projection has reported back
//!
//! ### Step 2: Network construction
//!
//! - One network input per parameter value, in parameter order
//! - One network operation per supported call, arguments first
//! - One network output per value of the body
//!
//! ### Step 3: Compile and reconcile
//!
//! - The first candidate returned by the support library is kept
//! - Compiled buffers are matched to caller positions by operation id
//!
//! ## Supported operators
//!
//! - `qnn.concatenate`
//! - `split`

pub mod compiler;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod ir;
pub mod ops;
pub mod passes;
pub mod support;

// Re-exports for convenient access
pub use compiler::{
    BufferPermutation, CompilationStats, CompiledModule, Compiler, OrderedCompiledNetwork,
};
pub use config::CompilerConfig;
pub use descriptor::{DataFormat, DataType, QuantizationInfo, TensorDescriptor, TensorShape};
pub use error::{AttributeError, BufferSlot, CompilerError, Result};
pub use ir::{AttrValue, ElemType, ExprId, Function, IrGraph, Literal, Type};
pub use ops::OperatorKind;
pub use passes::{DescriptorTable, NetworkConstruction, NetworkWithIds, TensorInference};
