// Lowering passes
//
// Inference runs to completion first; construction then reads its finished
// table. The two never interleave.

pub mod construct;
pub mod infer;

pub use construct::{NetworkConstruction, NetworkWithIds, OperandTable, ProducedOperand};
pub use infer::{DescriptorTable, TensorInference};
