// Graph IR handed to the NPU lowering compiler
//
// The IR arrives fully type-checked: every node carries its resolved static
// type. Nodes are immutable and may be shared between consumers, so the passes
// keep all derived state in side tables keyed by node identity.

pub mod graph;
pub mod types;

// Re-exports for convenience
pub use graph::{
    Argument, AttrValue, Attrs, ExprId, ExprKind, Function, GraphStatistics, IrGraph, IrNode,
    Literal, NewCall,
};
pub use types::{ElemType, TensorType, Type};
