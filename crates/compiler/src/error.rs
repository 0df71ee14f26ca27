//! Error types for the NPU lowering compiler

use std::fmt;
use std::io;
use thiserror::Error;

use crate::ir::ExprId;
use crate::support::OperationId;

/// Result type for compiler operations
pub type Result<T> = std::result::Result<T, CompilerError>;

/// Errors that can occur while lowering a function to an NPU network
///
/// The first three variants are raised per node by the passes and always
/// name the offending node. The reconciliation and candidate variants are
/// invariant violations surfaced by the orchestrator.
#[derive(Debug, Error)]
pub enum CompilerError {
    #[error("node %{}: unsupported operator '{}'", .node.index(), .op)]
    UnsupportedOperator { node: ExprId, op: String },

    #[error("node %{} ({}): {}", .node.index(), .op, .source)]
    InvalidAttributes {
        node: ExprId,
        op: String,
        #[source]
        source: AttributeError,
    },

    #[error(
        "node %{} ({}): rejected by the support library: {}",
        .node.index(),
        .op,
        .message
    )]
    AcceleratorRejected {
        node: ExprId,
        op: String,
        message: String,
    },

    #[error("node %{}: tensor descriptor was never inferred", .node.index())]
    UnresolvedDescriptor { node: ExprId },

    #[error("NPU compiler failed to compile network '{function}': no candidates produced")]
    NoCandidates { function: String },

    #[error("compiled network references {slot} that was never recorded during construction")]
    ReconciliationMiss { slot: BufferSlot },

    #[error("Failed to retrieve external symbol: function has no global_symbol attribute")]
    MissingSymbol,

    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for CompilerError {
    fn from(err: toml::de::Error) -> Self {
        CompilerError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for CompilerError {
    fn from(err: serde_json::Error) -> Self {
        CompilerError::Serialization(err.to_string())
    }
}

/// A compiled-network buffer that could not be matched during reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferSlot {
    Input {
        operation_id: OperationId,
    },
    Output {
        operation_id: OperationId,
        output_index: u32,
    },
}

impl fmt::Display for BufferSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferSlot::Input { operation_id } => {
                write!(f, "input buffer of operation {}", operation_id)
            }
            BufferSlot::Output {
                operation_id,
                output_index,
            } => write!(
                f,
                "output buffer {} of operation {}",
                output_index, operation_id
            ),
        }
    }
}

/// Attribute problems found by an operator translator
///
/// Translators keep checking after the first problem so that a single
/// diagnostic lists everything wrong with a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
#[error("{}", .messages.join("; "))]
pub struct AttributeError {
    messages: Vec<String>,
}

impl AttributeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            messages: vec![message.into()],
        }
    }

    pub fn push(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    /// Record the error half of `result`, returning the value if there was one
    pub fn absorb<T>(&mut self, result: std::result::Result<T, AttributeError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.messages.extend(err.messages);
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// `Ok(value)` when nothing was recorded, otherwise `Err(self)`
    pub fn into_result<T>(self, value: T) -> std::result::Result<T, AttributeError> {
        if self.messages.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}
