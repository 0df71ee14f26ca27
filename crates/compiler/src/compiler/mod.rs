//! Compilation orchestrator
//!
//! Lowers one function at a time to a compiled accelerator network.
//!
//! # Architecture
//!
//! ```text
//! Function (type-checked graph IR)
//!     ↓
//! 1. Tensor inference → descriptor table
//!     ↓
//! 2. Network construction → network + input/output id maps
//!     ↓
//! 3. SupportLibrary::compile → candidates (first one wins)
//!     ↓
//! 4. Order reconciliation → caller order of every buffer
//! ```
//!
//! # Example
//!
//! ```no_run
//! use npu_lower_compiler::support::ReferenceSupport;
//! use npu_lower_compiler::{Compiler, CompilerConfig, Function};
//!
//! # fn lower(function: &Function) -> npu_lower_compiler::Result<()> {
//! let config = CompilerConfig::find_and_load()?.unwrap_or_default();
//! let compiler = Compiler::new(ReferenceSupport::new()).with_config(config);
//!
//! let network = compiler.compile_function(function)?;
//! println!("{}: inputs {:?}", network.name, network.input_order);
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::CompilerConfig;
use crate::ir::Function;
use crate::passes::{NetworkConstruction, TensorInference};
use crate::support::{CompilationOptions, Network, SupportLibrary};
use crate::{CompilerError, Result};

mod order;

pub use order::{reconcile, restore, BufferPermutation};

/// Summary of one function's compilation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilationStats {
    /// Network inputs created
    pub inputs: usize,
    /// Network outputs created
    pub outputs: usize,
    /// Operations in the network, inputs and outputs included
    pub operations: usize,
    pub compilation_time: Duration,
}

/// A compiled network together with the caller order of its buffers
///
/// This is the unit handed on to runtime module packaging.
#[derive(Debug, Clone)]
pub struct OrderedCompiledNetwork<C> {
    /// External symbol of the source function
    pub name: String,
    pub compiled: C,
    /// Caller input position of each compiled input buffer
    pub input_order: Vec<u32>,
    /// Caller output position of each compiled output buffer
    pub output_order: Vec<u32>,
    pub stats: CompilationStats,
}

/// Every network compiled for a module, in function order
#[derive(Debug, Clone)]
pub struct CompiledModule<C> {
    pub networks: Vec<OrderedCompiledNetwork<C>>,
}

impl<C> CompiledModule<C> {
    /// Look up a network by external symbol
    pub fn get(&self, name: &str) -> Option<&OrderedCompiledNetwork<C>> {
        self.networks.iter().find(|network| network.name == name)
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}

/// NPU lowering compiler
///
/// Holds the support library and the configuration read once per compilation.
pub struct Compiler<S> {
    support: S,
    config: CompilerConfig,
}

impl<S: SupportLibrary> Compiler<S> {
    /// Create a compiler with default configuration
    pub fn new(support: S) -> Self {
        Self {
            support,
            config: CompilerConfig::default(),
        }
    }

    /// Set the configuration
    pub fn with_config(mut self, config: CompilerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn support(&self) -> &S {
        &self.support
    }

    /// Compile one function
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - the function has no global symbol
    /// - a node uses an unsupported operator or attribute combination
    /// - the support library rejects the network or produces no candidates
    /// - a compiled buffer cannot be matched to a caller position
    #[tracing::instrument(
        skip_all,
        fields(function = function.global_symbol().unwrap_or("<anonymous>"))
    )]
    pub fn compile_function(
        &self,
        function: &Function,
    ) -> Result<OrderedCompiledNetwork<S::Compiled>> {
        let name = function
            .global_symbol()
            .ok_or(CompilerError::MissingSymbol)?
            .to_string();
        let start = Instant::now();

        debug!("Lowering '{}': {}", name, function.graph().statistics());
        if self.config.dump_debug_files {
            self.dump_graph(&name, function)?;
        }

        // Step 1: infer descriptors
        let descriptors = TensorInference::new().run(function)?;

        // Step 2: build the network
        let built = NetworkConstruction::new().run(&self.support, function, &descriptors)?;

        // Step 3: compile, first candidate wins
        let options = CompilationOptions::from_config(&self.config);
        let candidates = self.support.compile(&built.network, &options)?;
        if candidates.len() > 1 {
            debug!("Using the first of {} candidates", candidates.len());
        }
        let compiled = candidates
            .into_iter()
            .next()
            .ok_or_else(|| CompilerError::NoCandidates {
                function: name.clone(),
            })?;

        // Step 4: restore caller order
        let order = reconcile(&compiled, &built.input_ids, &built.output_ids)?;

        let stats = CompilationStats {
            inputs: built.inputs.len(),
            outputs: built.outputs.len(),
            operations: built.network.operation_count(),
            compilation_time: start.elapsed(),
        };
        info!(
            "Compiled '{}': {} inputs, {} outputs, {} operations in {:?}",
            name, stats.inputs, stats.outputs, stats.operations, stats.compilation_time
        );

        Ok(OrderedCompiledNetwork {
            name,
            compiled,
            input_order: order.inputs,
            output_order: order.outputs,
            stats,
        })
    }

    /// Compile every function of a module, stopping at the first failure
    pub fn compile_functions(
        &self,
        functions: &[Function],
    ) -> Result<CompiledModule<S::Compiled>> {
        let networks = functions
            .iter()
            .map(|function| self.compile_function(function))
            .collect::<Result<Vec<_>>>()?;

        info!("Compiled module with {} networks", networks.len());
        Ok(CompiledModule { networks })
    }

    fn dump_graph(&self, name: &str, function: &Function) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.config.debug_dir)?;
        let path = self.config.debug_dir.join(format!("{}.dot", dump_file_stem(name)));
        std::fs::write(&path, function.graph().visualize_dot())?;
        debug!("Wrote IR graph to {}", path.display());
        Ok(path)
    }
}

/// Symbol reduced to characters that are safe in a single path component
fn dump_file_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '-' => c,
            _ => '_',
        })
        .collect();
    if stem.is_empty() {
        "_".to_string()
    } else {
        stem
    }
}
