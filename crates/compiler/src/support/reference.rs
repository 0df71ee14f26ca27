//! Software implementation of the support library
//!
//! `ReferenceNetwork` validates every primitive the way the accelerator's
//! network builder does and tracks the descriptor of each operand. Compiling
//! it lays out one buffer per network input and output, optionally in
//! reverse order so that callers exercise order reconciliation.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

use super::{
    CompilationOptions, CompiledNetwork, ConcatenationInfo, InputBufferInfo, Network,
    NotSupported, Operand, OperandAndId, OperandsAndId, OperationId, OutputBufferInfo, SplitInfo,
    SupportLibrary,
};
use crate::descriptor::{DataFormat, TensorDescriptor, MAX_RANK};
use crate::{CompilerError, Result};

/// Order in which compiled buffers are reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferOrder {
    /// Order in which inputs and outputs were added
    #[default]
    Declared,
    Reversed,
}

/// An operation recorded in a [`ReferenceNetwork`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Operation {
    Input {
        descriptor: TensorDescriptor,
    },
    Output {
        input: Operand,
    },
    Concatenation {
        inputs: Vec<Operand>,
        info: ConcatenationInfo,
    },
    Split {
        input: Operand,
        info: SplitInfo,
    },
}

/// A value produced by an operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperandInfo {
    pub producer: OperationId,
    pub output_index: u32,
    pub descriptor: TensorDescriptor,
}

/// In-memory accelerator graph
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReferenceNetwork {
    operations: Vec<Operation>,
    operands: Vec<OperandInfo>,
}

impl ReferenceNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn operation(&self, id: OperationId) -> Option<&Operation> {
        self.operations.get(id.0 as usize)
    }

    /// Descriptor and producer of an operand issued by this network
    pub fn operand(&self, operand: Operand) -> Option<&OperandInfo> {
        self.operands.get(operand.index() as usize)
    }

    fn lookup(&self, operand: Operand) -> std::result::Result<&OperandInfo, NotSupported> {
        self.operand(operand).ok_or_else(|| {
            NotSupported::new(format!(
                "operand {} does not belong to this network",
                operand.index()
            ))
        })
    }

    fn push_operation(&mut self, operation: Operation) -> OperationId {
        let id = OperationId(self.operations.len() as u32);
        self.operations.push(operation);
        id
    }

    fn push_operand(
        &mut self,
        producer: OperationId,
        output_index: u32,
        descriptor: TensorDescriptor,
    ) -> Operand {
        let operand = Operand::from_index(self.operands.len() as u32);
        self.operands.push(OperandInfo {
            producer,
            output_index,
            descriptor,
        });
        operand
    }
}

fn check_axis(axis: u32) -> std::result::Result<usize, NotSupported> {
    let axis = axis as usize;
    if axis >= MAX_RANK {
        return Err(NotSupported::new(format!(
            "axis {} is out of range for a rank {} tensor",
            axis, MAX_RANK
        )));
    }
    Ok(axis)
}

impl Network for ReferenceNetwork {
    fn add_input(
        &mut self,
        descriptor: &TensorDescriptor,
    ) -> std::result::Result<OperandAndId, NotSupported> {
        if descriptor.shape.contains(&0) {
            return Err(NotSupported::new(format!(
                "input shape {:?} has a zero extent",
                descriptor.shape
            )));
        }
        buffer_size(descriptor)?;
        let operation_id = self.push_operation(Operation::Input {
            descriptor: descriptor.clone(),
        });
        let operand = self.push_operand(operation_id, 0, descriptor.clone());
        Ok(OperandAndId {
            operand,
            operation_id,
        })
    }

    fn add_output(&mut self, operand: Operand) -> std::result::Result<OperationId, NotSupported> {
        self.lookup(operand)?;
        Ok(self.push_operation(Operation::Output { input: operand }))
    }

    fn add_concatenation(
        &mut self,
        inputs: &[Operand],
        info: &ConcatenationInfo,
    ) -> std::result::Result<OperandAndId, NotSupported> {
        let axis = check_axis(info.axis)?;
        let (first, rest) = inputs
            .split_first()
            .ok_or_else(|| NotSupported::new("concatenation requires at least one input"))?;

        let first_desc = self.lookup(*first)?.descriptor.clone();
        let mut shape = first_desc.shape;
        for operand in rest {
            let desc = &self.lookup(*operand)?.descriptor;
            if desc.data_type != first_desc.data_type {
                return Err(NotSupported::new(format!(
                    "concatenation inputs must share a data type ({:?} vs {:?})",
                    first_desc.data_type, desc.data_type
                )));
            }
            for dim in 0..MAX_RANK {
                if dim != axis && desc.shape[dim] != first_desc.shape[dim] {
                    return Err(NotSupported::new(format!(
                        "concatenation inputs {:?} and {:?} differ outside axis {}",
                        first_desc.shape, desc.shape, axis
                    )));
                }
            }
            shape[axis] = shape[axis].checked_add(desc.shape[axis]).ok_or_else(|| {
                NotSupported::new(format!(
                    "concatenated extent along axis {} overflows",
                    axis
                ))
            })?;
        }

        let output = TensorDescriptor::new(
            shape,
            first_desc.data_type,
            DataFormat::Nhwc,
            info.output_quantization.clone(),
        );
        buffer_size(&output)?;
        let operation_id = self.push_operation(Operation::Concatenation {
            inputs: inputs.to_vec(),
            info: info.clone(),
        });
        let operand = self.push_operand(operation_id, 0, output);
        Ok(OperandAndId {
            operand,
            operation_id,
        })
    }

    fn add_split(
        &mut self,
        input: Operand,
        info: &SplitInfo,
    ) -> std::result::Result<OperandsAndId, NotSupported> {
        let axis = check_axis(info.axis)?;
        let input_desc = self.lookup(input)?.descriptor.clone();

        if info.sizes.iter().any(|&size| size == 0) {
            return Err(NotSupported::new("split sizes must be non-zero"));
        }
        let total: u64 = info.sizes.iter().map(|&s| u64::from(s)).sum();
        if total != u64::from(input_desc.shape[axis]) {
            return Err(NotSupported::new(format!(
                "split sizes {:?} do not sum to the axis extent {}",
                info.sizes, input_desc.shape[axis]
            )));
        }

        let operation_id = self.push_operation(Operation::Split {
            input,
            info: info.clone(),
        });
        let operands = info
            .sizes
            .iter()
            .enumerate()
            .map(|(index, &size)| {
                let mut desc = input_desc.clone();
                desc.shape[axis] = size;
                self.push_operand(operation_id, index as u32, desc)
            })
            .collect();

        Ok(OperandsAndId {
            operands,
            operation_id,
        })
    }

    fn operation_count(&self) -> usize {
        self.operations.len()
    }
}

/// Buffer layout produced by [`ReferenceSupport::compile`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceCompiledNetwork {
    inputs: Vec<InputBufferInfo>,
    outputs: Vec<OutputBufferInfo>,
}

impl ReferenceCompiledNetwork {
    pub fn new(inputs: Vec<InputBufferInfo>, outputs: Vec<OutputBufferInfo>) -> Self {
        Self { inputs, outputs }
    }
}

impl CompiledNetwork for ReferenceCompiledNetwork {
    fn input_buffer_infos(&self) -> &[InputBufferInfo] {
        &self.inputs
    }

    fn output_buffer_infos(&self) -> &[OutputBufferInfo] {
        &self.outputs
    }
}

/// Software support library
#[derive(Debug)]
pub struct ReferenceSupport {
    buffer_order: BufferOrder,
    candidates: usize,
    dumps: AtomicUsize,
}

impl Default for ReferenceSupport {
    fn default() -> Self {
        Self {
            buffer_order: BufferOrder::Declared,
            candidates: 1,
            dumps: AtomicUsize::new(0),
        }
    }
}

impl ReferenceSupport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the order compiled buffers are reported in
    pub fn with_buffer_order(mut self, order: BufferOrder) -> Self {
        self.buffer_order = order;
        self
    }

    /// Set how many candidates `compile` returns
    pub fn with_candidates(mut self, candidates: usize) -> Self {
        self.candidates = candidates;
        self
    }

    fn dump_network(
        &self,
        network: &ReferenceNetwork,
        options: &CompilationOptions,
    ) -> Result<PathBuf> {
        #[derive(Serialize)]
        struct Dump<'a> {
            options: &'a CompilationOptions,
            network: &'a ReferenceNetwork,
        }

        let seq = self.dumps.fetch_add(1, Ordering::Relaxed);
        std::fs::create_dir_all(&options.debug.debug_dir)?;
        let path = options.debug.debug_dir.join(format!("network_{}.json", seq));
        let json = serde_json::to_string_pretty(&Dump { options, network })?;
        std::fs::write(&path, json)?;
        Ok(path)
    }
}

/// Bytes needed to hold a tensor; buffers are addressed with 32 bits
fn buffer_size(desc: &TensorDescriptor) -> std::result::Result<u32, NotSupported> {
    let elem_bytes: u32 = match desc.data_type {
        crate::descriptor::DataType::Int32Quantized => 4,
        _ => 1,
    };
    desc.shape
        .iter()
        .try_fold(elem_bytes, |size, &dim| size.checked_mul(dim))
        .ok_or_else(|| {
            NotSupported::new(format!(
                "tensor of shape {:?} does not fit in a {}-byte buffer",
                desc.shape,
                u32::MAX
            ))
        })
}

fn oversized(err: NotSupported) -> CompilerError {
    CompilerError::InvalidGraph(err.reason)
}

impl SupportLibrary for ReferenceSupport {
    type Network = ReferenceNetwork;
    type Compiled = ReferenceCompiledNetwork;

    fn create_network(&self) -> ReferenceNetwork {
        ReferenceNetwork::new()
    }

    fn compile(
        &self,
        network: &ReferenceNetwork,
        options: &CompilationOptions,
    ) -> Result<Vec<ReferenceCompiledNetwork>> {
        if options.debug.dump_debug_files {
            let path = self.dump_network(network, options)?;
            debug!("Wrote network dump to {}", path.display());
        }

        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        for (index, operation) in network.operations.iter().enumerate() {
            match operation {
                Operation::Input { descriptor } => inputs.push(InputBufferInfo {
                    source_operation_id: OperationId(index as u32),
                    size: buffer_size(descriptor).map_err(oversized)?,
                }),
                Operation::Output { input } => {
                    // add_output validated the operand
                    if let Some(source) = network.operand(*input) {
                        outputs.push(OutputBufferInfo {
                            source_operation_id: source.producer,
                            source_operation_output_index: source.output_index,
                            size: buffer_size(&source.descriptor).map_err(oversized)?,
                        });
                    }
                }
                Operation::Concatenation { .. } | Operation::Split { .. } => {}
            }
        }

        if self.buffer_order == BufferOrder::Reversed {
            inputs.reverse();
            outputs.reverse();
        }

        info!(
            "Compiled reference network for {}: {} inputs, {} outputs, {} candidates",
            options.variant,
            inputs.len(),
            outputs.len(),
            self.candidates
        );

        let compiled = ReferenceCompiledNetwork::new(inputs, outputs);
        Ok(vec![compiled; self.candidates])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{DataType, QuantizationInfo};

    fn nhwc(shape: [u32; 4]) -> TensorDescriptor {
        TensorDescriptor::new(
            shape,
            DataType::Uint8Quantized,
            DataFormat::Nhwc,
            QuantizationInfo::default(),
        )
    }

    #[test]
    fn test_concatenation_shape() {
        let mut network = ReferenceNetwork::new();
        let a = network.add_input(&nhwc([1, 4, 4, 2])).unwrap();
        let b = network.add_input(&nhwc([1, 4, 4, 6])).unwrap();

        let concat = network
            .add_concatenation(
                &[a.operand, b.operand],
                &ConcatenationInfo {
                    axis: 3,
                    output_quantization: QuantizationInfo::new(3, 0.5),
                },
            )
            .unwrap();

        let out = network.operand(concat.operand).unwrap();
        assert_eq!(out.descriptor.shape, [1, 4, 4, 8]);
        assert_eq!(out.descriptor.quantization, QuantizationInfo::new(3, 0.5));
        assert_eq!(concat.operation_id, OperationId(2));
    }

    #[test]
    fn test_concatenation_rejects_mismatch() {
        let mut network = ReferenceNetwork::new();
        let a = network.add_input(&nhwc([1, 4, 4, 2])).unwrap();
        let b = network.add_input(&nhwc([1, 5, 4, 2])).unwrap();

        let info = ConcatenationInfo {
            axis: 3,
            output_quantization: QuantizationInfo::default(),
        };
        assert!(network
            .add_concatenation(&[a.operand, b.operand], &info)
            .is_err());
        assert!(network.add_concatenation(&[], &info).is_err());
    }

    #[test]
    fn test_oversized_buffers_are_rejected() {
        let mut network = ReferenceNetwork::new();
        let err = network
            .add_input(&nhwc([65536, 65536, 1, 1]))
            .unwrap_err();
        assert!(err.reason.contains("does not fit"));

        let mut wide = nhwc([1, 1, 1, 1 << 30]);
        wide.data_type = DataType::Int32Quantized;
        assert!(network.add_input(&wide).is_err());

        // each half fits, the concatenation does not
        let half = nhwc([1, 1, 1, 1 << 31]);
        let a = network.add_input(&half).unwrap();
        let b = network.add_input(&half).unwrap();
        let info = ConcatenationInfo {
            axis: 3,
            output_quantization: QuantizationInfo::default(),
        };
        let err = network
            .add_concatenation(&[a.operand, b.operand], &info)
            .unwrap_err();
        assert!(err.reason.contains("overflows"));
        assert_eq!(network.operation_count(), 2);
    }

    #[test]
    fn test_split_outputs() {
        let mut network = ReferenceNetwork::new();
        let x = network.add_input(&nhwc([1, 4, 4, 9])).unwrap();

        let split = network
            .add_split(
                x.operand,
                &SplitInfo {
                    axis: 3,
                    sizes: vec![3, 3, 3],
                },
            )
            .unwrap();

        assert_eq!(split.operands.len(), 3);
        let last = network.operand(split.operands[2]).unwrap();
        assert_eq!(last.output_index, 2);
        assert_eq!(last.descriptor.shape, [1, 4, 4, 3]);

        let bad = SplitInfo {
            axis: 3,
            sizes: vec![4, 4],
        };
        assert!(network.add_split(x.operand, &bad).is_err());
    }

    #[test]
    fn test_compile_buffer_order() {
        let mut network = ReferenceNetwork::new();
        let a = network.add_input(&nhwc([1, 1, 1, 4])).unwrap();
        let b = network.add_input(&nhwc([1, 1, 1, 4])).unwrap();
        network.add_output(a.operand).unwrap();
        network.add_output(b.operand).unwrap();

        let options = CompilationOptions::default();
        let declared = ReferenceSupport::new().compile(&network, &options).unwrap();
        assert_eq!(declared.len(), 1);
        assert_eq!(
            declared[0].input_buffer_infos()[0].source_operation_id,
            a.operation_id
        );

        let reversed = ReferenceSupport::new()
            .with_buffer_order(BufferOrder::Reversed)
            .with_candidates(2)
            .compile(&network, &options)
            .unwrap();
        assert_eq!(reversed.len(), 2);
        assert_eq!(
            reversed[0].input_buffer_infos()[0].source_operation_id,
            b.operation_id
        );
        assert_eq!(
            reversed[0].output_buffer_infos()[0].source_operation_id,
            b.operation_id
        );
    }

    #[test]
    fn test_debug_dump() {
        let dir = tempfile::tempdir().unwrap();
        let mut options = CompilationOptions::default();
        options.debug.dump_debug_files = true;
        options.debug.debug_dir = dir.path().to_path_buf();

        let mut network = ReferenceNetwork::new();
        let x = network.add_input(&nhwc([1, 2, 2, 1])).unwrap();
        network.add_output(x.operand).unwrap();

        ReferenceSupport::new().compile(&network, &options).unwrap();

        let dump = std::fs::read_to_string(dir.path().join("network_0.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&dump).unwrap();
        assert_eq!(value["options"]["variant"], "n77");
        assert_eq!(value["network"]["operations"].as_array().unwrap().len(), 2);
    }
}
