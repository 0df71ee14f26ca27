//! Order reconciliation is a bijection between compiled and caller order

mod common;

use common::FunctionBuilder;
use npu_lower_compiler::compiler::{reconcile, restore};
use npu_lower_compiler::support::{
    BufferOrder, CompiledNetwork, InputBufferInfo, OperationId, OutputBufferInfo,
    ReferenceCompiledNetwork, ReferenceSupport,
};
use npu_lower_compiler::Compiler;
use proptest::prelude::*;
use rustc_hash::FxHashMap;

fn permutation(max: usize) -> impl Strategy<Value = Vec<u32>> {
    (1..=max).prop_flat_map(|n| Just((0..n as u32).collect::<Vec<_>>()).prop_shuffle())
}

proptest! {
    #[test]
    fn prop_reconcile_restores_caller_order(
        input_perm in permutation(8),
        output_perm in permutation(8),
    ) {
        // caller input i is operation 100 + i; caller output j is output j of operation 7
        let input_ids: FxHashMap<OperationId, u32> =
            (0..input_perm.len() as u32).map(|i| (OperationId(100 + i), i)).collect();
        let output_ids: FxHashMap<(OperationId, u32), u32> =
            (0..output_perm.len() as u32).map(|j| ((OperationId(7), j), j)).collect();

        // the compiled network lists buffers in a shuffled order
        let inputs: Vec<_> = input_perm
            .iter()
            .map(|&i| InputBufferInfo { source_operation_id: OperationId(100 + i), size: 1 })
            .collect();
        let outputs: Vec<_> = output_perm
            .iter()
            .map(|&j| OutputBufferInfo {
                source_operation_id: OperationId(7),
                source_operation_output_index: j,
                size: 1,
            })
            .collect();
        let compiled = ReferenceCompiledNetwork::new(inputs, outputs);

        let order = reconcile(&compiled, &input_ids, &output_ids).unwrap();
        prop_assert_eq!(&order.inputs, &input_perm);
        prop_assert_eq!(&order.outputs, &output_perm);

        let restored_inputs = restore(&order.inputs, compiled.input_buffer_infos()).unwrap();
        for (position, info) in restored_inputs.iter().enumerate() {
            prop_assert_eq!(info.source_operation_id, OperationId(100 + position as u32));
        }
        let restored_outputs = restore(&order.outputs, compiled.output_buffer_infos()).unwrap();
        for (position, info) in restored_outputs.iter().enumerate() {
            prop_assert_eq!(info.source_operation_output_index, position as u32);
        }
    }

    #[test]
    fn prop_compiled_concat_positions_are_dense(
        widths in prop::collection::vec(1i64..5, 1..6),
        reversed in any::<bool>(),
    ) {
        let mut b = FunctionBuilder::new();
        let params: Vec<_> = widths
            .iter()
            .enumerate()
            .map(|(i, &w)| b.param(&format!("p{}", i), &[1, 2, 2, w]))
            .collect();
        let concat = b.concat(&params, 3).unwrap();
        let function = b.finish(concat, "npu_prop").unwrap();

        let order = if reversed { BufferOrder::Reversed } else { BufferOrder::Declared };
        let compiler = Compiler::new(ReferenceSupport::new().with_buffer_order(order));
        let network = compiler.compile_function(&function).unwrap();

        let mut positions = network.input_order.clone();
        positions.sort_unstable();
        prop_assert_eq!(positions, (0..widths.len() as u32).collect::<Vec<_>>());
        prop_assert_eq!(network.output_order, vec![0]);

        // compiled input sizes restored to caller order match the parameter widths
        let sizes: Vec<u32> = network
            .compiled
            .input_buffer_infos()
            .iter()
            .map(|info| info.size)
            .collect();
        let restored = restore(&network.input_order, &sizes).unwrap();
        let expected: Vec<u32> = widths.iter().map(|&w| 4 * w as u32).collect();
        prop_assert_eq!(restored, expected);
    }
}
