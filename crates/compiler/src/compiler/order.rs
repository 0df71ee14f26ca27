//! Input/output order reconciliation
//!
//! The accelerator compiler may lay out its buffers in any order. Each buffer
//! names the operation (and output index) it belongs to, and construction
//! recorded where each of those sits in the caller's ordering, so the
//! permutation is a lookup join.

use rustc_hash::FxHashMap;

use crate::error::BufferSlot;
use crate::support::{CompiledNetwork, OperationId};
use crate::{CompilerError, Result};

/// Caller positions of a compiled network's buffers
///
/// `inputs[i]` is the caller's input position for the compiled network's
/// `i`-th input buffer; likewise for `outputs`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BufferPermutation {
    pub inputs: Vec<u32>,
    pub outputs: Vec<u32>,
}

/// Match every buffer of `compiled` against the ids recorded during construction
///
/// A buffer whose operation was never recorded is an invariant violation and
/// fails with [`CompilerError::ReconciliationMiss`].
pub fn reconcile<C: CompiledNetwork + ?Sized>(
    compiled: &C,
    input_ids: &FxHashMap<OperationId, u32>,
    output_ids: &FxHashMap<(OperationId, u32), u32>,
) -> Result<BufferPermutation> {
    let inputs = compiled
        .input_buffer_infos()
        .iter()
        .map(|info| {
            input_ids
                .get(&info.source_operation_id)
                .copied()
                .ok_or(CompilerError::ReconciliationMiss {
                    slot: BufferSlot::Input {
                        operation_id: info.source_operation_id,
                    },
                })
        })
        .collect::<Result<Vec<_>>>()?;

    let outputs = compiled
        .output_buffer_infos()
        .iter()
        .map(|info| {
            let key = (info.source_operation_id, info.source_operation_output_index);
            output_ids
                .get(&key)
                .copied()
                .ok_or(CompilerError::ReconciliationMiss {
                    slot: BufferSlot::Output {
                        operation_id: info.source_operation_id,
                        output_index: info.source_operation_output_index,
                    },
                })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(BufferPermutation { inputs, outputs })
}

/// Put `items` (in compiled order) back into caller order
///
/// Returns `None` unless `positions` is a permutation of `0..items.len()`.
pub fn restore<T: Clone>(positions: &[u32], items: &[T]) -> Option<Vec<T>> {
    if positions.len() != items.len() {
        return None;
    }
    let mut restored: Vec<Option<T>> = vec![None; items.len()];
    for (item, &position) in items.iter().zip(positions) {
        let slot = restored.get_mut(position as usize)?;
        if slot.is_some() {
            return None;
        }
        *slot = Some(item.clone());
    }
    restored.into_iter().collect()
}
