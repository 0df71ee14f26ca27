//! Shared IR-building helpers for the integration tests

#![allow(dead_code)]

use std::cell::Cell;

use anyhow::{anyhow, Context, Result};
use npu_lower_compiler::ops::normalize_axis;
use npu_lower_compiler::support::{CompilationOptions, ReferenceSupport, SupportLibrary};
use npu_lower_compiler::{AttrValue, ElemType, ExprId, Function, IrGraph, Literal, Type};

/// Input zero point given to the `i`-th concatenation input
pub fn input_zero_point(i: usize) -> i32 {
    i as i32 + 1
}

/// Input scale given to the `i`-th concatenation input
pub fn input_scale(i: usize) -> f32 {
    0.5 / (i as f32 + 1.0)
}

pub const OUTPUT_ZERO_POINT: i32 = 3;
pub const OUTPUT_SCALE: f32 = 0.25;

/// Builds single-function graphs out of supported operators
#[derive(Default)]
pub struct FunctionBuilder {
    graph: IrGraph,
    params: Vec<ExprId>,
}

impl FunctionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn graph(&self) -> &IrGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut IrGraph {
        &mut self.graph
    }

    /// Add a uint8 tensor parameter
    pub fn param(&mut self, name: &str, shape: &[i64]) -> ExprId {
        self.typed_param(name, Type::tensor(shape.to_vec(), ElemType::Uint8))
    }

    pub fn typed_param(&mut self, name: &str, ty: Type) -> ExprId {
        let id = self.graph.add_var(name, ty);
        self.params.push(id);
        id
    }

    fn tensor_shape(&self, id: ExprId) -> Result<(Vec<i64>, ElemType)> {
        let node = self
            .graph
            .node(id)
            .ok_or_else(|| anyhow!("node %{} does not exist", id.index()))?;
        let tensor = node
            .ty
            .as_tensor()
            .ok_or_else(|| anyhow!("node %{} is not a tensor", id.index()))?;
        Ok((tensor.shape.clone(), tensor.dtype))
    }

    pub fn tuple(&mut self, fields: &[ExprId]) -> Result<ExprId> {
        Ok(self.graph.add_tuple(fields)?)
    }

    pub fn get(&mut self, tuple: ExprId, index: usize) -> Result<ExprId> {
        Ok(self.graph.add_tuple_get_item(tuple, index)?)
    }

    /// `qnn.concatenate` of `inputs` along `axis` with per-input quantization
    pub fn concat(&mut self, inputs: &[ExprId], axis: i64) -> Result<ExprId> {
        let (mut shape, dtype) = self.tensor_shape(inputs[0])?;
        let axis_index = normalize_axis(axis, shape.len())? as usize;
        shape[axis_index] = 0;
        for &input in inputs {
            shape[axis_index] += self.tensor_shape(input)?.0[axis_index];
        }

        let data = self.graph.add_tuple(inputs)?;
        let scales: Vec<_> = (0..inputs.len())
            .map(|i| self.graph.add_constant(Literal::F32(input_scale(i))))
            .collect();
        let zero_points: Vec<_> = (0..inputs.len())
            .map(|i| self.graph.add_constant(Literal::I32(input_zero_point(i))))
            .collect();
        let scales = self.graph.add_tuple(&scales)?;
        let zero_points = self.graph.add_tuple(&zero_points)?;
        let output_scale = self.graph.add_constant(Literal::F32(OUTPUT_SCALE));
        let output_zero_point = self.graph.add_constant(Literal::I32(OUTPUT_ZERO_POINT));

        let call = self
            .graph
            .add_call("qnn.concatenate")
            .arg(data)
            .arg(scales)
            .arg(zero_points)
            .arg(output_scale)
            .arg(output_zero_point)
            .attr("axis", AttrValue::Int(axis))
            .ty(Type::tensor(shape, dtype))
            .finish()?;
        Ok(call)
    }

    /// `split` of `input` into `sections` equal pieces along `axis`
    pub fn split_sections(&mut self, input: ExprId, axis: i64, sections: i64) -> Result<ExprId> {
        let (shape, dtype) = self.tensor_shape(input)?;
        let axis_index = normalize_axis(axis, shape.len())? as usize;
        let mut piece = shape.clone();
        piece[axis_index] /= sections;
        let ty = Type::Tuple(vec![Type::tensor(piece, dtype); sections as usize]);

        let call = self
            .graph
            .add_call("split")
            .arg(input)
            .attr("axis", AttrValue::Int(axis))
            .attr("sections", AttrValue::Int(sections))
            .ty(ty)
            .finish()?;
        Ok(call)
    }

    /// `split` of `input` at `indices` along `axis`
    pub fn split_indices(&mut self, input: ExprId, axis: i64, indices: &[i64]) -> Result<ExprId> {
        let (shape, dtype) = self.tensor_shape(input)?;
        let axis_index = normalize_axis(axis, shape.len())? as usize;

        let mut bounds = vec![0];
        bounds.extend_from_slice(indices);
        bounds.push(shape[axis_index]);
        let fields = bounds
            .windows(2)
            .map(|w| {
                let mut piece = shape.clone();
                piece[axis_index] = w[1] - w[0];
                Type::tensor(piece, dtype)
            })
            .collect();

        let call = self
            .graph
            .add_call("split")
            .arg(input)
            .attr("axis", AttrValue::Int(axis))
            .attr("indices", AttrValue::Ints(indices.to_vec()))
            .ty(Type::Tuple(fields))
            .finish()?;
        Ok(call)
    }

    /// Call to an arbitrary operator with an explicit result type
    pub fn call(&mut self, op: &str, args: &[ExprId], ty: Type) -> Result<ExprId> {
        let mut call = self.graph.add_call(op).ty(ty);
        for &arg in args {
            call = call.arg(arg);
        }
        Ok(call.finish()?)
    }

    pub fn finish(self, body: ExprId, symbol: &str) -> Result<Function> {
        Ok(self.finish_unnamed(body)?.with_global_symbol(symbol))
    }

    /// Finish without a global symbol
    pub fn finish_unnamed(self, body: ExprId) -> Result<Function> {
        Function::new(self.graph, self.params, body).context("building test function")
    }
}

/// A standalone function wrapping an operator the NPU does not support
pub fn conv_function() -> Result<Function> {
    let mut b = FunctionBuilder::new();
    let a = b.param("a", &[1, 8, 8, 3]);
    let conv = b.call("nn.conv2d", &[a], Type::tensor([1, 8, 8, 16], ElemType::Uint8))?;
    b.finish(conv, "conv_0")
}

/// Reference support library that counts the networks it creates
#[derive(Default)]
pub struct CountingSupport {
    pub inner: ReferenceSupport,
    created: Cell<usize>,
}

impl CountingSupport {
    pub fn new(inner: ReferenceSupport) -> Self {
        Self {
            inner,
            created: Cell::new(0),
        }
    }

    pub fn networks_created(&self) -> usize {
        self.created.get()
    }
}

impl SupportLibrary for CountingSupport {
    type Network = <ReferenceSupport as SupportLibrary>::Network;
    type Compiled = <ReferenceSupport as SupportLibrary>::Compiled;

    fn create_network(&self) -> Self::Network {
        self.created.set(self.created.get() + 1);
        self.inner.create_network()
    }

    fn compile(
        &self,
        network: &Self::Network,
        options: &CompilationOptions,
    ) -> npu_lower_compiler::Result<Vec<Self::Compiled>> {
        self.inner.compile(network, options)
    }
}
