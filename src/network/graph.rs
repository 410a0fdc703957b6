use std::collections::HashSet;
use std::fmt::Write as _;

use rand::{rngs::StdRng, SeedableRng};
use serde::{Serialize, Deserialize};
use tracing::debug;

use crate::activation::activation::ActivationFunction;
use crate::error::{Error, Result};
use crate::layers::{
    concat::{concat_backward, concat_channels, concat_shape},
    crop::{center_crop, center_crop_backward, center_crop_shape},
    Conv2d, ConvTranspose2d, MaxPool2d, Param,
};
use crate::math::tensor::{Shape, Tensor};

/// Handle to a node of a graph under construction or of a frozen graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// The operation a node applies to its inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Op {
    Input,
    Conv(Conv2d),
    Activation(ActivationFunction),
    MaxPool(MaxPool2d),
    UpConv(ConvTranspose2d),
    CenterCrop { height: usize, width: usize },
    /// Channel concatenation; the first input takes the low channels.
    Concat,
}

impl Op {
    pub fn kind(&self) -> &'static str {
        match self {
            Op::Input => "Input",
            Op::Conv(_) => "Conv2d",
            Op::Activation(act) => act.name(),
            Op::MaxPool(_) => "MaxPool2d",
            Op::UpConv(_) => "ConvTranspose2d",
            Op::CenterCrop { .. } => "CenterCrop",
            Op::Concat => "Concat",
        }
    }

    pub fn param_count(&self) -> usize {
        match self {
            Op::Conv(conv) => conv.param_count(),
            Op::UpConv(up) => up.param_count(),
            _ => 0,
        }
    }

    fn params_mut(&mut self) -> Vec<&mut Param> {
        match self {
            Op::Conv(conv) => vec![&mut conv.weights, &mut conv.biases],
            Op::UpConv(up) => vec![&mut up.weights, &mut up.biases],
            _ => vec![],
        }
    }

    fn arity(&self) -> usize {
        match self {
            Op::Input => 0,
            Op::Concat => 2,
            _ => 1,
        }
    }

    fn infer_shape(&self, inputs: &[Shape]) -> Result<Shape> {
        match self {
            Op::Input => Err(Error::shape("input nodes have no upstream shape")),
            Op::Conv(conv) => conv.output_shape(inputs[0]),
            Op::Activation(_) => Ok(inputs[0]),
            Op::MaxPool(pool) => pool.output_shape(inputs[0]),
            Op::UpConv(up) => up.output_shape(inputs[0]),
            Op::CenterCrop { height, width } => center_crop_shape(inputs[0], *height, *width),
            Op::Concat => concat_shape(inputs[0], inputs[1]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub op: Op,
    pub inputs: Vec<NodeId>,
    pub shape: Shape,
}

/// Builds a DAG one named node at a time.
///
/// Nodes can only reference nodes that already exist, so insertion order is
/// a topological order and cycles cannot be expressed. Output shapes are
/// inferred on insertion; an incompatible wiring fails right there.
pub struct GraphBuilder {
    nodes: Vec<Node>,
    names: HashSet<String>,
    input: Option<NodeId>,
    rng: StdRng,
}

impl GraphBuilder {
    /// `seed` drives parameter initialisation, so equal seeds give equal graphs.
    pub fn new(seed: u64) -> GraphBuilder {
        GraphBuilder {
            nodes: Vec::new(),
            names: HashSet::new(),
            input: None,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn shape(&self, id: NodeId) -> Shape {
        self.nodes[id.0].shape
    }

    fn register_name(&mut self, name: &str) -> Result<()> {
        if !self.names.insert(name.to_string()) {
            return Err(Error::config(format!("duplicate node name '{}'", name)));
        }
        Ok(())
    }

    fn push(&mut self, name: &str, op: Op, inputs: Vec<NodeId>) -> Result<NodeId> {
        if inputs.len() != op.arity() {
            return Err(Error::config(format!(
                "{} node '{}' takes {} inputs, got {}",
                op.kind(),
                name,
                op.arity(),
                inputs.len()
            )));
        }
        if let Some(bad) = inputs.iter().find(|id| id.0 >= self.nodes.len()) {
            return Err(Error::config(format!("node '{}' refers to unknown node {}", name, bad.0)));
        }
        let input_shapes: Vec<Shape> = inputs.iter().map(|id| self.shape(*id)).collect();
        let shape = op
            .infer_shape(&input_shapes)
            .map_err(|e| match e {
                Error::ShapeMismatch(msg) => Error::shape(format!("at '{}': {}", name, msg)),
                other => other,
            })?;
        self.register_name(name)?;

        debug!(node = name, op = op.kind(), shape = %shape, "added node");
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node { name: name.to_string(), op, inputs, shape });
        Ok(id)
    }

    pub fn input(&mut self, name: &str, shape: Shape) -> Result<NodeId> {
        if self.input.is_some() {
            return Err(Error::config("a graph has exactly one input"));
        }
        if shape.is_empty() {
            return Err(Error::config(format!("input shape {} is empty", shape)));
        }
        self.register_name(name)?;
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node { name: name.to_string(), op: Op::Input, inputs: vec![], shape });
        self.input = Some(id);
        Ok(id)
    }

    pub fn conv(&mut self, name: &str, from: NodeId, kernel: usize, filters: usize) -> Result<NodeId> {
        let in_channels = self.checked_shape(from)?.channels;
        let conv = Conv2d::new(kernel, in_channels, filters, &mut self.rng);
        self.push(name, Op::Conv(conv), vec![from])
    }

    pub fn activation(&mut self, name: &str, from: NodeId, act: ActivationFunction) -> Result<NodeId> {
        self.push(name, Op::Activation(act), vec![from])
    }

    pub fn max_pool(&mut self, name: &str, from: NodeId) -> Result<NodeId> {
        self.push(name, Op::MaxPool(MaxPool2d::default()), vec![from])
    }

    pub fn up_conv(&mut self, name: &str, from: NodeId, filters: usize) -> Result<NodeId> {
        let in_channels = self.checked_shape(from)?.channels;
        let up = ConvTranspose2d::new(2, in_channels, filters, &mut self.rng);
        self.push(name, Op::UpConv(up), vec![from])
    }

    pub fn center_crop(&mut self, name: &str, from: NodeId, height: usize, width: usize) -> Result<NodeId> {
        self.push(name, Op::CenterCrop { height, width }, vec![from])
    }

    pub fn concat(&mut self, name: &str, first: NodeId, second: NodeId) -> Result<NodeId> {
        self.push(name, Op::Concat, vec![first, second])
    }

    fn checked_shape(&self, id: NodeId) -> Result<Shape> {
        self.nodes
            .get(id.0)
            .map(|n| n.shape)
            .ok_or_else(|| Error::config(format!("unknown node {}", id.0)))
    }

    /// Freezes the graph with `output` as its single output.
    ///
    /// Every other node must feed at least one downstream node, so the frozen
    /// graph has exactly one sink.
    pub fn build(self, output: NodeId) -> Result<Graph> {
        let input = self.input.ok_or_else(|| Error::config("graph has no input node"))?;
        if output.0 >= self.nodes.len() {
            return Err(Error::config(format!("unknown output node {}", output.0)));
        }
        let mut consumed = vec![false; self.nodes.len()];
        for node in &self.nodes {
            for id in &node.inputs {
                consumed[id.0] = true;
            }
        }
        if let Some((i, _)) = consumed
            .iter()
            .enumerate()
            .find(|(i, used)| !**used && *i != output.0)
        {
            return Err(Error::config(format!(
                "node '{}' is not connected to the output",
                self.nodes[i].name
            )));
        }
        Ok(Graph { nodes: self.nodes, input, output })
    }
}

/// Every node output of one forward pass, indexed by node.
pub struct Trace {
    outputs: Vec<Tensor>,
}

impl Trace {
    pub fn get(&self, id: NodeId) -> &Tensor {
        &self.outputs[id.0]
    }

    pub fn into_output(mut self, id: NodeId) -> Tensor {
        self.outputs.swap_remove(id.0)
    }
}

/// A frozen single-input, single-output computation graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Graph {
    nodes: Vec<Node>,
    input: NodeId,
    output: NodeId,
}

impl Graph {
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn input(&self) -> NodeId {
        self.input
    }

    pub fn output(&self) -> NodeId {
        self.output
    }

    pub fn input_shape(&self) -> Shape {
        self.node(self.input).shape
    }

    pub fn output_shape(&self) -> Shape {
        self.node(self.output).shape
    }

    pub fn param_count(&self) -> usize {
        self.nodes.iter().map(|n| n.op.param_count()).sum()
    }

    /// Trainable parameters in node order; the order is stable for the
    /// lifetime of the graph, which is what optimiser state is keyed on.
    pub fn params_mut(&mut self) -> Vec<&mut Param> {
        self.nodes.iter_mut().flat_map(|n| n.op.params_mut()).collect()
    }

    pub fn zero_grad(&mut self) {
        for param in self.params_mut() {
            param.zero_grad();
        }
    }

    pub fn forward(&self, input: &Tensor) -> Result<Trace> {
        if input.shape() != self.input_shape() {
            return Err(Error::shape(format!(
                "network expects input {}, got {}",
                self.input_shape(),
                input.shape()
            )));
        }
        let mut outputs: Vec<Tensor> = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            let arg = |k: usize| &outputs[node.inputs[k].0];
            let out = match &node.op {
                Op::Input => input.clone(),
                Op::Conv(conv) => conv.forward(arg(0))?,
                Op::Activation(act) => act.forward(arg(0)),
                Op::MaxPool(pool) => pool.forward(arg(0))?,
                Op::UpConv(up) => up.forward(arg(0))?,
                Op::CenterCrop { height, width } => center_crop(arg(0), *height, *width)?,
                Op::Concat => concat_channels(arg(0), arg(1))?,
            };
            outputs.push(out);
        }
        Ok(Trace { outputs })
    }

    /// Back-propagates ∂L/∂output through the graph, accumulating parameter
    /// gradients. Nodes with several consumers (skip feature maps) receive
    /// the sum of their consumers' gradients.
    pub fn backward(&mut self, trace: &Trace, grad_output: Tensor) -> Result<()> {
        if grad_output.shape() != self.output_shape() {
            return Err(Error::compute(format!(
                "output gradient {} does not match output {}",
                grad_output.shape(),
                self.output_shape()
            )));
        }
        let mut grads: Vec<Option<Tensor>> = vec![None; self.nodes.len()];
        grads[self.output.0] = Some(grad_output);

        for i in (0..self.nodes.len()).rev() {
            let grad = match grads[i].take() {
                Some(grad) => grad,
                None => continue,
            };
            let node = &mut self.nodes[i];
            let inputs = node.inputs.clone();
            let arg = |k: usize| trace.get(inputs[k]);

            let upstream: Vec<Tensor> = match &mut node.op {
                Op::Input => vec![],
                Op::Conv(conv) => vec![conv.backward(arg(0), &grad)],
                Op::Activation(act) => vec![act.backward(&trace.outputs[i], &grad)],
                Op::MaxPool(pool) => vec![pool.backward(arg(0), &grad)],
                Op::UpConv(up) => vec![up.backward(arg(0), &grad)],
                Op::CenterCrop { .. } => vec![center_crop_backward(arg(0).shape(), &grad)?],
                Op::Concat => {
                    let (first, second) = concat_backward(&grad, arg(0).channels);
                    vec![first, second]
                }
            };

            for (id, g) in inputs.into_iter().zip(upstream) {
                if let Some(acc) = grads[id.0].as_mut() {
                    *acc += &g;
                } else {
                    grads[id.0] = Some(g);
                }
            }
        }
        Ok(())
    }

    /// A layer-by-layer table with output shapes and parameter counts.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let rule = "-".repeat(96);
        let _ = writeln!(out, "{:<28} {:<16} {:<18} {:>10}  {}", "Node", "Op", "Output shape", "Params", "Inputs");
        let _ = writeln!(out, "{}", rule);
        for node in &self.nodes {
            let inputs: Vec<&str> = node.inputs.iter().map(|id| self.nodes[id.0].name.as_str()).collect();
            let _ = writeln!(
                out,
                "{:<28} {:<16} {:<18} {:>10}  {}",
                node.name,
                node.op.kind(),
                node.shape.to_string(),
                node.op.param_count(),
                inputs.join(", ")
            );
        }
        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(out, "Trainable params: {}", self.param_count());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_errors_surface_while_building() {
        let mut b = GraphBuilder::new(0);
        let x = b.input("in", Shape::new(4, 4, 1)).unwrap();
        let c = b.conv("c", x, 3, 2).unwrap();
        assert_eq!(b.shape(c), Shape::new(2, 2, 2));
        assert!(matches!(b.conv("c2", c, 3, 2), Err(Error::ShapeMismatch(_))));
    }

    #[test]
    fn names_are_unique_and_input_single() {
        let mut b = GraphBuilder::new(0);
        let x = b.input("in", Shape::new(4, 4, 1)).unwrap();
        assert!(b.input("in2", Shape::new(4, 4, 1)).is_err());
        b.activation("a", x, ActivationFunction::ReLU).unwrap();
        assert!(b.activation("a", x, ActivationFunction::ReLU).is_err());
    }

    #[test]
    fn dangling_nodes_are_rejected() {
        let mut b = GraphBuilder::new(0);
        let x = b.input("in", Shape::new(4, 4, 1)).unwrap();
        let a = b.activation("a", x, ActivationFunction::ReLU).unwrap();
        let _unused = b.max_pool("p", x).unwrap();
        assert!(b.build(a).is_err());
    }

    #[test]
    fn fan_out_gradients_accumulate() {
        // out = concat(a, a) with a = w * x, so ∂sum(out)/∂w = 2 * sum(x).
        let mut b = GraphBuilder::new(0);
        let x = b.input("in", Shape::new(2, 2, 1)).unwrap();
        let a = b.conv("scale", x, 1, 1).unwrap();
        let c = b.concat("cat", a, a).unwrap();
        let mut graph = b.build(c).unwrap();
        if let Op::Conv(conv) = &mut graph.nodes[a.index()].op {
            conv.weights = Param::new(vec![1.0]);
        }

        let input = Tensor::from_data(Shape::new(2, 2, 1), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let trace = graph.forward(&input).unwrap();
        assert_eq!(trace.get(c).shape(), Shape::new(2, 2, 2));

        let grad = trace.get(c).map(|_| 1.0);
        graph.backward(&trace, grad).unwrap();
        let params = graph.params_mut();
        assert_eq!(params[0].grad(), &[20.0]);
        assert_eq!(params[1].grad(), &[8.0]);
    }

    #[test]
    fn summary_lists_every_node() {
        let mut b = GraphBuilder::new(0);
        let x = b.input("in", Shape::new(6, 6, 1)).unwrap();
        let c = b.conv("conv", x, 3, 2).unwrap();
        let r = b.activation("conv_relu", c, ActivationFunction::ReLU).unwrap();
        let graph = b.build(r).unwrap();
        let text = graph.summary();
        assert!(text.contains("conv"));
        assert!(text.lines().any(|l| l.starts_with("conv_relu") && l.contains("ReLU")));
        assert!(text.contains("(4, 4, 2)"));
        assert!(text.contains("Trainable params: 20"));
    }
}
