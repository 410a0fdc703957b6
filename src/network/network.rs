use serde::{Serialize, Deserialize};

use crate::data::sample::LabelMap;
use crate::loss::metrics::argmax_labels;
use crate::error::Result;
use crate::math::tensor::{Shape, Tensor};
use crate::network::blocks::SkipConnection;
use crate::network::graph::{Graph, Trace};

/// An assembled segmentation network: the frozen graph plus the skip
/// connections it was wired with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    pub graph: Graph,
    pub skips: Vec<SkipConnection>,
}

impl Network {
    pub fn new(graph: Graph, skips: Vec<SkipConnection>) -> Network {
        Network { graph, skips }
    }

    pub fn input_shape(&self) -> Shape {
        self.graph.input_shape()
    }

    pub fn output_shape(&self) -> Shape {
        self.graph.output_shape()
    }

    pub fn param_count(&self) -> usize {
        self.graph.param_count()
    }

    pub fn summary(&self) -> String {
        self.graph.summary()
    }

    /// Forward pass keeping every intermediate map for backprop.
    pub fn forward(&self, input: &Tensor) -> Result<Trace> {
        self.graph.forward(input)
    }

    /// Per-pixel class scores (logits) for one image.
    pub fn predict(&self, input: &Tensor) -> Result<Tensor> {
        let output = self.graph.output();
        Ok(self.graph.forward(input)?.into_output(output))
    }

    pub fn predict_batch(&self, images: &[Tensor]) -> Result<Vec<Tensor>> {
        images.iter().map(|image| self.predict(image)).collect()
    }

    /// Serializes the network weights to a pretty-printed JSON file.
    pub fn save_json(&self, path: &str) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Deserializes a network from a JSON file previously written by `save_json`.
    pub fn load_json(path: &str) -> Result<Network> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}

/// Collapses class scores into a label map (per-pixel argmax, first wins).
pub fn argmax_mask(scores: &Tensor) -> LabelMap {
    LabelMap::new(scores.height, scores.width, argmax_labels(scores))
}
