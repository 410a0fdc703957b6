use serde::{Serialize, Deserialize};

use crate::activation::activation::ActivationFunction;
use crate::error::{Error, Result};
use crate::math::tensor::Shape;
use crate::network::filters::FilterSchedule;
use crate::network::graph::{GraphBuilder, NodeId};

/// Side length of every feature-extracting convolution.
const KERNEL: usize = 3;

/// Explicit edge from contracting block `depth` to the expansive block that
/// mirrors it. `node` is the block's pre-pooling output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkipConnection {
    pub depth: usize,
    pub node: NodeId,
    pub shape: Shape,
}

pub struct ContractingPath {
    pub bottleneck: NodeId,
    /// Shallow to deep, one per non-terminal block.
    pub skips: Vec<SkipConnection>,
}

/// Two valid 3×3 convolutions, each followed by ReLU. Shrinks each spatial
/// dimension by 4.
fn conv_pair(builder: &mut GraphBuilder, prefix: &str, from: NodeId, filters: usize) -> Result<NodeId> {
    let x = builder.conv(&format!("{prefix}/conv_a"), from, KERNEL, filters)?;
    let x = builder.activation(&format!("{prefix}/relu_a"), x, ActivationFunction::ReLU)?;
    let x = builder.conv(&format!("{prefix}/conv_b"), x, KERNEL, filters)?;
    builder.activation(&format!("{prefix}/relu_b"), x, ActivationFunction::ReLU)
}

/// Chains `block_count` downsampling blocks starting at `input`.
///
/// Every block but the last ends in a 2×2 max pool; its pre-pooling output
/// is recorded as a skip connection. The last block's output is the
/// bottleneck, so `block_count - 1` skips come back.
pub fn contracting_path(
    builder: &mut GraphBuilder,
    input: NodeId,
    schedule: &FilterSchedule,
    block_count: usize,
) -> Result<ContractingPath> {
    if block_count < 1 {
        return Err(Error::config("block_count must be at least 1"));
    }

    let mut x = input;
    let mut skips = Vec::with_capacity(block_count - 1);
    for index in 0..block_count {
        let prefix = format!("contract_{index}");
        let features = conv_pair(builder, &prefix, x, schedule.filters(index))?;

        if index == block_count - 1 {
            x = features;
        } else {
            skips.push(SkipConnection {
                depth: index,
                node: features,
                shape: builder.shape(features),
            });
            x = builder.max_pool(&format!("{prefix}/pool"), features)?;
        }
    }

    Ok(ContractingPath { bottleneck: x, skips })
}

/// Climbs back from `bottleneck`, consuming `skips` deepest first.
///
/// Step `s` upsamples, centre-crops `skips[len - 1 - s]` to the upsampled
/// size, concatenates (skip first), and runs a conv pair at half the width of
/// the level it climbs to. The last step adds a 1×1 projection to
/// `output_classes` channels. Without skips the projection is applied to the
/// bottleneck directly.
pub fn expansive_path(
    builder: &mut GraphBuilder,
    bottleneck: NodeId,
    skips: &[SkipConnection],
    schedule: &FilterSchedule,
    output_classes: usize,
) -> Result<NodeId> {
    let steps = skips.len();
    let mut x = bottleneck;

    for step in 0..steps {
        let level = steps - step;
        let filters = schedule.filters(level) / 2;
        let prefix = format!("expand_{step}");

        let up = builder.up_conv(&format!("{prefix}/up"), x, filters)?;
        let target = builder.shape(up);

        let skip = &skips[steps - 1 - step];
        let cropped = builder.center_crop(
            &format!("{prefix}/crop_skip"),
            skip.node,
            target.height,
            target.width,
        )?;
        let merged = builder.concat(&format!("{prefix}/concat"), cropped, up)?;
        x = conv_pair(builder, &prefix, merged, filters)?;
    }

    let name = if steps == 0 {
        "project".to_string()
    } else {
        format!("expand_{}/project", steps - 1)
    };
    builder.conv(&name, x, 1, output_classes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contract(block_count: usize, size: usize) -> (GraphBuilder, ContractingPath) {
        let mut builder = GraphBuilder::new(1);
        let input = builder.input("input", Shape::new(size, size, 3)).unwrap();
        let path = contracting_path(&mut builder, input, &FilterSchedule::new(2), block_count).unwrap();
        (builder, path)
    }

    #[test]
    fn yields_one_skip_per_pooled_block() {
        for block_count in 1..=4 {
            let (builder, path) = contract(block_count, 188);
            assert_eq!(path.skips.len(), block_count - 1);
            assert_eq!(
                builder.shape(path.bottleneck).channels,
                FilterSchedule::new(2).filters(block_count - 1)
            );
            let depths: Vec<usize> = path.skips.iter().map(|s| s.depth).collect();
            assert_eq!(depths, (0..block_count - 1).collect::<Vec<_>>());
        }
    }

    #[test]
    fn contracting_geometry_shrinks() {
        let (builder, path) = contract(3, 100);
        assert_eq!(path.skips[0].shape, Shape::new(96, 96, 2));
        assert_eq!(path.skips[1].shape, Shape::new(44, 44, 4));
        assert_eq!(builder.shape(path.bottleneck), Shape::new(18, 18, 8));
    }

    #[test]
    fn zero_blocks_is_a_configuration_error() {
        let mut builder = GraphBuilder::new(1);
        let input = builder.input("input", Shape::new(32, 32, 1)).unwrap();
        let err = contracting_path(&mut builder, input, &FilterSchedule::new(2), 0);
        assert!(matches!(err, Err(Error::Configuration(_))));
    }

    #[test]
    fn single_block_projects_bottleneck() {
        let (mut builder, path) = contract(1, 20);
        let out = expansive_path(&mut builder, path.bottleneck, &path.skips, &FilterSchedule::new(2), 3).unwrap();
        assert_eq!(builder.shape(out), Shape::new(16, 16, 3));
    }

    #[test]
    fn expansive_path_restores_classes() {
        let (mut builder, path) = contract(3, 100);
        let out = expansive_path(&mut builder, path.bottleneck, &path.skips, &FilterSchedule::new(2), 3).unwrap();
        assert_eq!(builder.shape(out), Shape::new(60, 60, 3));
    }

    #[test]
    fn misordered_skips_are_a_shape_mismatch() {
        let (mut builder, mut path) = contract(3, 100);
        path.skips.reverse();
        let err = expansive_path(&mut builder, path.bottleneck, &path.skips, &FilterSchedule::new(2), 3);
        assert!(matches!(err, Err(Error::ShapeMismatch(_))));
    }
}
