use tracing::info;

use crate::config::UNetConfig;
use crate::error::{Error, Result};
use crate::math::tensor::Shape;
use crate::network::blocks::{contracting_path, expansive_path};
use crate::network::filters::FilterSchedule;
use crate::network::graph::GraphBuilder;
use crate::network::network::Network;

/// Wires the contracting and expansive paths into one network.
///
/// A pure function of the configuration: the same config (seed included)
/// always yields the same topology and the same initial parameters.
pub struct NetworkAssembler<'a> {
    config: &'a UNetConfig,
}

impl<'a> NetworkAssembler<'a> {
    pub fn new(config: &'a UNetConfig) -> NetworkAssembler<'a> {
        NetworkAssembler { config }
    }

    pub fn assemble(&self) -> Result<Network> {
        let config = self.config;
        if config.block_count < 1 {
            return Err(Error::config("block_count must be at least 1"));
        }
        if config.base_filters == 0 {
            return Err(Error::config("base_filters must be at least 1"));
        }
        if config.output_classes == 0 {
            return Err(Error::config("output_classes must be at least 1"));
        }
        if config.block_count > 1 && config.base_filters < 2 {
            return Err(Error::config("base_filters must be at least 2 when block_count > 1"));
        }

        let schedule = FilterSchedule::new(config.base_filters);
        let (height, width, channels) = config.input_shape();

        let mut builder = GraphBuilder::new(config.init_seed);
        let input = builder.input("input", Shape::new(height, width, channels))?;

        let contracted = contracting_path(&mut builder, input, &schedule, config.block_count)?;
        info!(
            skips = contracted.skips.len(),
            bottleneck = %builder.shape(contracted.bottleneck),
            "contracting path assembled"
        );

        let output = expansive_path(
            &mut builder,
            contracted.bottleneck,
            &contracted.skips,
            &schedule,
            config.output_classes,
        )?;
        let graph = builder.build(output)?;
        info!(
            output = %graph.output_shape(),
            params = graph.param_count(),
            "network assembled"
        );

        Ok(Network::new(graph, contracted.skips))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small(block_count: usize) -> UNetConfig {
        UNetConfig { base_filters: 2, block_count, ..UNetConfig::default() }
    }

    #[test]
    fn reference_geometry_matches_mask() {
        let network = NetworkAssembler::new(&small(3)).assemble().unwrap();
        assert_eq!(network.input_shape(), Shape::new(100, 100, 3));
        assert_eq!(network.output_shape(), Shape::new(60, 60, 3));
    }

    #[test]
    fn full_width_network_has_reference_param_count() {
        // 64 base filters, 3 blocks, 3 classes on 100x100x3.
        let network = NetworkAssembler::new(&UNetConfig::default()).assemble().unwrap();
        let expected = 1792 + 36928 + 73856 + 147584 + 295168 + 590080
            + 131200 + 295040 + 147584
            + 32832 + 73792 + 36928
            + 195;
        assert_eq!(network.param_count(), expected);
    }

    #[test]
    fn zero_blocks_rejected_before_building() {
        let err = NetworkAssembler::new(&small(0)).assemble();
        assert!(matches!(err, Err(Error::Configuration(_))));
    }

    #[test]
    fn zero_filters_rejected_without_validation() {
        for block_count in [1, 3] {
            let config = UNetConfig { base_filters: 0, block_count, ..UNetConfig::default() };
            let err = NetworkAssembler::new(&config).assemble();
            assert!(matches!(err, Err(Error::Configuration(_))), "block_count {block_count}");
        }
    }

    #[test]
    fn too_many_blocks_for_input_is_a_shape_mismatch() {
        let err = NetworkAssembler::new(&small(5)).assemble();
        assert!(matches!(err, Err(Error::ShapeMismatch(_))));
    }

    #[test]
    fn same_config_same_network() {
        let a = NetworkAssembler::new(&small(2)).assemble().unwrap();
        let b = NetworkAssembler::new(&small(2)).assemble().unwrap();
        assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());
    }
}
