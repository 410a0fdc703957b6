use unet_seg::math::tensor::{Shape, Tensor};
use unet_seg::network::{
    argmax_mask, contracting_path, expansive_path, FilterSchedule, GraphBuilder, NetworkAssembler,
};
use unet_seg::schedule::{LearningRate, LrScheduleBuilder};
use unet_seg::{Error, UNetConfig};

#[test]
fn default_configuration_maps_100px_input_to_60px_mask() {
    let config = UNetConfig { base_filters: 4, ..UNetConfig::default() };
    let network = NetworkAssembler::new(&config).assemble().unwrap();
    assert_eq!(network.input_shape(), Shape::new(100, 100, 3));
    assert_eq!(network.output_shape(), Shape::new(60, 60, 3));
    assert_eq!(network.skips.len(), 2);

    let summary = network.summary();
    assert!(summary.contains("expand_1/project"));
    assert!(summary.contains(&format!("Trainable params: {}", network.param_count())));
}

#[test]
fn forward_pass_scores_every_mask_pixel() {
    let config = UNetConfig {
        base_filters: 2,
        block_count: 2,
        input_width: 28,
        input_height: 28,
        input_channels: 1,
        ..UNetConfig::default()
    };
    let network = NetworkAssembler::new(&config).assemble().unwrap();
    let image = Tensor::from_data(Shape::new(28, 28, 1), vec![0.5; 28 * 28]).unwrap();
    let scores = network.predict(&image).unwrap();
    assert_eq!(scores.shape(), Shape::new(12, 12, 3));
    let mask = argmax_mask(&scores);
    assert_eq!(mask.len(), 144);
    assert!(mask.labels.iter().all(|&l| l < 3));
}

#[test]
fn skip_order_is_enforced_by_shapes() {
    let schedule = FilterSchedule::new(2);
    for block_count in 3..=4 {
        let mut builder = GraphBuilder::new(0);
        let input = builder.input("input", Shape::new(188, 188, 1)).unwrap();
        let mut path = contracting_path(&mut builder, input, &schedule, block_count).unwrap();
        path.skips.reverse();
        let err = expansive_path(&mut builder, path.bottleneck, &path.skips, &schedule, 3);
        assert!(matches!(err, Err(Error::ShapeMismatch(_))), "block_count {block_count}");
    }
}

#[test]
fn filter_schedule_doubles() {
    let schedule = FilterSchedule::new(64);
    assert_eq!(schedule.filters(0), 64);
    for n in 1..6 {
        assert_eq!(schedule.filters(n), 2 * schedule.filters(n - 1));
    }
}

#[test]
fn reference_schedule_rates() {
    let schedule = LrScheduleBuilder::new(vec![0.2, 0.5, 0.8], vec![3e-4, 1e-4, 1e-5, 1e-6])
        .steps_per_epoch(275)
        .epochs(2)
        .build()
        .unwrap();
    assert_eq!(schedule.boundaries(), &[110, 275, 440]);
    assert_eq!(schedule.rate_at(0), 3e-4);
    assert_eq!(schedule.rate_at(111), 1e-4);
    assert_eq!(schedule.rate_at(441), 1e-6);
}
