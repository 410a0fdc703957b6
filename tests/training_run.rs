use std::path::Path;
use std::sync::{mpsc, Arc};

use image::{GrayImage, Luma, Rgb, RgbImage};
use unet_seg::data::{DatasetSource, PetDataset};
use unet_seg::network::Network;
use unet_seg::train::{train_network, History, TimingSummary};
use unet_seg::UNetConfig;

/// Writes `count` image/trimap pairs in the pet directory layout.
fn write_pet_dir(root: &Path, count: usize) {
    let images = root.join("images");
    let trimaps = root.join("annotations").join("trimaps");
    std::fs::create_dir_all(&images).unwrap();
    std::fs::create_dir_all(&trimaps).unwrap();
    for i in 0..count {
        let edge = 8 + (i as u32 % 8);
        RgbImage::from_fn(30, 30, |x, _| {
            if x < edge { Rgb([210, 180, 40]) } else { Rgb([20, 60, 90]) }
        })
        .save(images.join(format!("pet_{i:02}.png")))
        .unwrap();
        GrayImage::from_fn(30, 30, |x, _| {
            Luma([if x + 1 < edge { 1 } else if x <= edge { 3 } else { 2 }])
        })
        .save(trimaps.join(format!("pet_{i:02}.png")))
        .unwrap();
    }
}

fn tiny_config(root: &Path) -> UNetConfig {
    UNetConfig {
        train_percent: 40,
        val_percent: 60,
        test_percent: 100,
        base_filters: 2,
        block_count: 2,
        input_width: 20,
        input_height: 20,
        input_channels: 3,
        mask_width: 4,
        mask_height: 4,
        batch_size: 2,
        epochs: 3,
        validation_sub_splits: 1,
        inference_batches: 10,
        dataset_path: root.to_path_buf(),
        ..UNetConfig::default()
    }
}

#[test]
fn end_to_end_run_produces_every_artifact() {
    let dir = tempfile::tempdir().unwrap();
    write_pet_dir(dir.path(), 10);
    let config = tiny_config(dir.path());

    let source: Arc<dyn DatasetSource> = Arc::new(PetDataset::open(dir.path()).unwrap());
    assert_eq!(source.len(), 10);

    let (tx, rx) = mpsc::channel();
    let report = train_network(&config, source, |plan| plan.with_progress(tx)).unwrap();

    // 4 training samples / batch 2 = 2 steps; 2 validation samples = 1 step.
    assert_eq!(report.history.len(), 3);
    assert_eq!(rx.try_iter().count(), 3);
    assert!(report.history.epochs.iter().all(|e| e.val_loss.is_some()));
    assert!(report.evaluation.loss.is_finite());
    assert_eq!(report.evaluation.batches, 2);
    assert_eq!(report.timing.batch_size, 2);
    assert_eq!(report.timing.epoch_count, 3);

    // The schedule decays over the six steps: boundaries land on 1, 3 and 5.
    let rates: Vec<f64> = report.history.epochs.iter().map(|e| e.learning_rate).collect();
    assert_eq!(rates, vec![1e-4, 1e-5, 1e-6]);

    let out = tempfile::tempdir().unwrap();
    let weights = out.path().join("model_weights.json");
    let metrics = out.path().join("metrics.json");
    let timing = out.path().join("time.json");
    report.network.save_json(weights.to_str().unwrap()).unwrap();
    report.history.save_json(metrics.to_str().unwrap()).unwrap();
    report.timing.save_json(timing.to_str().unwrap()).unwrap();

    let restored = Network::load_json(weights.to_str().unwrap()).unwrap();
    assert_eq!(restored.param_count(), report.network.param_count());
    assert_eq!(restored.output_shape(), report.network.output_shape());

    let metrics: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&metrics).unwrap()).unwrap();
    for key in ["loss", "accuracy", "val_loss", "val_accuracy", "lr"] {
        assert_eq!(metrics[key].as_array().unwrap().len(), 3, "{key}");
    }
    let timing: TimingSummary =
        serde_json::from_str(&std::fs::read_to_string(&timing).unwrap()).unwrap();
    assert_eq!(timing.batch_size, report.timing.batch_size);
    assert_eq!(timing.epoch_count, report.timing.epoch_count);
    let pairs = [
        (timing.avg_inference_time, report.timing.avg_inference_time),
        (timing.total_train_time, report.timing.total_train_time),
        (timing.avg_epoch_time, report.timing.avg_epoch_time),
        (timing.avg_image_time, report.timing.avg_image_time),
    ];
    for (read, written) in pairs {
        assert!((read - written).abs() <= 1e-12 * written.abs().max(1.0), "{read} vs {written}");
    }
}

#[test]
fn too_few_training_samples_is_a_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    write_pet_dir(dir.path(), 4);
    let config = UNetConfig { batch_size: 4, ..tiny_config(dir.path()) };
    let source: Arc<dyn DatasetSource> = Arc::new(PetDataset::open(dir.path()).unwrap());
    let err = train_network(&config, source, |plan| plan).err().unwrap();
    assert!(matches!(err, unet_seg::Error::Configuration(_)));
}

#[test]
fn history_is_empty_by_default() {
    assert!(History::default().by_metric()["loss"].is_empty());
}
