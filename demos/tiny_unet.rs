use std::sync::{mpsc, Arc};

use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use unet_seg::data::{DataPipeline, DatasetSource, RawSample, VecSource};
use unet_seg::network::{argmax_mask, NetworkAssembler};
use unet_seg::loss::{Metric, SparseCrossEntropy};
use unet_seg::optim::Adam;
use unet_seg::schedule::LrScheduleBuilder;
use unet_seg::train::{Orchestrator, TrainPlan};
use unet_seg::{logging, UNetConfig};

/// A bright disc (class 1) on a dark background (class 2), with a thin
/// border ring (class 3), like a pet trimap.
fn disc(radius: f64) -> RawSample {
    let centre = 15.5;
    let dist = |x: u32, y: u32| ((x as f64 - centre).powi(2) + (y as f64 - centre).powi(2)).sqrt();
    let image = RgbImage::from_fn(32, 32, |x, y| {
        let v = if dist(x, y) <= radius { 230 } else { 25 };
        Rgb([v, v / 2, 255 - v])
    });
    let mask = GrayImage::from_fn(32, 32, |x, y| {
        let d = dist(x, y);
        Luma([if d < radius - 1.0 { 1 } else if d <= radius + 1.0 { 3 } else { 2 }])
    });
    RawSample { image: DynamicImage::ImageRgb8(image), mask }
}

fn main() -> unet_seg::Result<()> {
    logging::init(0);

    let config = UNetConfig {
        base_filters: 4,
        block_count: 2,
        input_width: 28,
        input_height: 28,
        mask_width: 12,
        mask_height: 12,
        batch_size: 4,
        epochs: 20,
        ..UNetConfig::default()
    };

    let train: Arc<dyn DatasetSource> =
        Arc::new(VecSource::new((0..16).map(|i| disc(5.0 + (i % 8) as f64)).collect()));
    let test: Arc<dyn DatasetSource> = Arc::new(VecSource::new(vec![disc(7.5), disc(11.0)]));

    let network = NetworkAssembler::new(&config).assemble()?;
    println!("{}", network.summary());

    let plan = TrainPlan::from_counts(train.len(), 0, config.batch_size, 1, config.epochs)?;
    let schedule = LrScheduleBuilder::new(vec![0.5, 0.8], vec![1e-2, 3e-3, 1e-3])
        .steps_per_epoch(plan.steps_per_epoch)
        .epochs(config.epochs)
        .build()?;

    let (tx, rx) = mpsc::channel();
    let mut orchestrator = Orchestrator::new(network, &config);
    orchestrator.compile(
        SparseCrossEntropy::from_logits(),
        Box::new(Adam::new(Box::new(schedule))),
        &[Metric::Accuracy, Metric::MeanIou],
    )?;
    orchestrator.fit(DataPipeline::training(train, &config)?, None, plan.with_progress(tx))?;

    for stats in rx.try_iter() {
        println!(
            "Epoch {:>2}: loss = {:.4}  accuracy = {:.3}  mean IoU = {:.3}  lr = {:.0e}",
            stats.epoch,
            stats.train_loss,
            stats.metric("accuracy").unwrap_or(0.0),
            stats.metric("mean_iou").unwrap_or(0.0),
            stats.learning_rate
        );
    }

    let evaluation = orchestrator.evaluate(DataPipeline::test(test.clone(), &config))?;
    println!("Test loss: {:.4}", evaluation.loss);
    for (name, value) in &evaluation.metrics {
        println!("Test {name}: {value:.3}");
    }

    for batch in DataPipeline::test(test, &config) {
        let batch = batch?;
        for image in &batch.images {
            let mask = argmax_mask(&orchestrator.network().predict(image)?);
            for row in mask.labels.chunks(mask.width) {
                let line: String = row.iter().map(|&l| ['#', '.', 'o'][l as usize]).collect();
                println!("{line}");
            }
            println!();
        }
    }
    Ok(())
}
