//! Command-line front end: train a U-Net on a pet-segmentation directory,
//! print the assembled topology, or write a starter configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use unet_seg::data::{DatasetSource, PetDataset};
use unet_seg::network::NetworkAssembler;
use unet_seg::train::train_network;
use unet_seg::{logging, UNetConfig};

#[derive(Parser, Debug)]
#[command(name = "unet-seg", version, about = "Train and inspect a U-Net segmentation model")]
struct Cli {
    /// Increase log detail (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fit, evaluate and time a model; writes weights, metrics and timings.
    Train {
        /// Configuration file (JSON). Defaults apply when omitted.
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Dataset root (overrides `dataset_path`).
        #[arg(short, long, value_name = "DIR")]
        data: Option<PathBuf>,

        /// Directory for model_weights.json, metrics.json and time.json.
        #[arg(short, long, value_name = "DIR", default_value = ".")]
        output: PathBuf,

        /// Override the number of epochs.
        #[arg(short, long, value_name = "N")]
        epochs: Option<usize>,

        /// Override the batch size.
        #[arg(short, long, value_name = "N")]
        batch_size: Option<usize>,
    },
    /// Assemble the network and print its layer table.
    Summary {
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
    /// Write the default configuration as JSON.
    InitConfig {
        #[arg(value_name = "FILE", default_value = "unet.json")]
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match cli.command {
        Command::Train { config, data, output, epochs, batch_size } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(data) = data {
                config.dataset_path = data;
            }
            if let Some(epochs) = epochs {
                config.epochs = epochs;
            }
            if let Some(batch_size) = batch_size {
                config.batch_size = batch_size;
            }
            config.validate().context("invalid configuration")?;
            train(&config, &output)
        }
        Command::Summary { config } => {
            let config = load_config(config.as_deref())?;
            let network = NetworkAssembler::new(&config)
                .assemble()
                .context("failed to assemble network")?;
            println!("{}", network.summary());
            Ok(())
        }
        Command::InitConfig { path } => {
            let path_str = path_str(&path)?;
            UNetConfig::default()
                .save_json(path_str)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("wrote default configuration to {}", path.display());
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<UNetConfig> {
    match path {
        Some(path) => UNetConfig::load_json(path_str(path)?)
            .with_context(|| format!("failed to load configuration from {}", path.display())),
        None => Ok(UNetConfig::default()),
    }
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str()
        .with_context(|| format!("path is not valid UTF-8: {}", path.display()))
}

fn train(config: &UNetConfig, output: &Path) -> Result<()> {
    let dataset = PetDataset::open(&config.dataset_path)
        .with_context(|| format!("failed to open dataset at {}", config.dataset_path.display()))?;
    let source: Arc<dyn DatasetSource> = Arc::new(dataset);

    let report = train_network(config, source, |plan| plan).context("training failed")?;

    std::fs::create_dir_all(output)
        .with_context(|| format!("failed to create {}", output.display()))?;
    let weights = output.join("model_weights.json");
    let metrics = output.join("metrics.json");
    let timing = output.join("time.json");
    report.network.save_json(path_str(&weights)?)?;
    report.history.save_json(path_str(&metrics)?)?;
    report.timing.save_json(path_str(&timing)?)?;

    println!("Test loss: {:.4}", report.evaluation.loss);
    for (name, value) in &report.evaluation.metrics {
        println!("Test {}: {:.4}", name, value);
    }
    println!("The time of train: {:.1} sec", report.timing.total_train_time);
    println!("Average time per epoch: {:.3} sec", report.timing.avg_epoch_time);
    println!("Average time per image: {:.4} sec", report.timing.avg_image_time);
    println!(
        "Average time of inference: {:.4} s/batch",
        report.timing.avg_inference_time
    );
    info!(dir = %output.display(), "wrote model_weights.json, metrics.json, time.json");
    Ok(())
}
