use anyhow::{ensure, Context, Result};
use clap::Parser;
use rayon::ThreadPoolBuilder;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use inpaint_prep::{Config, ImageProcessor, InpaintModel, MaskedPreview};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_writer(std::io::stderr)
        .init();

    let config = Config::parse();

    ensure!(config.input_dir.exists(), "Input directory does not exist");
    ensure!(config.mask_dir.exists(), "Mask directory does not exist");
    if let Some(model_path) = &config.model_path {
        ensure!(model_path.exists(), "Model path does not exist");
    }

    ThreadPoolBuilder::new()
        .num_threads(config.num_threads)
        .build_global()?;

    match config.model_path.clone() {
        Some(model_path) => run_with_model(&model_path, config),
        None => {
            info!("no model given, writing masked images");
            run(MaskedPreview, config)
        }
    }
}

#[cfg(feature = "onnx")]
fn run_with_model(model_path: &std::path::Path, config: Config) -> Result<()> {
    let model = inpaint_prep::OnnxInpaintModel::new(model_path, config.device_id)
        .with_context(|| format!("Failed to load model: {}", model_path.display()))?;
    run(model, config)
}

#[cfg(not(feature = "onnx"))]
fn run_with_model(model_path: &std::path::Path, _config: Config) -> Result<()> {
    anyhow::bail!(
        "Cannot load {}: built without the `onnx` feature",
        model_path.display()
    )
}

fn run<M: InpaintModel>(model: M, config: Config) -> Result<()> {
    let input_dir = config.input_dir.clone();
    let processor = ImageProcessor::new(model, config);
    let count = processor
        .process_directory()
        .with_context(|| format!("Failed to process {}", input_dir.display()))?;
    info!(count, "done");
    Ok(())
}
