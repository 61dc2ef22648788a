use anyhow::{Context, Result};
use clap::Parser;
use rayon::ThreadPoolBuilder;
use tracing_subscriber::EnvFilter;

use car_damage::{export, Cli, Command, ImageProcessor};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Analyze(config) => {
            if config.num_threads > 0 {
                ThreadPoolBuilder::new()
                    .num_threads(config.num_threads)
                    .build_global()?;
            }

            let processor = ImageProcessor::with_onnx_models(config)
                .context("Failed to load models")?;
            processor.run().context("Analysis failed")?;
        }
        Command::Export(config) => {
            let path = export::export(&config).context("Export failed")?;
            println!("Saved: {}", path.display());
        }
    }

    Ok(())
}
