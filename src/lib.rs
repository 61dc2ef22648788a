pub mod analyzer;
pub mod config;
pub mod damage;
pub mod device;
pub mod enhance;
pub mod errors;
pub mod estimate;
pub mod export;
pub mod mask;
pub mod model;
pub mod processor;
pub mod report;
pub mod visualize;

pub mod mocks;

pub use analyzer::{Analysis, DamageAnalyzer};
pub use config::{AnalyzeConfig, Cli, Command, DeviceConfig, ExportConfig, ModelLayout};
pub use damage::DamageCategory;
pub use device::Device;
pub use errors::{CarDamageError, Result};
pub use estimate::{DamageAreas, Grade, RepairEstimate, Severity};
pub use mask::LabelMask;
pub use model::{OnnxSegmentationModel, SegmentationModel};
pub use processor::ImageProcessor;
pub use report::Report;

impl ImageProcessor<OnnxSegmentationModel> {
    /// Load every model named by `config` and wrap them in a processor.
    pub fn with_onnx_models(config: AnalyzeConfig) -> Result<Self> {
        let analyzer = DamageAnalyzer::load(&config)?;
        Ok(Self::new(analyzer, config))
    }
}
