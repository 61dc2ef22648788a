//! Converts a damage model for on-device deployment.
//!
//! The preferred target is ONNX Runtime's mobile format (`.ort`). If the
//! runtime cannot serialize that, the exporter falls back to an optimised
//! plain ONNX graph. The file extension tells which backend was used.

use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use ort::session::{builder::GraphOptimizationLevel, Session};
use tracing::{info, warn};

use crate::{
    config::ExportConfig,
    errors::{ensure_exists, CarDamageError, Result},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// ORT flatbuffer for the mobile runtime
    OrtMobile,
    /// Portable ONNX graph with basic optimisations only
    Onnx,
}

impl ExportFormat {
    /// Backends in the order they are attempted.
    pub const FALLBACK_ORDER: [Self; 2] = [Self::OrtMobile, Self::Onnx];

    pub const fn extension(self) -> &'static str {
        match self {
            Self::OrtMobile => "ort",
            Self::Onnx => "onnx",
        }
    }

    const fn optimization_level(self) -> GraphOptimizationLevel {
        match self {
            Self::OrtMobile => GraphOptimizationLevel::Level3,
            Self::Onnx => GraphOptimizationLevel::Level1,
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::OrtMobile => "ort-mobile",
            Self::Onnx => "onnx",
        })
    }
}

pub fn output_path(output_dir: &Path, stem: &str, format: ExportFormat) -> PathBuf {
    output_dir.join(format!("{stem}.{}", format.extension()))
}

/// Writes `source` to `target` in `format`.
pub trait ModelWriter {
    fn write(&self, source: &Path, target: &Path, format: ExportFormat) -> Result<()>;
}

/// Serializes through ONNX Runtime's optimised-model output on CPU.
pub struct OrtModelWriter;

impl ModelWriter for OrtModelWriter {
    fn write(&self, source: &Path, target: &Path, format: ExportFormat) -> Result<()> {
        let target_str = target.to_string_lossy().into_owned();
        let builder = Session::builder()?
            .with_optimization_level(format.optimization_level())?
            .with_optimized_model_path(target_str.as_str())?;
        let builder = match format {
            ExportFormat::OrtMobile => {
                builder.with_config_entry("session.save_model_format", "ORT")?
            }
            ExportFormat::Onnx => builder,
        };
        builder
            .commit_from_file(source)
            .map_err(|e| CarDamageError::model(format!("convert to {format}"), e))?;

        if target.exists() {
            Ok(())
        } else {
            Err(CarDamageError::model(
                format!("convert to {format}"),
                format!("runtime did not write {}", target.display()),
            ))
        }
    }
}

/// Try each backend in [`ExportFormat::FALLBACK_ORDER`] and return the path
/// that was written.
pub fn export_with<W: ModelWriter>(writer: &W, config: &ExportConfig) -> Result<PathBuf> {
    let source = config.source_path();
    ensure_exists("Model", &source)?;
    fs::create_dir_all(&config.output_dir).map_err(|e| CarDamageError::FileSystem {
        path: config.output_dir.clone(),
        operation: "create output directory".to_string(),
        source: e,
    })?;

    let stem = config.output_stem();
    let mut last_error = None;
    for format in ExportFormat::FALLBACK_ORDER {
        let target = output_path(&config.output_dir, &stem, format);
        match writer.write(&source, &target, format) {
            Ok(()) => {
                info!(%format, path = %target.display(), "exported model");
                return Ok(target);
            }
            Err(e) => {
                warn!(%format, error = %e, "export failed, trying next backend");
                // never leave a partial export behind
                let _ = fs::remove_file(&target);
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| CarDamageError::Configuration {
        message: "no export backend configured".to_string(),
    }))
}

pub fn export(config: &ExportConfig) -> Result<PathBuf> {
    export_with(&OrtModelWriter, config)
}
