use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use image::ImageFormat;

use crate::{
    damage::DamageCategory,
    device::Device,
    errors::ensure_exists,
    visualize::DEFAULT_OVERLAY_OPACITY,
};

/// Classes predicted by each damage model (background, damage).
pub const DAMAGE_CLASSES: usize = 2;
/// Classes predicted by the part model (background plus 15 body parts).
pub const PART_CLASSES: usize = 16;

#[derive(Parser, Clone, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Command {
    /// Segment damage on a photo (or a directory of photos) and estimate repair cost
    Analyze(AnalyzeConfig),
    /// Convert a damage model for on-device deployment
    Export(ExportConfig),
}

#[derive(Args, Clone, Debug)]
pub struct ProjectConfig {
    /// Project root containing `models/` and `image/`
    #[arg(long, default_value = "..")]
    pub root: PathBuf,

    /// Weight directory, defaults to `<root>/models`
    #[arg(long)]
    pub models_dir: Option<PathBuf>,
}

/// Where inference sessions are placed. Export always converts on CPU.
#[derive(Args, Clone, Debug)]
pub struct DeviceConfig {
    #[arg(short, long, value_enum, default_value_t = Device::Auto)]
    pub device: Device,

    #[arg(long, default_value_t = 0)]
    pub device_id: i32,
}

impl ProjectConfig {
    pub fn layout(&self) -> ModelLayout {
        ModelLayout::new(
            self.models_dir
                .clone()
                .unwrap_or_else(|| self.root.join("models")),
        )
    }

    pub fn default_image(&self) -> PathBuf {
        self.root.join("image").join("111.jpg")
    }
}

#[derive(Args, Clone, Debug)]
pub struct AnalyzeConfig {
    #[command(flatten)]
    pub project: ProjectConfig,

    #[command(flatten)]
    pub device: DeviceConfig,

    /// Photo or directory of photos, defaults to `<root>/image/111.jpg`
    pub input: Option<PathBuf>,

    #[arg(short, long, default_value = "output")]
    pub output_dir: PathBuf,

    #[arg(short, long, default_value = "png", value_parser = check_format)]
    pub format: String,

    /// Skip low-light correction
    #[arg(long)]
    pub skip_enhance: bool,

    /// Enhancer graph, defaults to `<models>/enlighten.onnx`
    #[arg(long)]
    pub enhancer_path: Option<PathBuf>,

    /// Categories painted on the colour overlay
    #[arg(long, value_enum, value_delimiter = ',', default_values_t = DamageCategory::ALL)]
    pub overlay: Vec<DamageCategory>,

    #[arg(long, default_value_t = DEFAULT_OVERLAY_OPACITY, value_parser = check_opacity)]
    pub opacity: f32,

    /// Also write a JSON report next to the images
    #[arg(long)]
    pub json: bool,

    /// Worker threads for directory mode (0 = one per core)
    #[arg(short, long, default_value_t = 0)]
    pub num_threads: usize,
}

impl AnalyzeConfig {
    pub fn input_path(&self) -> PathBuf {
        self.input
            .clone()
            .unwrap_or_else(|| self.project.default_image())
    }

    pub fn enhancer_path(&self) -> PathBuf {
        self.enhancer_path
            .clone()
            .unwrap_or_else(|| self.project.layout().enhancer())
    }
}

#[derive(Args, Clone, Debug)]
pub struct ExportConfig {
    #[command(flatten)]
    pub project: ProjectConfig,

    #[arg(short, long, value_enum, default_value_t = DamageCategory::Breakage)]
    pub category: DamageCategory,

    /// Explicit source graph instead of the category's weight file
    #[arg(short, long)]
    pub model_path: Option<PathBuf>,

    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Output file stem, defaults to `Damage_<Tag>_Unet_<size>`
    #[arg(long)]
    pub name: Option<String>,

    /// Input resolution baked into the default output name
    #[arg(long, default_value_t = 256)]
    pub image_size: u32,
}

impl ExportConfig {
    pub fn source_path(&self) -> PathBuf {
        self.model_path
            .clone()
            .unwrap_or_else(|| self.project.layout().damage_model(self.category))
    }

    pub fn output_stem(&self) -> String {
        self.name.clone().unwrap_or_else(|| {
            format!(
                "Damage_{}_Unet_{}",
                self.category.compact_tag(),
                self.image_size
            )
        })
    }
}

/// Weight-file naming convention under the models directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelLayout {
    models_dir: PathBuf,
}

impl ModelLayout {
    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
        }
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn damage_model(&self, category: DamageCategory) -> PathBuf {
        self.models_dir
            .join(format!("[DAMAGE][{}]Unet.onnx", category.tag()))
    }

    pub fn part_model(&self) -> PathBuf {
        self.models_dir.join("[PART]Unet.onnx")
    }

    pub fn enhancer(&self) -> PathBuf {
        self.models_dir.join("enlighten.onnx")
    }

    /// Check every segmentation weight file up front so a missing one aborts
    /// before any session is built.
    pub fn ensure_segmentation_models(&self) -> crate::errors::Result<()> {
        for category in DamageCategory::ALL {
            ensure_exists(
                &format!("Damage model ({category})"),
                &self.damage_model(category),
            )?;
        }
        ensure_exists("Part model", &self.part_model())
    }
}

fn check_format(s: &str) -> Result<String, String> {
    let supported: Vec<_> = ImageFormat::all()
        .filter(|f| f.writing_enabled())
        .flat_map(|f| f.extensions_str())
        .map(|s| format!("`{}`", s))
        .collect();
    let supported_message = format!("Supported formats: {}", supported.join(", "));

    let format = ImageFormat::from_extension(s)
        .ok_or(format!("{} is not supported. {}", s, supported_message))?;
    if !format.writing_enabled() {
        return Err(format!("{} is not supported. {}", s, supported_message));
    }

    Ok(s.to_string())
}

fn check_opacity(s: &str) -> Result<f32, String> {
    let value: f32 = s.parse().map_err(|e| format!("{s}: {e}"))?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("opacity must be within 0..=1, got {value}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weight_files_follow_naming_convention() {
        let layout = ModelLayout::new("/project/models");
        assert_eq!(
            layout.damage_model(DamageCategory::Separated),
            Path::new("/project/models/[DAMAGE][Seperated_1]Unet.onnx")
        );
        assert_eq!(
            layout.part_model(),
            Path::new("/project/models/[PART]Unet.onnx")
        );
    }

    #[test]
    fn defaults_resolve_against_root() {
        let cli = Cli::parse_from(["car-damage", "analyze", "--root", "/work"]);
        let Command::Analyze(config) = cli.command else {
            panic!("expected analyze");
        };
        assert_eq!(config.input_path(), Path::new("/work/image/111.jpg"));
        assert_eq!(config.enhancer_path(), Path::new("/work/models/enlighten.onnx"));
        assert_eq!(config.overlay, DamageCategory::ALL.to_vec());
        assert_eq!(config.device.device, Device::Auto);
    }

    #[test]
    fn overlay_list_is_comma_separated() {
        let cli = Cli::parse_from(["car-damage", "analyze", "--overlay", "scratch,breakage"]);
        let Command::Analyze(config) = cli.command else {
            panic!("expected analyze");
        };
        assert_eq!(
            config.overlay,
            vec![DamageCategory::Scratch, DamageCategory::Breakage]
        );
    }

    #[test]
    fn rejects_bad_format_and_opacity() {
        assert!(Cli::try_parse_from(["car-damage", "analyze", "-f", "txt"]).is_err());
        assert!(Cli::try_parse_from(["car-damage", "analyze", "--opacity", "1.5"]).is_err());
    }

    #[test]
    fn export_stem_uses_compact_tag() {
        let cli = Cli::parse_from(["car-damage", "export", "-c", "crushed"]);
        let Command::Export(config) = cli.command else {
            panic!("expected export");
        };
        assert_eq!(config.output_stem(), "Damage_Crushed2_Unet_256");
        assert_eq!(
            config.source_path(),
            Path::new("../models/[DAMAGE][Crushed_2]Unet.onnx")
        );
    }

    #[test]
    fn export_has_no_device_flags() {
        assert!(Cli::try_parse_from(["car-damage", "export", "--device", "cuda"]).is_err());
        assert!(Cli::try_parse_from(["car-damage", "export", "--device-id", "1"]).is_err());
        let cli = Cli::parse_from(["car-damage", "analyze", "-d", "cpu", "--device-id", "1"]);
        let Command::Analyze(config) = cli.command else {
            panic!("expected analyze");
        };
        assert_eq!(config.device.device, Device::Cpu);
        assert_eq!(config.device.device_id, 1);
    }

    #[test]
    fn missing_weights_are_reported() {
        let dir = tempfile::TempDir::new().unwrap();
        let layout = ModelLayout::new(dir.path());
        assert!(layout.ensure_segmentation_models().is_err());
    }
}
