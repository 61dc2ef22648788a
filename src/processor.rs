use std::{
    fs,
    path::{Path, PathBuf},
};

use image::{ImageFormat, RgbImage};
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::{
    analyzer::DamageAnalyzer,
    config::AnalyzeConfig,
    errors::{CarDamageError, Result},
    model::SegmentationModel,
    report::Report,
    visualize,
};

/// Runs the analyzer over one photo or a directory tree of photos and writes
/// the panel, the colour overlay and (optionally) a JSON report per photo.
pub struct ImageProcessor<M: SegmentationModel> {
    analyzer: DamageAnalyzer<M>,
    config: AnalyzeConfig,
}

impl<M: SegmentationModel> ImageProcessor<M> {
    pub const fn new(analyzer: DamageAnalyzer<M>, config: AnalyzeConfig) -> Self {
        Self { analyzer, config }
    }

    pub fn run(&self) -> Result<Vec<Report>> {
        let input = self.config.input_path();
        let output_dir = &self.config.output_dir;

        fs::create_dir_all(output_dir).map_err(|e| CarDamageError::FileSystem {
            path: output_dir.clone(),
            operation: "create output directory".to_string(),
            source: e,
        })?;

        if input.is_dir() {
            self.process_directory(&input)
        } else {
            crate::errors::ensure_exists("Image", &input)?;
            let parent = input.parent().unwrap_or(Path::new(""));
            let report = self.process_single_image(&input, parent)?;
            println!("{report}");
            Ok(vec![report])
        }
    }

    fn process_directory(&self, input_dir: &Path) -> Result<Vec<Report>> {
        let image_files = collect_image_files(input_dir);
        if image_files.is_empty() {
            warn!(dir = %input_dir.display(), "no images to analyze");
            return Ok(Vec::new());
        }

        let pb = ProgressBar::new(image_files.len() as u64);
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )
            .map_err(|e| CarDamageError::Configuration {
                message: e.to_string(),
            })?
            .progress_chars("#>-"),
        );

        let reports = image_files
            .par_iter()
            .progress_with(pb.clone())
            .map(|path| {
                let report = self.process_single_image(path, input_dir)?;
                pb.suspend(|| println!("{report}"));
                Ok(report)
            })
            .collect::<Result<Vec<_>>>()?;

        pb.finish();
        info!(count = reports.len(), "analyzed all images");
        Ok(reports)
    }

    /// Analyze `input_file`; outputs are placed under the output directory at
    /// the file's path relative to `base`.
    pub fn process_single_image(&self, input_file: &Path, base: &Path) -> Result<Report> {
        let img = image::open(input_file).map_err(|e| CarDamageError::ImageProcessing {
            path: input_file.display().to_string(),
            operation: "open image".to_string(),
            source: Box::new(e),
        })?;

        let analysis = self.analyzer.analyze(&img)?;
        let report = Report::new(input_file, &analysis);

        let stem = self.output_stem(input_file, base)?;
        if let Some(parent) = stem.parent() {
            fs::create_dir_all(parent).map_err(|e| CarDamageError::FileSystem {
                path: parent.to_path_buf(),
                operation: "create output directory".to_string(),
                source: e,
            })?;
        }

        let masks = analysis.masks();
        let panel = visualize::panel(&analysis.image, &masks)?;
        self.save(&panel, &stem, "panel")?;

        let overlay = visualize::color_overlay(
            &analysis.image,
            &masks,
            &self.config.overlay,
            self.config.opacity,
        )?;
        self.save(&overlay, &stem, "overlay")?;

        if self.config.json {
            report.write_json(&stem.with_extension("json"))?;
        }

        Ok(report)
    }

    /// `<output_dir>/<relative dir>/<file stem>` without extension.
    pub fn output_stem(&self, input_file: &Path, base: &Path) -> Result<PathBuf> {
        let relative = input_file
            .strip_prefix(base)
            .map_err(|_| CarDamageError::FileSystem {
                path: input_file.to_path_buf(),
                operation: "relative path".to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "input file is not inside the input directory",
                ),
            })?;
        Ok(self.config.output_dir.join(relative.with_extension("")))
    }

    fn save(&self, image: &RgbImage, stem: &Path, suffix: &str) -> Result<()> {
        let file_name = format!(
            "{}_{suffix}.{}",
            stem.file_name().unwrap_or_default().to_string_lossy(),
            self.config.format
        );
        let path = stem.with_file_name(file_name);
        let format = ImageFormat::from_extension(&self.config.format).unwrap_or(ImageFormat::Png);

        image
            .save_with_format(&path, format)
            .map_err(|e| CarDamageError::ImageProcessing {
                path: path.display().to_string(),
                operation: "save image".to_string(),
                source: Box::new(e),
            })
    }
}

pub fn is_supported_image_format(path: &Path) -> bool {
    ImageFormat::from_path(path).is_ok_and(|f| f.reading_enabled())
}

fn collect_image_files(input_dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<_> = WalkDir::new(input_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| is_supported_image_format(e.path()))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}
