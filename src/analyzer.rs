use image::{imageops, imageops::FilterType, DynamicImage, RgbImage};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::{
    config::{AnalyzeConfig, DAMAGE_CLASSES, PART_CLASSES},
    damage::DamageCategory,
    enhance::{ImageEnhancer, LightEnhancer},
    errors::{CarDamageError, Result},
    estimate::{DamageAreas, RepairEstimate, Severity},
    mask::LabelMask,
    model::{OnnxSegmentationModel, SegmentationModel},
};

/// Label the damage models assign to damaged pixels.
pub const DAMAGE_LABEL: u8 = 1;

/// Everything computed for one photo.
pub struct Analysis {
    /// Resized (and enhanced, when enabled) photo the masks refer to.
    pub image: RgbImage,
    pub damage_masks: Vec<(DamageCategory, LabelMask)>,
    pub part_mask: LabelMask,
    pub areas: DamageAreas,
    pub part_area: u64,
    pub estimate: RepairEstimate,
    pub severity: Severity,
}

impl Analysis {
    pub fn masks(&self) -> Vec<(DamageCategory, &LabelMask)> {
        self.damage_masks.iter().map(|(c, m)| (*c, m)).collect()
    }
}

pub struct DamageAnalyzer<M: SegmentationModel> {
    damage_models: Vec<(DamageCategory, M)>,
    part_model: M,
    enhancer: Option<Box<dyn ImageEnhancer>>,
}

impl<M: SegmentationModel> DamageAnalyzer<M> {
    /// `damage_models` follows [`DamageCategory::ALL`] order.
    pub fn new(damage_models: [M; 4], part_model: M) -> Result<Self> {
        let size = part_model.input_size();
        if part_model.num_classes() != PART_CLASSES {
            return Err(CarDamageError::validation(
                "part model",
                format!(
                    "predicts {} classes, expected {PART_CLASSES}",
                    part_model.num_classes()
                ),
            ));
        }

        let damage_models: Vec<_> = DamageCategory::ALL.into_iter().zip(damage_models).collect();
        for (category, model) in &damage_models {
            if model.input_size() != size {
                return Err(CarDamageError::validation(
                    format!("{category} model"),
                    format!(
                        "input size {} differs from part model input size {size}",
                        model.input_size()
                    ),
                ));
            }
            if model.num_classes() != DAMAGE_CLASSES {
                return Err(CarDamageError::validation(
                    format!("{category} model"),
                    format!(
                        "predicts {} classes, expected {DAMAGE_CLASSES}",
                        model.num_classes()
                    ),
                ));
            }
        }

        Ok(Self {
            damage_models,
            part_model,
            enhancer: None,
        })
    }

    pub fn with_enhancer(mut self, enhancer: Box<dyn ImageEnhancer>) -> Self {
        self.enhancer = Some(enhancer);
        self
    }

    pub fn input_size(&self) -> u32 {
        self.part_model.input_size()
    }

    pub fn analyze(&self, image: &DynamicImage) -> Result<Analysis> {
        let size = self.input_size();
        let resized = imageops::resize(&image.to_rgb8(), size, size, FilterType::Triangle);
        let image = match &self.enhancer {
            Some(enhancer) => enhancer.enhance(&resized)?,
            None => resized,
        };

        let damage_masks = self
            .damage_models
            .par_iter()
            .map(|(category, model)| model.segment(&image).map(|mask| (*category, mask)))
            .collect::<Result<Vec<_>>>()?;

        let mut areas = DamageAreas::default();
        for (category, mask) in &damage_masks {
            areas.set(*category, mask.count(DAMAGE_LABEL));
        }
        let estimate = RepairEstimate::from_areas(&areas);
        for line in &estimate.lines {
            info!(category = %line.category, area = line.area, cost = line.cost, "damage area");
        }

        let part_mask = self.part_model.segment(&image)?;
        let part_area = part_mask.label_sum();
        let severity = Severity::assess(&areas, part_area);
        debug!(
            part_area,
            breakage = areas.get(DamageCategory::Breakage),
            crushed = areas.get(DamageCategory::Crushed),
            scratch = areas.get(DamageCategory::Scratch),
            separated = areas.get(DamageCategory::Separated),
            score = severity.score,
            "areas"
        );

        Ok(Analysis {
            image,
            damage_masks,
            part_mask,
            areas,
            part_area,
            estimate,
            severity,
        })
    }
}

impl DamageAnalyzer<OnnxSegmentationModel> {
    /// Load all segmentation models (and the enhancer unless skipped).
    ///
    /// Every weight file is checked before the first session is built.
    pub fn load(config: &AnalyzeConfig) -> Result<Self> {
        let layout = config.project.layout();
        layout.ensure_segmentation_models()?;
        let enhancer_path = config.enhancer_path();
        if !config.skip_enhance {
            crate::errors::ensure_exists("Enhancer model", &enhancer_path)?;
        }

        let device_id = config.device.device_id;
        let device = config.device.device.resolve(device_id);
        let load = |category: DamageCategory| {
            let path = layout.damage_model(category);
            OnnxSegmentationModel::new(&path, DAMAGE_CLASSES, device, device_id)
        };
        let damage_models = [
            load(DamageCategory::Breakage)?,
            load(DamageCategory::Crushed)?,
            load(DamageCategory::Scratch)?,
            load(DamageCategory::Separated)?,
        ];
        info!("loaded pretrained damage models");

        let part_model =
            OnnxSegmentationModel::new(&layout.part_model(), PART_CLASSES, device, device_id)?;
        let analyzer = Self::new(damage_models, part_model)?;

        if config.skip_enhance {
            Ok(analyzer)
        } else {
            let enhancer = LightEnhancer::new(&enhancer_path, device, device_id)?;
            Ok(analyzer.with_enhancer(Box::new(enhancer)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{BrightenEnhancer, MockSegmentationModel};
    use image::Rgb;

    fn damage(pattern: fn(usize, usize) -> u8) -> MockSegmentationModel {
        MockSegmentationModel::new(8, DAMAGE_CLASSES).with_pattern(pattern)
    }

    fn analyzer() -> DamageAnalyzer<MockSegmentationModel> {
        // breakage: one row (8 px), crushed: none, scratch: whole image, separated: one column
        let part = MockSegmentationModel::new(8, PART_CLASSES).with_pattern(|x, _| (x % 16) as u8);
        DamageAnalyzer::new(
            [
                damage(|_, y| u8::from(y == 0)),
                damage(|_, _| 0),
                damage(|_, _| 1),
                damage(|x, _| u8::from(x == 7)),
            ],
            part,
        )
        .unwrap()
    }

    #[test]
    fn analyze_counts_areas_and_prices() -> Result<()> {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 16, Rgb([90, 90, 90])));
        let analysis = analyzer().analyze(&image)?;

        assert_eq!(analysis.image.dimensions(), (8, 8));
        assert_eq!(analysis.areas, DamageAreas::new(8, 0, 64, 8));
        assert_eq!(analysis.estimate.total, 8 * 120 + 64 * 60 + 8 * 90);
        // part labels 0..=7 per row, summed over 8 rows
        assert_eq!(analysis.part_area, 224);

        let weighted = 8.0 * 3.0 + 64.0 * 1.0 + 8.0 * 1.2;
        let expected = weighted * 100.0 / (3.0 * 224.0);
        assert!((analysis.severity.score - expected).abs() < 1e-9);
        assert_eq!(analysis.severity.grade.value(), 3);
        Ok(())
    }

    #[test]
    fn part_area_sums_part_labels() -> Result<()> {
        let clean = MockSegmentationModel::new(16, DAMAGE_CLASSES);
        let breakage = clean.clone().with_pattern(|_, y| u8::from(y < 4));
        let part = MockSegmentationModel::new(16, PART_CLASSES).with_pattern(|x, _| (x % 16) as u8);
        let analyzer =
            DamageAnalyzer::new([breakage, clean.clone(), clean.clone(), clean], part)?;

        let image = DynamicImage::ImageRgb8(RgbImage::new(16, 16));
        let analysis = analyzer.analyze(&image)?;

        // (0 + 1 + ... + 15) * 16 rows
        assert_eq!(analysis.part_area, 1920);
        // 64 * 3 * 100 / (3 * 1920)
        assert!((analysis.severity.score - 10.0 / 3.0).abs() < 1e-9);
        assert_eq!(analysis.severity.grade.value(), 4);

        // counting labelled pixels instead would land a grade worse
        let labelled = 256 - analysis.part_mask.count(0);
        assert_eq!(labelled, 240);
        assert_eq!(Severity::assess(&analysis.areas, labelled).grade.value(), 3);
        Ok(())
    }

    #[test]
    fn masks_follow_canonical_order() -> Result<()> {
        let image = DynamicImage::ImageRgb8(RgbImage::new(8, 8));
        let analysis = analyzer().analyze(&image)?;
        let order: Vec<_> = analysis.masks().iter().map(|(c, _)| *c).collect();
        assert_eq!(order, DamageCategory::ALL.to_vec());
        Ok(())
    }

    #[test]
    fn enhancer_output_is_what_gets_segmented() -> Result<()> {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([10, 10, 10])));
        let analysis = analyzer()
            .with_enhancer(Box::new(BrightenEnhancer(50)))
            .analyze(&image)?;
        assert_eq!(analysis.image.get_pixel(0, 0), &Rgb([60, 60, 60]));
        Ok(())
    }

    #[test]
    fn rejects_mismatched_class_counts() {
        let part = MockSegmentationModel::new(8, PART_CLASSES);
        let wrong = MockSegmentationModel::new(8, 3);
        let result = DamageAnalyzer::new(
            [wrong.clone(), wrong.clone(), wrong.clone(), wrong],
            part,
        );
        assert!(result.is_err());
    }

    #[test]
    fn rejects_mismatched_input_sizes() {
        let part = MockSegmentationModel::new(8, PART_CLASSES);
        let small = MockSegmentationModel::new(4, DAMAGE_CLASSES);
        let result = DamageAnalyzer::new(
            [small.clone(), small.clone(), small.clone(), small],
            part,
        );
        assert!(result.is_err());
    }
}
