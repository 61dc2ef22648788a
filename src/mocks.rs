use std::sync::Arc;

use image::{Rgb, RgbImage};
use ndarray::prelude::*;

use crate::enhance::ImageEnhancer;
use crate::errors::{CarDamageError, Result};
use crate::model::SegmentationModel;

type Pattern = Arc<dyn Fn(usize, usize) -> u8 + Send + Sync>;

/// Segmentation model for tests: labels each pixel from a fixed `(x, y)` pattern.
#[derive(Clone)]
pub struct MockSegmentationModel {
    pub image_size: u32,
    pub num_classes: usize,
    pattern: Pattern,
}

impl MockSegmentationModel {
    /// Every pixel is background until a pattern is set.
    pub fn new(image_size: u32, num_classes: usize) -> Self {
        Self {
            image_size,
            num_classes,
            pattern: Arc::new(|_, _| 0),
        }
    }

    pub fn with_pattern(mut self, pattern: impl Fn(usize, usize) -> u8 + Send + Sync + 'static) -> Self {
        self.pattern = Arc::new(pattern);
        self
    }
}

impl SegmentationModel for MockSegmentationModel {
    fn input_size(&self) -> u32 {
        self.image_size
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>> {
        let shape = tensor.shape();
        if shape[2] != self.image_size as usize || shape[3] != self.image_size as usize {
            return Err(CarDamageError::validation(
                "mock input",
                format!("expected {0}x{0}, got {shape:?}", self.image_size),
            ));
        }
        Ok(Array4::from_shape_fn(
            (shape[0], self.num_classes, shape[2], shape[3]),
            |(_, c, y, x)| {
                if usize::from((self.pattern)(x, y)) == c {
                    1.0
                } else {
                    0.0
                }
            },
        ))
    }
}

/// Adds a constant to every channel.
pub struct BrightenEnhancer(pub u8);

impl ImageEnhancer for BrightenEnhancer {
    fn enhance(&self, image: &RgbImage) -> Result<RgbImage> {
        let mut out = image.clone();
        for Rgb(px) in out.pixels_mut() {
            for c in px.iter_mut() {
                *c = c.saturating_add(self.0);
            }
        }
        Ok(out)
    }
}
