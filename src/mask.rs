use image::{GrayImage, Luma};
use ndarray::prelude::*;

use crate::errors::{CarDamageError, Result};

/// Per-pixel class labels, shape `(H, W)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMask {
    labels: Array2<u8>,
}

impl LabelMask {
    pub const fn new(labels: Array2<u8>) -> Self {
        Self { labels }
    }

    /// Reduce `[1, C, H, W]` logits to the highest-scoring class per pixel.
    ///
    /// Ties resolve to the lowest class index.
    pub fn from_logits(logits: ArrayView4<f32>, num_classes: usize) -> Result<Self> {
        let shape = logits.shape();
        if shape[0] != 1 {
            return Err(CarDamageError::validation(
                "logits",
                format!("batch size must be 1, got {}", shape[0]),
            ));
        }
        if shape[1] != num_classes {
            return Err(CarDamageError::validation(
                "logits",
                format!("expected {num_classes} classes, got {}", shape[1]),
            ));
        }
        if num_classes > usize::from(u8::MAX) + 1 {
            return Err(CarDamageError::validation(
                "logits",
                format!("{num_classes} classes do not fit in a u8 label"),
            ));
        }

        let logits = logits.index_axis(Axis(0), 0);
        let labels = Array2::from_shape_fn((shape[2], shape[3]), |(y, x)| {
            let mut best = 0;
            let mut best_score = f32::NEG_INFINITY;
            for (class, &score) in logits.slice(s![.., y, x]).iter().enumerate() {
                if score > best_score {
                    best = class;
                    best_score = score;
                }
            }
            best as u8
        });

        Ok(Self { labels })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        let (h, w) = self.labels.dim();
        (w as u32, h as u32)
    }

    pub fn labels(&self) -> ArrayView2<'_, u8> {
        self.labels.view()
    }

    pub fn count(&self, label: u8) -> u64 {
        self.labels.iter().filter(|&&l| l == label).count() as u64
    }

    /// Sum of all labels. For a binary mask this is the positive pixel count;
    /// for the part mask it is the area measure the severity score divides by.
    pub fn label_sum(&self) -> u64 {
        self.labels.iter().map(|&l| u64::from(l)).sum()
    }

    pub fn max_label(&self) -> u8 {
        self.labels.iter().copied().max().unwrap_or(0)
    }

    /// Raw labels as a grayscale image.
    pub fn to_label_image(&self) -> GrayImage {
        let (w, h) = self.dimensions();
        GrayImage::from_fn(w, h, |x, y| Luma([self.labels[[y as usize, x as usize]]]))
    }

    /// Binary mask image: 255 where the label equals `positive`.
    pub fn to_luma(&self, positive: u8) -> GrayImage {
        let (w, h) = self.dimensions();
        GrayImage::from_fn(w, h, |x, y| {
            if self.labels[[y as usize, x as usize]] == positive {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }
}
