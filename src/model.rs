use std::path::Path;

use image::{imageops, imageops::FilterType, RgbImage};
use ndarray::prelude::*;
use nshare::AsNdarray3;
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use parking_lot::Mutex;
use tracing::debug;

use crate::{
    device::{build_session, Device},
    errors::{ensure_exists, CarDamageError, Result},
    mask::LabelMask,
};

/// Input resolution used when the graph declares a dynamic spatial size.
pub const DEFAULT_INPUT_SIZE: u32 = 256;

/// A segmentation network that maps an RGB tensor to per-class logits.
pub trait SegmentationModel: Send + Sync {
    /// Square input resolution the model expects.
    fn input_size(&self) -> u32;

    fn num_classes(&self) -> usize;

    /// `[1, 3, S, S]` in `[0, 1]` → `[1, C, S, S]` logits.
    fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>>;

    /// Preprocess, predict and take the argmax over classes.
    fn segment(&self, image: &RgbImage) -> Result<LabelMask> {
        let tensor = preprocess(image, self.input_size());
        let logits = self.predict(tensor.view())?;
        LabelMask::from_logits(logits.view(), self.num_classes())
    }
}

/// U-Net exported to ONNX, executed through ONNX Runtime.
pub struct OnnxSegmentationModel {
    image_size: u32,
    num_classes: usize,
    input_name: String,
    output_name: String,
    device: Device,
    session: Mutex<Session>,
}

impl OnnxSegmentationModel {
    pub fn new(model_path: &Path, num_classes: usize, device: Device, device_id: i32) -> Result<Self> {
        ensure_exists("Model", model_path)?;

        let (mut session, device) = build_session(model_path, device, device_id, |builder| {
            builder
                .with_optimization_level(GraphOptimizationLevel::Level3)?
                .with_memory_pattern(true)
        })?;

        let input = session.inputs.first().ok_or_else(|| {
            CarDamageError::validation("model inputs", "graph declares no inputs")
        })?;
        let input_name = input.name.clone();
        let image_size = input
            .input_type
            .tensor_shape()
            .and_then(|shape| shape.get(2).copied())
            .filter(|&size| size > 0)
            .map_or(DEFAULT_INPUT_SIZE, |size| size as u32);
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| {
                CarDamageError::validation("model outputs", "graph declares no outputs")
            })?;

        // initialize model
        let data = Array4::<f32>::zeros((1, 3, image_size as usize, image_size as usize));
        session
            .run(ort::inputs![input_name.as_str() => TensorRef::from_array_view(&data)?])
            .map_err(|e| CarDamageError::model("warm-up run", e))?;

        debug!(
            path = %model_path.display(),
            %device,
            image_size,
            num_classes,
            "loaded segmentation model"
        );

        Ok(Self {
            image_size,
            num_classes,
            input_name,
            output_name,
            device,
            session: Mutex::new(session),
        })
    }

    /// Device the session ended up on after any fallback.
    pub const fn device(&self) -> Device {
        self.device
    }
}

impl SegmentationModel for OnnxSegmentationModel {
    fn input_size(&self) -> u32 {
        self.image_size
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>> {
        let mut binding = self.session.lock();
        let outputs = binding.run(ort::inputs![
            self.input_name.as_str() => TensorRef::from_array_view(&tensor.as_standard_layout())?
        ])?;
        Ok(outputs[self.output_name.as_str()]
            .try_extract_array::<f32>()?
            .into_dimensionality::<Ix4>()?
            .to_owned())
    }
}

/// Resize to `image_size`², scale to `[0, 1]` and lay out as `[1, 3, H, W]` (RGB).
pub fn preprocess(image: &RgbImage, image_size: u32) -> Array4<f32> {
    let resized;
    let image = if image.dimensions() == (image_size, image_size) {
        image
    } else {
        resized = imageops::resize(image, image_size, image_size, FilterType::Triangle);
        &resized
    };

    image
        .as_ndarray3()
        .map(|&v| f32::from(v) / 255.0)
        .insert_axis(Axis(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn preprocess_scales_and_transposes() {
        let image = RgbImage::from_pixel(8, 4, Rgb([255, 0, 51]));
        let tensor = preprocess(&image, 16);

        assert_eq!(tensor.shape(), &[1, 3, 16, 16]);
        assert!((tensor[[0, 0, 5, 5]] - 1.0).abs() < 1e-6);
        assert_eq!(tensor[[0, 1, 5, 5]], 0.0);
        assert!((tensor[[0, 2, 5, 5]] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn preprocess_keeps_matching_size() {
        let image = RgbImage::from_fn(4, 4, |x, _| Rgb([(x * 60) as u8, 0, 0]));
        let tensor = preprocess(&image, 4);
        assert!((tensor[[0, 0, 0, 3]] - 180.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn missing_weights_fail_before_session() {
        let err = OnnxSegmentationModel::new(
            Path::new("/definitely/missing/[PART]Unet.onnx"),
            16,
            Device::Cpu,
            0,
        )
        .err()
        .expect("missing model must fail");
        assert!(matches!(err, CarDamageError::MissingFile { .. }));
    }
}
