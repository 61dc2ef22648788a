//! Low-light correction with an EnlightenGAN graph.

use std::path::Path;

use image::{imageops, Rgb, RgbImage};
use ndarray::prelude::*;
use nshare::AsNdarray3;
use ort::{session::Session, value::TensorRef};
use parking_lot::Mutex;
use tracing::debug;

use crate::{
    device::{build_session, Device},
    errors::{ensure_exists, CarDamageError, Result},
};

/// Spatial dimensions must be a multiple of this (four stride-2 stages).
const SIZE_MULTIPLE: u32 = 16;

/// Brightens an image before segmentation.
pub trait ImageEnhancer: Send + Sync {
    fn enhance(&self, image: &RgbImage) -> Result<RgbImage>;
}

pub struct LightEnhancer {
    input_names: Vec<String>,
    output_name: String,
    session: Mutex<Session>,
}

impl LightEnhancer {
    pub fn new(model_path: &Path, device: Device, device_id: i32) -> Result<Self> {
        ensure_exists("Enhancer model", model_path)?;
        let (session, device) = build_session(model_path, device, device_id, Ok)?;

        let input_names: Vec<_> = session.inputs.iter().map(|i| i.name.clone()).collect();
        if input_names.is_empty() || input_names.len() > 2 {
            return Err(CarDamageError::validation(
                "enhancer inputs",
                format!("expected 1 or 2 inputs, got {}", input_names.len()),
            ));
        }
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| {
                CarDamageError::validation("enhancer outputs", "graph declares no outputs")
            })?;

        debug!(path = %model_path.display(), %device, inputs = ?input_names, "loaded enhancer");
        Ok(Self {
            input_names,
            output_name,
            session: Mutex::new(session),
        })
    }
}

impl ImageEnhancer for LightEnhancer {
    fn enhance(&self, image: &RgbImage) -> Result<RgbImage> {
        let (width, height) = image.dimensions();
        let padded = pad_to_multiple(image, SIZE_MULTIPLE);
        let input = to_signed_tensor(&padded);

        let output = {
            let mut session = self.session.lock();
            let outputs = if let [image_name, gray_name] = self.input_names.as_slice() {
                let gray = attention_map(input.view());
                session.run(ort::inputs![
                    image_name.as_str() => TensorRef::from_array_view(&input)?,
                    gray_name.as_str() => TensorRef::from_array_view(&gray)?
                ])?
            } else {
                session.run(ort::inputs![
                    self.input_names[0].as_str() => TensorRef::from_array_view(&input)?
                ])?
            };
            outputs[self.output_name.as_str()]
                .try_extract_array::<f32>()?
                .into_dimensionality::<Ix4>()?
                .to_owned()
        };

        let enhanced = from_signed_tensor(output.view())?;
        Ok(imageops::crop_imm(&enhanced, 0, 0, width, height).to_image())
    }
}

/// Extend the canvas right/bottom with black so both sides divide by `multiple`.
pub fn pad_to_multiple(image: &RgbImage, multiple: u32) -> RgbImage {
    let (width, height) = image.dimensions();
    let pad_width = width.div_ceil(multiple) * multiple;
    let pad_height = height.div_ceil(multiple) * multiple;
    if (pad_width, pad_height) == (width, height) {
        return image.clone();
    }

    let mut canvas = RgbImage::from_pixel(pad_width, pad_height, Rgb([0, 0, 0]));
    imageops::overlay(&mut canvas, image, 0, 0);
    canvas
}

/// `[0, 255]` → `[-1, 1]`, layout `[1, 3, H, W]`.
fn to_signed_tensor(image: &RgbImage) -> Array4<f32> {
    image
        .as_ndarray3()
        .map(|&v| f32::from(v) / 127.5 - 1.0)
        .insert_axis(Axis(0))
}

/// Darker pixels get more attention: `1 - (gray + 1) / 2` on the signed input.
fn attention_map(input: ArrayView4<f32>) -> Array4<f32> {
    let r = input.slice(s![.., 0..1, .., ..]);
    let g = input.slice(s![.., 1..2, .., ..]);
    let b = input.slice(s![.., 2..3, .., ..]);
    let gray = &r * 0.299 + &g * 0.587 + &b * 0.114;
    gray.mapv(|v| 1.0 - (v + 1.0) / 2.0)
}

fn from_signed_tensor(output: ArrayView4<f32>) -> Result<RgbImage> {
    let shape = output.shape();
    if shape[0] != 1 || shape[1] != 3 {
        return Err(CarDamageError::validation(
            "enhancer output",
            format!("expected [1, 3, H, W], got {shape:?}"),
        ));
    }
    let (height, width) = (shape[2] as u32, shape[3] as u32);
    Ok(RgbImage::from_fn(width, height, |x, y| {
        let channel = |c: usize| {
            let v = output[[0, c, y as usize, x as usize]];
            ((v.clamp(-1.0, 1.0) + 1.0) * 127.5).round() as u8
        };
        Rgb([channel(0), channel(1), channel(2)])
    }))
}
