use image::{imageops, GrayImage, Luma, Rgb, RgbImage};
use imageproc::map::map_colors2;

use crate::{
    damage::DamageCategory,
    errors::{CarDamageError, Result},
    mask::LabelMask,
};

/// Opacity of the jet mask laid over the photo.
const MASK_ALPHA: f32 = 0.6;
/// Opacity of the photo itself over a white canvas.
const IMAGE_ALPHA: f32 = 0.9;

/// Default opacity for solid category overlays.
pub const DEFAULT_OVERLAY_OPACITY: f32 = 0.6;

/// Piecewise-linear jet colormap, `t` in `[0, 1]`.
pub fn jet(t: f32) -> Rgb<u8> {
    let t = t.clamp(0.0, 1.0);
    let channel = |offset: f32| {
        let v = (1.5 - (4.0 * t - offset).abs()).clamp(0.0, 1.0);
        (v * 255.0).round() as u8
    };
    Rgb([channel(3.0), channel(2.0), channel(1.0)])
}

fn ensure_same_size(image: &RgbImage, mask: &LabelMask) -> Result<()> {
    if image.dimensions() == mask.dimensions() {
        Ok(())
    } else {
        let (iw, ih) = image.dimensions();
        let (mw, mh) = mask.dimensions();
        Err(CarDamageError::validation(
            "overlay",
            format!("image {iw}x{ih} and mask {mw}x{mh} differ in size"),
        ))
    }
}

/// Blend a jet-coloured label mask over the photo.
///
/// Labels are normalised to the mask's own range, so an all-background mask
/// renders uniformly in the lowest colour.
pub fn jet_overlay(image: &RgbImage, mask: &LabelMask) -> Result<RgbImage> {
    ensure_same_size(image, mask)?;
    let max = f32::from(mask.max_label());
    let labels = mask.to_label_image();

    Ok(map_colors2(image, &labels, |Rgb(px), Luma([label])| {
        let t = if max > 0.0 { f32::from(label) / max } else { 0.0 };
        let Rgb(color) = jet(t);
        Rgb(std::array::from_fn(|c| {
            let photo = IMAGE_ALPHA * f32::from(px[c]) + (1.0 - IMAGE_ALPHA) * 255.0;
            (MASK_ALPHA * f32::from(color[c]) + (1.0 - MASK_ALPHA) * photo).round() as u8
        }))
    }))
}

/// Photo followed by one jet overlay per damage mask, left to right.
pub fn panel(image: &RgbImage, masks: &[(DamageCategory, &LabelMask)]) -> Result<RgbImage> {
    let (width, height) = image.dimensions();
    let mut canvas = RgbImage::new(width * (masks.len() as u32 + 1), height);
    imageops::replace(&mut canvas, image, 0, 0);

    for (i, (_, mask)) in masks.iter().enumerate() {
        let tile = jet_overlay(image, mask)?;
        imageops::replace(&mut canvas, &tile, i64::from(width) * (i as i64 + 1), 0);
    }
    Ok(canvas)
}

/// Paint the positive pixels of each selected category in its overlay colour.
///
/// Later categories in `masks` are painted over earlier ones.
pub fn color_overlay(
    image: &RgbImage,
    masks: &[(DamageCategory, &LabelMask)],
    selected: &[DamageCategory],
    opacity: f32,
) -> Result<RgbImage> {
    let opacity = opacity.clamp(0.0, 1.0);
    let mut canvas = image.clone();

    for (category, mask) in masks.iter().filter(|(c, _)| selected.contains(c)) {
        ensure_same_size(image, mask)?;
        let binary: GrayImage = mask.to_luma(1);
        let Rgb(color) = category.overlay_color();
        canvas = map_colors2(&canvas, &binary, |Rgb(px), Luma([m])| {
            if m == 0 {
                return Rgb(px);
            }
            Rgb(std::array::from_fn(|c| {
                (opacity * f32::from(color[c]) + (1.0 - opacity) * f32::from(px[c])).round() as u8
            }))
        });
    }
    Ok(canvas)
}
