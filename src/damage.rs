use std::fmt;

use clap::ValueEnum;
use image::Rgb;
use serde::Serialize;

/// Defect types predicted by the damage models, one binary U-Net each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DamageCategory {
    Breakage,
    Crushed,
    Scratch,
    Separated,
}

impl DamageCategory {
    /// Canonical order. Reports, panels and the model list all follow it.
    pub const ALL: [Self; 4] = [Self::Breakage, Self::Crushed, Self::Scratch, Self::Separated];

    /// Tag embedded in the weight file name, e.g. `[DAMAGE][Breakage_3]Unet.onnx`.
    ///
    /// `Seperated_1` is spelled the way the trained weights were published.
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Breakage => "Breakage_3",
            Self::Crushed => "Crushed_2",
            Self::Scratch => "Scratch_0",
            Self::Separated => "Seperated_1",
        }
    }

    /// Repair price per damaged pixel.
    pub const fn unit_price(self) -> u64 {
        match self {
            Self::Breakage => 120,
            Self::Crushed => 90,
            Self::Scratch => 60,
            Self::Separated => 90,
        }
    }

    pub const fn severity_weight(self) -> f64 {
        match self {
            Self::Breakage => 3.0,
            Self::Crushed => 2.0,
            Self::Scratch => 1.0,
            Self::Separated => 1.2,
        }
    }

    pub const fn overlay_color(self) -> Rgb<u8> {
        match self {
            Self::Breakage => Rgb([191, 140, 25]),
            Self::Crushed => Rgb([51, 89, 204]),
            Self::Scratch => Rgb([204, 25, 25]),
            Self::Separated => Rgb([25, 140, 25]),
        }
    }

    pub const fn index(self) -> usize {
        match self {
            Self::Breakage => 0,
            Self::Crushed => 1,
            Self::Scratch => 2,
            Self::Separated => 3,
        }
    }

    /// Tag without the underscore, used for exported model names (`Breakage3`).
    pub fn compact_tag(self) -> String {
        self.tag().replace('_', "")
    }
}

impl fmt::Display for DamageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_matches_canonical_order() {
        for (i, category) in DamageCategory::ALL.iter().enumerate() {
            assert_eq!(category.index(), i);
        }
    }

    #[test]
    fn compact_tag_drops_underscore() {
        assert_eq!(DamageCategory::Breakage.compact_tag(), "Breakage3");
        assert_eq!(DamageCategory::Separated.compact_tag(), "Seperated1");
    }
}
