use serde::Serialize;

use crate::damage::DamageCategory;

/// Damaged-pixel count per category, indexed by [`DamageCategory::index`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DamageAreas([u64; 4]);

impl DamageAreas {
    pub const fn new(breakage: u64, crushed: u64, scratch: u64, separated: u64) -> Self {
        Self([breakage, crushed, scratch, separated])
    }

    pub const fn get(&self, category: DamageCategory) -> u64 {
        self.0[category.index()]
    }

    pub fn set(&mut self, category: DamageCategory, area: u64) {
        self.0[category.index()] = area;
    }

    pub fn iter(&self) -> impl Iterator<Item = (DamageCategory, u64)> + '_ {
        DamageCategory::ALL.iter().map(|&c| (c, self.get(c)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EstimateLine {
    pub category: DamageCategory,
    pub area: u64,
    pub cost: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepairEstimate {
    pub lines: Vec<EstimateLine>,
    pub total: u64,
}

impl RepairEstimate {
    /// Price every category's area with its unit price and sum the lines.
    pub fn from_areas(areas: &DamageAreas) -> Self {
        let lines: Vec<_> = areas
            .iter()
            .map(|(category, area)| EstimateLine {
                category,
                area,
                cost: area.saturating_mul(category.unit_price()),
            })
            .collect();
        let total = lines.iter().map(|l| l.cost).fold(0u64, u64::saturating_add);
        Self { lines, total }
    }
}

/// Ordinal grade, 1 is the most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(into = "u8")]
pub struct Grade(u8);

impl Grade {
    pub const fn value(self) -> u8 {
        self.0
    }

    pub fn from_score(score: f64) -> Self {
        if score < 11.0 {
            Self(4)
        } else if score < 41.0 {
            Self(3)
        } else if score < 81.0 {
            Self(2)
        } else {
            Self(1)
        }
    }
}

impl From<Grade> for u8 {
    fn from(grade: Grade) -> Self {
        grade.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Severity {
    pub score: f64,
    pub grade: Grade,
}

impl Severity {
    /// Weighted damaged area as a percentage of three times the part area.
    ///
    /// A zero part area means nothing was segmented as vehicle; the score is 0.
    pub fn assess(areas: &DamageAreas, total_part_area: u64) -> Self {
        let score = if total_part_area == 0 {
            0.0
        } else {
            let weighted: f64 = areas
                .iter()
                .map(|(category, area)| area as f64 * category.severity_weight())
                .sum();
            weighted * 100.0 / (3.0 * total_part_area as f64)
        };
        Self {
            score,
            grade: Grade::from_score(score),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_example_lands_in_grade_three() {
        let areas = DamageAreas::new(100, 50, 0, 0);
        let severity = Severity::assess(&areas, 1000);
        assert!((severity.score - 13.333_333).abs() < 1e-4);
        assert_eq!(severity.grade.value(), 3);
    }

    #[test]
    fn zero_part_area_is_grade_four() {
        let areas = DamageAreas::new(500, 500, 500, 500);
        let severity = Severity::assess(&areas, 0);
        assert_eq!(severity.score, 0.0);
        assert_eq!(severity.grade.value(), 4);
    }

    #[test]
    fn separated_and_scratch_weights() {
        // 1.2 * 250 + 1.0 * 30 = 330 -> 330 * 100 / 300 = 110
        let areas = DamageAreas::new(0, 0, 30, 250);
        let severity = Severity::assess(&areas, 100);
        assert!((severity.score - 110.0).abs() < 1e-9);
        assert_eq!(severity.grade.value(), 1);
    }

    #[test]
    fn grade_thresholds_are_exclusive_upper_bounds() {
        let cases = [
            (0.0, 4),
            (10.99, 4),
            (11.0, 3),
            (40.99, 3),
            (41.0, 2),
            (80.99, 2),
            (81.0, 1),
            (250.0, 1),
        ];
        for (score, expected) in cases {
            assert_eq!(Grade::from_score(score).value(), expected, "score {score}");
        }
    }

    #[test]
    fn estimate_prices_each_category() {
        let areas = DamageAreas::new(10, 20, 30, 40);
        let estimate = RepairEstimate::from_areas(&areas);

        let costs: Vec<_> = estimate.lines.iter().map(|l| l.cost).collect();
        assert_eq!(costs, vec![1200, 1800, 1800, 3600]);
        assert_eq!(estimate.total, 8400);
    }

    #[test]
    fn empty_areas_cost_nothing() {
        let estimate = RepairEstimate::from_areas(&DamageAreas::default());
        assert_eq!(estimate.total, 0);
        assert_eq!(estimate.lines.len(), 4);
    }
}
