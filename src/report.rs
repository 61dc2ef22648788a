use std::{
    fmt,
    fs,
    path::{Path, PathBuf},
};

use serde::Serialize;

use crate::{
    analyzer::Analysis,
    errors::{CarDamageError, Result},
    estimate::{EstimateLine, Severity},
};

/// Serializable summary of one analysed photo.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub input: PathBuf,
    pub lines: Vec<EstimateLine>,
    pub total_cost: u64,
    pub part_area: u64,
    pub severity: Severity,
}

impl Report {
    pub fn new(input: &Path, analysis: &Analysis) -> Self {
        Self {
            input: input.to_path_buf(),
            lines: analysis.estimate.lines.clone(),
            total_cost: analysis.estimate.total,
            part_area: analysis.part_area,
            severity: analysis.severity,
        }
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|e| CarDamageError::FileSystem {
            path: path.to_path_buf(),
            operation: "write report".to_string(),
            source: e,
        })
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.input.display())?;
        for line in &self.lines {
            writeln!(
                f,
                "  {:<12} area: {:>7}  cost: {:>9}",
                line.category.tag(),
                line.area,
                line.cost
            )?;
        }
        writeln!(f, "  total repair cost: {}", self.total_cost)?;
        write!(
            f,
            "  severity: {:.2} -> grade {}",
            self.severity.score,
            self.severity.grade.value()
        )
    }
}
