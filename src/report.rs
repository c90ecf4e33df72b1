//! Run Reports
//!
//! One plain-text file per observation kind, one entry per line, plus a JSON
//! summary of the run. Every kind gets a file, empty when nothing was observed,
//! so consecutive runs can be compared file by file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::diagnostics::{Diagnostics, ObservationKind};
use crate::error::Result;

/// Counts describing one migration run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub generated_at: String,
    pub dry_run: bool,
    pub extended_types_read: usize,
    pub tables_read: usize,
    pub extended_types_rewritten: usize,
    pub tables_rewritten: usize,
    pub foreign_keys_created: usize,
    /// Observation count per kind
    pub observations: BTreeMap<String, usize>,
}

impl RunSummary {
    pub fn new(dry_run: bool) -> Self {
        Self {
            generated_at: chrono::Utc::now().to_rfc3339(),
            dry_run,
            ..Self::default()
        }
    }

    pub fn count_observations(&mut self, diagnostics: &Diagnostics) {
        self.observations = diagnostics
            .counts()
            .into_iter()
            .map(|(kind, count)| (format!("{:?}", kind), count))
            .collect();
    }
}

/// Write every report file into `dir`, returning the paths written
pub fn write_reports(dir: &Path, diagnostics: &Diagnostics, summary: &RunSummary) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::with_capacity(ObservationKind::ALL.len() + 1);

    for kind in ObservationKind::ALL {
        let mut content = String::new();
        for item in diagnostics.of_kind(kind) {
            content.push_str(&item.report_line());
            content.push('\n');
        }
        let path = dir.join(kind.report_file());
        fs::write(&path, content)?;
        written.push(path);
    }

    let path = dir.join("summary.json");
    fs::write(&path, serde_json::to_string_pretty(summary)?)?;
    written.push(path);

    tracing::info!("reports written to {}", dir.display());
    Ok(written)
}
