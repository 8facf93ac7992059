//! End-of-run summary

use comfy_table::{presets::UTF8_FULL, Table};
use std::fmt;

/// Outcome counts and failures of one batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Objects created on the member node
    pub uploads_succeeded: usize,
    pub uploads_failed: usize,
    /// Datasets that reached a complete package
    pub packages_succeeded: Vec<String>,
    /// Datasets that failed, with the reason
    pub packages_failed: Vec<(String, String)>,
    /// Datasets not attempted because the run was cancelled
    pub not_attempted: usize,
    pub cancelled: bool,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn succeeded(&mut self, dataset: impl Into<String>) {
        self.packages_succeeded.push(dataset.into());
    }

    pub fn failed(&mut self, dataset: impl Into<String>, reason: impl Into<String>) {
        self.packages_failed.push((dataset.into(), reason.into()));
    }

    pub fn has_failures(&self) -> bool {
        !self.packages_failed.is_empty() || self.uploads_failed > 0
    }

    /// Table of failed datasets, empty when nothing failed
    pub fn failure_table(&self) -> Option<Table> {
        if self.packages_failed.is_empty() {
            return None;
        }
        let mut table = Table::new();
        table.load_preset(UTF8_FULL).set_header(vec!["Dataset", "Reason"]);
        for (dataset, reason) in &self.packages_failed {
            table.add_row(vec![dataset.as_str(), reason.as_str()]);
        }
        Some(table)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Package creation report:")?;
        writeln!(f, "  Failed uploads:      {}", self.uploads_failed)?;
        writeln!(f, "  Successful uploads:  {}", self.uploads_succeeded)?;
        writeln!(f, "  Failed packages:     {}", self.packages_failed.len())?;
        write!(f, "  Successful packages: {}", self.packages_succeeded.len())?;
        if self.cancelled {
            write!(f, "\n  Cancelled with {} dataset(s) not attempted", self.not_attempted)?;
        }
        Ok(())
    }
}
