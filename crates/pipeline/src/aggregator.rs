//! Result Aggregator
//!
//! Merges per-tool line-oriented artifacts into one deduplicated candidate
//! list. Output order is the order artifacts are supplied, then the order
//! lines appear in each artifact; completion order never matters.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use recon_core::CoreResult;

/// Line normalisation applied before deduplication.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Normalization {
    /// Exact trimmed text, case-sensitive
    #[default]
    Exact,
    /// Trimmed and lower-cased (hostnames)
    Lowercase,
}

impl Normalization {
    fn apply(self, line: &str) -> String {
        match self {
            Normalization::Exact => line.to_string(),
            Normalization::Lowercase => line.to_lowercase(),
        }
    }
}

/// Merges tool artifacts for one phase.
#[derive(Debug, Clone, Default)]
pub struct ResultAggregator {
    normalization: Normalization,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set normalization
    pub fn with_normalization(mut self, normalization: Normalization) -> Self {
        self.normalization = normalization;
        self
    }

    /// Merge artifacts: trim, drop empty lines, keep the first occurrence of
    /// each line. Unreadable artifacts are skipped with a warning.
    pub fn merge(&self, phase: &str, artifacts: &[PathBuf]) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut merged = Vec::new();

        for path in artifacts {
            let content = match std::fs::read(path) {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(e) => {
                    tracing::warn!(
                        phase,
                        path = %path.display(),
                        error = %e,
                        "skipping unreadable artifact"
                    );
                    continue;
                }
            };

            for line in content.lines() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let line = self.normalization.apply(line);
                if seen.insert(line.clone()) {
                    merged.push(line);
                }
            }
        }

        tracing::debug!(phase, artifacts = artifacts.len(), lines = merged.len(), "merged artifacts");
        merged
    }

    /// Merge and write the result, one candidate per line.
    pub fn merge_to_file(
        &self,
        phase: &str,
        artifacts: &[PathBuf],
        destination: &Path,
    ) -> CoreResult<usize> {
        let merged = self.merge(phase, artifacts);
        write_lines(destination, &merged)?;
        Ok(merged.len())
    }
}

/// Write lines to a file, creating parent directories.
pub fn write_lines(path: &Path, lines: &[String]) -> CoreResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
    for line in lines {
        writeln!(file, "{}", line)?;
    }
    file.flush()?;
    Ok(())
}
