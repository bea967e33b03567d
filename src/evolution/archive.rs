//! Solution archive for exporting repair results as JSON.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::schema::{AttemptRecord, RepairResult, StopReason, VariantId};

/// Writes per-trial solutions and attempt logs under one directory.
#[derive(Debug)]
pub struct SolutionArchive {
    output_dir: PathBuf,
    /// Files written so far.
    saved: Vec<PathBuf>,
}

impl SolutionArchive {
    /// Set output directory, creating it if needed.
    pub fn with_output_dir<P: AsRef<Path>>(dir: P) -> io::Result<Self> {
        let path = dir.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;
        Ok(Self {
            output_dir: path,
            saved: Vec::new(),
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Save the solutions of one trial.
    pub fn save_solutions(&mut self, trial: usize, result: &RepairResult) -> io::Result<PathBuf> {
        let export = SolutionExport {
            metadata: TrialMetadata {
                trial,
                generations: result.stats.generations,
                attempts: result.stats.attempts,
                solved_lineages: result.stats.solved_lineages,
                total_lineages: result.stats.total_lineages,
                repair_rate: result.stats.repair_rate,
                stop_reason: result.stats.stop_reason.clone(),
            },
            solutions: result.solutions.clone(),
        };
        let path = self.output_dir.join(format!("solutions_trial{trial}.json"));
        let json = serde_json::to_string_pretty(&export)?;
        fs::write(&path, json)?;
        self.saved.push(path.clone());
        Ok(path)
    }

    /// Save the attempt log of one trial.
    pub fn save_attempts(&mut self, trial: usize, attempts: &[AttemptRecord]) -> io::Result<PathBuf> {
        let path = self.output_dir.join(format!("attempts_trial{trial}.json"));
        let json = serde_json::to_string_pretty(attempts)?;
        fs::write(&path, json)?;
        self.saved.push(path.clone());
        Ok(path)
    }

    /// Save both the solutions and the attempt log of one trial.
    pub fn save_result(&mut self, trial: usize, result: &RepairResult) -> io::Result<Vec<PathBuf>> {
        Ok(vec![
            self.save_solutions(trial, result)?,
            self.save_attempts(trial, &result.attempts)?,
        ])
    }

    pub fn saved(&self) -> &[PathBuf] {
        &self.saved
    }

    /// Load every solution export in a directory, ordered by trial.
    pub fn load_from_dir<P: AsRef<Path>>(dir: P) -> io::Result<Vec<SolutionExport>> {
        let mut exports = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let is_solutions = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("solutions_") && n.ends_with(".json"));
            if is_solutions {
                match load_json(&path) {
                    Ok(export) => exports.push(export),
                    Err(e) => log::warn!("Ignoring {}: {e}", path.display()),
                }
            }
        }
        exports.sort_by_key(|e: &SolutionExport| e.metadata.trial);
        Ok(exports)
    }

    /// Load an attempt log written by [`SolutionArchive::save_attempts`].
    pub fn load_attempts<P: AsRef<Path>>(path: P) -> io::Result<Vec<AttemptRecord>> {
        load_json(path)
    }
}

/// Exported solutions of one trial.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SolutionExport {
    pub metadata: TrialMetadata,
    /// Per lineage: solution variant id -> patch text.
    pub solutions: BTreeMap<String, BTreeMap<VariantId, String>>,
}

/// Summary statistics for an exported trial.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TrialMetadata {
    pub trial: usize,
    pub generations: usize,
    pub attempts: usize,
    pub solved_lineages: usize,
    pub total_lineages: usize,
    pub repair_rate: f64,
    pub stop_reason: StopReason,
}

fn load_json<T: serde::de::DeserializeOwned, P: AsRef<Path>>(path: P) -> io::Result<T> {
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::RepairStats;

    fn test_result(solved: usize) -> RepairResult {
        let solutions = (0..solved)
            .map(|i| {
                let origin = format!("w{i}");
                let patch = BTreeMap::from([(VariantId::new(origin.as_str(), 2), "print(5)\n".to_string())]);
                (origin, patch)
            })
            .collect();
        RepairResult {
            solutions,
            attempts: Vec::new(),
            population: BTreeMap::new(),
            stats: RepairStats {
                generations: 3,
                attempts: 0,
                solved_lineages: solved,
                total_lineages: 2,
                repair_rate: solved as f64 / 2.0,
                elapsed_seconds: 0.1,
                stop_reason: StopReason::MaxGenerations,
            },
        }
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut archive = SolutionArchive::with_output_dir(dir.path().join("out")).unwrap();

        archive.save_result(1, &test_result(2)).unwrap();
        archive.save_result(0, &test_result(1)).unwrap();
        assert_eq!(archive.saved().len(), 4);

        let exports = SolutionArchive::load_from_dir(archive.output_dir()).unwrap();
        assert_eq!(exports.len(), 2);
        assert_eq!(exports[0].metadata.trial, 0);
        assert_eq!(exports[1].solutions.len(), 2);
        assert_eq!(
            exports[1].solutions["w1"][&VariantId::new("w1", 2)],
            "print(5)\n"
        );
    }

    #[test]
    fn test_attempts_roundtrip_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut archive = SolutionArchive::with_output_dir(dir.path()).unwrap();
        let path = archive.save_attempts(0, &[]).unwrap();
        assert!(SolutionArchive::load_attempts(&path).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_export_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("solutions_trial9.json"), "{not json").unwrap();
        fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        assert!(SolutionArchive::load_from_dir(dir.path()).unwrap().is_empty());
    }
}
