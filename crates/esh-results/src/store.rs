//! Run storage API.
//!
//! One directory per run id holding `manifest.json` and the normalized
//! result as `result.json`.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use esh_transform::Framework;
use serde::{Deserialize, Serialize};

use crate::error::{ResultsError, ResultsResult};
use crate::normalized::NormalizedResult;

pub type RunId = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: RunId,
    pub system_id: String,
    pub framework: Framework,
    pub timestamp: DateTime<Utc>,
    pub solver_version: String,
    pub costs: f64,
    pub emissions: f64,
}

impl RunManifest {
    pub fn for_result(run_id: RunId, result: &NormalizedResult, solver_version: &str) -> Self {
        Self {
            run_id,
            system_id: result.system.clone(),
            framework: result.framework,
            timestamp: Utc::now(),
            solver_version: solver_version.to_string(),
            costs: result.global_results.costs,
            emissions: result.global_results.emissions,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RunStore {
    root_dir: PathBuf,
}

impl RunStore {
    pub fn new(root_dir: PathBuf) -> ResultsResult<Self> {
        if !root_dir.exists() {
            fs::create_dir_all(&root_dir)?;
        }
        Ok(Self { root_dir })
    }

    /// Store next to a model file, under `.esh/runs`.
    pub fn for_model(model_path: &Path) -> ResultsResult<Self> {
        let model_dir = model_path
            .parent()
            .ok_or_else(|| ResultsError::InvalidPath {
                message: "model path has no parent directory".to_string(),
            })?;
        Self::new(model_dir.join(".esh").join("runs"))
    }

    fn run_dir(&self, run_id: &str) -> ResultsResult<PathBuf> {
        if run_id.is_empty() || !run_id.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ResultsError::InvalidHash(run_id.to_string()));
        }
        Ok(self.root_dir.join(run_id))
    }

    pub fn has_run(&self, run_id: &str) -> bool {
        self.run_dir(run_id)
            .map(|dir| dir.join("manifest.json").exists())
            .unwrap_or(false)
    }

    pub fn save_run(&self, manifest: &RunManifest, result: &NormalizedResult) -> ResultsResult<()> {
        let run_dir = self.run_dir(&manifest.run_id)?;
        fs::create_dir_all(&run_dir)?;

        let manifest_json = serde_json::to_string_pretty(manifest)?;
        fs::write(run_dir.join("manifest.json"), manifest_json)?;

        let result_json = serde_json::to_string_pretty(result)?;
        fs::write(run_dir.join("result.json"), result_json)?;

        Ok(())
    }

    pub fn load_manifest(&self, run_id: &str) -> ResultsResult<RunManifest> {
        let manifest_path = self.run_dir(run_id)?.join("manifest.json");

        if !manifest_path.exists() {
            return Err(ResultsError::RunNotFound {
                run_id: run_id.to_string(),
            });
        }

        let content = fs::read_to_string(manifest_path)?;
        let manifest = serde_json::from_str(&content)?;
        Ok(manifest)
    }

    pub fn load_result(&self, run_id: &str) -> ResultsResult<NormalizedResult> {
        let result_path = self.run_dir(run_id)?.join("result.json");

        if !result_path.exists() {
            return Err(ResultsError::RunNotFound {
                run_id: run_id.to_string(),
            });
        }

        let content = fs::read_to_string(result_path)?;
        let result = serde_json::from_str(&content)?;
        Ok(result)
    }

    /// Manifests of every run of `system_id`, oldest first.
    pub fn list_runs(&self, system_id: &str) -> ResultsResult<Vec<RunManifest>> {
        let mut runs = Vec::new();

        if !self.root_dir.exists() {
            return Ok(runs);
        }

        for entry in fs::read_dir(&self.root_dir)? {
            let entry = entry?;
            if entry.path().is_dir() {
                let run_id = entry.file_name().to_string_lossy().to_string();
                if let Ok(manifest) = self.load_manifest(&run_id)
                    && manifest.system_id == system_id
                {
                    runs.push(manifest);
                }
            }
        }

        runs.sort_by_key(|m| m.timestamp);
        Ok(runs)
    }

    pub fn delete_run(&self, run_id: &str) -> ResultsResult<()> {
        let run_dir = self.run_dir(run_id)?;
        if run_dir.exists() {
            fs::remove_dir_all(run_dir)?;
        }
        Ok(())
    }
}
