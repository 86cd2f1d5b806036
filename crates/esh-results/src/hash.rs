//! Content-based hashing for run IDs.

use serde::Serialize;
use sha2::{Digest, Sha256};

use esh_transform::Framework;

use crate::error::ResultsResult;

/// Run id of solving `native` with `framework` at `solver_version`.
pub fn compute_run_id<N: Serialize>(
    native: &N,
    framework: Framework,
    solver_version: &str,
) -> ResultsResult<String> {
    let mut hasher = Sha256::new();

    let native_json = serde_json::to_string(native)?;
    hasher.update(native_json.as_bytes());
    hasher.update(framework.as_str().as_bytes());
    hasher.update(solver_version.as_bytes());

    let result = hasher.finalize();
    Ok(format!("{:x}", result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use esh_core::HarmonyConfig;
    use esh_model::fixtures;
    use esh_transform::{Adapter, AdapterOptions, FineAdapter, OemofAdapter};

    #[test]
    fn hash_stability() {
        let system = fixtures::minimal_example().unwrap();
        let t = OemofAdapter
            .transform(&system, &AdapterOptions::default(), &HarmonyConfig::default())
            .unwrap();

        let hash1 = compute_run_id(&t.native, Framework::Oemof, "v1").unwrap();
        let hash2 = compute_run_id(&t.native, Framework::Oemof, "v1").unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn hash_differs_for_different_inputs() {
        let config = HarmonyConfig::default();
        let opts = AdapterOptions::default();
        let minimal = fixtures::minimal_example().unwrap();
        let chp = fixtures::chp_example().unwrap();
        let a = FineAdapter.transform(&minimal, &opts, &config).unwrap();
        let b = FineAdapter.transform(&chp, &opts, &config).unwrap();

        let hash1 = compute_run_id(&a.native, Framework::Fine, "v1").unwrap();
        let hash2 = compute_run_id(&b.native, Framework::Fine, "v1").unwrap();
        let hash3 = compute_run_id(&a.native, Framework::Fine, "v2").unwrap();

        assert_ne!(hash1, hash2);
        assert_ne!(hash1, hash3);
    }
}
