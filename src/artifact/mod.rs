//! Model artifact loading
//!
//! The artifact is read and resolved at most once per [`ArtifactHandle`].
//! Concurrent first callers share a single load; a failed load is not
//! remembered, so a later call retries after the file is fixed.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::OnceCell;
use tokio::task;
use tracing::{info, instrument};

use crate::{RailcastError, Result};

pub mod resolver;
pub mod scanner;
pub mod schema;

pub use resolver::resolve;
pub use schema::{BundleShape, CanonicalBundle, Composition, Located, ResolvedBundle};

/// Read an artifact file as JSON.
pub fn load_artifact(path: &Path) -> Result<Value> {
    if !path.exists() {
        return Err(RailcastError::artifact_not_found(path.display().to_string()));
    }
    let text = fs::read_to_string(path).map_err(|e| {
        RailcastError::artifact_load(format!("cannot read {}: {e}", path.display()))
    })?;
    serde_json::from_str(&text).map_err(|e| {
        RailcastError::artifact_load(format!("{} is not a valid artifact: {e}", path.display()))
    })
}

/// Read and resolve an artifact file.
#[instrument(level = "info", skip(path), fields(path = %path.display()))]
pub fn load_bundle(path: &Path) -> Result<ResolvedBundle> {
    let value = load_artifact(path)?;
    let bundle = resolve(&value)?;
    info!(
        shape = ?bundle.shape,
        forest = %bundle.forest.component.signature(),
        boosted = %bundle.boosted.component.signature(),
        preprocessor = bundle.preprocessor.is_some(),
        weight = bundle.weight,
        "Loaded model artifact"
    );
    Ok(bundle)
}

/// Write `bundle` to `path` in the canonical layout.
pub fn write_canonical(bundle: &ResolvedBundle, path: &Path) -> Result<()> {
    let text = serde_json::to_string_pretty(&bundle.to_canonical())
        .map_err(|e| RailcastError::artifact_load(format!("cannot encode bundle: {e}")))?;
    fs::write(path, text)?;
    info!(path = %path.display(), "Wrote canonical artifact");
    Ok(())
}

/// Lazily loaded, shared model artifact
#[derive(Debug)]
pub struct ArtifactHandle {
    path: PathBuf,
    cell: OnceCell<Arc<ResolvedBundle>>,
}

impl ArtifactHandle {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            cell: OnceCell::new(),
        }
    }

    /// A handle around an already resolved bundle.
    #[must_use]
    pub fn preloaded(bundle: ResolvedBundle) -> Self {
        Self {
            path: PathBuf::from("<preloaded>"),
            cell: OnceCell::new_with(Some(Arc::new(bundle))),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }

    /// The resolved bundle, loading it on first use.
    pub async fn get(&self) -> Result<Arc<ResolvedBundle>> {
        self.cell
            .get_or_try_init(|| async {
                let path = self.path.clone();
                let bundle = task::spawn_blocking(move || load_bundle(&path))
                    .await
                    .map_err(|e| {
                        RailcastError::artifact_load(format!("artifact loader stopped: {e}"))
                    })??;
                Ok::<_, RailcastError>(Arc::new(bundle))
            })
            .await
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn bundle_json() -> Value {
        let leaf = |class: &str, module: &str, value: f64| {
            json!({
                "__class__": class,
                "__module__": module,
                "__dict__": {"trees": [{"nodes": [{"value": value}]}]}
            })
        };
        json!({
            "rf_pipe": leaf("RandomForestRegressor", "sklearn.ensemble._forest", 100.0),
            "cat_pipe": leaf("CatBoostRegressor", "catboost.core", 50.0)
        })
    }

    fn write_temp(text: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let err = load_artifact(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, RailcastError::ArtifactNotFound { .. }));
    }

    #[test]
    fn test_invalid_json_is_load_error() {
        let file = write_temp("{not json");
        let err = load_artifact(file.path()).unwrap_err();
        assert!(matches!(err, RailcastError::ArtifactLoad { .. }));
    }

    #[tokio::test]
    async fn test_handle_loads_once() {
        let file = write_temp(&bundle_json().to_string());
        let handle = ArtifactHandle::new(file.path());
        assert!(!handle.is_loaded());

        let first = handle.get().await.unwrap();
        let second = handle.get().await.unwrap();
        assert!(handle.is_loaded());
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.weight, 0.7);
    }

    #[tokio::test]
    async fn test_failed_load_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundle.json");
        let handle = ArtifactHandle::new(&path);

        let err = handle.get().await.unwrap_err();
        assert!(matches!(err, RailcastError::ArtifactNotFound { .. }));
        assert!(!handle.is_loaded());

        fs::write(&path, bundle_json().to_string()).unwrap();
        assert!(handle.get().await.is_ok());
    }

    #[test]
    fn test_write_canonical() {
        let bundle = resolve(&bundle_json()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("canonical.json");
        write_canonical(&bundle, &out).unwrap();

        let reloaded = load_bundle(&out).unwrap();
        assert_eq!(reloaded.shape, BundleShape::Canonical);
        assert_eq!(reloaded.weight, bundle.weight);
    }
}
