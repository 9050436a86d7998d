//! Model downloading and caching via hf-hub.

use crate::config::ModelConfig;
use crate::error::{Result, SpeechError};
use hf_hub::api::sync::{Api, ApiBuilder};
use std::path::PathBuf;
use tracing::info;

/// Manages downloading and caching of ML models.
pub struct ModelManager {
    api: Api,
}

impl ModelManager {
    /// Create a new model manager rooted at the configured cache directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directory cannot be created or the
    /// HuggingFace client cannot be built.
    pub fn new(config: &ModelConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.cache_dir)?;
        info!("model cache directory: {}", config.cache_dir.display());

        let api = ApiBuilder::new()
            .with_cache_dir(config.cache_dir.clone())
            .with_progress(false)
            .build()
            .map_err(|e| SpeechError::Model(format!("failed to create HF API: {e}")))?;

        Ok(Self { api })
    }

    /// Get the path to a cached model file, downloading if necessary.
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot be downloaded.
    pub fn get_model_path(&self, repo_id: &str, filename: &str) -> Result<PathBuf> {
        info!("ensuring {repo_id}/{filename}");
        self.api
            .model(repo_id.to_owned())
            .get(filename)
            .map_err(|e| {
                SpeechError::Model(format!("failed to download {filename} from {repo_id}: {e}"))
            })
    }

    /// Download `filenames` from `repo_id` and return the snapshot directory
    /// that holds them.
    ///
    /// Models that load from a directory (like Parakeet TDT) need every file
    /// to sit side by side; hf-hub keeps them in one snapshot folder.
    ///
    /// # Errors
    ///
    /// Returns an error if any download fails or `filenames` is empty.
    pub fn get_repo_dir(&self, repo_id: &str, filenames: &[&str]) -> Result<PathBuf> {
        let mut snapshot: Option<PathBuf> = None;
        for filename in filenames {
            let path = self.get_model_path(repo_id, filename)?;
            if snapshot.is_none() {
                snapshot = path.parent().map(std::path::Path::to_path_buf);
            }
        }
        snapshot.ok_or_else(|| {
            SpeechError::Model(format!("could not determine repo directory for {repo_id}"))
        })
    }
}
