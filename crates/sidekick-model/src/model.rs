//! Model download and management.

use futures_util::StreamExt;
use reqwest::header::USER_AGENT;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::ModelError;
use crate::paths::models_dir;
use crate::progress::{download_percent, report, ProgressFn};
use crate::validate::{is_valid_model_file, validate_model_file};
use crate::{DEFAULT_MODEL_FILENAME, DEFAULT_MODEL_NAME, DEFAULT_MODEL_URL};

/// Extensions recognised as model files in the models directory.
const MODEL_EXTENSIONS: [&str; 3] = ["gguf", "task", "bin"];

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default idle timeout for a download: abort when no bytes arrive for this long.
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Model registry entry.
#[derive(Debug, Clone)]
pub struct ModelInfo {
    /// Display name of the model.
    pub name: String,
    /// Filename on disk.
    pub filename: String,
    /// Download URL.
    pub url: String,
    /// Expected SHA256 checksum (optional).
    pub sha256: Option<String>,
    /// Size in bytes, used when the server omits Content-Length.
    pub size_bytes: Option<u64>,
}

/// Manager for downloading and managing models.
pub struct ModelManager {
    client: reqwest::Client,
    models_dir: PathBuf,
    hf_token: Option<String>,
    download_timeout: Duration,
}

impl ModelManager {
    /// Create a new model manager rooted at the default models directory.
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });

        Self {
            client,
            models_dir: models_dir(),
            hf_token: None,
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
        }
    }

    /// Use a custom models directory.
    pub fn with_models_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.models_dir = dir.into();
        self
    }

    /// Send `Authorization: Bearer <token>` with downloads. Empty tokens are ignored.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.hf_token = token.filter(|t| !t.trim().is_empty());
        self
    }

    /// Set the idle timeout between body chunks.
    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    /// Get the directory models are stored in.
    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Get the default model info.
    pub fn default_model() -> ModelInfo {
        ModelInfo {
            name: DEFAULT_MODEL_NAME.to_string(),
            filename: DEFAULT_MODEL_FILENAME.to_string(),
            url: DEFAULT_MODEL_URL.to_string(),
            sha256: None,
            size_bytes: None,
        }
    }

    /// List all installed models by file stem, sorted.
    pub fn list_installed(&self) -> Result<Vec<String>, ModelError> {
        if !self.models_dir.exists() {
            return Ok(vec![]);
        }

        let mut models: Vec<String> = fs::read_dir(&self.models_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| MODEL_EXTENSIONS.contains(&ext))
                    .unwrap_or(false)
            })
            .filter_map(|path| {
                path.file_stem()
                    .and_then(|s| s.to_str())
                    .map(|s| s.to_string())
            })
            .collect();

        models.sort();
        Ok(models)
    }

    /// Check if a model is installed.
    pub fn is_installed(&self, filename: &str) -> bool {
        self.model_path(filename).exists()
    }

    /// Resolve a filename or a `list_installed` stem to an installed filename.
    pub fn resolve_installed(&self, name: &str) -> Option<String> {
        std::iter::once(name.to_string())
            .chain(MODEL_EXTENSIONS.iter().map(|ext| format!("{}.{}", name, ext)))
            .find(|filename| self.model_path(filename).is_file())
    }

    /// Get the path to an installed model.
    pub fn get_model_path(&self, filename: &str) -> Option<PathBuf> {
        let path = self.model_path(filename);
        if path.exists() {
            Some(path)
        } else {
            None
        }
    }

    /// Return a usable local copy of `model`, downloading it when the cache
    /// is missing or fails validation.
    pub async fn ensure_available(
        &self,
        model: &ModelInfo,
        progress: Option<&ProgressFn>,
    ) -> Result<PathBuf, ModelError> {
        let path = self.model_path(&model.filename);

        let cached_len = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        if cached_len > 0 {
            if is_valid_model_file(&path) {
                info!("Using cached model ({} MB)", cached_len / 1024 / 1024);
                report(progress, 60, "Found valid cached model");
                return Ok(path);
            }

            warn!("Cached model is corrupted, re-downloading...");
            fs::remove_file(&path)?;
        }

        self.download(model, progress).await
    }

    /// Download a model from its URL into the models directory.
    ///
    /// The body lands in `<filename>.part` first and only replaces the
    /// target once it has been fully written, checksummed and validated.
    pub async fn download(
        &self,
        model: &ModelInfo,
        progress: Option<&ProgressFn>,
    ) -> Result<PathBuf, ModelError> {
        fs::create_dir_all(&self.models_dir)?;

        let dest_path = self.model_path(&model.filename);
        let part_path = partial_path(&dest_path);

        info!("Downloading model '{}' to {:?}", model.name, dest_path);

        if let Err(e) = self.fetch(model, &part_path, progress).await {
            warn!("Download error: {}", e);
            // Clean up partial download
            let _ = fs::remove_file(&part_path);
            report(progress, 0, "Download failed");
            return Err(e);
        }

        if !is_valid_model_file(&part_path) {
            warn!("Downloaded model is corrupted!");
            let _ = fs::remove_file(&part_path);
            report(progress, 0, "Download failed");
            return Err(ModelError::CorruptModel(model.filename.clone()));
        }

        fs::rename(&part_path, &dest_path)?;

        info!("Model '{}' downloaded successfully", model.name);
        report(progress, 60, "Download complete, preparing model...");
        Ok(dest_path)
    }

    async fn fetch(
        &self,
        model: &ModelInfo,
        part_path: &Path,
        progress: Option<&ProgressFn>,
    ) -> Result<(), ModelError> {
        report(progress, 5, "Connecting to model host...");

        let mut request = self
            .client
            .get(&model.url)
            .header(USER_AGENT, crate::USER_AGENT);
        if let Some(token) = &self.hf_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ModelError::DownloadFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ModelError::DownloadFailed(format!(
                "HTTP {}: {}",
                response.status(),
                model.url
            )));
        }

        let total_size = response.content_length().or(model.size_bytes);
        debug!("Downloading model, size: {:?} bytes", total_size);
        report(progress, 10, "Starting download...");

        let mut file = File::create(part_path)?;
        let mut hasher = Sha256::new();
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;
        let mut last_reported_mb = None;

        loop {
            let next = tokio::time::timeout(self.download_timeout, stream.next())
                .await
                .map_err(|_| ModelError::DownloadStalled(self.download_timeout))?;
            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(|e| ModelError::DownloadFailed(e.to_string()))?;

            file.write_all(&chunk)?;
            hasher.update(&chunk);
            downloaded += chunk.len() as u64;

            let mb = downloaded / 1024 / 1024;
            if last_reported_mb != Some(mb) {
                last_reported_mb = Some(mb);
                let status = match total_size {
                    Some(total) if total > 0 => {
                        format!("Downloaded {}MB / {}MB", mb, total / 1024 / 1024)
                    }
                    _ => format!("Downloaded {}MB...", mb),
                };
                report(
                    progress,
                    download_percent(downloaded, total_size) as u32,
                    status,
                );
            }
        }

        file.flush()?;
        drop(file);

        if downloaded == 0 {
            return Err(ModelError::DownloadFailed("Empty response body".to_string()));
        }

        // Verify checksum if provided
        if let Some(expected) = &model.sha256 {
            let actual = hex::encode(hasher.finalize());
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(ModelError::ChecksumMismatch {
                    expected: expected.clone(),
                    actual,
                });
            }
            debug!("Checksum verified: {}", actual);
        }

        Ok(())
    }

    /// Install a model from a local file path.
    pub fn install_from_path(&self, source: &Path) -> Result<PathBuf, ModelError> {
        fs::create_dir_all(&self.models_dir)?;

        let filename = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ModelError::ModelNotFound(source.display().to_string()))?;

        if !source.exists() {
            return Err(ModelError::ModelNotFound(source.display().to_string()));
        }

        let dest_path = self.model_path(filename);

        if source == dest_path {
            // Already in the right place
            return Ok(dest_path);
        }

        info!("Installing model from {:?} to {:?}", source, dest_path);
        fs::copy(source, &dest_path)?;

        if !validate_model_file(&dest_path)?.valid {
            let _ = fs::remove_file(&dest_path);
            return Err(ModelError::CorruptModel(filename.to_string()));
        }

        Ok(dest_path)
    }

    /// Remove an installed model.
    pub fn remove(&self, filename: &str) -> Result<(), ModelError> {
        let path = self.model_path(filename);
        if path.exists() {
            fs::remove_file(&path)?;
            info!("Removed model: {}", filename);
        }
        Ok(())
    }

    fn model_path(&self, filename: &str) -> PathBuf {
        self.models_dir.join(filename)
    }
}

impl Default for ModelManager {
    fn default() -> Self {
        Self::new()
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}
