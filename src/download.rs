//! Model asset acquisition and on-disk caching
//!
//! Downloads the segmentation model and its preprocessor configuration from a
//! `HuggingFace` repository into an XDG cache directory. Downloads land in a
//! temporary directory and are renamed into place only once every file is
//! complete, so a crashed download never leaves a half-populated cache entry
//! behind.

use crate::error::{CutoutError, Result};
use futures_util::stream::TryStreamExt;
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;

/// Repository file holding the model weights
const MODEL_FILE: &str = "onnx/model.onnx";

/// Repository file holding preprocessing parameters
const PREPROCESSOR_FILE: &str = "preprocessor_config.json";

/// Paths of a fully cached model
#[derive(Debug, Clone)]
pub struct ModelAssets {
    /// ONNX graph file
    pub model_path: PathBuf,
    /// `preprocessor_config.json` next to it
    pub preprocessor_path: PathBuf,
}

/// Downloads and caches model assets
#[derive(Debug)]
pub struct ModelDownloader {
    client: Client,
    cache_dir: PathBuf,
}

impl ModelDownloader {
    /// Create a downloader using the platform cache directory
    /// (`~/.cache/cutout/models` on Linux)
    ///
    /// # Errors
    /// - No cache directory can be determined
    /// - The HTTP client cannot be constructed
    pub fn new() -> Result<Self> {
        let base = dirs::cache_dir().ok_or_else(|| {
            CutoutError::inference("could not determine a cache directory for model assets")
        })?;
        Self::with_cache_dir(base.join("cutout").join("models"))
    }

    /// Create a downloader with an explicit cache directory
    ///
    /// # Errors
    /// - The directory cannot be created
    /// - The HTTP client cannot be constructed
    pub fn with_cache_dir(cache_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&cache_dir)
            .map_err(|e| CutoutError::file_io_error("create model cache directory", &cache_dir, &e))?;

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| CutoutError::inference(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client, cache_dir })
    }

    /// Filesystem-safe identifier for a model repository URL
    #[must_use]
    pub fn url_to_model_id(url: &str) -> String {
        let prefix = "https://huggingface.co/";
        if let Some(repo) = url.strip_prefix(prefix) {
            repo.replace('/', "--")
        } else {
            let mut hasher = Sha256::new();
            hasher.update(url.as_bytes());
            let digest = format!("{:x}", hasher.finalize());
            format!("url-{}", digest.get(..16).unwrap_or(&digest))
        }
    }

    /// Make sure the model behind `url` is present in the cache, downloading
    /// it on first use, and return the asset paths
    ///
    /// # Errors
    /// - `CutoutError::Inference` for unsupported URLs or network failures
    /// - `CutoutError::Io` for cache filesystem failures
    pub async fn ensure_cached(&self, url: &str) -> Result<ModelAssets> {
        let model_id = Self::url_to_model_id(url);
        let final_dir = self.cache_dir.join(&model_id);

        let assets = ModelAssets {
            model_path: final_dir.join(MODEL_FILE),
            preprocessor_path: final_dir.join(PREPROCESSOR_FILE),
        };

        if assets.model_path.is_file() && assets.preprocessor_path.is_file() {
            log::debug!("Model already cached: {model_id}");
            return Ok(assets);
        }

        if !url.starts_with("https://huggingface.co/") {
            return Err(CutoutError::inference(format!(
                "unsupported model URL '{url}': only HuggingFace repositories are supported"
            )));
        }

        log::info!("Downloading model {model_id} from {url}");
        let temp_dir = self.create_temp_dir(&model_id)?;
        let raw_base = format!("{url}/resolve/main/");

        let model_dl = self.download_file(
            format!("{raw_base}{MODEL_FILE}"),
            temp_dir.join(MODEL_FILE),
        );
        let config_dl = self.download_file(
            format!("{raw_base}{PREPROCESSOR_FILE}"),
            temp_dir.join(PREPROCESSOR_FILE),
        );

        match futures::future::try_join(model_dl, config_dl).await {
            Ok(_) => {
                if final_dir.exists() {
                    fs::remove_dir_all(&final_dir).map_err(|e| {
                        CutoutError::file_io_error("remove stale model directory", &final_dir, &e)
                    })?;
                }
                fs::rename(&temp_dir, &final_dir).map_err(|e| {
                    CutoutError::file_io_error("move downloaded model into cache", &final_dir, &e)
                })?;
                log::info!("Model cached: {model_id}");
                Ok(assets)
            },
            Err(e) => {
                if temp_dir.exists() {
                    if let Err(cleanup_err) = fs::remove_dir_all(&temp_dir) {
                        log::warn!("Failed to clean up temp directory: {cleanup_err}");
                    }
                }
                Err(e)
            },
        }
    }

    fn create_temp_dir(&self, model_id: &str) -> Result<PathBuf> {
        let temp_dir = self.cache_dir.join(format!(".tmp-{model_id}"));
        if temp_dir.exists() {
            fs::remove_dir_all(&temp_dir).map_err(|e| {
                CutoutError::file_io_error("remove existing temp directory", &temp_dir, &e)
            })?;
        }
        fs::create_dir_all(&temp_dir)
            .map_err(|e| CutoutError::file_io_error("create temp directory", &temp_dir, &e))?;
        Ok(temp_dir)
    }

    /// Stream one file to disk, logging its size and SHA-256 digest
    async fn download_file(&self, url: String, local_path: PathBuf) -> Result<()> {
        log::debug!("Downloading {} -> {}", url, local_path.display());

        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| CutoutError::file_io_error("create directory", parent, &e))?;
        }

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CutoutError::inference(format!("failed to download {url}: {e}")))?;

        if !response.status().is_success() {
            return Err(CutoutError::inference(format!(
                "HTTP {} for {url}",
                response.status()
            )));
        }

        let mut file = tokio::fs::File::create(&local_path)
            .await
            .map_err(|e| CutoutError::file_io_error("create file", &local_path, &e))?;

        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        let mut hasher = Sha256::new();
        let mut downloaded = 0u64;
        let mut buffer = vec![0u8; 8192];

        loop {
            let bytes_read = tokio::io::AsyncReadExt::read(&mut stream, &mut buffer)
                .await
                .map_err(|e| CutoutError::inference(format!("download stream failed: {e}")))?;
            if bytes_read == 0 {
                break;
            }
            let chunk = buffer.get(..bytes_read).unwrap_or(&[]);
            hasher.update(chunk);
            file.write_all(chunk)
                .await
                .map_err(|e| CutoutError::file_io_error("write to file", &local_path, &e))?;
            downloaded += bytes_read as u64;
        }

        file.flush()
            .await
            .map_err(|e| CutoutError::file_io_error("flush file", &local_path, &e))?;

        log::debug!(
            "Downloaded {} bytes to {} (sha256: {:x})",
            downloaded,
            local_path.display(),
            hasher.finalize()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_url_to_model_id_huggingface() {
        let id = ModelDownloader::url_to_model_id("https://huggingface.co/imgly/isnet-general-onnx");
        assert_eq!(id, "imgly--isnet-general-onnx");
    }

    #[test]
    fn test_url_to_model_id_other_urls_hashed() {
        let id = ModelDownloader::url_to_model_id("https://example.com/model");
        assert!(id.starts_with("url-"));
        assert_eq!(id.len(), 4 + 16);

        // Stable across calls
        assert_eq!(id, ModelDownloader::url_to_model_id("https://example.com/model"));
    }

    #[test]
    fn test_with_cache_dir_creates_directory() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("nested").join("models");
        let downloader = ModelDownloader::with_cache_dir(dir.clone()).unwrap();
        assert!(dir.is_dir());
        drop(downloader);
    }

    #[tokio::test]
    async fn test_ensure_cached_short_circuits_on_cached_model() {
        let temp = TempDir::new().unwrap();
        let downloader = ModelDownloader::with_cache_dir(temp.path().to_path_buf()).unwrap();

        // Pre-populate the cache entry; no network should be touched
        let model_dir = temp.path().join("imgly--isnet-general-onnx");
        fs::create_dir_all(model_dir.join("onnx")).unwrap();
        fs::write(model_dir.join(MODEL_FILE), b"fake-onnx").unwrap();
        fs::write(model_dir.join(PREPROCESSOR_FILE), b"{}").unwrap();

        let assets = downloader
            .ensure_cached("https://huggingface.co/imgly/isnet-general-onnx")
            .await
            .unwrap();
        assert!(assets.model_path.is_file());
        assert!(assets.preprocessor_path.is_file());
    }

    #[tokio::test]
    async fn test_ensure_cached_rejects_unsupported_url() {
        let temp = TempDir::new().unwrap();
        let downloader = ModelDownloader::with_cache_dir(temp.path().to_path_buf()).unwrap();

        let err = downloader
            .ensure_cached("ftp://example.com/model")
            .await
            .unwrap_err();
        assert!(matches!(err, CutoutError::Inference(_)));
    }
}
