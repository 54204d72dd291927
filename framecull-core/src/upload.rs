//! Artifact upload to remote object storage.
//!
//! The default uploader PUTs block blobs into an Azure Storage container
//! addressed by a SAS URL. Any failure, including a timeout, surfaces as
//! `UploadFailed` with the cause; retries are left to the caller.

use crate::error::{CoreError, CoreResult};
use crate::utils::sanitize_file_name;
use chrono::{DateTime, Local};
use reqwest::blocking::Body;
use std::fs::File;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Collaborator that publishes a local file and returns where it can be reached.
pub trait ArtifactUploader {
    fn upload_artifact(&self, local_path: &Path) -> CoreResult<String>;
}

/// Blob name for an upload: `<stem>_<YYYYMMDDHHMMSS><ext>` with spaces,
/// colons and slashes replaced.
#[must_use]
pub fn blob_name(local_path: &Path, at: DateTime<Local>) -> String {
    let stem = local_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    let extension = local_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    sanitize_file_name(&format!("{stem}_{}{extension}", at.format("%Y%m%d%H%M%S")))
}

/// URL of `name` inside `container`, keeping the container's SAS query.
pub fn blob_url(container: &Url, name: &str) -> CoreResult<Url> {
    let mut url = container.clone();
    url.path_segments_mut()
        .map_err(|_| CoreError::Config(format!("{container} cannot hold blobs")))?
        .pop_if_empty()
        .push(name);
    Ok(url)
}

fn content_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("csv") => "text/csv",
        Some("json") => "application/json",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    }
}

/// `ArtifactUploader` for an Azure Storage container SAS URL.
pub struct AzureBlobUploader {
    client: reqwest::blocking::Client,
    container_url: Url,
}

impl AzureBlobUploader {
    pub fn new(container_url: &str, timeout: Duration) -> CoreResult<Self> {
        let container_url = Url::parse(container_url)
            .map_err(|e| CoreError::Config(format!("invalid container URL: {e}")))?;
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::Config(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            container_url,
        })
    }
}

impl ArtifactUploader for AzureBlobUploader {
    fn upload_artifact(&self, local_path: &Path) -> CoreResult<String> {
        let file = File::open(local_path).map_err(|e| {
            CoreError::UploadFailed(format!("cannot open {}: {}", local_path.display(), e))
        })?;
        let length = file.metadata()?.len();

        let name = blob_name(local_path, Local::now());
        let url = blob_url(&self.container_url, &name)?;
        log::info!("Uploading {} as blob {}", local_path.display(), name);

        let response = self
            .client
            .put(url.clone())
            .header("x-ms-blob-type", "BlockBlob")
            .header("Content-Type", content_type(local_path))
            .body(Body::sized(file, length))
            .send()
            .map_err(|e| CoreError::UploadFailed(format!("{name}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(CoreError::UploadFailed(format!(
                "{name}: storage returned {status}: {body}"
            )));
        }

        let mut public = url;
        public.set_query(None);
        log::info!("Uploaded {} to {}", local_path.display(), public);
        Ok(public.to_string())
    }
}
