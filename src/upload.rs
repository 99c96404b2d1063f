//! Image host collaborator.
//!
//! Files are validated locally, then handed to an [`ImageHost`] which returns
//! the public URL. Callers upload before opening any transaction so a failed
//! upload never leaves a partial record behind.

use std::{path::Path, time::Duration};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::config::{AppConfig, CloudinaryConfig};

/// Supported image formats
pub const SUPPORTED_FORMATS: &[&str] = &["png", "jpg", "jpeg", "webp", "gif"];

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("{0}")]
    Invalid(String),

    #[error("image host is not configured")]
    NotConfigured,

    #[error("image host request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("image host rejected upload ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// A file received from a multipart form.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub field: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
    }
}

/// Validate image file
pub fn validate_image(file: &UploadedFile, max_bytes: usize) -> Result<(), UploadError> {
    if file.bytes.is_empty() {
        return Err(UploadError::Invalid(format!(
            "Empty file provided for '{}'",
            file.file_name
        )));
    }

    if file.bytes.len() > max_bytes {
        return Err(UploadError::Invalid(format!(
            "File too large. Maximum size is {} bytes",
            max_bytes
        )));
    }

    let ext = file.extension().ok_or_else(|| {
        UploadError::Invalid(format!("Invalid file extension for: {}", file.file_name))
    })?;
    if !SUPPORTED_FORMATS.contains(&ext.as_str()) {
        return Err(UploadError::Invalid(format!(
            "Unsupported file format '{}'. Supported: {}",
            ext,
            SUPPORTED_FORMATS.join(", ")
        )));
    }

    Ok(())
}

#[async_trait]
pub trait ImageHost: Send + Sync {
    /// Stores the file and returns its public URL.
    async fn upload(&self, file: UploadedFile) -> Result<String, UploadError>;
}

/// Validates every file, then uploads them in order. Nothing is uploaded if
/// any file is invalid.
pub async fn upload_all(
    host: &dyn ImageHost,
    files: Vec<UploadedFile>,
    max_bytes: usize,
) -> Result<Vec<String>, UploadError> {
    for file in &files {
        validate_image(file, max_bytes)?;
    }

    let mut urls = Vec::with_capacity(files.len());
    for file in files {
        urls.push(host.upload(file).await?);
    }
    Ok(urls)
}

/// Unsigned upload to Cloudinary's REST endpoint.
pub struct CloudinaryHost {
    client: reqwest::Client,
    endpoint: String,
    upload_preset: String,
}

impl CloudinaryHost {
    pub fn new(config: &CloudinaryConfig) -> Result<Self, UploadError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!(
                "https://api.cloudinary.com/v1_1/{}/image/upload",
                config.cloud_name
            ),
            upload_preset: config.upload_preset.clone(),
        })
    }
}

#[derive(Deserialize)]
struct CloudinaryResponse {
    secure_url: String,
}

#[async_trait]
impl ImageHost for CloudinaryHost {
    async fn upload(&self, file: UploadedFile) -> Result<String, UploadError> {
        let mime = file
            .content_type
            .clone()
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let part = reqwest::multipart::Part::bytes(file.bytes)
            .file_name(file.file_name)
            .mime_str(&mime)?;
        let form = reqwest::multipart::Form::new()
            .text("upload_preset", self.upload_preset.clone())
            .part("file", part);

        let resp = self.client.post(&self.endpoint).multipart(form).send().await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(UploadError::Rejected { status, body });
        }

        let parsed: CloudinaryResponse = resp.json().await?;
        tracing::debug!(url = %parsed.secure_url, "image uploaded");
        Ok(parsed.secure_url)
    }
}

/// Used when no image host is configured; every upload fails.
pub struct DisabledImageHost;

#[async_trait]
impl ImageHost for DisabledImageHost {
    async fn upload(&self, _file: UploadedFile) -> Result<String, UploadError> {
        Err(UploadError::NotConfigured)
    }
}

/// Picks the image host from configuration.
pub fn image_host_from_config(config: &AppConfig) -> anyhow::Result<Box<dyn ImageHost>> {
    match &config.cloudinary {
        Some(cloudinary) => Ok(Box::new(CloudinaryHost::new(cloudinary)?)),
        None => {
            tracing::warn!("CLOUDINARY_* not set; image uploads are disabled");
            Ok(Box::new(DisabledImageHost))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn file(name: &str, bytes: &[u8]) -> UploadedFile {
        UploadedFile {
            field: "images".into(),
            file_name: name.into(),
            content_type: Some("image/png".into()),
            bytes: bytes.to_vec(),
        }
    }

    struct RecordingHost {
        uploaded: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ImageHost for RecordingHost {
        async fn upload(&self, file: UploadedFile) -> Result<String, UploadError> {
            let url = format!("https://img.test/{}", file.file_name);
            self.uploaded.lock().unwrap().push(url.clone());
            Ok(url)
        }
    }

    #[test]
    fn rejects_empty_oversized_and_unknown_files() {
        assert!(validate_image(&file("a.png", b""), 10).is_err());
        assert!(validate_image(&file("a.png", &[0u8; 11]), 10).is_err());
        assert!(validate_image(&file("a.exe", b"abc"), 10).is_err());
        assert!(validate_image(&file("noext", b"abc"), 10).is_err());
        assert!(validate_image(&file("A.JPG", b"abc"), 10).is_ok());
    }

    #[tokio::test]
    async fn upload_all_uploads_nothing_when_one_file_is_invalid() {
        let host = RecordingHost {
            uploaded: Mutex::new(Vec::new()),
        };
        let result = upload_all(
            &host,
            vec![file("ok.png", b"abc"), file("bad.txt", b"abc")],
            1024,
        )
        .await;
        assert!(matches!(result, Err(UploadError::Invalid(_))));
        assert!(host.uploaded.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn upload_all_keeps_order() {
        let host = RecordingHost {
            uploaded: Mutex::new(Vec::new()),
        };
        let urls = upload_all(&host, vec![file("1.png", b"a"), file("2.png", b"b")], 1024)
            .await
            .unwrap();
        assert_eq!(urls, vec!["https://img.test/1.png", "https://img.test/2.png"]);
    }

    #[tokio::test]
    async fn disabled_host_reports_not_configured() {
        let err = DisabledImageHost.upload(file("a.png", b"a")).await.unwrap_err();
        assert!(matches!(err, UploadError::NotConfigured));
    }
}
