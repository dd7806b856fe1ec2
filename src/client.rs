use std::{future::Future, path::Path};

use reqwest::{multipart, StatusCode};

use crate::{
    config::Config,
    model::{Detection, Report, SubmissionReceipt},
};

/// Form field the backend reads the uploaded media from.
pub const UPLOAD_FIELD: &str = "image";
pub const TRAFFIC_DENSITY_FIELD: &str = "traffic_density";

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered with status {status}")]
    Status { url: String, status: StatusCode },
    #[error("could not decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid upload: {0}")]
    InvalidUpload(String),
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum UploadError {
    #[error("unsupported media type {0}; only image/* and video/* are accepted")]
    UnsupportedMediaType(String),
    #[error("file {0} is empty")]
    Empty(String),
}

/// A media file picked for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Result<Self, UploadError> {
        let file_name = file_name.into();
        let content_type = content_type.into().trim().to_ascii_lowercase();
        if !is_accepted_media_type(&content_type) {
            return Err(UploadError::UnsupportedMediaType(content_type));
        }
        if bytes.is_empty() {
            return Err(UploadError::Empty(file_name));
        }
        Ok(Self {
            file_name,
            content_type,
            bytes,
        })
    }

    /// Builds an upload from a file on disk, deriving the media type from the
    /// extension.
    pub fn from_path(path: &Path, bytes: Vec<u8>) -> Result<Self, UploadError> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let content_type = media_type_for(path)
            .unwrap_or("application/octet-stream")
            .to_string();
        Self::new(file_name, content_type, bytes)
    }
}

/// Whether the dashboard takes uploads of this MIME type: any `image/*` or
/// `video/*`, parameters ignored.
pub fn is_accepted_media_type(content_type: &str) -> bool {
    let essence = content_type.split(';').next().unwrap_or("").trim();
    match essence.split_once('/') {
        Some(("image", sub)) | Some(("video", sub)) => !sub.is_empty(),
        _ => false,
    }
}

/// MIME type for the image and video extensions phones and cameras produce.
fn media_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "heic" => "image/heic",
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        _ => return None,
    };
    Some(mime)
}

/// The calls the dashboard panels make against the reports backend.
pub trait ReportsApi: Send + Sync + 'static {
    /// Reads the whole report collection in backend order.
    fn fetch_reports(&self) -> impl Future<Output = Result<Vec<Report>, ClientError>> + Send;

    /// Uploads one media file for analysis.
    fn submit_report(
        &self,
        file: &UploadFile,
        traffic_density: Option<&str>,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;
}

/// HTTP client for the reports backend. Every call is a single attempt.
#[derive(Clone, Debug)]
pub struct ReportsClient {
    http: reqwest::Client,
    reports_url: String,
    report_url: String,
}

impl ReportsClient {
    pub fn new(config: &Config) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("pavers-dashboard/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout)
            .build()
            .map_err(|source| ClientError::Transport {
                url: config.api_url.clone(),
                source,
            })?;
        Ok(Self {
            http,
            reports_url: config.reports_url(),
            report_url: config.report_url(),
        })
    }

    async fn get_reports(&self) -> Result<Vec<Report>, ClientError> {
        let url = &self.reports_url;
        let res = self
            .http
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|source| ClientError::Transport {
                url: url.clone(),
                source,
            })?;
        let status = res.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                url: url.clone(),
                status,
            });
        }
        let body = res.bytes().await.map_err(|source| ClientError::Transport {
            url: url.clone(),
            source,
        })?;
        serde_json::from_slice(&body).map_err(|source| ClientError::Decode {
            url: url.clone(),
            source,
        })
    }

    async fn post_media(
        &self,
        file: &UploadFile,
        traffic_density: Option<&str>,
    ) -> Result<(), ClientError> {
        let url = &self.report_url;
        let part = multipart::Part::bytes(file.bytes.clone())
            .file_name(file.file_name.clone())
            .mime_str(&file.content_type)
            .map_err(|e| ClientError::InvalidUpload(e.to_string()))?;
        let mut form = multipart::Form::new().part(UPLOAD_FIELD, part);
        if let Some(density) = traffic_density {
            form = form.text(TRAFFIC_DENSITY_FIELD, density.to_string());
        }

        let res = self
            .http
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|source| ClientError::Transport {
                url: url.clone(),
                source,
            })?;
        let status = res.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                url: url.clone(),
                status,
            });
        }
        Ok(())
    }

    /// Posts detector output for a known location, the way the on-device
    /// detector reports potholes without uploading the frame itself.
    pub async fn submit_detections(
        &self,
        detections: &[Detection],
        latitude: f64,
        longitude: f64,
        traffic_density: Option<&str>,
    ) -> Result<SubmissionReceipt, ClientError> {
        let url = &self.report_url;
        let mut query = vec![
            ("lat", latitude.to_string()),
            ("lon", longitude.to_string()),
        ];
        if let Some(density) = traffic_density {
            query.push((TRAFFIC_DENSITY_FIELD, density.to_string()));
        }

        let res = self
            .http
            .post(url)
            .query(&query)
            .json(detections)
            .send()
            .await
            .map_err(|source| ClientError::Transport {
                url: url.clone(),
                source,
            })?;
        let status = res.status();
        let body = res.bytes().await.unwrap_or_default();
        if !status.is_success() {
            tracing::error!(
                "detections submission rejected: status={} body={}",
                status,
                truncate(&String::from_utf8_lossy(&body))
            );
            return Err(ClientError::Status {
                url: url.clone(),
                status,
            });
        }
        Ok(serde_json::from_slice(&body).unwrap_or_default())
    }
}

impl ReportsApi for ReportsClient {
    async fn fetch_reports(&self) -> Result<Vec<Report>, ClientError> {
        match self.get_reports().await {
            Ok(reports) => {
                tracing::debug!("fetched {} reports", reports.len());
                Ok(reports)
            }
            Err(e) => {
                tracing::error!("fetch reports failed: {}", e);
                Err(e)
            }
        }
    }

    async fn submit_report(
        &self,
        file: &UploadFile,
        traffic_density: Option<&str>,
    ) -> Result<(), ClientError> {
        tracing::info!(
            "uploading {} ({}, {} bytes)",
            file.file_name,
            file.content_type,
            file.bytes.len()
        );
        self.post_media(file, traffic_density).await.map_err(|e| {
            tracing::error!("upload of {} failed: {}", file.file_name, e);
            e
        })
    }
}

fn truncate(s: &str) -> String {
    const MAX: usize = 512;
    if s.len() <= MAX {
        return s.to_string();
    }
    let mut end = MAX;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}
