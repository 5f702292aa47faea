//! Local inference service API: health, models, inference, uploads and quality probes.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::Path};

use super::{ApiError, ApiResult, decode_any_status, ensure_success, join};

/// Static service description from the root endpoint.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ServiceInfo {
    pub service: String,
    pub version: String,
    pub status: String,
    #[serde(default)]
    pub endpoints: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub service: String,
    pub service_available: bool,
    /// Server-ordered model catalog, when the backend can list it.
    #[serde(default)]
    pub available_models: Option<Vec<String>>,
}

/// One multi-modal inference call. `None` fields are left out of the JSON.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceRequest {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_urls: Option<Vec<String>>,
    /// Set only when exactly one image is attached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ocr_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceResponse {
    pub success: bool,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub input_tokens: Option<u64>,
    #[serde(default)]
    pub output_tokens: Option<u64>,
    #[serde(default)]
    pub total_tokens: Option<u64>,
    /// Text the service extracted from the images, if any.
    #[serde(default)]
    pub ocr_text: Option<String>,
}

/// Resolution/quality descriptor of an uploaded image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QualityInfo {
    pub width: u32,
    pub height: u32,
    pub resolution: String,
    pub quality: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub local_path: Option<String>,
    #[serde(default)]
    pub original_name: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub resolution: Option<String>,
    #[serde(default)]
    pub quality: Option<String>,
}

impl UploadResponse {
    /// Quality the server computed during upload, if it sent all of it.
    pub fn inline_quality(&self) -> Option<QualityInfo> {
        Some(QualityInfo {
            width: self.width?,
            height: self.height?,
            resolution: self.resolution.clone()?,
            quality: self.quality.clone()?,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct QualityResponse {
    pub success: bool,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub resolution: Option<String>,
    #[serde(default)]
    pub quality: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl QualityResponse {
    pub fn into_quality(self) -> Option<QualityInfo> {
        if !self.success {
            return None;
        }
        Some(QualityInfo {
            width: self.width?,
            height: self.height?,
            resolution: self.resolution?,
            quality: self.quality?,
        })
    }
}

/// Operations offered by the local inference service.
#[async_trait]
pub trait InferenceApi: Send + Sync {
    async fn service_info(&self) -> ApiResult<ServiceInfo>;
    async fn health(&self) -> ApiResult<HealthResponse>;
    async fn infer(&self, req: &InferenceRequest) -> ApiResult<InferenceResponse>;
    async fn upload(&self, path: &Path) -> ApiResult<UploadResponse>;
    async fn quality(&self, file_url: &str) -> ApiResult<QualityResponse>;
}

/// `InferenceApi` over HTTP/JSON.
#[derive(Clone)]
pub struct HttpInferenceClient {
    http: Client,
    base_url: String,
}

impl HttpInferenceClient {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl InferenceApi for HttpInferenceClient {
    async fn service_info(&self) -> ApiResult<ServiceInfo> {
        let url = format!("{}/", self.base_url.trim_end_matches('/'));
        let resp = ensure_success(self.http.get(url).send().await?).await?;
        Ok(resp.json::<ServiceInfo>().await?)
    }

    async fn health(&self) -> ApiResult<HealthResponse> {
        let url = join(&self.base_url, "health");
        let resp = ensure_success(self.http.get(url).send().await?).await?;
        Ok(resp.json::<HealthResponse>().await?)
    }

    async fn infer(&self, req: &InferenceRequest) -> ApiResult<InferenceResponse> {
        let url = join(&self.base_url, "infer");
        let resp = self.http.post(url).json(req).send().await?;
        decode_any_status(resp).await
    }

    async fn upload(&self, path: &Path) -> ApiResult<UploadResponse> {
        let bytes = tokio::fs::read(path).await.map_err(|source| ApiError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let filename = file_name(path);

        let form = reqwest::multipart::Form::new().part(
            "file",
            reqwest::multipart::Part::bytes(bytes)
                .file_name(filename)
                .mime_str(mime_for(path))?,
        );

        let url = join(&self.base_url, "upload");
        let resp = self.http.post(url).multipart(form).send().await?;
        decode_any_status(resp).await
    }

    async fn quality(&self, file_url: &str) -> ApiResult<QualityResponse> {
        let url = format!(
            "{}?fileUrl={}",
            join(&self.base_url, "quality"),
            urlencoding::encode(file_url)
        );
        let resp = self.http.get(url).send().await?;
        decode_any_status(resp).await
    }
}

/// Display name of a local file.
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// MIME type guessed from the extension; the service only accepts images.
pub fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_with_single_url_serializes_both_shapes_only_when_set() {
        let req = InferenceRequest {
            prompt: "describe this".into(),
            image_url: Some("http://x/y.png".into()),
            ..Default::default()
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v, json!({"prompt": "describe this", "imageUrl": "http://x/y.png"}));
    }

    #[test]
    fn server_error_with_failure_body_is_a_remote_failure() {
        let body = r#"{"success": false, "error": "model unavailable"}"#;
        let resp: InferenceResponse =
            super::super::decode_body(reqwest::StatusCode::INTERNAL_SERVER_ERROR, body).unwrap();
        assert!(!resp.success);
        assert_eq!(resp.error.as_deref(), Some("model unavailable"));
        assert!(resp.content.is_none());
    }

    #[test]
    fn health_without_catalog() {
        let h: HealthResponse = serde_json::from_value(json!({
            "status": "UP",
            "service": "Local LLM Client",
            "serviceAvailable": true
        }))
        .unwrap();
        assert!(h.service_available);
        assert!(h.available_models.is_none());
    }

    #[test]
    fn inline_quality_needs_every_field() {
        let mut up: UploadResponse = serde_json::from_value(json!({
            "success": true,
            "fileUrl": "file:///tmp/a.png",
            "width": 1920,
            "height": 1080,
            "resolution": "1080p"
        }))
        .unwrap();
        assert!(up.inline_quality().is_none());
        up.quality = Some("HD".into());
        assert_eq!(
            up.inline_quality(),
            Some(QualityInfo {
                width: 1920,
                height: 1080,
                resolution: "1080p".into(),
                quality: "HD".into(),
            })
        );
    }

    #[test]
    fn failed_quality_probe_yields_nothing() {
        let q = QualityResponse {
            success: false,
            error: Some("ffprobe missing".into()),
            ..Default::default()
        };
        assert!(q.into_quality().is_none());
    }

    #[test]
    fn mime_from_extension() {
        assert_eq!(mime_for(Path::new("a/B.JPG")), "image/jpeg");
        assert_eq!(mime_for(Path::new("shot.webp")), "image/webp");
        assert_eq!(mime_for(Path::new("notes")), "application/octet-stream");
        assert_eq!(file_name(Path::new("/tmp/x/shot.png")), "shot.png");
    }
}
