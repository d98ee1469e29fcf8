use anyhow::Context;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::config::CdnConfig;

/// Signed image uploads to Cloudinary.
#[derive(Clone)]
pub struct ImageCdn {
    http: reqwest::Client,
    config: CdnConfig,
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: String,
}

/// Cloudinary signature: sorted `k=v` pairs joined by `&`, the API secret
/// appended, hashed with SHA-256.
fn sign_params(params: &[(&str, &str)], api_secret: &str) -> String {
    let mut sorted = params.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    hex::encode(Sha256::digest(format!("{}{}", joined, api_secret).as_bytes()))
}

impl ImageCdn {
    pub fn new(http: reqwest::Client, config: CdnConfig) -> Self {
        Self { http, config }
    }

    /// Uploads one image and returns its public HTTPS URL.
    pub async fn upload(&self, file_name: &str, content_type: &str, bytes: Vec<u8>) -> anyhow::Result<String> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = sign_params(
            &[("folder", self.config.folder.as_str()), ("timestamp", timestamp.as_str())],
            &self.config.api_secret,
        );

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(content_type)
            .context("invalid content type")?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("api_key", self.config.api_key.clone())
            .text("timestamp", timestamp)
            .text("folder", self.config.folder.clone())
            .text("signature", signature)
            .text("signature_algorithm", "sha256");

        let url = format!(
            "https://api.cloudinary.com/v1_1/{}/image/upload",
            self.config.cloud_name
        );
        let resp = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .context("CDN upload request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("CDN upload error: {} - {}", status, text);
        }

        let body: UploadResponse = resp.json().await.context("invalid CDN response")?;
        tracing::info!("Uploaded {} to {}", file_name, body.secure_url);
        Ok(body.secure_url)
    }
}
