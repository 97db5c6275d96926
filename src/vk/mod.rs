use async_trait::async_trait;
use reqwest::{multipart, Client, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::vk::model::{ApiErrorBody, CreatedPost, PostListing};
pub use crate::vk::model::{PostSummary, SavedPhoto, UploadDescriptor, UploadTarget};

pub mod model;

const VK_API_BASE: &str = "https://api.vk.com/method/";
pub const DEFAULT_API_VERSION: &str = "5.199";

/// VK error code for a revoked or invalid access token.
const AUTH_FAILED_CODE: i64 = 5;

#[derive(Debug, Error)]
pub enum VkError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("vk api error {code}: {message}")]
    Api { code: i64, message: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl VkError {
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, VkError::Api { code, .. } if *code == AUTH_FAILED_CODE)
    }

    /// The service cannot be reached or rejects the credential. Fatal to a run.
    pub fn is_connection_failure(&self) -> bool {
        match self {
            VkError::Transport(e) => e.is_connect() || e.is_timeout(),
            other => other.is_auth_failure(),
        }
    }
}

/// Remote operations the scheduler needs. `group_id` / `owner_id` are the
/// signed community id (negative for communities).
#[async_trait]
pub trait VkService: Send + Sync {
    async fn get_server_time(&self) -> Result<i64, VkError>;

    async fn get_upload_target(&self, group_id: i64) -> Result<UploadTarget, VkError>;

    async fn upload_bytes(
        &self,
        target: &UploadTarget,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadDescriptor, VkError>;

    async fn persist_asset(
        &self,
        group_id: i64,
        descriptor: &UploadDescriptor,
    ) -> Result<SavedPhoto, VkError>;

    /// Returns the server-assigned post id.
    async fn create_scheduled_post(
        &self,
        owner_id: i64,
        message: &str,
        attachments: &[String],
        publish_time: i64,
    ) -> Result<i64, VkError>;

    async fn list_scheduled_posts(
        &self,
        owner_id: i64,
        offset: u32,
        count: u32,
    ) -> Result<Vec<PostSummary>, VkError>;

    async fn delete_post(&self, owner_id: i64, post_id: i64) -> Result<(), VkError>;
}

#[derive(Clone)]
pub struct VkClient {
    http: Client,
    base_url: Url,
    token: String,
    version: String,
}

impl fmt::Debug for VkClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VkClient")
            .field("base_url", &self.base_url)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl VkClient {
    pub fn new(token: String, version: String) -> Result<Self, VkError> {
        let base_url = Url::parse(VK_API_BASE).map_err(|e| VkError::InvalidUrl(e.to_string()))?;
        Self::with_base_url(token, version, base_url)
    }

    pub fn with_base_url(token: String, version: String, base_url: Url) -> Result<Self, VkError> {
        let http = Client::builder()
            .user_agent("vk-autopost/0.1")
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            http,
            base_url,
            token,
            version,
        })
    }

    /// Build a form-encoded POST for an API method. The token travels in the
    /// body, never in the URL.
    pub fn build_request(
        &self,
        method: &str,
        params: &[(&str, String)],
    ) -> Result<reqwest::Request, VkError> {
        let endpoint = self
            .base_url
            .join(method)
            .map_err(|e| VkError::InvalidUrl(e.to_string()))?;
        let mut form: Vec<(&str, &str)> = params.iter().map(|(k, v)| (*k, v.as_str())).collect();
        form.push(("access_token", self.token.as_str()));
        form.push(("v", self.version.as_str()));
        Ok(self.http.post(endpoint).form(&form).build()?)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, String)],
    ) -> Result<T, VkError> {
        let request = self.build_request(method, params)?;
        debug!(method, "sending vk request");
        let res = self.http.execute(request).await?;
        let status = res.status();
        let body = res.text().await?;
        if !status.is_success() {
            return Err(VkError::Malformed(format!("http {}: {}", status, body)));
        }
        parse_envelope(&body)
    }
}

/// Unwrap the `{"response": ...}` / `{"error": {...}}` envelope.
pub fn parse_envelope<T: DeserializeOwned>(body: &str) -> Result<T, VkError> {
    let mut value: Value =
        serde_json::from_str(body).map_err(|e| VkError::Malformed(e.to_string()))?;
    if let Some(err) = value.get_mut("error") {
        let err: ApiErrorBody = serde_json::from_value(err.take())
            .map_err(|e| VkError::Malformed(format!("unreadable error object: {}", e)))?;
        return Err(VkError::Api {
            code: err.error_code,
            message: err.error_msg,
        });
    }
    let response = value
        .get_mut("response")
        .map(Value::take)
        .ok_or_else(|| VkError::Malformed("missing `response` field".into()))?;
    serde_json::from_value(response).map_err(|e| VkError::Malformed(e.to_string()))
}

/// Parse the upload host's reply, which is not wrapped in an envelope.
pub fn parse_upload_response(body: &str) -> Result<UploadDescriptor, VkError> {
    let descriptor: UploadDescriptor = match serde_json::from_str(body) {
        Ok(d) => d,
        Err(_) => return parse_envelope(body),
    };
    if descriptor.is_rejected() {
        return Err(VkError::Malformed("upload host returned no photo".into()));
    }
    Ok(descriptor)
}

fn content_type(file_name: &str) -> &'static str {
    match Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|s| s.to_ascii_lowercase())
    {
        Some(ext) if ext == "jpg" || ext == "jpeg" => "image/jpeg",
        Some(ext) if ext == "png" => "image/png",
        Some(ext) if ext == "gif" => "image/gif",
        Some(ext) if ext == "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl VkService for VkClient {
    async fn get_server_time(&self) -> Result<i64, VkError> {
        self.call("utils.getServerTime", &[]).await
    }

    async fn get_upload_target(&self, group_id: i64) -> Result<UploadTarget, VkError> {
        self.call(
            "photos.getWallUploadServer",
            &[("group_id", group_id.abs().to_string())],
        )
        .await
    }

    async fn upload_bytes(
        &self,
        target: &UploadTarget,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadDescriptor, VkError> {
        let part = multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(content_type(file_name))?;
        let form = multipart::Form::new().part("photo", part);

        let res = self
            .http
            .post(&target.upload_url)
            .multipart(form)
            .send()
            .await?;
        let status = res.status();
        let body = res.text().await?;
        if !status.is_success() {
            return Err(VkError::Malformed(format!("upload http {}: {}", status, body)));
        }
        debug!(file_name, "uploaded photo bytes");
        parse_upload_response(&body)
    }

    async fn persist_asset(
        &self,
        group_id: i64,
        descriptor: &UploadDescriptor,
    ) -> Result<SavedPhoto, VkError> {
        let saved: Vec<SavedPhoto> = self
            .call(
                "photos.saveWallPhoto",
                &[
                    ("group_id", group_id.abs().to_string()),
                    ("server", descriptor.server.to_string()),
                    ("photo", descriptor.photo.clone()),
                    ("hash", descriptor.hash.clone()),
                ],
            )
            .await?;
        saved
            .into_iter()
            .next()
            .ok_or_else(|| VkError::Malformed("saveWallPhoto returned no photos".into()))
    }

    async fn create_scheduled_post(
        &self,
        owner_id: i64,
        message: &str,
        attachments: &[String],
        publish_time: i64,
    ) -> Result<i64, VkError> {
        let created: CreatedPost = self
            .call(
                "wall.post",
                &[
                    ("owner_id", owner_id.to_string()),
                    ("from_group", "1".to_string()),
                    ("message", message.to_string()),
                    ("attachments", attachments.join(",")),
                    ("publish_date", publish_time.to_string()),
                ],
            )
            .await?;
        Ok(created.post_id)
    }

    async fn list_scheduled_posts(
        &self,
        owner_id: i64,
        offset: u32,
        count: u32,
    ) -> Result<Vec<PostSummary>, VkError> {
        let listing: PostListing = self
            .call(
                "wall.get",
                &[
                    ("owner_id", owner_id.to_string()),
                    ("filter", "postponed".to_string()),
                    ("offset", offset.to_string()),
                    ("count", count.to_string()),
                ],
            )
            .await?;
        Ok(listing.items)
    }

    async fn delete_post(&self, owner_id: i64, post_id: i64) -> Result<(), VkError> {
        let _: i64 = self
            .call(
                "wall.delete",
                &[
                    ("owner_id", owner_id.to_string()),
                    ("post_id", post_id.to_string()),
                ],
            )
            .await?;
        Ok(())
    }
}
