#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use vk_autopost::config::EngineSettings;
use vk_autopost::events::{EngineEvent, LogLevel, LogLine};
use vk_autopost::vk::{
    PostSummary, SavedPhoto, UploadDescriptor, UploadTarget, VkError, VkService,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostCall {
    pub owner_id: i64,
    pub message: String,
    pub attachments: Vec<String>,
    pub publish_time: i64,
}

/// In-memory VK double that records every call.
#[derive(Clone, Default)]
pub struct RecordingVk {
    pub server_time: Option<i64>,
    pub upload_delay: Duration,
    failing_files: Arc<Mutex<HashSet<String>>>,
    publish_responses: Arc<Mutex<VecDeque<Result<i64, VkError>>>>,
    postponed: Arc<Mutex<Vec<i64>>>,
    failing_deletes: Arc<Mutex<HashSet<i64>>>,
    list_error: Arc<Mutex<Option<VkError>>>,

    pub uploads: Arc<Mutex<Vec<String>>>,
    pub posts: Arc<Mutex<Vec<PostCall>>>,
    pub list_calls: Arc<Mutex<Vec<(u32, u32)>>>,
    pub delete_calls: Arc<Mutex<Vec<i64>>>,

    next_photo_id: Arc<AtomicI64>,
    in_flight: Arc<AtomicUsize>,
    pub max_in_flight: Arc<AtomicUsize>,
}

impl RecordingVk {
    pub fn new() -> Self {
        Self {
            server_time: Some(1_760_000_000),
            ..Default::default()
        }
    }

    pub fn with_upload_delay(mut self, delay: Duration) -> Self {
        self.upload_delay = delay;
        self
    }

    pub async fn fail_upload_of(&self, file: &str) {
        self.failing_files.lock().await.insert(file.to_string());
    }

    pub async fn script_publish(&self, responses: Vec<Result<i64, VkError>>) {
        self.publish_responses.lock().await.extend(responses);
    }

    pub async fn with_postponed(&self, n: i64) {
        *self.postponed.lock().await = (1..=n).collect();
    }

    pub async fn fail_delete_of(&self, post_id: i64) {
        self.failing_deletes.lock().await.insert(post_id);
    }

    pub async fn fail_listing(&self, err: VkError) {
        *self.list_error.lock().await = Some(err);
    }

    pub async fn posts(&self) -> Vec<PostCall> {
        self.posts.lock().await.clone()
    }

    pub async fn uploads(&self) -> Vec<String> {
        self.uploads.lock().await.clone()
    }

    pub async fn list_calls(&self) -> Vec<(u32, u32)> {
        self.list_calls.lock().await.clone()
    }

    pub async fn delete_calls(&self) -> Vec<i64> {
        self.delete_calls.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl VkService for RecordingVk {
    async fn get_server_time(&self) -> Result<i64, VkError> {
        self.server_time
            .ok_or_else(|| VkError::Malformed("no server time".into()))
    }

    async fn get_upload_target(&self, group_id: i64) -> Result<UploadTarget, VkError> {
        Ok(UploadTarget {
            upload_url: format!("https://upload.test/{}", group_id.abs()),
        })
    }

    async fn upload_bytes(
        &self,
        _target: &UploadTarget,
        file_name: &str,
        _bytes: Vec<u8>,
    ) -> Result<UploadDescriptor, VkError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.upload_delay.is_zero() {
            tokio::time::sleep(self.upload_delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.uploads.lock().await.push(file_name.to_string());
        if self.failing_files.lock().await.contains(file_name) {
            return Err(VkError::Api {
                code: 100,
                message: format!("bad photo {}", file_name),
            });
        }
        Ok(UploadDescriptor {
            server: 1,
            photo: format!("[{}]", file_name),
            hash: "hash".into(),
        })
    }

    async fn persist_asset(
        &self,
        group_id: i64,
        _descriptor: &UploadDescriptor,
    ) -> Result<SavedPhoto, VkError> {
        Ok(SavedPhoto {
            id: self.next_photo_id.fetch_add(1, Ordering::SeqCst) + 1,
            owner_id: group_id,
        })
    }

    async fn create_scheduled_post(
        &self,
        owner_id: i64,
        message: &str,
        attachments: &[String],
        publish_time: i64,
    ) -> Result<i64, VkError> {
        let mut posts = self.posts.lock().await;
        posts.push(PostCall {
            owner_id,
            message: message.to_string(),
            attachments: attachments.to_vec(),
            publish_time,
        });
        let fallback = posts.len() as i64;
        drop(posts);
        self.publish_responses
            .lock()
            .await
            .pop_front()
            .unwrap_or(Ok(fallback))
    }

    async fn list_scheduled_posts(
        &self,
        _owner_id: i64,
        offset: u32,
        count: u32,
    ) -> Result<Vec<PostSummary>, VkError> {
        self.list_calls.lock().await.push((offset, count));
        if let Some(err) = self.list_error.lock().await.take() {
            return Err(err);
        }
        let all = self.postponed.lock().await;
        let start = (offset as usize).min(all.len());
        let end = (start + count as usize).min(all.len());
        Ok(all[start..end]
            .iter()
            .map(|&id| PostSummary { id, date: None })
            .collect())
    }

    async fn delete_post(&self, _owner_id: i64, post_id: i64) -> Result<(), VkError> {
        self.delete_calls.lock().await.push(post_id);
        if self.failing_deletes.lock().await.contains(&post_id) {
            return Err(VkError::Api {
                code: 15,
                message: "Access denied".into(),
            });
        }
        Ok(())
    }
}

/// Settings with no courtesy delays so tests run fast.
pub fn fast_settings() -> EngineSettings {
    EngineSettings {
        grace_seconds: 60,
        post_delay: Duration::ZERO,
        pause_poll: Duration::from_millis(20),
        upload_workers: 9,
        page_size: 100,
        request_delay: Duration::ZERO,
    }
}

pub fn write_photos(dir: &Path, n: usize) {
    for i in 0..n {
        std::fs::write(dir.join(format!("img_{:03}.jpg", i)), b"\xff\xd8fake").unwrap();
    }
}

pub fn log_lines(events: &[EngineEvent], level: LogLevel) -> Vec<LogLine> {
    events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::Log(line) if line.level == level => Some(line.clone()),
            _ => None,
        })
        .collect()
}

pub fn progress_times(events: &[EngineEvent]) -> Vec<i64> {
    events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::Progress(t) => Some(*t),
            _ => None,
        })
        .collect()
}
