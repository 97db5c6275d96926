//! Submits one scheduled post per batch and records the resumable high-water mark.
use chrono::{Local, TimeZone};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::instrument;

use crate::error::EngineError;
use crate::events::EventSink;
use crate::model::UploadedAsset;
use crate::state::{PersistedRunState, StateStore};
use crate::vk::VkService;

/// Caption plus, when enabled, a blank line and one random decoration.
/// An empty caption yields the decoration alone, without the leading blank
/// line a literal `caption + "\n\n" + decoration` would produce.
pub fn compose_message<R: Rng + ?Sized>(
    caption: &str,
    randomize: bool,
    pool: &[String],
    rng: &mut R,
) -> String {
    let suffix = if randomize { pool.choose(rng) } else { None };
    match suffix {
        Some(token) if caption.is_empty() => token.clone(),
        Some(token) => format!("{}\n\n{}", caption, token),
        None => caption.to_string(),
    }
}

pub fn format_timestamp(ts: i64) -> String {
    match Local.timestamp_opt(ts, 0).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
        None => ts.to_string(),
    }
}

pub struct PostPublisher<'a> {
    service: &'a dyn VkService,
    sink: &'a EventSink,
    store: &'a StateStore,
    token: &'a str,
    group_id: i64,
    batch_size: usize,
    posted: usize,
}

impl<'a> PostPublisher<'a> {
    pub fn new(
        service: &'a dyn VkService,
        sink: &'a EventSink,
        store: &'a StateStore,
        token: &'a str,
        group_id: i64,
        batch_size: usize,
    ) -> Self {
        Self {
            service,
            sink,
            store,
            token,
            group_id,
            batch_size,
            posted: 0,
        }
    }

    pub fn posted(&self) -> usize {
        self.posted
    }

    /// Schedule the post for `batch_index`. An unreachable service or a
    /// rejected token surfaces as `ConnectionFailure`; any other failure is a
    /// per-batch `Publish` error.
    #[instrument(skip(self, assets, message))]
    pub async fn publish(
        &mut self,
        batch_index: usize,
        assets: &[UploadedAsset],
        message: &str,
        publish_time: i64,
    ) -> Result<i64, EngineError> {
        let attachments: Vec<String> = assets.iter().map(UploadedAsset::reference).collect();
        let post_id = self
            .service
            .create_scheduled_post(self.group_id, message, &attachments, publish_time)
            .await
            .map_err(|source| {
                if source.is_connection_failure() {
                    EngineError::ConnectionFailure(source.to_string())
                } else {
                    EngineError::Publish {
                        batch: batch_index,
                        source,
                    }
                }
            })?;

        self.posted += 1;
        self.sink.progress(publish_time);

        let state = PersistedRunState {
            token: self.token.to_string(),
            group_id: Some(self.group_id),
            batch_size: Some(self.batch_size),
            last_post_time: Some(publish_time),
        };
        if let Err(err) = self.store.save(&state) {
            self.sink.warn(format!(
                "could not save progress to {}: {}",
                self.store.path().display(),
                err
            ));
        }
        Ok(post_id)
    }
}
