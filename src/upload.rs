//! Uploads the files of one batch with a bounded number of concurrent workers.
use futures::stream::{self, StreamExt};
use std::path::Path;
use tracing::{debug, instrument};

use crate::error::EngineError;
use crate::events::EventSink;
use crate::model::{display_name, Batch, UploadedAsset};
use crate::vk::{VkError, VkService};

#[derive(Clone, Copy)]
pub struct UploadCoordinator<'a> {
    service: &'a dyn VkService,
    sink: &'a EventSink,
    workers: usize,
}

impl<'a> UploadCoordinator<'a> {
    pub fn new(service: &'a dyn VkService, sink: &'a EventSink, workers: usize) -> Self {
        Self {
            service,
            sink,
            workers: workers.max(1),
        }
    }

    /// One asset per successfully uploaded file, in completion order. Failed
    /// files are logged and left out. Only when no file made it and the
    /// service was unreachable does the batch fail, with `ConnectionFailure`.
    #[instrument(skip_all, fields(batch = batch.index, files = batch.len()))]
    pub async fn upload_batch(
        &self,
        batch: &Batch,
        group_id: i64,
    ) -> Result<Vec<UploadedAsset>, EngineError> {
        let uploads: Vec<_> = batch
            .files
            .iter()
            .map(|path| self.upload_file(path, group_id))
            .collect();
        let results: Vec<Result<UploadedAsset, EngineError>> = stream::iter(uploads)
            .buffer_unordered(self.workers)
            .collect()
            .await;

        let mut assets = Vec::with_capacity(results.len());
        let mut unreachable = None;
        for result in results {
            match result {
                Ok(asset) => assets.push(asset),
                Err(err) => {
                    self.sink.error(err.to_string());
                    if let EngineError::Upload { source, .. } = &err {
                        if source.is_connection_failure() && unreachable.is_none() {
                            unreachable = Some(source.to_string());
                        }
                    }
                }
            }
        }
        match unreachable {
            Some(reason) if assets.is_empty() => Err(EngineError::ConnectionFailure(reason)),
            _ => Ok(assets),
        }
    }

    async fn upload_file(&self, path: &Path, group_id: i64) -> Result<UploadedAsset, EngineError> {
        let file = display_name(path);
        let wrap = |source: VkError| EngineError::Upload {
            file: file.clone(),
            source,
        };
        self.sink.info(format!("uploading {}", file));

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| wrap(VkError::Io(e)))?;
        let target = self.service.get_upload_target(group_id).await.map_err(wrap)?;
        let descriptor = self
            .service
            .upload_bytes(&target, &file, bytes)
            .await
            .map_err(wrap)?;
        let saved = self
            .service
            .persist_asset(group_id, &descriptor)
            .await
            .map_err(wrap)?;

        let asset = UploadedAsset::from_saved(descriptor.server, &saved);
        debug!(file = %file, reference = %asset.reference(), "photo saved");
        Ok(asset)
    }
}
