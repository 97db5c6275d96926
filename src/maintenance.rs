//! Counting and bulk-deleting postponed posts. Independent of the posting
//! run: nothing here touches the persisted run state.
use std::sync::Arc;
use tracing::instrument;

use crate::config::EngineSettings;
use crate::error::EngineError;
use crate::events::{EventSink, TaskHandle};
use crate::vk::{PostSummary, VkError, VkService};

/// Page through the postponed listing. Stops on an empty or short page, so
/// 250 posts at page size 100 take three calls.
async fn enumerate_postponed(
    service: &dyn VkService,
    group_id: i64,
    settings: &EngineSettings,
) -> Result<Vec<PostSummary>, VkError> {
    let page_size = settings.page_size.max(1);
    let mut all = Vec::new();
    let mut offset = 0u32;
    loop {
        let page = service
            .list_scheduled_posts(group_id, offset, page_size)
            .await?;
        let len = page.len() as u32;
        all.extend(page);
        if len < page_size {
            break;
        }
        offset += len;
        tokio::time::sleep(settings.request_delay).await;
    }
    Ok(all)
}

#[instrument(skip(service, settings, sink))]
pub async fn count_postponed(
    service: &dyn VkService,
    group_id: i64,
    settings: &EngineSettings,
    sink: &EventSink,
) -> Result<u64, VkError> {
    let posts = enumerate_postponed(service, group_id, settings).await?;
    let total = posts.len() as u64;
    sink.info(format!("postponed posts: {}", total));
    Ok(total)
}

/// Delete every postponed post, one call each. A failed deletion is logged
/// and skipped. Returns the number of attempted deletions.
#[instrument(skip(service, settings, sink))]
pub async fn clear_postponed(
    service: &dyn VkService,
    group_id: i64,
    settings: &EngineSettings,
    sink: &EventSink,
) -> Result<u64, VkError> {
    let posts = enumerate_postponed(service, group_id, settings).await?;
    sink.info(format!("found {} postponed posts, deleting", posts.len()));

    let mut attempted = 0u64;
    let mut failed = 0u64;
    for post in &posts {
        attempted += 1;
        match service.delete_post(group_id, post.id).await {
            Ok(()) => sink.success(format!("deleted postponed post {}", post.id)),
            Err(source) => {
                failed += 1;
                let err = EngineError::Delete {
                    post_id: post.id,
                    source,
                };
                sink.error(err.to_string());
            }
        }
        tokio::time::sleep(settings.request_delay).await;
    }
    sink.info(format!(
        "cleanup done: {} attempted, {} failed",
        attempted, failed
    ));
    Ok(attempted)
}

/// Run [`count_postponed`] in the background; emits `Count` then `Finished`.
pub fn spawn_count(
    service: Arc<dyn VkService>,
    group_id: i64,
    settings: EngineSettings,
) -> TaskHandle<Option<u64>> {
    let (sink, events) = EventSink::channel();
    let task = tokio::spawn(async move {
        sink.info(format!("counting postponed posts of {}", group_id));
        let result = match count_postponed(service.as_ref(), group_id, &settings, &sink).await {
            Ok(total) => {
                sink.count(total);
                Some(total)
            }
            Err(err) => {
                sink.error(format!("could not list postponed posts: {}", err));
                None
            }
        };
        sink.finished();
        result
    });
    TaskHandle { events, task }
}

/// Run [`clear_postponed`] in the background; always ends with `Finished`.
pub fn spawn_clear(
    service: Arc<dyn VkService>,
    group_id: i64,
    settings: EngineSettings,
) -> TaskHandle<Option<u64>> {
    let (sink, events) = EventSink::channel();
    let task = tokio::spawn(async move {
        let result = match clear_postponed(service.as_ref(), group_id, &settings, &sink).await {
            Ok(attempted) => Some(attempted),
            Err(err) => {
                sink.error(format!("could not list postponed posts: {}", err));
                None
            }
        };
        sink.finished();
        result
    });
    TaskHandle { events, task }
}
