use chrono::Utc;
use tracing::debug;

use crate::model::ClockSource;
use crate::vk::VkService;

/// Single attempt at the server clock, falling back to local wall time.
pub async fn reconcile(service: &dyn VkService) -> (i64, ClockSource) {
    match service.get_server_time().await {
        Ok(ts) => (ts, ClockSource::Remote),
        Err(err) => {
            debug!(?err, "server time unavailable");
            (Utc::now().timestamp(), ClockSource::Local)
        }
    }
}
