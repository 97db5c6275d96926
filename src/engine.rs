//! The posting run: discover, batch, upload, plan, publish, repeat.
//!
//! A run executes on one background tokio task. Batches go strictly in index
//! order; only the uploads inside a batch fan out. The pause gate is checked
//! before each batch, never mid-batch, so a batch either completes upload and
//! publish or the task is torn down.
use chrono::Utc;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

use crate::batcher;
use crate::clock;
use crate::config::EngineSettings;
use crate::error::EngineError;
use crate::events::{EngineEvent, EventSink, TaskHandle};
use crate::model::{ClockSource, PlanOutcome, RunParameters, RunReport};
use crate::pause::{PauseGate, PauseState};
use crate::publish::{compose_message, format_timestamp, PostPublisher};
use crate::schedule::plan_time;
use crate::state::StateStore;
use crate::upload::UploadCoordinator;
use crate::vk::VkService;

pub struct PosterEngine {
    params: RunParameters,
    service: Arc<dyn VkService>,
    settings: EngineSettings,
    store: StateStore,
    gate: PauseGate,
    cancel: CancellationToken,
}

impl PosterEngine {
    /// Configuration problems are reported here, before anything touches the network.
    pub fn new(
        params: RunParameters,
        service: Arc<dyn VkService>,
        settings: EngineSettings,
        store: StateStore,
    ) -> Result<Self, EngineError> {
        params.validate()?;
        if settings.upload_workers == 0 {
            return Err(EngineError::invalid("upload worker count must be > 0"));
        }
        if settings.grace_seconds <= 0 {
            return Err(EngineError::invalid("grace offset must be > 0"));
        }
        Ok(Self {
            params,
            service,
            settings,
            store,
            gate: PauseGate::new(),
            cancel: CancellationToken::new(),
        })
    }

    /// The gate can be toggled before `start`, e.g. to begin paused.
    pub fn pause_gate(&self) -> PauseGate {
        self.gate.clone()
    }

    pub fn start(self) -> EngineHandle {
        let (sink, events) = EventSink::channel();
        let gate = self.gate.clone();
        let cancel = self.cancel.clone();
        let task = tokio::spawn(self.run(sink));
        EngineHandle {
            inner: TaskHandle { events, task },
            gate,
            cancel,
        }
    }

    async fn run(self, sink: EventSink) -> RunReport {
        let report = match AssertUnwindSafe(self.run_batches(&sink))
            .catch_unwind()
            .await
        {
            Ok(report) => report,
            Err(_) => {
                sink.error("run stopped by an internal error");
                RunReport {
                    aborted: true,
                    ..RunReport::default()
                }
            }
        };
        sink.info(format!(
            "run finished: {} of {} posts scheduled, {} failed",
            report.posted, report.batches, report.failed
        ));
        sink.finished();
        report
    }

    async fn run_batches(&self, sink: &EventSink) -> RunReport {
        let params = &self.params;
        let mut report = RunReport::default();

        sink.info("connecting to the VK API...");
        match clock::reconcile(self.service.as_ref()).await {
            (ts, ClockSource::Remote) => {
                sink.info(format!("server time: {}", format_timestamp(ts)))
            }
            (ts, ClockSource::Local) => sink.warn(format!(
                "could not get server time; using local time {}",
                format_timestamp(ts)
            )),
        }

        let files = match batcher::discover_files(&params.source_dir).await {
            Ok(files) => files,
            Err(err) => {
                sink.error(format!(
                    "cannot read {}: {}",
                    params.source_dir.display(),
                    err
                ));
                report.aborted = true;
                return report;
            }
        };
        sink.info(format!("found {} images to publish", files.len()));

        let batches = match batcher::batch(&files, params.batch_size) {
            Ok(batches) => batches,
            Err(err) => {
                sink.error(err.to_string());
                report.aborted = true;
                return report;
            }
        };
        report.batches = batches.len();

        let uploader =
            UploadCoordinator::new(self.service.as_ref(), sink, self.settings.upload_workers);
        let mut publisher = PostPublisher::new(
            self.service.as_ref(),
            sink,
            &self.store,
            &params.token,
            params.group_id,
            params.batch_size,
        );

        for batch in &batches {
            if self.gate.is_paused() {
                sink.info(format!("paused before post #{}", batch.index));
            }
            if !self
                .gate
                .wait_until_running(self.settings.pause_poll, &self.cancel)
                .await
            {
                sink.warn(format!("run cancelled before post #{}", batch.index));
                report.aborted = true;
                break;
            }

            let assets = match uploader.upload_batch(batch, params.group_id).await {
                Ok(assets) => assets,
                Err(err) => {
                    report.failed += 1;
                    report.aborted = true;
                    sink.error(format!("{}; stopping the run", err));
                    break;
                }
            };
            if assets.is_empty() {
                sink.warn(format!(
                    "post #{}: no photo uploaded, scheduling it without attachments",
                    batch.index
                ));
            }

            let planned = plan_time(
                params.start_timestamp,
                batch.index,
                params.interval_seconds(),
                self.settings.grace_seconds,
                Utc::now().timestamp(),
            );
            let (publish_time, outcome) = match planned {
                Ok(planned) => planned,
                Err(err) => {
                    report.failed += 1;
                    report.aborted = true;
                    sink.error(format!("{}; stopping the run", err));
                    break;
                }
            };
            if let PlanOutcome::Corrected { original } = outcome {
                sink.warn(format!(
                    "post #{}: {} has already passed, moved to {}",
                    batch.index,
                    format_timestamp(original),
                    format_timestamp(publish_time)
                ));
            }

            let message = compose_message(
                &params.caption,
                params.randomize_suffix,
                &params.decorations,
                &mut rand::thread_rng(),
            );
            match publisher
                .publish(batch.index, &assets, &message, publish_time)
                .await
            {
                Ok(post_id) => {
                    report.last_publish_time = Some(publish_time);
                    sink.success(format!(
                        "post #{} scheduled for {} ({} photos, id {})",
                        batch.index,
                        format_timestamp(publish_time),
                        assets.len(),
                        post_id
                    ));
                }
                Err(err @ EngineError::ConnectionFailure(_)) => {
                    report.failed += 1;
                    report.aborted = true;
                    sink.error(format!("{}; stopping the run", err));
                    break;
                }
                Err(err) => {
                    report.failed += 1;
                    sink.error(err.to_string());
                }
            }

            if batch.index + 1 < batches.len() {
                tokio::time::sleep(self.settings.post_delay).await;
            }
        }

        report.posted = publisher.posted();
        report
    }
}

/// Caller side of a started run.
#[derive(Debug)]
pub struct EngineHandle {
    inner: TaskHandle<RunReport>,
    gate: PauseGate,
    cancel: CancellationToken,
}

impl EngineHandle {
    pub fn toggle_pause(&self) -> PauseState {
        self.gate.toggle()
    }

    pub fn pause_gate(&self) -> PauseGate {
        self.gate.clone()
    }

    /// Stop at the next batch boundary; the batch in flight still completes.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn next_event(&mut self) -> Option<EngineEvent> {
        self.inner.next_event().await
    }

    pub async fn join(self) -> Result<(RunReport, Vec<EngineEvent>), JoinError> {
        self.inner.join().await
    }
}
