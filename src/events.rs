//! Outbound event stream shared by the posting engine and maintenance actions.
//!
//! Callers receive operator-facing log lines plus a few discrete events over
//! an unbounded channel; every log line is mirrored to `tracing` as well.
use std::fmt;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Success,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub level: LogLevel,
    pub message: String,
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.level {
            LogLevel::Info => "[INFO]",
            LogLevel::Success => "[✓]",
            LogLevel::Warn => "[WARN]",
            LogLevel::Error => "[!]",
        };
        write!(f, "{} {}", tag, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Log(LogLine),
    /// A batch was scheduled at this publish time.
    Progress(i64),
    /// Result of `count_postponed`.
    Count(u64),
    /// Always the last event of a run or maintenance action.
    Finished,
}

/// Sending half of the event stream. A dropped receiver is not an error: the
/// run keeps going and only `tracing` sees the lines.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: UnboundedSender<EngineEvent>,
}

impl EventSink {
    pub fn channel() -> (Self, UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn log(&self, level: LogLevel, message: String) {
        match level {
            LogLevel::Info | LogLevel::Success => info!("{}", message),
            LogLevel::Warn => warn!("{}", message),
            LogLevel::Error => error!("{}", message),
        }
        let _ = self.tx.send(EngineEvent::Log(LogLine { level, message }));
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message.into());
    }

    pub fn success(&self, message: impl Into<String>) {
        self.log(LogLevel::Success, message.into());
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message.into());
    }

    pub fn progress(&self, publish_time: i64) {
        let _ = self.tx.send(EngineEvent::Progress(publish_time));
    }

    pub fn count(&self, total: u64) {
        let _ = self.tx.send(EngineEvent::Count(total));
    }

    pub fn finished(&self) {
        let _ = self.tx.send(EngineEvent::Finished);
    }
}

/// A background task plus its event stream.
#[derive(Debug)]
pub struct TaskHandle<T> {
    pub events: UnboundedReceiver<EngineEvent>,
    pub(crate) task: JoinHandle<T>,
}

impl<T> TaskHandle<T> {
    pub async fn next_event(&mut self) -> Option<EngineEvent> {
        self.events.recv().await
    }

    /// Wait for the task's result. Events still buffered stay readable.
    pub async fn join(self) -> Result<(T, Vec<EngineEvent>), tokio::task::JoinError> {
        let TaskHandle { mut events, task } = self;
        let out = task.await?;
        let mut rest = Vec::new();
        while let Ok(ev) = events.try_recv() {
            rest.push(ev);
        }
        Ok((out, rest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_lines_render_with_tags() {
        let line = LogLine {
            level: LogLevel::Warn,
            message: "server time unavailable".into(),
        };
        assert_eq!(line.to_string(), "[WARN] server time unavailable");
        let line = LogLine {
            level: LogLevel::Success,
            message: "post #0".into(),
        };
        assert_eq!(line.to_string(), "[✓] post #0");
    }

    #[tokio::test]
    async fn sink_forwards_in_order_and_survives_dropped_receiver() {
        let (sink, mut rx) = EventSink::channel();
        sink.info("one");
        sink.progress(10);
        sink.finished();
        assert!(matches!(rx.recv().await, Some(EngineEvent::Log(l)) if l.message == "one"));
        assert_eq!(rx.recv().await, Some(EngineEvent::Progress(10)));
        assert_eq!(rx.recv().await, Some(EngineEvent::Finished));
        drop(rx);
        sink.error("nobody listens");
    }
}
