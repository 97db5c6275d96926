//! Schedules a folder of images as postponed wall posts on a VK community.
pub mod batcher;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod maintenance;
pub mod model;
pub mod pause;
pub mod publish;
pub mod schedule;
pub mod state;
pub mod upload;
pub mod vk;

pub use engine::{EngineHandle, PosterEngine};
pub use error::EngineError;
pub use events::{EngineEvent, LogLevel, LogLine};
pub use model::RunParameters;
