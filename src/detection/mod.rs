//! Detection - frame analysis and detection events
//!
//! ## Responsibilities
//!
//! - `FrameAnalyzer`: frame in, detections out. Decoding and models live
//!   behind the trait (remote inference service, tests, ...)
//! - `AnalysisEngine`: registered analyzers, runs the requested kinds
//! - `DetectionRecorder`: crop image save + event insert
//! - `EventRepository`: `ai_events` CRUD, listing and statistics

mod engine;
mod recorder;
mod remote;
mod repository;
mod types;

pub use engine::AnalysisEngine;
pub use recorder::DetectionRecorder;
pub use remote::RemoteAnalyzer;
pub use repository::EventRepository;
pub use types::*;

use crate::error::Result;
use async_trait::async_trait;

/// Frame-level detector
#[async_trait]
pub trait FrameAnalyzer: Send + Sync {
    /// Unique model name
    fn name(&self) -> &str;

    /// Event type this analyzer emits (e.g. `person_detection`)
    fn kind(&self) -> &str;

    /// Backend description for listings
    fn model_type(&self) -> &str;

    async fn analyze(&self, frame: &Frame) -> Result<Vec<Detection>>;
}

/// Sink for recorded events
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn insert_event(&self, req: &CreateEventRequest) -> Result<DetectionEvent>;
}

#[async_trait]
impl EventStore for EventRepository {
    async fn insert_event(&self, req: &CreateEventRequest) -> Result<DetectionEvent> {
        self.insert(req).await
    }
}
