//! AnalysisEngine - registered analyzers

use super::{Detection, Frame, FrameAnalyzer, ModelInfo};
use std::sync::Arc;

/// Set of analyzers, selected per request by kind
#[derive(Default, Clone)]
pub struct AnalysisEngine {
    analyzers: Vec<Arc<dyn FrameAnalyzer>>,
}

impl AnalysisEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, analyzer: Arc<dyn FrameAnalyzer>) {
        tracing::info!(
            name = analyzer.name(),
            kind = analyzer.kind(),
            model_type = analyzer.model_type(),
            "Analyzer registered"
        );
        self.analyzers.push(analyzer);
    }

    pub fn is_empty(&self) -> bool {
        self.analyzers.is_empty()
    }

    /// Descriptors of every registered analyzer
    pub fn models(&self) -> Vec<ModelInfo> {
        self.analyzers
            .iter()
            .map(|a| ModelInfo {
                name: a.name().to_string(),
                kind: a.kind().to_string(),
                model_type: a.model_type().to_string(),
                status: "loaded".to_string(),
            })
            .collect()
    }

    /// Kinds some analyzer can produce
    pub fn supports(&self, kind: &str) -> bool {
        self.analyzers.iter().any(|a| a.kind() == kind)
    }

    /// Run every analyzer whose kind is in `kinds`
    ///
    /// A failing analyzer contributes nothing. Detections with a confidence
    /// outside [0, 1] or an event type unfit for a file name are dropped.
    pub async fn analyze(&self, frame: &Frame, kinds: &[String]) -> Vec<Detection> {
        let selected = self
            .analyzers
            .iter()
            .filter(|a| kinds.iter().any(|k| k == a.kind()));

        let results = futures::future::join_all(
            selected.map(|analyzer| async move { (analyzer, analyzer.analyze(frame).await) }),
        )
        .await;

        let mut detections = Vec::new();
        for (analyzer, result) in results {
            match result {
                Ok(found) => {
                    for mut detection in found {
                        if !detection.confidence_in_range() {
                            tracing::debug!(
                                analyzer = analyzer.name(),
                                confidence = detection.confidence,
                                "Dropping detection with out-of-range confidence"
                            );
                            continue;
                        }
                        if detection.event_type.is_empty() {
                            detection.event_type = analyzer.kind().to_string();
                        }
                        if !detection.event_type_is_safe() {
                            tracing::warn!(
                                analyzer = analyzer.name(),
                                event_type = %detection.event_type,
                                "Dropping detection with invalid event type"
                            );
                            continue;
                        }
                        detections.push(detection);
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        device_id = %frame.device_id,
                        analyzer = analyzer.name(),
                        error = %e,
                        "Analyzer failed"
                    );
                }
            }
        }
        detections
    }
}
