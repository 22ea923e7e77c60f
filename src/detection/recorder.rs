//! DetectionRecorder - crop save + event insert

use super::{CreateEventRequest, Detection, DetectionEvent, EventStore, Frame};
use crate::error::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

pub struct DetectionRecorder {
    image_root: PathBuf,
    store: Arc<dyn EventStore>,
}

impl DetectionRecorder {
    /// # Arguments
    /// * `image_root` - Crops go to `{image_root}/{device_id}/`
    /// * `store` - Event sink
    pub fn new(image_root: PathBuf, store: Arc<dyn EventStore>) -> Self {
        Self { image_root, store }
    }

    pub fn image_root(&self) -> &Path {
        &self.image_root
    }

    /// `{root}/{device_id}/{event_type}_{unix}_{n}.jpg`
    pub fn crop_path(&self, device_id: &str, event_type: &str, timestamp: i64, n: usize) -> PathBuf {
        self.image_root
            .join(device_id)
            .join(format!("{}_{}_{}.jpg", event_type, timestamp, n))
    }

    /// Save one image per detection and insert its event
    ///
    /// Without a crop from the analyzer the whole frame is stored. A failed
    /// save or insert skips that detection only.
    pub async fn record(&self, frame: &Frame, detections: &[Detection]) -> Result<Vec<DetectionEvent>> {
        if detections.is_empty() {
            return Ok(Vec::new());
        }

        fs::create_dir_all(self.image_root.join(&frame.device_id)).await?;
        let timestamp = frame.captured_at.timestamp();

        let mut events = Vec::with_capacity(detections.len());
        for (n, detection) in detections.iter().enumerate() {
            if !detection.event_type_is_safe() {
                tracing::warn!(
                    device_id = %frame.device_id,
                    event_type = %detection.event_type,
                    "Skipping detection with invalid event type"
                );
                continue;
            }
            let path = self.crop_path(&frame.device_id, &detection.event_type, timestamp, n);
            let image = detection.crop.as_deref().unwrap_or(&frame.jpeg);

            if let Err(e) = fs::write(&path, image).await {
                tracing::warn!(
                    device_id = %frame.device_id,
                    path = %path.display(),
                    error = %e,
                    "Failed to save detection image"
                );
                continue;
            }

            let req = CreateEventRequest::from_detection(
                &frame.device_id,
                detection,
                &path.to_string_lossy(),
                timestamp,
            );
            match self.store.insert_event(&req).await {
                Ok(event) => events.push(event),
                Err(e) => {
                    tracing::error!(
                        device_id = %frame.device_id,
                        event_type = %detection.event_type,
                        error = %e,
                        "Failed to record detection event"
                    );
                }
            }
        }

        tracing::info!(
            device_id = %frame.device_id,
            detected = detections.len(),
            recorded = events.len(),
            "Detections recorded"
        );
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::testing::MemoryEvents;
    use crate::detection::BoundingBox;
    use tempfile::TempDir;

    fn detection(event_type: &str, crop: Option<&[u8]>) -> Detection {
        Detection {
            event_type: event_type.to_string(),
            confidence: 0.9,
            bbox: BoundingBox {
                x: 1,
                y: 2,
                width: 3,
                height: 4,
            },
            crop: crop.map(|c| c.to_vec()),
        }
    }

    #[tokio::test]
    async fn test_record_saves_images_and_events() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryEvents::default());
        let recorder = DetectionRecorder::new(dir.path().to_path_buf(), store.clone());

        let frame = Frame::new("cam1", b"FULLFRAME".to_vec());
        let events = recorder
            .record(
                &frame,
                &[
                    detection("face_detection", Some(b"CROP")),
                    detection("person_detection", None),
                ],
            )
            .await
            .unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(store.events.lock().unwrap().len(), 2);

        let ts = frame.captured_at.timestamp();
        let face = recorder.crop_path("cam1", "face_detection", ts, 0);
        let person = recorder.crop_path("cam1", "person_detection", ts, 1);
        assert_eq!(std::fs::read(&face).unwrap(), b"CROP");
        assert_eq!(std::fs::read(&person).unwrap(), b"FULLFRAME");

        assert_eq!(events[0].image_path.as_deref(), Some(face.to_string_lossy().as_ref()));
        assert_eq!(events[0].bbox_height, Some(4));
        assert_eq!(events[0].metadata.as_ref().unwrap()["detection_time"], ts);
    }

    #[tokio::test]
    async fn test_invalid_detection_skipped() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryEvents::default());
        let recorder = DetectionRecorder::new(dir.path().to_path_buf(), store.clone());

        let mut bad = detection("face_detection", None);
        bad.confidence = 2.0;
        let frame = Frame::new("cam1", b"FULLFRAME".to_vec());

        let events = recorder
            .record(&frame, &[bad, detection("person_detection", None)])
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "person_detection");
    }

    #[tokio::test]
    async fn test_event_type_never_leaves_device_dir() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("detections");
        let store = Arc::new(MemoryEvents::default());
        let recorder = DetectionRecorder::new(root.clone(), store.clone());

        let frame = Frame::new("cam1", b"FULLFRAME".to_vec());
        let events = recorder
            .record(
                &frame,
                &[
                    detection("../../escaped", None),
                    detection("person_detection", None),
                ],
            )
            .await
            .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "person_detection");
        assert_eq!(store.events.lock().unwrap().len(), 1);
        let ts = frame.captured_at.timestamp();
        assert!(!dir.path().join(format!("escaped_{}_0.jpg", ts)).exists());
        assert_eq!(std::fs::read_dir(root.join("cam1")).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_nothing_to_record() {
        let dir = TempDir::new().unwrap();
        let recorder =
            DetectionRecorder::new(dir.path().join("none"), Arc::new(MemoryEvents::default()));
        let frame = Frame::new("cam1", Vec::new());
        assert!(recorder.record(&frame, &[]).await.unwrap().is_empty());
        assert!(!dir.path().join("none").exists());
    }
}
