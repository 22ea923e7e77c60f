//! Detection types

use crate::device_registry::DeviceCounts;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default analysis kinds when a request names none
pub const DEFAULT_KINDS: [&str; 2] = ["face_detection", "person_detection"];

/// Default events per page
pub const DEFAULT_PER_PAGE: u32 = 20;
/// Upper bound for per_page
pub const MAX_PER_PAGE: u32 = 100;

/// Pixel rectangle in source frame coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// One analyzer hit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub event_type: String,
    pub confidence: f64,
    pub bbox: BoundingBox,
    /// Cropped region as JPEG, when the analyzer produced one
    #[serde(skip)]
    pub crop: Option<Vec<u8>>,
}

impl Detection {
    pub fn confidence_in_range(&self) -> bool {
        (0.0..=1.0).contains(&self.confidence)
    }

    /// Event type usable as a file name part: `[A-Za-z0-9_-]+`
    pub fn event_type_is_safe(&self) -> bool {
        !self.event_type.is_empty()
            && self
                .event_type
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    }
}

/// A captured JPEG frame handed to analyzers
#[derive(Debug, Clone)]
pub struct Frame {
    pub device_id: String,
    pub jpeg: Vec<u8>,
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(device_id: &str, jpeg: Vec<u8>) -> Self {
        Self {
            device_id: device_id.to_string(),
            jpeg,
            captured_at: Utc::now(),
        }
    }
}

/// Registered analyzer descriptor (GET /ai/models)
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub name: String,
    pub kind: String,
    #[serde(rename = "type")]
    pub model_type: String,
    pub status: String,
}

/// Persisted detection event (`ai_events`)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DetectionEvent {
    pub id: i64,
    pub device_id: String,
    pub event_type: String,
    pub confidence: f64,
    pub bbox_x: Option<i32>,
    pub bbox_y: Option<i32>,
    pub bbox_width: Option<i32>,
    pub bbox_height: Option<i32>,
    pub image_path: Option<String>,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// Create event request (POST /events, also built by the recorder)
#[derive(Debug, Clone, Deserialize)]
pub struct CreateEventRequest {
    pub device_id: String,
    pub event_type: String,
    #[serde(default)]
    pub confidence: f64,
    pub bbox_x: Option<i32>,
    pub bbox_y: Option<i32>,
    pub bbox_width: Option<i32>,
    pub bbox_height: Option<i32>,
    pub image_path: Option<String>,
    pub metadata: Option<Value>,
}

impl CreateEventRequest {
    pub fn validate(&self) -> Result<()> {
        if self.device_id.trim().is_empty() {
            return Err(Error::Validation("device_id is required".to_string()));
        }
        if self.event_type.trim().is_empty() {
            return Err(Error::Validation("event_type is required".to_string()));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(Error::Validation(format!(
                "confidence must be within [0, 1], got {}",
                self.confidence
            )));
        }
        Ok(())
    }

    /// Event for one detection saved at `image_path`
    pub fn from_detection(
        device_id: &str,
        detection: &Detection,
        image_path: &str,
        detection_time: i64,
    ) -> Self {
        Self {
            device_id: device_id.to_string(),
            event_type: detection.event_type.clone(),
            confidence: detection.confidence,
            bbox_x: Some(detection.bbox.x),
            bbox_y: Some(detection.bbox.y),
            bbox_width: Some(detection.bbox.width),
            bbox_height: Some(detection.bbox.height),
            image_path: Some(image_path.to_string()),
            metadata: Some(serde_json::json!({ "detection_time": detection_time })),
        }
    }
}

/// Event list filters (GET /events query string)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventQuery {
    pub device_id: Option<String>,
    pub event_type: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl EventQuery {
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE)
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page() - 1) * u64::from(self.per_page())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
    pub pages: i64,
}

impl Pagination {
    pub fn new(page: u32, per_page: u32, total: i64) -> Self {
        let per = i64::from(per_page.max(1));
        Self {
            page,
            per_page,
            total,
            pages: (total + per - 1) / per,
        }
    }
}

/// One page of events
#[derive(Debug, Clone, Serialize)]
pub struct EventPage {
    pub events: Vec<DetectionEvent>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TypeCount {
    #[serde(rename = "type")]
    pub event_type: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventCounts {
    pub today: i64,
    /// Last 7 days
    pub by_type: Vec<TypeCount>,
}

/// GET /statistics payload
#[derive(Debug, Clone, Serialize)]
pub struct Statistics {
    pub devices: DeviceCounts,
    pub events: EventCounts,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(confidence: f64) -> CreateEventRequest {
        CreateEventRequest {
            device_id: "cam1".to_string(),
            event_type: "person_detection".to_string(),
            confidence,
            bbox_x: None,
            bbox_y: None,
            bbox_width: None,
            bbox_height: None,
            image_path: None,
            metadata: None,
        }
    }

    #[test]
    fn test_event_request_validation() {
        assert!(request(0.0).validate().is_ok());
        assert!(request(1.0).validate().is_ok());
        assert!(request(1.2).validate().is_err());
        assert!(request(-0.1).validate().is_err());

        let mut blank = request(0.5);
        blank.device_id = " ".to_string();
        assert!(matches!(blank.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_query_paging() {
        let query = EventQuery::default();
        assert_eq!(query.page(), 1);
        assert_eq!(query.per_page(), DEFAULT_PER_PAGE);
        assert_eq!(query.offset(), 0);

        let query = EventQuery {
            page: Some(3),
            per_page: Some(500),
            ..Default::default()
        };
        assert_eq!(query.per_page(), MAX_PER_PAGE);
        assert_eq!(query.offset(), 200);

        let query = EventQuery {
            page: Some(0),
            per_page: Some(0),
            ..Default::default()
        };
        assert_eq!(query.page(), 1);
        assert_eq!(query.per_page(), 1);
    }

    #[test]
    fn test_pagination_pages() {
        assert_eq!(Pagination::new(1, 20, 0).pages, 0);
        assert_eq!(Pagination::new(1, 20, 20).pages, 1);
        assert_eq!(Pagination::new(1, 20, 21).pages, 2);
    }

    #[test]
    fn test_event_from_detection() {
        let detection = Detection {
            event_type: "face_detection".to_string(),
            confidence: 0.8,
            bbox: BoundingBox {
                x: 10,
                y: 20,
                width: 30,
                height: 40,
            },
            crop: None,
        };
        let req = CreateEventRequest::from_detection("cam1", &detection, "/tmp/x.jpg", 1700000000);
        assert_eq!(req.bbox_width, Some(30));
        assert_eq!(req.metadata.unwrap()["detection_time"], 1700000000);
        assert!(detection.confidence_in_range());
        assert!(detection.event_type_is_safe());
    }

    #[test]
    fn test_event_type_safety() {
        let mut detection = Detection {
            event_type: "person-detection_2".to_string(),
            confidence: 0.5,
            bbox: BoundingBox::default(),
            crop: None,
        };
        assert!(detection.event_type_is_safe());

        for bad in ["", "../../x", "a/b", "a\\b", ".hidden", "face detection"] {
            detection.event_type = bad.to_string();
            assert!(!detection.event_type_is_safe(), "{:?}", bad);
        }
    }
}
