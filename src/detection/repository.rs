//! Event Repository
//!
//! Database access layer for the `ai_events` table (migration 002)

use super::types::*;
use crate::error::{Error, Result};
use chrono::{Duration, Utc};
use sqlx::{MySql, MySqlPool, QueryBuilder};

/// Detection event repository
#[derive(Clone)]
pub struct EventRepository {
    pool: MySqlPool,
}

impl EventRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    const EVENT_COLUMNS: &'static str = r#"
        id, device_id, event_type, confidence,
        bbox_x, bbox_y, bbox_width, bbox_height,
        image_path, metadata, created_at
    "#;

    /// Insert an event, returns the stored row
    pub async fn insert(&self, req: &CreateEventRequest) -> Result<DetectionEvent> {
        req.validate()?;

        let metadata = req
            .metadata
            .clone()
            .unwrap_or_else(|| serde_json::json!({}));

        let result = sqlx::query(
            r#"
            INSERT INTO ai_events (
                device_id, event_type, confidence,
                bbox_x, bbox_y, bbox_width, bbox_height,
                image_path, metadata, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&req.device_id)
        .bind(&req.event_type)
        .bind(req.confidence)
        .bind(req.bbox_x)
        .bind(req.bbox_y)
        .bind(req.bbox_width)
        .bind(req.bbox_height)
        .bind(&req.image_path)
        .bind(&metadata)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_id() as i64;
        self.get(id)
            .await?
            .ok_or_else(|| Error::Database(format!("Inserted event {} not readable", id)))
    }

    pub async fn get(&self, id: i64) -> Result<Option<DetectionEvent>> {
        let query = format!("SELECT {} FROM ai_events WHERE id = ?", Self::EVENT_COLUMNS);
        let event = sqlx::query_as::<_, DetectionEvent>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(event)
    }

    /// Filtered page of events, newest first
    pub async fn list(&self, query: &EventQuery) -> Result<EventPage> {
        let mut count = QueryBuilder::<MySql>::new("SELECT COUNT(*) FROM ai_events WHERE 1=1");
        push_filters(&mut count, query);
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<MySql>::new(format!(
            "SELECT {} FROM ai_events WHERE 1=1",
            Self::EVENT_COLUMNS
        ));
        push_filters(&mut select, query);
        select
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(query.per_page())
            .push(" OFFSET ")
            .push_bind(query.offset());

        let events = select
            .build_query_as::<DetectionEvent>()
            .fetch_all(&self.pool)
            .await?;

        Ok(EventPage {
            events,
            pagination: Pagination::new(query.page(), query.per_page(), total),
        })
    }

    /// Events created today (UTC)
    pub async fn count_today(&self) -> Result<i64> {
        let today = Utc::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|t| t.and_utc())
            .unwrap_or_else(Utc::now);

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM ai_events WHERE created_at >= ? AND created_at < ?",
        )
        .bind(today)
        .bind(today + Duration::days(1))
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Event counts per type over the last 7 days
    pub async fn count_by_type(&self) -> Result<Vec<TypeCount>> {
        let since = Utc::now() - Duration::days(7);
        let counts = sqlx::query_as::<_, TypeCount>(
            r#"
            SELECT event_type, COUNT(*) AS count
            FROM ai_events
            WHERE created_at >= ?
            GROUP BY event_type
            ORDER BY count DESC, event_type
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(counts)
    }
}

fn push_filters(builder: &mut QueryBuilder<'_, MySql>, query: &EventQuery) {
    if let Some(device_id) = &query.device_id {
        builder.push(" AND device_id = ").push_bind(device_id.clone());
    }
    if let Some(event_type) = &query.event_type {
        builder.push(" AND event_type = ").push_bind(event_type.clone());
    }
    if let Some(start) = query.start_time {
        builder.push(" AND created_at >= ").push_bind(start);
    }
    if let Some(end) = query.end_time {
        builder.push(" AND created_at <= ").push_bind(end);
    }
}
