//! Device Repository
//!
//! Database access layer for the `devices` table (migration 001)

use super::types::*;
use crate::error::{Error, Result};
use sqlx::MySqlPool;

/// Device repository for database operations
#[derive(Clone)]
pub struct DeviceRepository {
    pool: MySqlPool,
}

impl DeviceRepository {
    /// Create new repository
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    const DEVICE_COLUMNS: &'static str = r#"
        id, device_id, name, protocol, ip_address, port,
        username, password, status, location, description,
        gb_device_id, gb_channel_id, gb_manufacturer, gb_model,
        rtsp_url, created_at, updated_at
    "#;

    /// Get all devices
    pub async fn list(&self) -> Result<Vec<Device>> {
        let query = format!("SELECT {} FROM devices ORDER BY id", Self::DEVICE_COLUMNS);
        let devices = sqlx::query_as::<_, Device>(&query)
            .fetch_all(&self.pool)
            .await?;

        Ok(devices)
    }

    /// Get device by external identifier
    pub async fn get(&self, device_id: &str) -> Result<Option<Device>> {
        let query = format!(
            "SELECT {} FROM devices WHERE device_id = ?",
            Self::DEVICE_COLUMNS
        );
        let device = sqlx::query_as::<_, Device>(&query)
            .bind(device_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(device)
    }

    /// Create device
    ///
    /// Caller resolves the identifier (request value or generated UUID).
    pub async fn create(&self, device_id: &str, req: &CreateDeviceRequest) -> Result<Device> {
        if self.get(device_id).await?.is_some() {
            return Err(Error::Conflict(format!("Device ID already exists: {}", device_id)));
        }

        let now = chrono::Utc::now();

        sqlx::query(
            r#"
            INSERT INTO devices (
                device_id, name, protocol, ip_address, port,
                username, password, status, location, description,
                gb_device_id, gb_channel_id, gb_manufacturer, gb_model,
                rtsp_url, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, 'offline', ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(device_id)
        .bind(&req.name)
        .bind(&req.protocol)
        .bind(&req.ip_address)
        .bind(req.port)
        .bind(&req.username)
        .bind(&req.password)
        .bind(&req.location)
        .bind(&req.description)
        .bind(&req.gb_device_id)
        .bind(&req.gb_channel_id)
        .bind(&req.gb_manufacturer)
        .bind(&req.gb_model)
        .bind(&req.rtsp_url)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get(device_id)
            .await?
            .ok_or(Error::NotFound("Device not found after insert".to_string()))
    }

    /// Update device - only fields present in the request are written
    pub async fn update(&self, device_id: &str, req: &UpdateDeviceRequest) -> Result<Device> {
        let mut device = self
            .get(device_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Device not found: {}", device_id)))?;

        if let Some(v) = &req.name {
            device.name = v.clone();
        }
        if let Some(v) = &req.protocol {
            device.protocol = v.clone();
        }
        if let Some(v) = &req.ip_address {
            device.ip_address = v.clone();
        }
        if let Some(v) = req.port {
            device.port = v;
        }
        if req.username.is_some() {
            device.username = req.username.clone();
        }
        if req.password.is_some() {
            device.password = req.password.clone();
        }
        if req.location.is_some() {
            device.location = req.location.clone();
        }
        if req.description.is_some() {
            device.description = req.description.clone();
        }
        if req.gb_device_id.is_some() {
            device.gb_device_id = req.gb_device_id.clone();
        }
        if req.gb_channel_id.is_some() {
            device.gb_channel_id = req.gb_channel_id.clone();
        }
        if req.gb_manufacturer.is_some() {
            device.gb_manufacturer = req.gb_manufacturer.clone();
        }
        if req.gb_model.is_some() {
            device.gb_model = req.gb_model.clone();
        }
        if req.rtsp_url.is_some() {
            device.rtsp_url = req.rtsp_url.clone();
        }

        sqlx::query(
            r#"
            UPDATE devices SET
                name = ?, protocol = ?, ip_address = ?, port = ?,
                username = ?, password = ?, location = ?, description = ?,
                gb_device_id = ?, gb_channel_id = ?, gb_manufacturer = ?, gb_model = ?,
                rtsp_url = ?, updated_at = ?
            WHERE device_id = ?
            "#,
        )
        .bind(&device.name)
        .bind(&device.protocol)
        .bind(&device.ip_address)
        .bind(device.port)
        .bind(&device.username)
        .bind(&device.password)
        .bind(&device.location)
        .bind(&device.description)
        .bind(&device.gb_device_id)
        .bind(&device.gb_channel_id)
        .bind(&device.gb_manufacturer)
        .bind(&device.gb_model)
        .bind(&device.rtsp_url)
        .bind(chrono::Utc::now())
        .bind(device_id)
        .execute(&self.pool)
        .await?;

        self.get(device_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Device not found: {}", device_id)))
    }

    /// Update device status
    pub async fn update_status(&self, device_id: &str, status: DeviceStatus) -> Result<Device> {
        let result = sqlx::query("UPDATE devices SET status = ?, updated_at = ? WHERE device_id = ?")
            .bind(status.as_str())
            .bind(chrono::Utc::now())
            .bind(device_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Device not found: {}", device_id)));
        }

        self.get(device_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Device not found: {}", device_id)))
    }

    /// Delete device
    pub async fn delete(&self, device_id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM devices WHERE device_id = ?")
            .bind(device_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Device not found: {}", device_id)));
        }

        Ok(())
    }

    /// Device counts by status
    pub async fn counts(&self) -> Result<DeviceCounts> {
        let (total, online, offline): (i64, Option<i64>, Option<i64>) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                CAST(SUM(status = 'online') AS SIGNED),
                CAST(SUM(status = 'offline') AS SIGNED)
            FROM devices
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(DeviceCounts {
            total,
            online: online.unwrap_or(0),
            offline: offline.unwrap_or(0),
        })
    }
}
