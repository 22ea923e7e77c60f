//! Device registry data types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Camera device entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Device {
    pub id: i64,
    /// Stable external identifier, immutable once assigned
    pub device_id: String,
    pub name: String,
    /// Stored as VARCHAR, converted via [`Device::protocol`]
    pub protocol: String,
    pub ip_address: String,
    pub port: i32,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    /// Stored as VARCHAR, converted via [`Device::status`]
    pub status: String,
    pub location: Option<String>,
    pub description: Option<String>,
    // === GB28181 ===
    pub gb_device_id: Option<String>,
    pub gb_channel_id: Option<String>,
    pub gb_manufacturer: Option<String>,
    pub gb_model: Option<String>,
    /// Explicit source URL, overrides protocol-based construction
    pub rtsp_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Device {
    /// Parsed protocol, `None` when the stored value is not recognised
    pub fn protocol(&self) -> Option<DeviceProtocol> {
        DeviceProtocol::parse(&self.protocol)
    }

    pub fn status(&self) -> DeviceStatus {
        DeviceStatus::parse(&self.status).unwrap_or(DeviceStatus::Offline)
    }

    pub fn is_online(&self) -> bool {
        self.status() == DeviceStatus::Online
    }

    /// Both username and password present and non-empty
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => Some((user, pass)),
            _ => None,
        }
    }
}

/// Camera signalling protocol
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeviceProtocol {
    Rtsp,
    Onvif,
    Gb28181,
}

impl DeviceProtocol {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "RTSP" => Some(Self::Rtsp),
            "ONVIF" => Some(Self::Onvif),
            "GB28181" => Some(Self::Gb28181),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rtsp => "RTSP",
            Self::Onvif => "ONVIF",
            Self::Gb28181 => "GB28181",
        }
    }
}

/// Device connectivity status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    Offline,
    Error,
}

impl DeviceStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "online" => Some(Self::Online),
            "offline" => Some(Self::Offline),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Error => "error",
        }
    }
}

fn default_protocol() -> String {
    "RTSP".to_string()
}

fn default_port() -> i32 {
    554
}

/// Create device request
#[derive(Debug, Clone, Deserialize)]
pub struct CreateDeviceRequest {
    /// Generated (UUIDv4) when omitted
    pub device_id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default)]
    pub ip_address: String,
    #[serde(default = "default_port")]
    pub port: i32,
    pub username: Option<String>,
    pub password: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub gb_device_id: Option<String>,
    pub gb_channel_id: Option<String>,
    pub gb_manufacturer: Option<String>,
    pub gb_model: Option<String>,
    pub rtsp_url: Option<String>,
}

/// Update device request (device_id is never updatable)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateDeviceRequest {
    pub name: Option<String>,
    pub protocol: Option<String>,
    pub ip_address: Option<String>,
    pub port: Option<i32>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub gb_device_id: Option<String>,
    pub gb_channel_id: Option<String>,
    pub gb_manufacturer: Option<String>,
    pub gb_model: Option<String>,
    pub rtsp_url: Option<String>,
}

/// Update status request
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

/// Device counts for the statistics endpoint
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeviceCounts {
    pub total: i64,
    pub online: i64,
    pub offline: i64,
}

#[cfg(test)]
pub(crate) fn test_device(device_id: &str, protocol: &str) -> Device {
    let now = Utc::now();
    Device {
        id: 1,
        device_id: device_id.to_string(),
        name: device_id.to_string(),
        protocol: protocol.to_string(),
        ip_address: "10.0.0.5".to_string(),
        port: 554,
        username: None,
        password: None,
        status: "online".to_string(),
        location: None,
        description: None,
        gb_device_id: None,
        gb_channel_id: None,
        gb_manufacturer: None,
        gb_model: None,
        rtsp_url: None,
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_parse() {
        assert_eq!(DeviceProtocol::parse("RTSP"), Some(DeviceProtocol::Rtsp));
        assert_eq!(DeviceProtocol::parse("onvif"), Some(DeviceProtocol::Onvif));
        assert_eq!(DeviceProtocol::parse("GB28181"), Some(DeviceProtocol::Gb28181));
        assert_eq!(DeviceProtocol::parse("SIP"), None);
    }

    #[test]
    fn test_credentials_require_both() {
        let mut device = test_device("cam1", "RTSP");
        assert!(device.credentials().is_none());

        device.username = Some("admin".into());
        assert!(device.credentials().is_none());

        device.password = Some(String::new());
        assert!(device.credentials().is_none());

        device.password = Some("secret".into());
        assert_eq!(device.credentials(), Some(("admin", "secret")));
    }

    #[test]
    fn test_unknown_status_is_offline() {
        let mut device = test_device("cam1", "RTSP");
        assert!(device.is_online());
        device.status = "rebooting".into();
        assert_eq!(device.status(), DeviceStatus::Offline);
    }

    #[test]
    fn test_password_not_serialized() {
        let mut device = test_device("cam1", "RTSP");
        device.password = Some("secret".into());
        let json = serde_json::to_value(&device).unwrap();
        assert!(json.get("password").is_none());
        assert_eq!(json["device_id"], "cam1");
    }
}
