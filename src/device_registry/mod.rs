//! DeviceRegistry - camera device records
//!
//! ## Responsibilities
//!
//! - Device CRUD (MySQL `devices` table)
//! - Device lookup for the stream manager via [`DeviceLookup`]
//!
//! The stream manager only ever needs "give me device X", so it depends on the
//! trait, not on the repository.

mod repository;
mod types;

pub use repository::DeviceRepository;
pub use types::*;

use crate::error::Result;
use async_trait::async_trait;

/// Device lookup by external identifier
#[async_trait]
pub trait DeviceLookup: Send + Sync {
    async fn find_device(&self, device_id: &str) -> Result<Option<Device>>;
}

#[async_trait]
impl DeviceLookup for DeviceRepository {
    async fn find_device(&self, device_id: &str) -> Result<Option<Device>> {
        self.get(device_id).await
    }
}

/// Pick the identifier for a new device: the requested one, or a fresh UUID
pub fn assign_device_id(requested: Option<&str>) -> String {
    match requested.map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => uuid::Uuid::new_v4().to_string(),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assign_device_id() {
        assert_eq!(assign_device_id(Some("cam1")), "cam1");

        let generated = assign_device_id(None);
        assert!(uuid::Uuid::parse_str(&generated).is_ok());

        let blank = assign_device_id(Some("  "));
        assert!(uuid::Uuid::parse_str(&blank).is_ok());
    }
}
