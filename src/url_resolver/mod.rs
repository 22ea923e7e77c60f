//! UrlResolver - device record -> playable source URL
//!
//! Pure function, no I/O. GB28181 is reduced to a plain RTSP path on the
//! channel id; real GB28181 needs SIP signalling which is not done here.

use crate::device_registry::{Device, DeviceProtocol};

/// Resolve the source URL for a device
///
/// Returns `None` when no URL can be derived (unknown protocol, GB28181
/// without a channel id).
pub fn resolve(device: &Device) -> Option<String> {
    if let Some(url) = device.rtsp_url.as_deref() {
        if !url.trim().is_empty() {
            return Some(url.to_string());
        }
    }

    let host = &device.ip_address;
    let port = device.port;

    match device.protocol()? {
        DeviceProtocol::Rtsp => Some(format!("rtsp://{}{}:{}/stream", userinfo(device), host, port)),
        DeviceProtocol::Gb28181 => {
            let channel = device.gb_channel_id.as_deref().filter(|c| !c.is_empty())?;
            Some(format!("rtsp://{}:{}/{}", host, port, channel))
        }
        DeviceProtocol::Onvif => Some(format!("rtsp://{}{}:{}/onvif1", userinfo(device), host, port)),
    }
}

/// `user:pass@` when both credentials are present, empty otherwise
fn userinfo(device: &Device) -> String {
    match device.credentials() {
        Some((user, pass)) => format!("{}:{}@", user, pass),
        None => String::new(),
    }
}
