//! Camera discovery.

use std::collections::BTreeMap;

use nokhwa::utils::{ApiBackend, CameraIndex};

/// Index to human readable name for every camera the platform reports.
///
/// Enumeration failures are logged and produce an empty map.
pub fn available_cameras() -> BTreeMap<u32, String> {
    match nokhwa::query(ApiBackend::Auto) {
        Ok(devices) => {
            let cameras: BTreeMap<u32, String> = devices
                .into_iter()
                .filter_map(|info| match info.index() {
                    CameraIndex::Index(index) => Some((*index, info.human_name())),
                    CameraIndex::String(_) => None,
                })
                .collect();
            tracing::debug!("Found {} camera(s)", cameras.len());
            cameras
        }
        Err(e) => {
            tracing::warn!("Camera enumeration failed: {}", e);
            BTreeMap::new()
        }
    }
}
