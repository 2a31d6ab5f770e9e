use crate::error::{AdbResult, AdbServerError};
use async_trait::async_trait;

/// Opaque handle to "the selected device". The concrete transport and
/// device manager are external collaborators, out of scope for this
/// crate; a session only ever sees this serial-shaped token once resolved.
pub type DeviceHandle = String;

/// What `Session::selected_device` asks of the embedder: turn an optional
/// requested serial into a concrete device handle, or fail if none exists /
/// the requested one isn't present.
#[async_trait]
pub trait DeviceManager: Send + Sync {
    async fn resolve(&self, serial: Option<&str>) -> AdbResult<DeviceHandle>;
}

/// Default manager for the "one preselected device" world this server
/// targets: it has exactly one known serial and trusts any request for it
/// (or for no serial in particular).
pub struct SingleDeviceManager {
    serial: String,
}

impl SingleDeviceManager {
    pub fn new(serial: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
        }
    }
}

#[async_trait]
impl DeviceManager for SingleDeviceManager {
    async fn resolve(&self, serial: Option<&str>) -> AdbResult<DeviceHandle> {
        match serial {
            Some(requested) if requested != self.serial => Err(AdbServerError::Handler(
                format!("device not found: {requested}"),
            )),
            _ => Ok(self.serial.clone()),
        }
    }
}
