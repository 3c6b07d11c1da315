pub mod frame_source;
pub mod ip_camera_device;

use crate::channel_config::ChannelSpec;
use crate::errors::AppError;
use bytes::Bytes;
use std::time::Duration;

/// Blocking snapshot fetch. Must return (with data or an error) within `timeout`.
pub trait Transport: Send {
    fn fetch(&self, uri: &str, timeout: Duration) -> Result<Bytes, AppError>;
}

/// Builds one transport per channel. Called on the channel's worker thread, so
/// blocking clients are created and dropped outside the async runtime.
pub trait TransportFactory: Send + Sync {
    fn create(&self, channel: &ChannelSpec) -> Result<Box<dyn Transport>, AppError>;
}
