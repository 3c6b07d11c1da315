use crate::camera::{Transport, TransportFactory};
use crate::channel_config::ChannelSpec;
use crate::errors::AppError;
use bytes::Bytes;
use log::debug;
use reqwest::blocking::Client;
use std::time::Duration;

/// Fetches JPEG snapshots over HTTP with a blocking reqwest client.
pub struct IpCameraDevice {
    pub name: String,
    client: Client,
}

impl IpCameraDevice {
    pub fn new(name: String) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Network(format!("Failed to build HTTP client for '{}': {}", name, e)))?;
        Ok(Self { name, client })
    }
}

impl Transport for IpCameraDevice {
    fn fetch(&self, uri: &str, timeout: Duration) -> Result<Bytes, AppError> {
        let response = self
            .client
            .get(uri)
            .timeout(timeout)
            .send()
            .map_err(|e| AppError::Network(format!("HTTP request to '{}' failed: {}", uri, e)))?;

        if !response.status().is_success() {
            return Err(AppError::Network(format!(
                "HTTP request to '{}' failed with status: {}",
                uri,
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .map_err(|e| AppError::Network(format!("Failed to read body from '{}': {}", uri, e)))?;
        debug!("IP Cam [{}]: Received {} bytes from HTTP.", self.name, bytes.len());
        Ok(bytes)
    }
}

/// Default factory: one reqwest client per channel.
pub struct HttpTransportFactory;

impl TransportFactory for HttpTransportFactory {
    fn create(&self, channel: &ChannelSpec) -> Result<Box<dyn Transport>, AppError> {
        Ok(Box::new(IpCameraDevice::new(channel.name.clone())?))
    }
}
