use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Acquisition Error for channel '{channel}': {details}")]
    Acquisition { channel: String, details: String },

    #[error("Encoding Error: {0}")]
    Encoding(String),

    #[error("Retention Error: {0}")]
    Retention(String),

    #[error("Network Error: {0}")]
    Network(String),

    #[error("Media Processing Error: {0}")]
    Media(String),

    #[error("File I/O Error: {0}")]
    Io(String),

    #[error("OpenCV Error: {0}")]
    OpenCV(String),

    #[error("Worker Error: {0}")]
    Worker(String),

    // Not a failure: a blocking call gave up because shutdown was requested.
    #[error("Shutdown requested")]
    Shutdown,
}

impl AppError {
    pub fn is_shutdown(&self) -> bool {
        matches!(self, AppError::Shutdown)
    }
}

// Allow conversion from std::io::Error to AppError::Io
impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err.to_string())
    }
}

impl From<image::ImageError> for AppError {
    fn from(err: image::ImageError) -> Self {
        AppError::Media(err.to_string())
    }
}

#[cfg(feature = "opencv")]
impl From<opencv::Error> for AppError {
    fn from(err: opencv::Error) -> Self {
        AppError::OpenCV(err.to_string())
    }
}
