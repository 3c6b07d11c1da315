use crate::errors::AppError;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    pub name: String, // Prefix of every segment file written for this channel
    pub uri: String,  // JPEG snapshot endpoint, e.g., http://cam/img.jpg
}

impl ChannelSpec {
    pub fn new(name: impl Into<String>, uri: impl Into<String>) -> Self {
        ChannelSpec { name: name.into(), uri: uri.into() }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.name.is_empty() {
            return Err(AppError::Config(format!("channel name cannot be empty (uri '{}')", self.uri)));
        }
        if self.name.contains(['/', '\\']) || self.name == "." || self.name == ".." {
            return Err(AppError::Config(format!(
                "channel name '{}' cannot contain path separators",
                self.name
            )));
        }
        if self.uri.is_empty() {
            return Err(AppError::Config(format!("uri for channel '{}' cannot be empty", self.name)));
        }
        Ok(())
    }
}

/// Parses a `name=uri` channel token. Splits at the first `=` so query strings survive.
pub fn parse_channel_token(token: &str) -> Result<ChannelSpec, AppError> {
    let (name, uri) = token.split_once('=').ok_or_else(|| {
        AppError::Config(format!("Invalid channel, expected name=uri - '{}'", token))
    })?;
    let spec = ChannelSpec::new(name.trim(), uri.trim());
    spec.validate()?;
    Ok(spec)
}
