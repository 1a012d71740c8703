use thiserror::Error;

#[derive(Debug, Error)]
pub enum GrabError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Detection error: {0}")]
    Detection(String),

    #[error("Input error: {0}")]
    Input(String),

    #[error("Window error: {0}")]
    Window(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Control channel closed")]
    ChannelClosed,
}

impl GrabError {
    /// Capture and detection hiccups are expected while the target window
    /// moves or minimizes; the loop skips the cycle instead of reporting.
    pub fn is_transient(&self) -> bool {
        matches!(self, GrabError::Capture(_) | GrabError::Detection(_) | GrabError::Window(_))
    }
}

impl serde::Serialize for GrabError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type GrabResult<T> = Result<T, GrabError>;
