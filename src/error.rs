//! Error types for confwatch.

use std::fmt;

/// Result type alias for confwatch operations.
pub type Result<T> = std::result::Result<T, WatchError>;

/// Errors that can occur while watching, storing or distributing configuration.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// The requested path has no stored value.
    #[error("[KEY_NOT_FOUND_ERROR] Key {path} not found in store")]
    NotFound {
        /// The config path that was looked up
        path: String,
    },

    /// A subscribe or unsubscribe referenced a topic that does not exist.
    #[error("[NO_SUCH_TOPIC_ERROR] Topic {topic} does not exist")]
    NoSuchTopic {
        /// The topic that was referenced
        topic: String,
    },

    /// Compressing or decompressing a stored payload failed.
    #[error("[COMPRESSION_ERROR] payload codec failed: {0}")]
    Compression(String),

    /// An unsupported backend kind was requested.
    #[error("[NOT_IMPLEMENTED_ERROR] {kind} is not a supported implementation of {component}")]
    NotImplemented {
        /// Which capability was being built ("store" or "bus")
        component: &'static str,
        /// The backend name that was requested
        kind: String,
    },

    /// File watching failed to initialize or to register a path.
    #[error("File watching error: {0}")]
    Watch(String),

    /// The outbound transport rejected a notification.
    #[error("Notification delivery failed: {0}")]
    Delivery(String),

    /// Settings could not be loaded or failed validation.
    #[error("Invalid settings: {0}")]
    Settings(String),

    /// IO error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WatchError {
    /// Create a not-found error for `path`.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Create a no-such-topic error for `topic`.
    pub fn no_such_topic(topic: impl Into<String>) -> Self {
        Self::NoSuchTopic {
            topic: topic.into(),
        }
    }

    /// Returns `true` if this is a [`WatchError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if this is a [`WatchError::NoSuchTopic`].
    pub fn is_no_such_topic(&self) -> bool {
        matches!(self, Self::NoSuchTopic { .. })
    }
}

/// Validation error for daemon settings.
#[derive(Debug)]
pub enum ValidationError {
    /// Custom validation error with a message.
    Custom(String),

    /// A specific field has an invalid value.
    InvalidField {
        /// The field name
        field: String,
        /// The reason why it's invalid
        reason: String,
    },

    /// Multiple validation errors occurred.
    Multiple(Vec<ValidationError>),
}

impl ValidationError {
    /// Create a custom validation error.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Create an invalid field error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom(msg) => write!(f, "{}", msg),
            Self::InvalidField { field, reason } => {
                write!(f, "Field '{}' is invalid: {}", field, reason)
            }
            Self::Multiple(errors) => {
                writeln!(f, "Multiple validation errors:")?;
                for (i, err) in errors.iter().enumerate() {
                    writeln!(f, "  {}. {}", i + 1, err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for WatchError {
    fn from(err: ValidationError) -> Self {
        WatchError::Settings(err.to_string())
    }
}
