//! Settings validation support.

use crate::error::ValidationError;

/// Checks applied to loaded settings before the daemon uses them.
///
/// [`Settings`](crate::core::Settings) implements this; a settings loader
/// rejects values that fail it.
///
/// # Examples
///
/// ```rust
/// use confwatch::core::{Settings, Validate};
///
/// let settings = Settings {
///     queue_capacity: 0,
///     ..Settings::default()
/// };
/// let err = settings.validate().unwrap_err();
/// assert!(err.to_string().contains("queue_capacity"));
/// ```
pub trait Validate {
    /// Validate the value.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` naming every field that failed.
    fn validate(&self) -> Result<(), ValidationError>;
}
