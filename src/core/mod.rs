//! Daemon wiring: settings, builder and the running core.

mod builder;
mod daemon;
mod settings;

#[cfg(feature = "validation")]
mod validation;

pub use builder::ConfigdBuilder;
pub use daemon::Configd;
pub use settings::{ENV_PREFIX, ENV_SEPARATOR, Settings, SettingsLoader};

#[cfg(feature = "validation")]
pub use validation::Validate;
