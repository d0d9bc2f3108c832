//! Daemon settings and their loading.

use crate::error::{Result, WatchError};
use crate::kv::StoreKind;
use crate::pubsub::{BusKind, OverflowPolicy};
use config::{Environment, File, Map};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[cfg(feature = "validation")]
use crate::core::Validate;
#[cfg(feature = "validation")]
use crate::error::ValidationError;

/// Prefix of environment variables overriding settings.
pub const ENV_PREFIX: &str = "CONFWATCH";

/// Separator for nested keys in environment variables.
pub const ENV_SEPARATOR: &str = "__";

/// Settings of a `confwatchd` instance.
///
/// Every field has a default, so an empty source is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Root of the watched tree.
    pub root_folder: PathBuf,
    /// Period of the tree walker in milliseconds.
    pub walk_interval_ms: u64,
    /// Delay before reading a file after a native event, in milliseconds.
    pub settle_ms: u64,
    /// Content store backend.
    pub store: String,
    /// Topic bus backend.
    pub bus: String,
    /// Length of each subscriber's queue.
    pub queue_capacity: usize,
    /// What happens when a subscriber's queue is full.
    pub overflow_policy: String,
    /// Log at debug level.
    pub debug: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            root_folder: PathBuf::from("./"),
            walk_interval_ms: 5000,
            settle_ms: 50,
            store: StoreKind::InMemory.to_string(),
            bus: BusKind::InMemory.to_string(),
            queue_capacity: 64,
            overflow_policy: OverflowPolicy::DropOldest.to_string(),
            debug: false,
        }
    }
}

impl Settings {
    /// Start a loader with the standard environment prefix.
    pub fn loader() -> SettingsLoader {
        SettingsLoader::new()
    }

    /// Load settings from an optional file and the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Settings`] if the file cannot be read, a value has
    /// the wrong type, or the result fails validation.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut loader = Self::loader();
        if let Some(file) = file {
            loader = loader.with_file(file);
        }
        loader.load()
    }

    /// Walker period.
    pub fn walk_interval(&self) -> Duration {
        Duration::from_millis(self.walk_interval_ms)
    }

    /// Settle delay for native events.
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// Parsed content store backend.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::NotImplemented`] for an unknown backend name.
    pub fn store_kind(&self) -> Result<StoreKind> {
        self.store.parse()
    }

    /// Parsed topic bus backend.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::NotImplemented`] for an unknown backend name.
    pub fn bus_kind(&self) -> Result<BusKind> {
        self.bus.parse()
    }

    /// Parsed overflow policy.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Settings`] for an unknown policy name.
    pub fn overflow_policy(&self) -> Result<OverflowPolicy> {
        self.overflow_policy.parse()
    }
}

#[cfg(feature = "validation")]
impl Validate for Settings {
    fn validate(&self) -> std::result::Result<(), ValidationError> {
        let mut errors = Vec::new();
        if self.walk_interval_ms == 0 {
            errors.push(ValidationError::invalid_field(
                "walk_interval_ms",
                "must be greater than 0",
            ));
        }
        if self.queue_capacity == 0 {
            errors.push(ValidationError::invalid_field(
                "queue_capacity",
                "must be greater than 0",
            ));
        }
        if let Err(e) = self.store_kind() {
            errors.push(ValidationError::invalid_field("store", e.to_string()));
        }
        if let Err(e) = self.bus_kind() {
            errors.push(ValidationError::invalid_field("bus", e.to_string()));
        }
        if let Err(e) = self.overflow_policy() {
            errors.push(ValidationError::invalid_field("overflow_policy", e.to_string()));
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ValidationError::Multiple(errors)),
        }
    }
}

/// Layers defaults, an optional file and environment variables into [`Settings`].
///
/// Later layers win: a file value replaces the default, an environment
/// variable replaces the file value.
///
/// # Examples
///
/// ```rust,no_run
/// use confwatch::core::Settings;
///
/// # fn example() -> confwatch::error::Result<()> {
/// // CONFWATCH_ROOT_FOLDER=/etc/myapp overrides root_folder from the file
/// let settings = Settings::loader()
///     .with_file("/etc/confwatchd.yaml")
///     .load()?;
/// println!("watching {}", settings.root_folder.display());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SettingsLoader {
    file: Option<PathBuf>,
    env_prefix: String,
    env_vars: Option<Map<String, String>>,
    #[cfg_attr(not(feature = "validation"), allow(dead_code))]
    validate: bool,
}

impl SettingsLoader {
    /// Create a loader reading `CONFWATCH_*` variables.
    pub fn new() -> Self {
        Self {
            file: None,
            env_prefix: ENV_PREFIX.to_string(),
            env_vars: None,
            validate: true,
        }
    }

    /// Read a YAML, TOML or JSON file, detected from its extension.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Use a different environment variable prefix.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Read environment variables from `vars` instead of the process.
    pub fn with_env_vars(mut self, vars: Map<String, String>) -> Self {
        self.env_vars = Some(vars);
        self
    }

    /// Return the merged settings without validating them.
    ///
    /// For callers that apply further overrides (command-line flags) and
    /// validate the final result themselves.
    pub fn without_validation(mut self) -> Self {
        self.validate = false;
        self
    }

    /// Build the settings.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Settings`] if the file is missing or has an
    /// unsupported extension, if a value cannot be deserialized, or if the
    /// result fails validation (unless disabled with
    /// [`without_validation`](Self::without_validation)).
    pub fn load(&self) -> Result<Settings> {
        let mut builder = config::Config::builder();

        if let Some(path) = &self.file {
            check_extension(path)?;
            builder = builder.add_source(File::from(path.as_path()).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator(ENV_SEPARATOR)
                .try_parsing(true)
                .source(self.env_vars.clone()),
        );

        let settings: Settings = builder
            .build()
            .map_err(|e| WatchError::Settings(format!("Failed to load settings: {}", e)))?
            .try_deserialize()
            .map_err(|e| WatchError::Settings(format!("Failed to deserialize settings: {}", e)))?;

        #[cfg(feature = "validation")]
        if self.validate {
            settings.validate()?;
        }

        Ok(settings)
    }
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn check_extension(path: &Path) -> Result<()> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml" | "yml" | "toml" | "json") => Ok(()),
        Some(ext) => Err(WatchError::Settings(format!(
            "Unsupported settings file extension: {}. Supported: .yaml, .yml, .toml, .json",
            ext
        ))),
        None => Err(WatchError::Settings(format!(
            "Unable to determine settings file format for: {}",
            path.display()
        ))),
    }
}
