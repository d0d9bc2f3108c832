//! The running daemon core.

use crate::api::ConfigApi;
use crate::core::{ConfigdBuilder, Settings};
use crate::error::Result;
use crate::fswatch::FsWatcher;
use crate::kv::ContentStore;
use crate::pubsub::TopicBus;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Store, bus and change detector of one watched tree.
///
/// A transport serves [`Configd::api`] and stops its streams when
/// [`Configd::shutdown_token`] fires.
///
/// # Examples
///
/// ```rust,no_run
/// use confwatch::prelude::*;
///
/// # async fn example() -> Result<()> {
/// let settings = Settings::load(None)?;
/// let daemon = Configd::from_settings(&settings).await?;
///
/// let stream = daemon.api().watch_config("app/db.toml")?;
/// let (mut tx, mut rx) = tokio::sync::mpsc::channel::<Notification>(16);
/// let cancel = daemon.shutdown_token();
/// tokio::spawn(async move { stream.run(&mut tx, cancel).await });
///
/// while let Some(notification) = rx.recv().await {
///     println!("{}", notification.event);
/// }
/// daemon.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct Configd {
    api: ConfigApi,
    watcher: FsWatcher,
    cancel: CancellationToken,
}

impl Configd {
    pub(crate) fn new(api: ConfigApi, watcher: FsWatcher, cancel: CancellationToken) -> Self {
        Self {
            api,
            watcher,
            cancel,
        }
    }

    /// Create a builder.
    pub fn builder() -> ConfigdBuilder {
        ConfigdBuilder::new()
    }

    /// Start a daemon from loaded settings.
    ///
    /// # Errors
    ///
    /// Fails on unknown backend names, a missing root folder, or a native
    /// watcher that cannot be set up.
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        ConfigdBuilder::from_settings(settings)?.start().await
    }

    /// GetConfig and WatchConfig handlers.
    pub fn api(&self) -> &ConfigApi {
        &self.api
    }

    /// The content store.
    pub fn store(&self) -> &Arc<dyn ContentStore> {
        self.api.store()
    }

    /// The topic bus.
    pub fn bus(&self) -> &Arc<dyn TopicBus> {
        self.api.bus()
    }

    /// Canonical root of the watched tree.
    pub fn root(&self) -> &Path {
        self.watcher.root()
    }

    /// Token cancelled when the daemon shuts down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    /// Stop watching and wait for in-flight dispatches.
    ///
    /// Streams driven with [`shutdown_token`](Self::shutdown_token) end as well.
    pub async fn shutdown(&self) {
        self.watcher.shutdown().await;
    }
}
