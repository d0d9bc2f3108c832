//! # confwatch
//!
//! Watches a directory tree of configuration files, keeps the latest content of
//! every file in a content store and streams change notifications to
//! subscribers of individual config paths.
//!
//! ## Overview
//!
//! - A native watcher observes each directory of the tree, and a periodic
//!   walker registers new directories and picks up anything the watcher missed
//! - Content is stored compressed, keyed by its path relative to the root, and
//!   fingerprinted so rewrites with identical content publish nothing
//! - Each config path is a topic; subscribers get `CONFIG_CREATED`,
//!   `CONFIG_UPDATED` and `CONFIG_DELETED` events through bounded queues that
//!   never block the publisher
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use confwatch::prelude::*;
//!
//! # async fn example() -> Result<()> {
//! let daemon = Configd::builder()
//!     .with_root("/etc/myapp")
//!     .start()
//!     .await?;
//!
//! // Current content of /etc/myapp/app/db.toml
//! let text = daemon.api().get_config("app/db.toml")?;
//! println!("{}", text);
//!
//! // Follow changes
//! let stream = daemon.api().watch_config("app/db.toml")?;
//! let (mut tx, mut rx) = tokio::sync::mpsc::channel::<Notification>(16);
//! let cancel = daemon.shutdown_token();
//! tokio::spawn(async move { stream.run(&mut tx, cancel).await });
//!
//! while let Some(notification) = rx.recv().await {
//!     println!("{}", notification.event);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): the `confwatchd` binary
//! - `validation` (default): settings validation through [`core::Validate`]
//! - `metrics`: OpenTelemetry instruments for routing and fan-out

#![warn(missing_docs, rust_2024_compatibility)]
#![deny(unsafe_code)]

pub mod api;
pub mod core;
pub mod error;
pub mod fswatch;
pub mod kv;
pub mod pubsub;

#[cfg(feature = "metrics")]
pub mod metrics;

/// Convenient re-exports for common usage patterns.
pub mod prelude {
    pub use crate::api::{ConfigApi, EventSink, Notification, NotificationStream};
    pub use crate::core::{Configd, ConfigdBuilder, Settings};
    pub use crate::error::{Result, ValidationError, WatchError};
    pub use crate::kv::{ContentStore, StoreKind};
    pub use crate::pubsub::{BusKind, Event, EventKind, OverflowPolicy, TopicBus};

    #[cfg(feature = "validation")]
    pub use crate::core::Validate;
}
