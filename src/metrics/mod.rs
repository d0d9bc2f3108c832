//! Built-in metrics for change detection and delivery.
//!
//! Provides OpenTelemetry metrics tracking:
//! - Routed filesystem events and routing failures
//! - Routing duration
//! - Published events by kind
//! - Active subscriptions
//! - Time since the last content change
//!
//! # Examples
//!
//! ```rust,no_run
//! use confwatch::prelude::*;
//! use confwatch::metrics::WatchMetrics;
//! use opentelemetry::global;
//!
//! # async fn example() -> Result<()> {
//! let metrics = WatchMetrics::new(global::meter("confwatch"));
//!
//! let daemon = Configd::builder()
//!     .with_root("/etc/myapp")
//!     .with_metrics(metrics)
//!     .start()
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod watch_metrics;

pub use watch_metrics::WatchMetrics;
