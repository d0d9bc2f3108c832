//! Configuration change events.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::fmt;

/// The kind of change an [`Event`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventKind {
    /// A config appeared that the store did not know about.
    #[serde(rename = "CONFIG_CREATED")]
    Created,
    /// A known config changed content.
    #[serde(rename = "CONFIG_UPDATED")]
    Updated,
    /// A config was removed.
    #[serde(rename = "CONFIG_DELETED")]
    Deleted,
}

impl EventKind {
    /// Wire name of the kind.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CONFIG_CREATED",
            Self::Updated => "CONFIG_UPDATED",
            Self::Deleted => "CONFIG_DELETED",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A change notification for one config path.
///
/// Events carry no content; consumers fetch the current value separately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    kind: EventKind,
    path: String,
    created_at: DateTime<Utc>,
}

impl Event {
    /// Create an event stamped with the current time.
    pub fn new(kind: EventKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            created_at: Utc::now(),
        }
    }

    /// The kind of change.
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// The config path that changed.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// When the event was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] - {}: {}",
            self.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            self.kind,
            self.path
        )
    }
}
