//! Transport-independent request handlers.
//!
//! [`ConfigApi`] serves the two operations a transport exposes: reading the
//! current text of a config and watching it for changes. A watch returns a
//! [`NotificationStream`] that the transport drives with an [`EventSink`].

mod handler;
mod stream;

pub use handler::ConfigApi;
pub use stream::{EventSink, Notification, NotificationStream};
