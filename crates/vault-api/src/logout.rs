//! Session logout capability
//!
//! The client never decides what "logging out" means for the application. It
//! is handed a `LogoutHandler` at construction and calls it when the server
//! rejects the session. The channel implementation lets the application
//! react on its own task.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;
use tracing::warn;

/// Notification that the session has ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogoutEvent {
    /// True when the server rejected the tokens (as opposed to a user action)
    pub expired: bool,
}

/// Invoked once per detected authentication failure.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn LogoutHandler>`).
pub trait LogoutHandler: Send + Sync {
    fn logout(&self, expired: bool) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

impl LogoutHandler for mpsc::UnboundedSender<LogoutEvent> {
    fn logout(&self, expired: bool) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        if self.send(LogoutEvent { expired }).is_err() {
            warn!("logout receiver dropped, event discarded");
        }
        Box::pin(async {})
    }
}

/// Channel pair for wiring a client's logout events into the application.
pub fn channel() -> (
    mpsc::UnboundedSender<LogoutEvent>,
    mpsc::UnboundedReceiver<LogoutEvent>,
) {
    mpsc::unbounded_channel()
}
