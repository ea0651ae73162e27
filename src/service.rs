//! Service contract
//!
//! A service is a dynamically loaded component driven through a fixed
//! lifecycle by the service manager:
//!
//! ```text
//!     (absent) ──init ok──▶ Initialized ──start ok──▶ Started
//!         │                      │                       │
//!         ◀──── init/start failure (record dropped) ─────┤ stop
//!                                                        ▼
//!                                                    (absent)
//! ```
//!
//! Failed init or start surfaces a [`Failure`](crate::manager::Failure) and
//! the record never enters (or leaves) the registry; a stopped record leaves
//! the registry whether or not its `stop` succeeded.

use std::sync::Arc;

use crate::communicator::Communicator;
use crate::properties::Properties;

/// Error type services report from lifecycle operations.
pub type ServiceError = Box<dyn std::error::Error + Send + Sync>;

/// The three-operation capability set every hosted service implements.
///
/// All three operations are invoked on the container's lifecycle task, one
/// service at a time. `start` and `stop` may block; the container imposes no
/// timeout.
pub trait Service: Send {
    /// Initialize the service with its composed configuration.
    ///
    /// `properties` is the service-scoped property view built by the
    /// container and `args` are the arguments left over after option
    /// parsing. The communicator handle is shared with the container; it is
    /// safe to keep for the lifetime of the service.
    fn init(
        &mut self,
        name: &str,
        communicator: Arc<Communicator>,
        properties: Properties,
        args: Vec<String>,
    ) -> Result<(), ServiceError>;

    /// Start the service. Called once, after every service has initialized.
    fn start(&mut self) -> Result<(), ServiceError>;

    /// Stop the service. Called once for every started service on shutdown.
    fn stop(&mut self) -> Result<(), ServiceError>;
}

/// C factory symbol exported by a service artifact.
///
/// The symbol receives a borrowed communicator handle and returns a heap
/// service, or null if construction failed. The container takes ownership of
/// the returned box. The double indirection keeps the returned pointer thin,
/// so the signature stays representable in the C ABI.
pub type RawServiceFactory =
    unsafe extern "C" fn(communicator: &Communicator) -> *mut Box<dyn Service>;

/// Lifecycle state of a registered service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Initialized,
    Started,
    Stopped,
    Failed,
}

impl ServiceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialized => "initialized",
            Self::Started => "started",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_as_str() {
        assert_eq!(ServiceState::Initialized.as_str(), "initialized");
        assert_eq!(ServiceState::Started.as_str(), "started");
        assert_eq!(ServiceState::Stopped.as_str(), "stopped");
        assert_eq!(ServiceState::Failed.as_str(), "failed");
    }
}
