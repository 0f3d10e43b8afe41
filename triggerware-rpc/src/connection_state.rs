//! Connection lifecycle
//!
//! ```text
//! Disconnected --connect/attach--> Connected --close/EOF--> Closed
//!       \__________________________close___________________/
//! ```
//!
//! There is no way back from `Closed`; a new connection needs a new client.

use std::fmt;
use triggerware_core::Error;

/// Where the client is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created, no stream yet
    Disconnected,
    /// Stream attached, read loop running
    Connected,
    /// Closed locally or by the peer
    Closed,
}

impl ConnectionState {
    /// Value reported on the connection-state gauge
    pub fn as_metric(self) -> i64 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connected => 1,
            ConnectionState::Closed => 2,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connected => "connected",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Broadcast to observers of a connection
///
/// Decode failures and stream errors are reported here instead of failing
/// any particular call. `Closed` is sent exactly once per client.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    Error(Error),
    Closed,
}
