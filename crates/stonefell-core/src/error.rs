//! Session-fatal errors.
//!
//! Most anomalies this engine detects (invalid coordinates, timing
//! violations, collision rollbacks) are absorbed: they adjust cheat scores or
//! force corrective packets and are reported through telemetry, never through
//! `Result`. The only errors that surface to the connection layer are the
//! ones that must terminate a session, collected in [`SessionError`].

use crate::entity::{ClientId, InstanceId};
use thiserror::Error;

/// An error that terminates (or refuses) a player session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The account carries an active ban.
    #[error("account is banned until {until_ms} ms")]
    Banned {
        /// Server timestamp at which the ban expires.
        until_ms: u64,
    },

    /// The client never acknowledged readiness within the login deadline.
    #[error("login acknowledgement not received before deadline")]
    LoginTimeout,

    /// The client id is already bound to a live session.
    #[error("client {0} is already connected")]
    AlreadyConnected(ClientId),

    /// The instance id does not name a live entity.
    #[error("unknown instance {0}")]
    UnknownInstance(InstanceId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offender() {
        let error = SessionError::Banned { until_ms: 5000 };
        assert_eq!(error.to_string(), "account is banned until 5000 ms");

        let error = SessionError::AlreadyConnected(ClientId::new(3));
        assert_eq!(error.to_string(), "client 3 is already connected");

        let error = SessionError::UnknownInstance(InstanceId::new(8));
        assert_eq!(error.to_string(), "unknown instance 8");
    }
}
