//! Session state machine.

/// Lifecycle state of a remote shell session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No transport process.
    #[default]
    Disconnected,
    /// Transport spawned, waiting for its first output or exit.
    Connecting,
    /// The remote shell produced output and accepts commands.
    Connected,
    /// The last connection attempt failed or the transport died abnormally.
    Error,
}

impl SessionState {
    /// Check if transition to target state is valid.
    ///
    /// Valid transitions:
    /// - Disconnected -> Connecting
    /// - Error -> Connecting
    /// - Connecting -> Connected
    /// - Connecting -> Error
    /// - Connected -> Error
    /// - any -> Disconnected
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (*self, target),
            (Disconnected, Connecting)
                | (Error, Connecting)
                | (Connecting, Connected)
                | (Connecting, Error)
                | (Connected, Error)
                | (_, Disconnected)
        )
    }

    /// Attempt to transition to a new state.
    ///
    /// Returns `Ok(())` if the transition is valid, or an error otherwise.
    pub fn transition_to(&mut self, target: SessionState) -> crate::Result<()> {
        if self.can_transition_to(target) {
            *self = target;
            Ok(())
        } else {
            Err(crate::error::RemoteShellError::InvalidStateTransition {
                from: *self,
                to: target,
            })
        }
    }

    /// Check if session can accept commands.
    pub fn can_execute(&self) -> bool {
        matches!(self, SessionState::Connected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_disconnect_cycle() {
        let mut state = SessionState::Disconnected;
        assert!(state.transition_to(SessionState::Connecting).is_ok());
        assert!(state.transition_to(SessionState::Connected).is_ok());
        assert!(state.transition_to(SessionState::Disconnected).is_ok());
        assert_eq!(state, SessionState::Disconnected);
    }

    #[test]
    fn test_failed_connect_then_retry() {
        let mut state = SessionState::Connecting;
        assert!(state.transition_to(SessionState::Error).is_ok());
        assert!(state.transition_to(SessionState::Connecting).is_ok());
        assert_eq!(state, SessionState::Connecting);
    }

    #[test]
    fn test_invalid_disconnected_to_connected() {
        let mut state = SessionState::Disconnected;
        assert!(state.transition_to(SessionState::Connected).is_err());
        assert_eq!(state, SessionState::Disconnected);
    }

    #[test]
    fn test_invalid_connected_to_connecting() {
        let mut state = SessionState::Connected;
        assert!(state.transition_to(SessionState::Connecting).is_err());
    }

    #[test]
    fn test_everything_can_disconnect() {
        for state in [
            SessionState::Disconnected,
            SessionState::Connecting,
            SessionState::Connected,
            SessionState::Error,
        ] {
            assert!(state.can_transition_to(SessionState::Disconnected));
        }
    }

    #[test]
    fn test_can_execute() {
        assert!(!SessionState::Disconnected.can_execute());
        assert!(!SessionState::Connecting.can_execute());
        assert!(SessionState::Connected.can_execute());
        assert!(!SessionState::Error.can_execute());
    }

    #[test]
    fn test_default() {
        assert_eq!(SessionState::default(), SessionState::Disconnected);
    }
}
