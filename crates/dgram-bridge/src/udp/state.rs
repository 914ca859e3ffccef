//! Lifecycle state machine for UDP sockets.

use crate::error::{Result, SocketError};

/// Lifecycle state of a UDP socket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SocketState {
    /// No service socket exists yet.
    #[default]
    Idle,
    /// The create call is in flight.
    Creating,
    /// A service socket exists but is not bound.
    Created,
    /// The bind call (and the info query after it) is in flight.
    Binding,
    /// Bound, with the receive loop armed.
    Listening,
    /// Closed. Terminal.
    Closed,
}

/// An event driving the lifecycle state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StateEvent {
    BeginCreate,
    CreateSucceeded,
    CreateFailed,
    BeginBind,
    BindSucceeded,
    BindFailed,
    Close,
}

impl SocketState {
    /// Compute the state after `event`, rejecting invalid transitions.
    pub fn transition(self, event: StateEvent) -> Result<SocketState> {
        use SocketState::*;
        use StateEvent::*;

        match (self, event) {
            (Closed, _) => Err(SocketError::Closed),
            (_, Close) => Ok(Closed),

            (Idle, BeginCreate) => Ok(Creating),
            (Creating, BeginCreate) => Err(SocketError::AlreadyCreating),
            (Creating, CreateSucceeded) => Ok(Created),
            (Creating, CreateFailed) => Ok(Idle),

            (Created, BeginBind) => Ok(Binding),
            (Binding, BeginBind) => Err(SocketError::AlreadyBinding),
            (Listening, BeginBind) => Err(SocketError::AlreadyListening),
            (Binding, BindSucceeded) => Ok(Listening),
            (Binding, BindFailed) => Ok(Created),

            (from, event) => Err(SocketError::InvalidTransition { from, event }),
        }
    }
}

impl std::fmt::Display for SocketState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SocketState::Idle => write!(f, "Idle"),
            SocketState::Creating => write!(f, "Creating"),
            SocketState::Created => write!(f, "Created"),
            SocketState::Binding => write!(f, "Binding"),
            SocketState::Listening => write!(f, "Listening"),
            SocketState::Closed => write!(f, "Closed"),
        }
    }
}

impl std::fmt::Display for StateEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateEvent::BeginCreate => write!(f, "BeginCreate"),
            StateEvent::CreateSucceeded => write!(f, "CreateSucceeded"),
            StateEvent::CreateFailed => write!(f, "CreateFailed"),
            StateEvent::BeginBind => write!(f, "BeginBind"),
            StateEvent::BindSucceeded => write!(f, "BindSucceeded"),
            StateEvent::BindFailed => write!(f, "BindFailed"),
            StateEvent::Close => write!(f, "Close"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let state = SocketState::default()
            .transition(StateEvent::BeginCreate)
            .and_then(|s| s.transition(StateEvent::CreateSucceeded))
            .and_then(|s| s.transition(StateEvent::BeginBind))
            .and_then(|s| s.transition(StateEvent::BindSucceeded))
            .and_then(|s| s.transition(StateEvent::Close));
        assert_eq!(state, Ok(SocketState::Closed));
    }

    #[test]
    fn test_single_flight_errors() {
        assert_eq!(
            SocketState::Creating.transition(StateEvent::BeginCreate),
            Err(SocketError::AlreadyCreating)
        );
        assert_eq!(
            SocketState::Binding.transition(StateEvent::BeginBind),
            Err(SocketError::AlreadyBinding)
        );
        assert_eq!(
            SocketState::Listening.transition(StateEvent::BeginBind),
            Err(SocketError::AlreadyListening)
        );
    }

    #[test]
    fn test_failures_step_back() {
        assert_eq!(
            SocketState::Creating.transition(StateEvent::CreateFailed),
            Ok(SocketState::Idle)
        );
        assert_eq!(
            SocketState::Binding.transition(StateEvent::BindFailed),
            Ok(SocketState::Created)
        );
    }

    #[test]
    fn test_closed_is_terminal() {
        for event in [
            StateEvent::BeginCreate,
            StateEvent::CreateSucceeded,
            StateEvent::BeginBind,
            StateEvent::BindSucceeded,
            StateEvent::Close,
        ] {
            assert_eq!(
                SocketState::Closed.transition(event),
                Err(SocketError::Closed)
            );
        }
    }

    #[test]
    fn test_invalid_transition() {
        assert_eq!(
            SocketState::Idle.transition(StateEvent::BeginBind),
            Err(SocketError::InvalidTransition {
                from: SocketState::Idle,
                event: StateEvent::BeginBind,
            })
        );
        assert!(matches!(
            SocketState::Listening.transition(StateEvent::CreateSucceeded),
            Err(SocketError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_socket_state_display() {
        assert_eq!(SocketState::Idle.to_string(), "Idle");
        assert_eq!(SocketState::Binding.to_string(), "Binding");
        assert_eq!(SocketState::Listening.to_string(), "Listening");
        assert_eq!(SocketState::Closed.to_string(), "Closed");
    }
}
