use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    DeviceConnected,
    ApplicationLaunching,
    Active,
    /// Resting state after a failure or a disconnect; `connect` is allowed.
    Disconnected,
}

impl SessionState {
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Active)
    }

    /// States where `connect` may start a new attempt directly.
    pub fn accepts_connect(&self) -> bool {
        matches!(self, SessionState::Idle | SessionState::Disconnected)
    }

    /// Connecting, handshaking or active.
    pub fn is_engaged(&self) -> bool {
        matches!(
            self,
            SessionState::Connecting
                | SessionState::DeviceConnected
                | SessionState::ApplicationLaunching
                | SessionState::Active
        )
    }

    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Idle, Connecting) => true,
            (Connecting, DeviceConnected) => true,
            (DeviceConnected, ApplicationLaunching) => true,
            (ApplicationLaunching, Active) => true,
            (Connecting | DeviceConnected | ApplicationLaunching | Active, Disconnected) => true,
            (Disconnected, Idle | Connecting) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::DeviceConnected => "device connected",
            SessionState::ApplicationLaunching => "application launching",
            SessionState::Active => "active",
            SessionState::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

/// Snapshot of the controller state readable from any thread.
///
/// Only the session actor writes it.
#[derive(Clone, Debug, Default)]
pub struct StateCell(Arc<RwLock<SessionState>>);

impl StateCell {
    pub fn new(state: SessionState) -> Self {
        Self(Arc::new(RwLock::new(state)))
    }

    pub fn get(&self) -> SessionState {
        *self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set(&self, state: SessionState) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

#[cfg(test)]
mod tests {
    use super::SessionState::*;
    use super::*;

    const ALL: [SessionState; 6] = [
        Idle,
        Connecting,
        DeviceConnected,
        ApplicationLaunching,
        Active,
        Disconnected,
    ];

    #[test]
    fn test_happy_path_is_allowed() {
        let path = [Idle, Connecting, DeviceConnected, ApplicationLaunching, Active, Disconnected, Idle];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_disconnected_reachable_from_every_engaged_state() {
        for state in ALL {
            assert_eq!(state.can_transition_to(Disconnected), state.is_engaged(), "{}", state);
        }
    }

    #[test]
    fn test_no_skipping_steps() {
        assert!(!Idle.can_transition_to(Active));
        assert!(!Connecting.can_transition_to(ApplicationLaunching));
        assert!(!DeviceConnected.can_transition_to(Active));
        assert!(!Active.can_transition_to(Connecting));
        assert!(!Active.can_transition_to(Idle));
        for state in ALL {
            assert!(!state.can_transition_to(state));
        }
    }

    #[test]
    fn test_state_cell_shares_updates() {
        let cell = StateCell::default();
        let reader = cell.clone();
        assert_eq!(reader.get(), Idle);
        cell.set(Active);
        assert_eq!(reader.get(), Active);
    }
}
