use crate::types::DeviceState;

const MAX_SSID_LEN: usize = 32;
const MAX_PASSWORD_LEN: usize = 64;

/// Radio work for the backend to carry out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkAction {
    StartPortal,
    StopPortal,
    JoinNetwork { ssid: String, password: String },
    Disconnect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: DeviceState,
    pub to: DeviceState,
    pub at_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    #[error("credentials are only accepted in AP mode (device is {state})")]
    NotAcceptingCredentials { state: DeviceState },
    #[error("network name must not be empty")]
    EmptySsid,
    #[error("network name or password is too long")]
    CredentialTooLong,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionAttempt {
    pub ssid: String,
    password: String,
    pub started_ms: u64,
}

#[derive(Debug)]
pub struct ConnectivityMachine {
    state: DeviceState,
    attempt: Option<ConnectionAttempt>,
    connect_timeout_ms: u64,
    link_lost_since_ms: Option<u64>,
    transitions: Vec<Transition>,
}

impl ConnectivityMachine {
    pub fn new(connect_timeout_ms: u64) -> Self {
        Self {
            state: DeviceState::Startup,
            attempt: None,
            connect_timeout_ms,
            link_lost_since_ms: None,
            transitions: Vec::new(),
        }
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn attempt(&self) -> Option<&ConnectionAttempt> {
        self.attempt.as_ref()
    }

    pub fn take_transitions(&mut self) -> Vec<Transition> {
        std::mem::take(&mut self.transitions)
    }

    pub fn boot_complete(&mut self, now_ms: u64) -> Vec<LinkAction> {
        if self.state != DeviceState::Startup {
            return Vec::new();
        }
        self.transition(DeviceState::ApMode, now_ms);
        vec![LinkAction::StartPortal]
    }

    pub fn submit_credential(
        &mut self,
        ssid: &str,
        password: &str,
        now_ms: u64,
    ) -> Result<Vec<LinkAction>, ConnectError> {
        if self.state != DeviceState::ApMode {
            return Err(ConnectError::NotAcceptingCredentials { state: self.state });
        }

        let ssid = ssid.trim();
        if ssid.is_empty() {
            return Err(ConnectError::EmptySsid);
        }
        if ssid.len() > MAX_SSID_LEN || password.len() > MAX_PASSWORD_LEN {
            return Err(ConnectError::CredentialTooLong);
        }

        self.attempt = Some(ConnectionAttempt {
            ssid: ssid.to_string(),
            password: password.to_string(),
            started_ms: now_ms,
        });
        self.transition(DeviceState::Connecting, now_ms);

        Ok(vec![LinkAction::JoinNetwork {
            ssid: ssid.to_string(),
            password: password.to_string(),
        }])
    }

    pub fn check_link(&mut self, link_up: bool, now_ms: u64) -> Vec<LinkAction> {
        if self.state != DeviceState::Connecting {
            return Vec::new();
        }
        if link_up {
            self.link_established(now_ms)
        } else {
            self.check_timeout(now_ms)
        }
    }

    pub fn link_established(&mut self, now_ms: u64) -> Vec<LinkAction> {
        if self.state != DeviceState::Connecting {
            return Vec::new();
        }
        self.attempt = None;
        self.transition(DeviceState::FetchingData, now_ms);
        vec![LinkAction::StopPortal]
    }

    /// Safe to call in any state.
    pub fn check_timeout(&mut self, now_ms: u64) -> Vec<LinkAction> {
        let Some(attempt) = self.attempt.as_ref() else {
            return Vec::new();
        };
        if self.state != DeviceState::Connecting
            || now_ms.saturating_sub(attempt.started_ms) <= self.connect_timeout_ms
        {
            return Vec::new();
        }

        self.attempt = None;
        self.transition(DeviceState::ApMode, now_ms);
        vec![
            LinkAction::Disconnect,
            LinkAction::StopPortal,
            LinkAction::StartPortal,
        ]
    }

    pub fn cache_seeded(&mut self, now_ms: u64) {
        if self.state == DeviceState::FetchingData {
            self.transition(DeviceState::Ready, now_ms);
        }
    }

    pub fn report_link_lost(&mut self, now_ms: u64) {
        if self.state == DeviceState::Ready && self.link_lost_since_ms.is_none() {
            self.link_lost_since_ms = Some(now_ms);
        }
    }

    pub fn report_link_restored(&mut self) {
        self.link_lost_since_ms = None;
    }

    pub fn link_lost_since_ms(&self) -> Option<u64> {
        self.link_lost_since_ms
    }

    fn transition(&mut self, to: DeviceState, now_ms: u64) {
        debug_assert!(
            Self::is_allowed(self.state, to),
            "illegal transition {} -> {}",
            self.state,
            to
        );
        self.transitions.push(Transition {
            from: self.state,
            to,
            at_ms: now_ms,
        });
        self.state = to;
    }

    fn is_allowed(from: DeviceState, to: DeviceState) -> bool {
        use DeviceState::*;
        matches!(
            (from, to),
            (Startup, ApMode)
                | (ApMode, Connecting)
                | (Connecting, FetchingData)
                | (Connecting, ApMode)
                | (FetchingData, Ready)
        )
    }
}
