//! Registration state machine for one worker version.

use perch_core::Error;

/// Lifecycle state of the running version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerState {
    #[default]
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Parsed => "parsed",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
        }
    }
}

/// Requests from the interception layer to its host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostSignal {
    /// Activate as soon as installed, even with an older version live.
    SkipWaiting,
    /// Take control of already-open clients.
    ClaimClients,
}

/// Tracks where this version is in install/activate and whether it
/// controls clients yet.
#[derive(Debug, Default)]
pub struct Registration {
    state: WorkerState,
    /// An older version is still controlling clients.
    has_previous: bool,
    skip_waiting: bool,
    claimed: bool,
}

impl Registration {
    pub fn new(has_previous: bool) -> Self {
        Self { has_previous, ..Default::default() }
    }

    /// A version that was already activated and controlling clients in an
    /// earlier run of the host.
    pub fn resumed() -> Self {
        Self { state: WorkerState::Activated, claimed: true, ..Default::default() }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn begin_install(&mut self) -> Result<(), Error> {
        self.transition(WorkerState::Parsed, WorkerState::Installing)
    }

    pub fn finish_install(&mut self) -> Result<(), Error> {
        self.transition(WorkerState::Installing, WorkerState::Installed)
    }

    /// Start activation. Only an installed version that is not waiting on an
    /// older one may activate.
    pub fn begin_activate(&mut self) -> Result<(), Error> {
        if self.state == WorkerState::Installed && !self.ready_to_activate() {
            return Err(Error::InvalidState("installed version is waiting for the previous one".into()));
        }
        self.transition(WorkerState::Installed, WorkerState::Activating)
    }

    pub fn finish_activate(&mut self) -> Result<(), Error> {
        self.transition(WorkerState::Activating, WorkerState::Activated)?;
        self.has_previous = false;
        Ok(())
    }

    pub fn apply(&mut self, signal: HostSignal) {
        match signal {
            HostSignal::SkipWaiting => self.skip_waiting = true,
            HostSignal::ClaimClients => {
                if self.state == WorkerState::Activated {
                    self.claimed = true;
                } else {
                    tracing::debug!(state = self.state.as_str(), "ignoring claim before activation");
                }
            }
        }
    }

    pub fn ready_to_activate(&self) -> bool {
        self.state == WorkerState::Installed && (self.skip_waiting || !self.has_previous)
    }

    /// Whether fetches should go through the interception layer.
    pub fn controls_clients(&self) -> bool {
        self.state == WorkerState::Activated && self.claimed
    }

    fn transition(&mut self, from: WorkerState, to: WorkerState) -> Result<(), Error> {
        if self.state != from {
            return Err(Error::InvalidState(format!(
                "cannot enter {} from {} (expected {})",
                to.as_str(),
                self.state.as_str(),
                from.as_str()
            )));
        }
        tracing::info!(from = from.as_str(), to = to.as_str(), "worker state changed");
        self.state = to;
        Ok(())
    }
}
