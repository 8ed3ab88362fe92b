//! The extension lifecycle state machine.
//!
//! ```text
//! Unconfigured → Configuring → Configured → Initializing → Initialized
//!   → Starting → Started → Stopping → Stopped → Deinitializing → Deinited
//! ```
//!
//! Each `*ing` state is entered when the runtime invokes the matching
//! hook and left only when the extension signals the phase done.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where an extension is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionState {
    /// Created, nothing invoked yet.
    Unconfigured,
    /// `on_configure` invoked, waiting for `on_configure_done`.
    Configuring,
    /// Configured.
    Configured,
    /// `on_init` invoked, waiting for `on_init_done`.
    Initializing,
    /// Initialized.
    Initialized,
    /// `on_start` invoked, waiting for `on_start_done`.
    Starting,
    /// Running; the only state in which messages are delivered.
    Started,
    /// `on_stop` invoked, waiting for `on_stop_done`.
    Stopping,
    /// Stopped.
    Stopped,
    /// `on_deinit` invoked, waiting for `on_deinit_done`.
    Deinitializing,
    /// Torn down. Terminal.
    Deinited,
}

impl ExtensionState {
    /// Whether envelopes may be delivered in this state.
    pub fn accepts_messages(self) -> bool {
        self == ExtensionState::Started
    }

    /// Whether this is the terminal state.
    pub fn is_terminal(self) -> bool {
        self == ExtensionState::Deinited
    }

    /// The phase whose `*_done` signal this state is waiting for.
    pub fn awaiting(self) -> Option<Phase> {
        match self {
            ExtensionState::Configuring => Some(Phase::Configure),
            ExtensionState::Initializing => Some(Phase::Init),
            ExtensionState::Starting => Some(Phase::Start),
            ExtensionState::Stopping => Some(Phase::Stop),
            ExtensionState::Deinitializing => Some(Phase::Deinit),
            _ => None,
        }
    }
}

impl fmt::Display for ExtensionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExtensionState::Unconfigured => "unconfigured",
            ExtensionState::Configuring => "configuring",
            ExtensionState::Configured => "configured",
            ExtensionState::Initializing => "initializing",
            ExtensionState::Initialized => "initialized",
            ExtensionState::Starting => "starting",
            ExtensionState::Started => "started",
            ExtensionState::Stopping => "stopping",
            ExtensionState::Stopped => "stopped",
            ExtensionState::Deinitializing => "deinitializing",
            ExtensionState::Deinited => "deinited",
        };
        f.write_str(s)
    }
}

/// A lifecycle phase: one hook plus its `*_done` acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// `on_configure` / `on_configure_done`
    Configure,
    /// `on_init` / `on_init_done`
    Init,
    /// `on_start` / `on_start_done`
    Start,
    /// `on_stop` / `on_stop_done`
    Stop,
    /// `on_deinit` / `on_deinit_done`
    Deinit,
}

impl Phase {
    /// All phases in lifecycle order.
    pub const ALL: [Phase; 5] = [
        Phase::Configure,
        Phase::Init,
        Phase::Start,
        Phase::Stop,
        Phase::Deinit,
    ];

    /// State required before the phase may begin.
    pub fn precondition(self) -> ExtensionState {
        match self {
            Phase::Configure => ExtensionState::Unconfigured,
            Phase::Init => ExtensionState::Configured,
            Phase::Start => ExtensionState::Initialized,
            Phase::Stop => ExtensionState::Started,
            Phase::Deinit => ExtensionState::Stopped,
        }
    }

    /// State while the hook runs and the `*_done` signal is awaited.
    pub fn in_progress(self) -> ExtensionState {
        match self {
            Phase::Configure => ExtensionState::Configuring,
            Phase::Init => ExtensionState::Initializing,
            Phase::Start => ExtensionState::Starting,
            Phase::Stop => ExtensionState::Stopping,
            Phase::Deinit => ExtensionState::Deinitializing,
        }
    }

    /// State after the `*_done` signal.
    pub fn completed(self) -> ExtensionState {
        match self {
            Phase::Configure => ExtensionState::Configured,
            Phase::Init => ExtensionState::Initialized,
            Phase::Start => ExtensionState::Started,
            Phase::Stop => ExtensionState::Stopped,
            Phase::Deinit => ExtensionState::Deinited,
        }
    }

    /// Name of the hook, for logs.
    pub fn hook_name(self) -> &'static str {
        match self {
            Phase::Configure => "on_configure",
            Phase::Init => "on_init",
            Phase::Start => "on_start",
            Phase::Stop => "on_stop",
            Phase::Deinit => "on_deinit",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.hook_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_chain_linearly() {
        let mut state = ExtensionState::Unconfigured;
        for phase in Phase::ALL {
            assert_eq!(phase.precondition(), state);
            assert_eq!(phase.in_progress().awaiting(), Some(phase));
            state = phase.completed();
        }
        assert!(state.is_terminal());
    }

    #[test]
    fn only_started_accepts_messages() {
        let accepting: Vec<_> = Phase::ALL
            .iter()
            .flat_map(|p| [p.precondition(), p.in_progress(), p.completed()])
            .filter(|s| s.accepts_messages())
            .collect();
        assert!(accepting.iter().all(|s| *s == ExtensionState::Started));
        assert!(!accepting.is_empty());
    }
}
