use crate::domain::error::ErrorKind;
use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    /// No driver is loaded
    Disconnected,
    /// Reading probe details and bringing up the driver, probe, device and RTT
    Connecting,
    /// Polling for the RTT control block
    DiscoveringControlBlock,
    /// Channels are known; reads and writes are accepted
    Ready,
    /// Start failed; whatever was opened stays open until stop
    Failed(ErrorKind),
    /// Torn down by stop; equivalent to disconnected for a new start
    Stopped,
}

impl SessionState {
    /// Whether a new start may begin from this state
    pub fn can_start(self) -> bool {
        matches!(self, SessionState::Disconnected | SessionState::Stopped)
    }

    pub fn is_ready(self) -> bool {
        self == SessionState::Ready
    }

    pub fn has_failed(self) -> bool {
        matches!(self, SessionState::Failed(_))
    }

    /// Whether the transition `self -> next` is part of the lifecycle
    pub fn allows(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Disconnected | Stopped, Connecting) => true,
            (Connecting, DiscoveringControlBlock) => true,
            (DiscoveringControlBlock, Ready) => true,
            (Connecting | DiscoveringControlBlock, Failed(_)) => true,
            // stop is valid from anywhere
            (_, Stopped) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "Disconnected"),
            SessionState::Connecting => write!(f, "Connecting"),
            SessionState::DiscoveringControlBlock => write!(f, "DiscoveringControlBlock"),
            SessionState::Ready => write!(f, "Ready"),
            SessionState::Failed(kind) => write!(f, "Failed: {}", kind),
            SessionState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Current state plus a watch channel publishing every change
#[derive(Debug)]
pub struct StateTracker {
    current: SessionState,
    sender: watch::Sender<SessionState>,
}

impl StateTracker {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(SessionState::Disconnected);
        Self {
            current: SessionState::Disconnected,
            sender,
        }
    }

    pub fn current(&self) -> SessionState {
        self.current
    }

    /// Receiver that always sees the latest state
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.sender.subscribe()
    }

    /// Move to `next`; returns false (and stays put) for transitions outside the lifecycle
    pub fn transition(&mut self, next: SessionState) -> bool {
        if !self.current.allows(next) {
            debug!("Rejected session transition {} -> {}", self.current, next);
            return false;
        }
        debug!("Session transition {} -> {}", self.current, next);
        self.current = next;
        self.sender.send_replace(next);
        true
    }
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}
