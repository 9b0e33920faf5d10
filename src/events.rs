//! Execution events
//!
//! Progress notifications emitted while spawns run. The coordinator and the
//! attempt context post events to an [`EventSink`]; delivery is up to the
//! sink:
//!
//! - [`ChannelEventSink`]: forwards to a `crossbeam-channel` receiver
//! - [`LoggingEventSink`]: turns events into structured log lines
//! - [`NullEventSink`]: drops everything

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::info;

use crate::logging::services;
use crate::spawn::ResourceOwner;

/// Progress of one attempt as reported by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStatus {
    /// Attempt is queued or about to start
    Scheduling,
    /// Attempt is actively running
    Executing,
    /// Backend is checking a cache of its own
    CheckingCache,
    /// Backend is downloading outputs
    Downloading,
}

/// State carried by an [`ActionStatusMessage`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionState {
    Scheduling,
    Running { strategy: String },
}

/// Status update for the action owning a spawn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionStatusMessage {
    pub owner: ResourceOwner,
    pub state: ActionState,
}

impl ActionStatusMessage {
    pub fn scheduling(owner: &ResourceOwner) -> Self {
        Self {
            owner: owner.clone(),
            state: ActionState::Scheduling,
        }
    }

    pub fn running(owner: &ResourceOwner, strategy: &str) -> Self {
        Self {
            owner: owner.clone(),
            state: ActionState::Running {
                strategy: strategy.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecEvent {
    Status(ActionStatusMessage),
    /// Command line of a spawn about to be executed
    Subcommand {
        owner: ResourceOwner,
        command_line: String,
    },
}

/// Event channel of an execution environment
pub trait EventSink: Send + Sync {
    fn post(&self, event: ExecEvent);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn post(&self, _event: ExecEvent) {}
}

/// Sink that logs every event at info level
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingEventSink;

impl EventSink for LoggingEventSink {
    fn post(&self, event: ExecEvent) {
        match event {
            ExecEvent::Status(message) => match message.state {
                ActionState::Scheduling => info!(
                    service = services::EXEC_EVENTS,
                    label = %message.owner.label,
                    mnemonic = %message.owner.mnemonic,
                    "scheduling"
                ),
                ActionState::Running { strategy } => info!(
                    service = services::EXEC_EVENTS,
                    label = %message.owner.label,
                    mnemonic = %message.owner.mnemonic,
                    strategy = %strategy,
                    "running"
                ),
            },
            ExecEvent::Subcommand {
                owner,
                command_line,
            } => info!(
                service = services::EXEC_EVENTS,
                label = %owner.label,
                "SUBCOMMAND: {}",
                command_line
            ),
        }
    }
}

/// Sink that forwards events to a channel
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    sender: Sender<ExecEvent>,
}

impl ChannelEventSink {
    /// Create a sink and the receiving end of its channel
    pub fn new() -> (Self, Receiver<ExecEvent>) {
        let (sender, receiver) = unbounded();
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelEventSink {
    fn post(&self, event: ExecEvent) {
        // Nobody listening is not an error
        let _ = self.sender.send(event);
    }
}
