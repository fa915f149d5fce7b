//! Engine phases and outcomes.

use agentdeck_core::ClientError;
use serde::Serialize;

/// Where the conversation stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Ready; the next send issues a plain ask call.
    Idle,
    /// An ask call (or the channel open that follows it) is in flight.
    AwaitingResponse,
    /// Sends go to the open channel.
    Interactive,
    /// Torn down; only `reset` leaves this phase.
    Closed,
}

impl Phase {
    #[must_use]
    pub const fn accepts_send(self) -> bool {
        matches!(self, Self::Idle | Self::Interactive)
    }
}

/// A send the engine refused without touching the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("A previous message is still awaiting its response")]
    Busy,
    #[error("Session is closed")]
    Closed,
}

/// What a send did.
#[derive(Debug)]
pub enum SendOutcome {
    /// Blank input; nothing happened.
    Ignored,
    /// The ask call answered directly.
    Answered,
    /// The backend upgraded and the channel is open.
    Upgraded { session_id: String },
    /// Written to the open channel; the answer arrives as a frame.
    Forwarded,
    /// The turn failed and a failure answer was appended.
    Failed(ClientError),
    /// The conversation was reset or closed while this send was in flight;
    /// its result was dropped.
    Discarded,
}
