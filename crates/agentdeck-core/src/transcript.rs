//! Append-only conversation transcript with live broadcast.

use std::sync::{PoisonError, RwLock};

use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::ChatMessage;

const BROADCAST_CAPACITY: usize = 1024;

/// Change notification for views.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptEvent {
    Appended(ChatMessage),
    /// The conversation was reset; prior entries are gone.
    Cleared,
}

/// Ordered transcript with history and broadcast support.
///
/// Entries are only ever appended; the one exception is [`Transcript::clear`]
/// on an explicit conversation reset. A view can replay history and then
/// follow live updates without gaps via [`Transcript::history_plus_stream`].
pub struct Transcript {
    history: RwLock<Vec<ChatMessage>>,
    sender: broadcast::Sender<TranscriptEvent>,
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

impl Transcript {
    /// Create an empty transcript.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            history: RwLock::new(Vec::with_capacity(32)),
            sender,
        }
    }

    /// Append a message and notify live listeners.
    pub fn push(&self, msg: ChatMessage) {
        let mut history = self.history.write().unwrap_or_else(PoisonError::into_inner);
        history.push(msg.clone());
        // Sent under the lock so a concurrent snapshot+subscribe sees it exactly once.
        let _ = self.sender.send(TranscriptEvent::Appended(msg));
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let mut history = self.history.write().unwrap_or_else(PoisonError::into_inner);
        history.clear();
        let _ = self.sender.send(TranscriptEvent::Cleared);
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.history.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether the transcript has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Most recent entry.
    #[must_use]
    pub fn last(&self) -> Option<ChatMessage> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    /// Get a receiver for live updates.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TranscriptEvent> {
        self.sender.subscribe()
    }

    /// Get a snapshot of the history.
    #[must_use]
    pub fn history(&self) -> Vec<ChatMessage> {
        self.history.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Stream that yields history first, then live updates.
    ///
    /// Lagged receivers skip the missed events rather than erroring.
    #[must_use]
    pub fn history_plus_stream(&self) -> futures::stream::BoxStream<'static, TranscriptEvent> {
        let (history, rx) = {
            let guard = self.history.read().unwrap_or_else(PoisonError::into_inner);
            (guard.clone(), self.sender.subscribe())
        };

        let hist = futures::stream::iter(history.into_iter().map(TranscriptEvent::Appended));
        let live = BroadcastStream::new(rx).filter_map(|res| async move { res.ok() });

        Box::pin(hist.chain(live))
    }
}
