//! WebSocket interactive channel.

use std::{
    sync::{
        Arc, Mutex as StdMutex, PoisonError,
        atomic::{AtomicU8, Ordering},
    },
    time::Duration,
};

use agentdeck_core::{
    AuthError, Channel, ChannelConnector, ChannelEvent, ChannelState, ClientConfig, ClientError,
    CloseReason, Credential, OpenedChannel,
};
use async_trait::async_trait;
use futures::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::{
    net::TcpStream,
    sync::{Mutex, mpsc},
    task::AbortHandle,
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{Error as WsError, Message},
};
use uuid::Uuid;

use crate::protocol::{decode_binary_frame, decode_frame};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upper bound on the close handshake before the socket is abandoned.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

const OPEN: u8 = 0;
const CLOSING: u8 = 1;
const CLOSED: u8 = 2;

/// Opens WebSocket channels at the configured channel endpoint.
#[derive(Debug, Clone)]
pub struct WsConnector {
    config: Arc<ClientConfig>,
}

impl WsConnector {
    /// Create a connector.
    #[must_use]
    pub const fn new(config: Arc<ClientConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ChannelConnector for WsConnector {
    async fn open(
        &self,
        session_id: &str,
        credential: &Credential,
    ) -> Result<OpenedChannel, ClientError> {
        if session_id.trim().is_empty() {
            return Err(ClientError::Protocol("cannot open a channel without a session id".into()));
        }

        // The URL carries the token; log the session only.
        let url = self.config.channel_url(session_id, credential)?;
        tracing::debug!(session_id, "Opening interactive channel");

        let (stream, _response) = connect_async(url.as_str()).await.map_err(handshake_error)?;
        Ok(WsChannel::spawn(session_id.to_string(), stream))
    }
}

fn handshake_error(e: WsError) -> ClientError {
    match e {
        WsError::Http(response) => {
            let status = response.status().as_u16();
            match status {
                401 | 403 => ClientError::Auth(AuthError::Rejected),
                _ => ClientError::Http {
                    status,
                    body: String::from("channel handshake refused"),
                },
            }
        }
        other => ClientError::Transport(other.to_string()),
    }
}

/// State shared between the channel handle and its reader task.
struct Shared {
    id: Uuid,
    state: AtomicU8,
    /// Taken on close, so nothing can be emitted after `Closed`.
    events: StdMutex<Option<mpsc::UnboundedSender<ChannelEvent>>>,
}

impl Shared {
    fn state(&self) -> ChannelState {
        match self.state.load(Ordering::SeqCst) {
            OPEN => ChannelState::Open,
            CLOSING => ChannelState::Closing,
            _ => ChannelState::Closed,
        }
    }

    fn emit(&self, event: ChannelEvent) {
        let guard = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = guard.as_ref() {
            let _ = tx.send(event);
        }
    }

    /// Reason for an end of stream seen by the reader. A close we started
    /// is still reported as local when the peer's reply wins the race.
    fn ended_reason(&self, remote: CloseReason) -> CloseReason {
        if self.state.load(Ordering::SeqCst) == CLOSING {
            CloseReason::Local
        } else {
            remote
        }
    }

    /// Mark closed and fire the single `Closed` notification.
    fn finish(&self, reason: CloseReason) {
        self.state.store(CLOSED, Ordering::SeqCst);
        let sender = self
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(tx) = sender {
            tracing::info!(channel = %self.id, ?reason, "Interactive channel closed");
            let _ = tx.send(ChannelEvent::Closed(reason));
        }
    }
}

/// An open WebSocket channel.
///
/// Outbound writes go straight to the socket under a lock; inbound frames
/// are decoded by a reader task and forwarded in arrival order.
pub struct WsChannel {
    session_id: String,
    sink: Mutex<SplitSink<WsStream, Message>>,
    shared: Arc<Shared>,
    reader: AbortHandle,
}

impl WsChannel {
    fn spawn(session_id: String, stream: WsStream) -> OpenedChannel {
        let (sink, source) = stream.split();
        let (tx, rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            id: Uuid::new_v4(),
            state: AtomicU8::new(OPEN),
            events: StdMutex::new(Some(tx)),
        });
        tracing::info!(channel = %shared.id, session_id, "Interactive channel open");

        let reader = tokio::spawn(read_loop(source, Arc::clone(&shared)));

        let channel = Arc::new(Self {
            session_id,
            sink: Mutex::new(sink),
            shared,
            reader: reader.abort_handle(),
        });

        OpenedChannel {
            channel,
            events: rx,
        }
    }

    /// Connection identifier, for logs.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.shared.id
    }
}

async fn read_loop(mut source: SplitStream<WsStream>, shared: Arc<Shared>) {
    while let Some(msg) = source.next().await {
        let decoded = match msg {
            Ok(Message::Text(text)) => decode_frame(&text),
            Ok(Message::Binary(data)) => decode_binary_frame(&data),
            Ok(Message::Close(_)) => {
                shared.finish(shared.ended_reason(CloseReason::Remote));
                return;
            }
            Ok(_) => continue,
            Err(e) => {
                tracing::error!("WebSocket error: {e}");
                shared.finish(shared.ended_reason(CloseReason::Error(e.to_string())));
                return;
            }
        };

        match decoded {
            Ok(frame) => shared.emit(ChannelEvent::Frame(frame)),
            Err(e) => {
                tracing::warn!(channel = %shared.id, "Invalid inbound frame: {e}");
                shared.emit(ChannelEvent::Malformed(e.to_string()));
            }
        }
    }

    shared.finish(shared.ended_reason(CloseReason::Remote));
}

#[async_trait]
impl Channel for WsChannel {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn state(&self) -> ChannelState {
        self.shared.state()
    }

    async fn send(&self, text: &str) -> Result<(), ClientError> {
        if self.shared.state() != ChannelState::Open {
            return Err(ClientError::NotReady);
        }

        let mut sink = self.sink.lock().await;
        // A close may have started while we waited for the lock.
        if self.shared.state() != ChannelState::Open {
            return Err(ClientError::NotReady);
        }

        if let Err(e) = sink.send(Message::Text(text.to_string())).await {
            drop(sink);
            tracing::warn!(channel = %self.shared.id, "Channel write failed: {e}");
            self.shared.finish(CloseReason::Error(e.to_string()));
            self.reader.abort();
            return Err(ClientError::Transport(e.to_string()));
        }
        Ok(())
    }

    async fn close(&self) {
        if self
            .shared
            .state
            .compare_exchange(OPEN, CLOSING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let mut sink = self.sink.lock().await;
        match tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(channel = %self.shared.id, "Close handshake failed: {e}"),
            Err(_) => tracing::debug!(channel = %self.shared.id, "Close handshake timed out"),
        }
        drop(sink);

        self.shared.finish(CloseReason::Local);
        self.reader.abort();
    }
}

impl Drop for WsChannel {
    fn drop(&mut self) {
        self.shared.finish(CloseReason::Local);
        self.reader.abort();
    }
}
