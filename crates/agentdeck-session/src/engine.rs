//! Session engine: ask, upgrade, interactive channel lifecycle.

use std::sync::{Arc, Weak};

use agentdeck_core::{
    AUTH_FAILURE_TEXT, AgentSelector, AskGateway, AskRequest, AskResponse, AuthError, Channel,
    ChannelConnector, ChannelEvent, ChatMessage, ClientConfig, ClientError, CredentialProvider,
    GENERIC_FAILURE_TEXT, Transcript,
};
use tokio::sync::{Mutex, mpsc, watch};

use crate::state::{Phase, SendOutcome, SessionError};

/// Per-conversation settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Language tag sent with every ask call.
    pub language: String,
    /// Which agents should answer; `None` lets the backend route.
    pub selector: Option<AgentSelector>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}

impl EngineOptions {
    #[must_use]
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            language: config.language.clone(),
            selector: None,
        }
    }

    #[must_use]
    pub fn with_selector(mut self, selector: AgentSelector) -> Self {
        self.selector = Some(selector);
        self
    }
}

struct EngineState {
    phase: Phase,
    session_id: Option<String>,
    selector: Option<AgentSelector>,
    channel: Option<Arc<dyn Channel>>,
    /// Bumped on every reset, close and demotion. Work started under an
    /// older generation must not touch state or the transcript.
    generation: u64,
    /// Bumped only by reset and close. A generation change within the same
    /// epoch is a demotion, which has already answered the open turns.
    epoch: u64,
    /// User turns still waiting for their assistant entry.
    unanswered: usize,
}

struct Inner<G, C> {
    gateway: G,
    connector: C,
    credentials: Arc<dyn CredentialProvider>,
    transcript: Arc<Transcript>,
    language: String,
    state: Mutex<EngineState>,
    phase_tx: watch::Sender<Phase>,
}

impl<G, C> Inner<G, C> {
    fn set_phase(&self, state: &mut EngineState, phase: Phase) {
        if state.phase != phase {
            tracing::debug!(from = ?state.phase, to = ?phase, "Session phase change");
        }
        state.phase = phase;
        self.phase_tx.send_replace(phase);
    }

    fn user_turn(&self, state: &mut EngineState, text: &str) {
        self.transcript.push(ChatMessage::user(text));
        state.unanswered += 1;
    }

    fn reply(&self, state: &mut EngineState, msg: ChatMessage) {
        self.transcript.push(msg);
        state.unanswered = state.unanswered.saturating_sub(1);
    }

    /// Close out every turn the channel will no longer answer.
    fn fail_unanswered(&self, state: &mut EngineState) {
        for _ in 0..std::mem::take(&mut state.unanswered) {
            self.transcript.push(ChatMessage::failure(GENERIC_FAILURE_TEXT));
        }
    }

    /// Start a new epoch: pending work from the old one is discarded.
    fn abandon(&self, state: &mut EngineState, phase: Phase) -> Option<Arc<dyn Channel>> {
        state.epoch = state.epoch.wrapping_add(1);
        state.unanswered = 0;
        self.detach(state, phase)
    }

    /// Leave the current conversation: invalidate in-flight work, forget
    /// the session and hand back the channel for closing.
    fn detach(&self, state: &mut EngineState, phase: Phase) -> Option<Arc<dyn Channel>> {
        state.generation = state.generation.wrapping_add(1);
        state.session_id = None;
        self.set_phase(state, phase);
        state.channel.take()
    }
}

/// Drives one conversation.
///
/// [`SessionEngine::send`] hides whether a turn goes through the ask call
/// or the interactive channel. Sends are serialized: while an ask call (or
/// the channel open that follows an upgrade) is in flight, further sends
/// are rejected with [`SessionError::Busy`].
///
/// Cloning is cheap and yields a handle to the same conversation.
pub struct SessionEngine<G, C> {
    inner: Arc<Inner<G, C>>,
}

impl<G, C> Clone for SessionEngine<G, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<G, C> SessionEngine<G, C>
where
    G: AskGateway + 'static,
    C: ChannelConnector + 'static,
{
    /// Create an idle engine with an empty transcript.
    #[must_use]
    pub fn new(
        gateway: G,
        connector: C,
        credentials: Arc<dyn CredentialProvider>,
        options: EngineOptions,
    ) -> Self {
        let (phase_tx, _) = watch::channel(Phase::Idle);
        Self {
            inner: Arc::new(Inner {
                gateway,
                connector,
                credentials,
                transcript: Arc::new(Transcript::new()),
                language: options.language,
                state: Mutex::new(EngineState {
                    phase: Phase::Idle,
                    session_id: None,
                    selector: options.selector,
                    channel: None,
                    generation: 0,
                    epoch: 0,
                    unanswered: 0,
                }),
                phase_tx,
            }),
        }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        *self.inner.phase_tx.borrow()
    }

    /// Follow phase changes.
    #[must_use]
    pub fn watch_phase(&self) -> watch::Receiver<Phase> {
        self.inner.phase_tx.subscribe()
    }

    /// The conversation's transcript.
    #[must_use]
    pub fn transcript(&self) -> &Arc<Transcript> {
        &self.inner.transcript
    }

    /// Session id of the open interactive channel, if any.
    pub async fn session_id(&self) -> Option<String> {
        self.inner.state.lock().await.session_id.clone()
    }

    /// Change which agents answer subsequent ask calls.
    pub async fn set_selector(&self, selector: Option<AgentSelector>) {
        self.inner.state.lock().await.selector = selector;
    }

    /// Send one user turn.
    ///
    /// Blank input is ignored. Otherwise exactly one user entry is appended
    /// now, and one assistant entry follows: the direct answer, a failure
    /// answer, or (after an upgrade) the first frame from the channel.
    ///
    /// # Errors
    /// Returns [`SessionError::Busy`] while a previous send is awaiting its
    /// response and [`SessionError::Closed`] after [`SessionEngine::close`].
    /// Neither appends to the transcript.
    pub async fn send(&self, text: &str) -> Result<SendOutcome, SessionError> {
        if text.trim().is_empty() {
            return Ok(SendOutcome::Ignored);
        }

        let inner = &self.inner;
        let mut state = inner.state.lock().await;
        match state.phase {
            Phase::Closed => Err(SessionError::Closed),
            Phase::AwaitingResponse => {
                tracing::debug!("Rejecting send while a response is pending");
                Err(SessionError::Busy)
            }
            Phase::Interactive => {
                let turn = (state.epoch, state.generation);
                let channel = state.channel.clone();
                inner.user_turn(&mut state, text);
                drop(state);
                Ok(self.forward(channel, text, turn).await)
            }
            Phase::Idle => {
                let generation = state.generation;
                let request = AskRequest::new(
                    text,
                    inner.language.as_str(),
                    state.session_id.clone(),
                    state.selector.as_ref(),
                );
                inner.user_turn(&mut state, text);
                inner.set_phase(&mut state, Phase::AwaitingResponse);
                drop(state);
                Ok(self.ask(request, generation).await)
            }
        }
    }

    /// Start over: close any channel, forget the session and clear the
    /// transcript. Also brings a closed engine back to idle.
    pub async fn reset(&self) {
        let channel = {
            let mut state = self.inner.state.lock().await;
            self.inner.transcript.clear();
            self.inner.abandon(&mut state, Phase::Idle)
        };
        if let Some(channel) = channel {
            channel.close().await;
        }
        tracing::debug!("Conversation reset");
    }

    /// Tear down. Sends fail with [`SessionError::Closed`] until
    /// [`SessionEngine::reset`].
    pub async fn close(&self) {
        let channel = {
            let mut state = self.inner.state.lock().await;
            self.inner.abandon(&mut state, Phase::Closed)
        };
        if let Some(channel) = channel {
            channel.close().await;
        }
    }

    async fn ask(&self, request: AskRequest, generation: u64) -> SendOutcome {
        match self.inner.gateway.ask(&request).await {
            Ok(AskResponse::Answer(payload)) => {
                let mut state = self.inner.state.lock().await;
                if state.generation != generation {
                    return discarded("answer");
                }
                self.inner.reply(&mut state, ChatMessage::assistant(payload));
                self.inner.set_phase(&mut state, Phase::Idle);
                SendOutcome::Answered
            }
            Ok(AskResponse::InteractiveStart { session_id }) => {
                self.upgrade(session_id, generation).await
            }
            Err(e) => self.fail(e, generation).await,
        }
    }

    async fn upgrade(&self, session_id: String, generation: u64) -> SendOutcome {
        // A missing credential is terminal for this attempt; never open
        // with a stale one.
        let Some(credential) = self.inner.credentials.get() else {
            return self.fail(AuthError::Missing.into(), generation).await;
        };

        let opened = match self.inner.connector.open(&session_id, &credential).await {
            Ok(opened) => opened,
            Err(e) => return self.fail(e, generation).await,
        };

        let mut state = self.inner.state.lock().await;
        if state.generation != generation {
            drop(state);
            opened.channel.close().await;
            return discarded("channel");
        }
        state.session_id = Some(session_id.clone());
        state.channel = Some(Arc::clone(&opened.channel));
        self.inner.set_phase(&mut state, Phase::Interactive);
        drop(state);

        tokio::spawn(pump(Arc::downgrade(&self.inner), generation, opened.events));
        tracing::info!(session_id, "Conversation upgraded to interactive channel");
        SendOutcome::Upgraded { session_id }
    }

    async fn forward(
        &self,
        channel: Option<Arc<dyn Channel>>,
        text: &str,
        (epoch, generation): (u64, u64),
    ) -> SendOutcome {
        let result = match channel {
            Some(channel) => channel.send(text).await,
            None => Err(ClientError::NotReady),
        };
        let Err(err) = result else {
            return SendOutcome::Forwarded;
        };

        let mut state = self.inner.state.lock().await;
        if state.epoch != epoch {
            return discarded("write failure");
        }
        if state.generation != generation {
            // The channel ended first and already answered this turn.
            tracing::debug!("Channel write failed after the channel ended: {err}");
            return SendOutcome::Failed(err);
        }
        tracing::warn!("Channel write failed, leaving interactive mode: {err}");
        self.inner.fail_unanswered(&mut state);
        let channel = self.inner.detach(&mut state, Phase::Idle);
        drop(state);
        if let Some(channel) = channel {
            channel.close().await;
        }
        SendOutcome::Failed(err)
    }

    async fn fail(&self, err: ClientError, generation: u64) -> SendOutcome {
        let mut state = self.inner.state.lock().await;
        if state.generation != generation {
            return discarded("failure");
        }

        let text = if err.is_auth() {
            self.inner.credentials.clear();
            AUTH_FAILURE_TEXT
        } else {
            GENERIC_FAILURE_TEXT
        };
        tracing::warn!("Turn failed: {err}");
        self.inner.reply(&mut state, ChatMessage::failure(text));
        self.inner.set_phase(&mut state, Phase::Idle);
        SendOutcome::Failed(err)
    }
}

fn discarded(what: &str) -> SendOutcome {
    tracing::warn!("Discarding late {what} for a conversation that was reset");
    SendOutcome::Discarded
}

/// Apply channel events to the conversation they were opened for.
async fn pump<G, C>(
    weak: Weak<Inner<G, C>>,
    generation: u64,
    mut events: mpsc::UnboundedReceiver<ChannelEvent>,
) where
    G: Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    while let Some(event) = events.recv().await {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        let mut state = inner.state.lock().await;
        if state.generation != generation {
            return;
        }

        match event {
            ChannelEvent::Frame(payload) => {
                inner.reply(&mut state, ChatMessage::assistant(payload));
            }
            ChannelEvent::Malformed(reason) => {
                tracing::warn!(%reason, "Undecodable frame, leaving interactive mode");
                inner.reply(&mut state, ChatMessage::failure(GENERIC_FAILURE_TEXT));
                inner.fail_unanswered(&mut state);
                let channel = inner.detach(&mut state, Phase::Idle);
                drop(state);
                if let Some(channel) = channel {
                    channel.close().await;
                }
                return;
            }
            ChannelEvent::Closed(reason) => {
                tracing::info!(?reason, "Interactive channel ended, back to one-shot mode");
                inner.fail_unanswered(&mut state);
                inner.detach(&mut state, Phase::Idle);
                return;
            }
        }
    }
}
