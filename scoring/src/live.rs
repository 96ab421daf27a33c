//! Live result channel.
//!
//! One subscription per competition. Every message carries a full results
//! snapshot that replaces whatever is displayed. The observer sees one of
//! three views:
//!
//! - [`LiveView::Connecting`] until the first snapshot or failure
//! - [`LiveView::Results`] once any snapshot arrived, kept through later
//!   transport failures
//! - [`LiveView::ConnectivityError`] when the channel failed before any
//!   snapshot arrived
//!
//! The channel reconnects on its own with exponential backoff. The backoff
//! counter resets whenever a connection succeeds; once the configured
//! number of reconnects is used up the channel stops.

use crate::error::LiveError;
use crate::results::CompetitionResults;
use crate::types::CompetitionId;
use futures::{Stream, StreamExt};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use topout_core::effect::Effect;
use topout_core::environment::{Clock, SystemClock};
use topout_core::reducer::Reducer;
use topout_core::{DateTime, SmallVec, Utc, smallvec};
use topout_runtime::Store;
use topout_runtime::metrics::LiveMetrics;
use topout_runtime::retry::RetryPolicy;

/// Snapshots received on one connection
pub type SnapshotStream =
    Pin<Box<dyn Stream<Item = Result<CompetitionResults, LiveError>> + Send>>;

/// Boxed future returned by [`ResultTransport::connect`]
pub type ConnectFuture<'a> =
    Pin<Box<dyn Future<Output = Result<SnapshotStream, LiveError>> + Send + 'a>>;

/// Opens connections to a competition's result feed
pub trait ResultTransport: Send + Sync {
    /// Connect to the feed of `competition`
    ///
    /// # Errors
    ///
    /// [`LiveError::Connect`] if no connection could be established.
    fn connect(&self, competition: CompetitionId) -> ConnectFuture<'_>;
}

/// WebSocket feed at `{base_url}/results/{competition}`
#[derive(Debug, Clone)]
pub struct WsResultTransport {
    base_url: String,
}

impl WsResultTransport {
    /// Transport for a `ws://` or `wss://` base URL
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    /// Feed URL of `competition`
    #[must_use]
    pub fn url(&self, competition: CompetitionId) -> String {
        format!("{}/results/{competition}", self.base_url.trim_end_matches('/'))
    }
}

fn decode(
    message: Result<Message, tokio_tungstenite::tungstenite::Error>,
) -> Option<Result<CompetitionResults, LiveError>> {
    let decode_err = |err: serde_json::Error| LiveError::Decode(err.to_string());
    match message {
        Ok(Message::Text(text)) => Some(serde_json::from_str(&text).map_err(decode_err)),
        Ok(Message::Binary(bytes)) => Some(serde_json::from_slice(&bytes).map_err(decode_err)),
        Ok(Message::Close(_)) => Some(Err(LiveError::Closed)),
        Ok(_) => None,
        Err(err) => Some(Err(LiveError::Transport(err.to_string()))),
    }
}

impl ResultTransport for WsResultTransport {
    fn connect(&self, competition: CompetitionId) -> ConnectFuture<'_> {
        let url = self.url(competition);
        Box::pin(async move {
            let (socket, _) = tokio_tungstenite::connect_async(url.as_str())
                .await
                .map_err(|err| LiveError::Connect(err.to_string()))?;
            tracing::debug!(%url, "Result feed connected");
            let stream: SnapshotStream =
                Box::pin(socket.filter_map(|message| futures::future::ready(decode(message))));
            Ok(stream)
        })
    }
}

/// What the observer should display
#[derive(Debug, Clone, PartialEq)]
pub enum LiveView {
    /// Nothing received yet
    Connecting,
    /// Last snapshot received
    Results(CompetitionResults),
    /// The channel failed before any snapshot arrived
    ConnectivityError(String),
}

/// Observer state
#[derive(Debug, Clone)]
pub struct LiveState {
    /// Competition watched
    pub competition_id: CompetitionId,
    /// Last snapshot received
    pub snapshot: Option<CompetitionResults>,
    /// When the last snapshot arrived
    pub updated_at: Option<DateTime<Utc>>,
    /// A connection is currently open
    pub connected: bool,
    /// Reconnects since the last successful connection
    pub reconnects: usize,
    /// Last transport failure
    pub last_error: Option<LiveError>,
    /// Reconnects were used up or the channel was closed
    pub stopped: bool,
}

impl LiveState {
    /// Fresh observer of `competition`
    #[must_use]
    pub const fn new(competition_id: CompetitionId) -> Self {
        Self {
            competition_id,
            snapshot: None,
            updated_at: None,
            connected: false,
            reconnects: 0,
            last_error: None,
            stopped: false,
        }
    }

    /// Current view
    #[must_use]
    pub fn view(&self) -> LiveView {
        match (&self.snapshot, &self.last_error) {
            (Some(snapshot), _) => LiveView::Results(snapshot.clone()),
            (None, Some(error)) => LiveView::ConnectivityError(error.to_string()),
            (None, None) => LiveView::Connecting,
        }
    }
}

/// Observer actions
#[derive(Debug, Clone, PartialEq)]
pub enum LiveAction {
    /// A connection opened
    Connected,
    /// A snapshot arrived
    Snapshot(CompetitionResults),
    /// The connection failed or dropped
    Failed(LiveError),
    /// A reconnect is scheduled
    Reconnecting {
        /// Reconnects since the last successful connection, this one included
        attempt: usize,
        /// Wait before connecting
        delay: Duration,
    },
    /// Reconnects are used up
    GaveUp,
    /// The observer closed the channel
    Closed,
}

/// Collaborators of the observer session
#[derive(Clone)]
pub struct LiveEnvironment {
    /// Stamps received snapshots
    pub clock: Arc<dyn Clock>,
}

impl LiveEnvironment {
    /// Environment using `clock`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl Default for LiveEnvironment {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

/// Reducer for [`LiveState`]; the reconnect loop lives in [`ResultChannel`]
#[derive(Debug, Clone, Copy, Default)]
pub struct LiveReducer;

impl Reducer for LiveReducer {
    type State = LiveState;
    type Action = LiveAction;
    type Environment = LiveEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            LiveAction::Connected => {
                state.connected = true;
                state.reconnects = 0;
            },
            LiveAction::Snapshot(snapshot) => {
                state.snapshot = Some(snapshot);
                state.updated_at = Some(env.clock.now());
                state.last_error = None;
            },
            LiveAction::Failed(error) => {
                state.connected = false;
                state.last_error = Some(error);
            },
            LiveAction::Reconnecting { attempt, .. } => state.reconnects = attempt,
            LiveAction::GaveUp | LiveAction::Closed => {
                state.connected = false;
                state.stopped = true;
            },
        }
        smallvec![Effect::None]
    }
}

type LiveStore = Store<LiveState, LiveAction, LiveEnvironment, LiveReducer>;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// A running subscription to a competition's results
pub struct ResultChannel {
    store: LiveStore,
    task: JoinHandle<()>,
}

impl ResultChannel {
    /// Start watching `competition`.
    ///
    /// `policy.max_retries` bounds consecutive reconnects; the delays follow
    /// `policy.delay_for_attempt`.
    #[must_use]
    pub fn open(
        transport: Arc<dyn ResultTransport>,
        competition: CompetitionId,
        policy: RetryPolicy,
    ) -> Self {
        Self::open_with(transport, competition, policy, LiveEnvironment::default())
    }

    /// [`ResultChannel::open`] with an explicit environment
    #[must_use]
    pub fn open_with(
        transport: Arc<dyn ResultTransport>,
        competition: CompetitionId,
        policy: RetryPolicy,
        env: LiveEnvironment,
    ) -> Self {
        let store = Store::new(LiveState::new(competition), LiveReducer, env);
        let task = tokio::spawn(run(store.clone(), transport, competition, policy));
        Self { store, task }
    }

    /// What the observer should display now
    pub async fn view(&self) -> LiveView {
        self.store.state(LiveState::view).await
    }

    /// Read the full observer state
    pub async fn state<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&LiveState) -> T,
    {
        self.store.state(f).await
    }

    /// Stop the subscription
    ///
    /// The channel stops accepting actions afterwards.
    pub async fn close(&self) {
        self.task.abort();
        let _ = self.store.send(LiveAction::Closed).await;
        if let Err(error) = self.store.shutdown(CLOSE_TIMEOUT).await {
            tracing::warn!(error = %error, "Result channel closed with effects pending");
        }
    }
}

impl Drop for ResultChannel {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Returns `false` once the store stopped accepting actions.
async fn dispatch(store: &LiveStore, action: LiveAction) -> bool {
    store.send(action).await.is_ok()
}

/// Forward snapshots until the connection ends, returning why it ended.
async fn pump(store: &LiveStore, mut stream: SnapshotStream) -> LiveError {
    while let Some(item) = stream.next().await {
        match item {
            Ok(snapshot) => {
                if !dispatch(store, LiveAction::Snapshot(snapshot)).await {
                    return LiveError::Closed;
                }
            },
            Err(LiveError::Decode(detail)) => {
                tracing::warn!(error = %detail, "Skipping undecodable result snapshot");
            },
            Err(error) => return error,
        }
    }
    LiveError::Closed
}

async fn run(
    store: LiveStore,
    transport: Arc<dyn ResultTransport>,
    competition: CompetitionId,
    policy: RetryPolicy,
) {
    let mut reconnects = 0;
    loop {
        let error = match transport.connect(competition).await {
            Ok(stream) => {
                reconnects = 0;
                if !dispatch(&store, LiveAction::Connected).await {
                    return;
                }
                pump(&store, stream).await
            },
            Err(error) => error,
        };
        tracing::warn!(competition_id = %competition, %error, "Result feed lost");
        if !dispatch(&store, LiveAction::Failed(error)).await {
            return;
        }

        if !policy.should_retry(reconnects) {
            tracing::error!(competition_id = %competition, reconnects, "Giving up on result feed");
            let _ = dispatch(&store, LiveAction::GaveUp).await;
            return;
        }
        let delay = policy.delay_for_attempt(reconnects);
        reconnects += 1;
        LiveMetrics::record_reconnect();
        tracing::info!(
            competition_id = %competition,
            attempt = reconnects,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Reconnecting to result feed"
        );
        if !dispatch(
            &store,
            LiveAction::Reconnecting {
                attempt: reconnects,
                delay,
            },
        )
        .await
        {
            return;
        }
        tokio::time::sleep(delay).await;
    }
}
