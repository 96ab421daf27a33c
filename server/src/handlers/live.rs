//! Live result feed.
//!
//! ```text
//! ws://localhost:8080/results/:competition_id
//! ```
//!
//! The server pushes the full `CompetitionResults` JSON array on connect and
//! after every committed change. Clients send nothing; anything they do
//! send is ignored apart from close frames.

use crate::extract::ApiPath;
use crate::state::AppState;
use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use topout_scoring::CompetitionId;
use tracing::{debug, info, warn};

/// Upgrade to a result feed for one competition.
#[allow(clippy::unused_async)] // Axum handler signature requires async
pub async fn results_feed(
    ws: WebSocketUpgrade,
    ApiPath(competition): ApiPath<CompetitionId>,
    State(state): State<AppState>,
) -> Response {
    info!(competition_id = %competition, "Observer connecting");
    ws.on_upgrade(move |socket| observe(socket, state, competition))
}

async fn observe(socket: WebSocket, state: AppState, competition: CompetitionId) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before reading the snapshot so no publish falls in between.
    let mut updates = state.hub.subscribe(competition).await;

    match state.snapshot(competition).await {
        Ok(payload) => {
            if sender.send(Message::Text(payload.to_string())).await.is_err() {
                return;
            }
        },
        Err(error) => warn!(competition_id = %competition, %error, "No initial snapshot"),
    }

    let mut send_task = tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(payload) => {
                    if sender.send(Message::Text(payload.to_string())).await.is_err() {
                        break;
                    }
                },
                // Every snapshot is complete, so the next one supersedes those skipped.
                Err(RecvError::Lagged(skipped)) => {
                    debug!(competition_id = %competition, skipped, "Observer lagging");
                },
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            if matches!(message, Message::Close(_)) {
                break;
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    state.hub.prune().await;
    info!(competition_id = %competition, "Observer disconnected");
}
