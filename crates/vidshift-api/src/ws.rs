//! Realtime progress over WebSocket.
//!
//! Clients join one or more jobs with `{"type":"join_job","job_id":..}`.
//! Joining replies with the job's current state as a `progress_update`,
//! after which every event of that job is forwarded until the socket closes.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::time::interval;
use tracing::{debug, info, warn};

use vidshift_models::{JobEvent, JobId};
use vidshift_store::StoreError;

use crate::metrics;
use crate::state::AppState;

const WS_SEND_BUFFER_SIZE: usize = 32;
const WS_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Messages accepted from clients.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    JoinJob { job_id: JobId },
    LeaveJob { job_id: JobId },
}

/// Connection-level messages sent to clients. Job events are sent as-is.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Connected { data: String },
    Error { detail: String },
}

/// Send a serialized message with backpressure handling.
async fn send_json<T: Serialize>(tx: &mpsc::Sender<Message>, msg: &T) -> bool {
    let json = match serde_json::to_string(msg) {
        Ok(j) => j,
        Err(_) => return false,
    };
    match tx.try_send(Message::Text(json.clone())) {
        Ok(_) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            debug!("WebSocket send buffer full, applying backpressure");
            tx.send(Message::Text(json)).await.is_ok()
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

async fn send_event(tx: &mpsc::Sender<Message>, event: &JobEvent) -> bool {
    metrics::record_ws_message_sent(event.event_name());
    send_json(tx, event).await
}

async fn send_error(tx: &mpsc::Sender<Message>, detail: impl Into<String>) -> bool {
    send_json(tx, &ServerMessage::Error { detail: detail.into() }).await
}

/// WebSocket progress endpoint.
pub async fn ws_progress(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    metrics::record_ws_connection();
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (ws_sender, mut receiver) = socket.split();

    // Subscribed before any snapshot is read so no event falls in between
    let mut events = state.service.subscribe();

    let (tx, mut rx) = mpsc::channel::<Message>(WS_SEND_BUFFER_SIZE);
    let send_task = tokio::spawn(async move {
        let mut ws_sender = ws_sender;
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                break;
            }
        }
        ws_sender
    });

    let greeting = ServerMessage::Connected {
        data: "Connected to progress server".to_string(),
    };
    if !send_json(&tx, &greeting).await {
        drop(tx);
        let _ = send_task.await;
        return;
    }
    info!("WebSocket client connected");

    let mut joined: HashSet<JobId> = HashSet::new();
    let mut heartbeat = interval(WS_HEARTBEAT_INTERVAL);
    let mut last_activity = Instant::now();

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        if !joined.contains(event.job_id()) {
                            continue;
                        }
                        last_activity = Instant::now();
                        if !send_event(&tx, &event).await {
                            warn!("WebSocket send failed, client disconnected");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "WebSocket observer lagged, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            client_msg = receiver.next() => {
                match client_msg {
                    Some(Ok(Message::Text(text))) => {
                        last_activity = Instant::now();
                        if !handle_client_message(&text, &state, &tx, &mut joined).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        last_activity = Instant::now();
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Client closed connection");
                        break;
                    }
                    Some(Err(e)) => {
                        debug!(error = %e, "WebSocket receive error");
                        break;
                    }
                    _ => {}
                }
            }
            _ = heartbeat.tick() => {
                if last_activity.elapsed() > WS_HEARTBEAT_INTERVAL / 2
                    && tx.send(Message::Ping(Vec::new())).await.is_err()
                {
                    warn!("Heartbeat failed, client disconnected");
                    break;
                }
            }
        }
    }

    drop(tx);
    let _ = send_task.await;
    debug!(jobs = joined.len(), "WebSocket connection ended");
}

/// Apply one client message. Returns false once the client is gone.
async fn handle_client_message(
    text: &str,
    state: &AppState,
    tx: &mpsc::Sender<Message>,
    joined: &mut HashSet<JobId>,
) -> bool {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => return send_error(tx, format!("Invalid message: {}", e)).await,
    };

    match msg {
        ClientMessage::JoinJob { job_id } => match state.service.store().read(&job_id).await {
            Ok(record) => {
                debug!(job_id = %job_id, "Client joined job");
                joined.insert(job_id);
                send_event(tx, &JobEvent::snapshot(&record)).await
            }
            Err(StoreError::NotFound(_)) => send_error(tx, "Job not found").await,
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Failed to read job for join");
                send_error(tx, "Could not read job state").await
            }
        },
        ClientMessage::LeaveJob { job_id } => {
            joined.remove(&job_id);
            true
        }
    }
}
