//! `GET /api/v1/jobs/{id}/events`: a WebSocket that follows one job.
//!
//! The first frame is the job's current state; each later frame is a
//! transition taken from the [`JobEventBus`](planforge_worker::JobEventBus).
//! Frames are JSON-encoded [`JobEvent`]s. The server closes the socket after
//! the terminal frame.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use planforge_core::job::Job;
use planforge_worker::{JobEvent, JobEventType, JobRegistry};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::error::AppResult;
use crate::handlers::path_job_id;
use crate::middleware::api_key::RequireApiKey;
use crate::state::AppState;

/// Interval between heartbeat pings.
const HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// Upgrade to a WebSocket streaming the job's lifecycle events.
///
/// Unknown ids are rejected with 404 before the upgrade.
pub async fn job_events(
    _auth: RequireApiKey,
    State(state): State<AppState>,
    Path(id): Path<String>,
    ws: WebSocketUpgrade,
) -> AppResult<impl IntoResponse> {
    let id = path_job_id(id)?;
    // Subscribe before the snapshot so no transition falls in between.
    let events = state.scheduler.events().subscribe();
    let job = state.scheduler.registry().get(&id)?;
    let registry = Arc::clone(state.scheduler.registry());

    Ok(ws.on_upgrade(move |socket| stream_job_events(socket, job, events, registry)))
}

async fn stream_job_events(
    socket: WebSocket,
    job: Job,
    events: broadcast::Receiver<JobEvent>,
    registry: Arc<JobRegistry>,
) {
    let job_id = job.id.clone();
    tracing::info!(job_id = %job_id, "Job event stream connected");

    let (sink, mut stream) = socket.split();
    let mut send_task = tokio::spawn(forward_events(sink, job, events, registry));

    let receiver_job_id = job_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = stream.next().await {
            match result {
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(job_id = %receiver_job_id, error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
    tracing::info!(job_id = %job_id, "Job event stream disconnected");
}

/// Send the snapshot, then every later transition, then a close frame.
async fn forward_events(
    mut sink: SplitSink<WebSocket, Message>,
    job: Job,
    mut events: broadcast::Receiver<JobEvent>,
    registry: Arc<JobRegistry>,
) {
    let job_id = job.id.clone();
    let first = JobEvent::current(&job);
    let mut last = first.event_type;
    if send_event(&mut sink, &first).await.is_err() {
        return;
    }

    let mut heartbeat = tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
    heartbeat.tick().await;

    while !last.is_terminal() {
        let next = tokio::select! {
            received = events.recv() => match received {
                Ok(event) if event.job_id == job_id => Some(event),
                Ok(_) => None,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(job_id = %job_id, skipped, "Job event stream lagged");
                    match registry.get(&job_id) {
                        Ok(job) => Some(JobEvent::current(&job)),
                        Err(_) => break,
                    }
                }
                Err(RecvError::Closed) => break,
            },
            _ = heartbeat.tick() => {
                if sink.send(Message::Ping(Bytes::new())).await.is_err() {
                    return;
                }
                None
            }
        };

        // Drop repeats of the snapshot state.
        if let Some(event) = next.filter(|e| progress(e.event_type) > progress(last)) {
            last = event.event_type;
            if send_event(&mut sink, &event).await.is_err() {
                return;
            }
        }
    }

    let _ = sink.send(Message::Close(None)).await;
}

async fn send_event(
    sink: &mut SplitSink<WebSocket, Message>,
    event: &JobEvent,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(event).map_err(axum::Error::new)?;
    sink.send(Message::Text(text.into())).await
}

fn progress(event_type: JobEventType) -> u8 {
    match event_type {
        JobEventType::Queued => 0,
        JobEventType::Started => 1,
        JobEventType::Succeeded | JobEventType::Failed => 2,
    }
}
