//! WebSocket endpoint streaming a job's progress feed.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use tracing::warn;
use uuid::Uuid;

use postline_core::ResourceId;

use crate::AppState;

/// Upgrade handler for `GET /ws/jobs/{id}/progress`.
pub async fn progress_ws(
    ws: WebSocketUpgrade,
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Response {
    let job_id = ResourceId::from_uuid(id);
    ws.on_upgrade(move |socket| stream_progress(socket, state, job_id))
}

async fn stream_progress(mut socket: WebSocket, state: AppState, job_id: ResourceId) {
    let mut feed = state.feed.subscribe(job_id);
    loop {
        tokio::select! {
            event = feed.recv() => {
                // the feed closing means the job reached a terminal status
                let Some(event) = event else { break };
                let Ok(json) = serde_json::to_string(&event) else { continue };
                if socket.send(Message::Text(json.into())).await.is_err() {
                    // client gone; dropping the feed cancels only the feed,
                    // never the job
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(job_id = %job_id, error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }
    let _ = socket.send(Message::Close(None)).await;
}
