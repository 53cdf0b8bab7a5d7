//! WebSocket stream of agent events
//!
//! Each agent event is sent as one JSON text frame. A client that falls
//! behind the broadcast buffer receives a `lagged` info frame with the number
//! of dropped events and keeps streaming from the oldest retained one.
use crate::{agent::AgentEvent, context::AppContext};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use futures::{
    sink::SinkExt,
    stream::{SplitSink, StreamExt},
};
use serde::Serialize;
use tokio::{
    sync::broadcast::error::RecvError,
    time::{interval, timeout, Duration, Instant},
};

const SEND_TIMEOUT_MS: u64 = 5000;
const PING_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Serialize)]
#[serde(tag = "frame", rename_all = "snake_case")]
enum EventFrame<'a> {
    Info {
        name: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Event(&'a AgentEvent),
}

pub fn routes() -> Router<AppContext> {
    Router::new().route("/events", get(subscribe_events))
}

/// GET /events
pub async fn subscribe_events(ws: WebSocketUpgrade, State(ctx): State<AppContext>) -> Response {
    ws.on_upgrade(move |socket| handle_subscription(socket, ctx))
}

async fn handle_subscription(socket: WebSocket, ctx: AppContext) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = ctx.agent.subscribe();

    let hello = EventFrame::Info {
        name: "Connected",
        message: None,
    };
    if send_frame(&mut sender, &hello).await.is_err() {
        return;
    }

    let mut ping_interval = interval(Duration::from_secs(PING_INTERVAL_SECS));
    let mut last_activity = Instant::now();

    loop {
        tokio::select! {
            event = events.recv() => {
                let sent = match event {
                    Ok(event) => send_frame(&mut sender, &EventFrame::Event(&event)).await,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Event subscriber lagged by {} events", skipped);
                        let info = EventFrame::Info {
                            name: "Lagged",
                            message: Some(format!("{} events dropped", skipped)),
                        };
                        send_frame(&mut sender, &info).await
                    }
                    Err(RecvError::Closed) => {
                        tracing::debug!("Agent stopped, closing event stream");
                        break;
                    }
                };

                match sent {
                    Ok(()) => last_activity = Instant::now(),
                    Err(()) => break,
                }
            }

            _ = ping_interval.tick() => {
                if last_activity.elapsed() > Duration::from_secs(PING_INTERVAL_SECS)
                    && sender.send(Message::Ping(vec![])).await.is_err()
                {
                    break;
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::debug!("Event client disconnected");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => last_activity = Instant::now(),
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }
        }
    }
}

/// Serialize and send one frame; `Err` means the client is gone or too slow
async fn send_frame(
    sender: &mut SplitSink<WebSocket, Message>,
    frame: &EventFrame<'_>,
) -> Result<(), ()> {
    let json = match serde_json::to_string(frame) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!("Failed to serialize event frame: {}", e);
            return Ok(());
        }
    };

    match timeout(
        Duration::from_millis(SEND_TIMEOUT_MS),
        sender.send(Message::Text(json)),
    )
    .await
    {
        Ok(Ok(())) => Ok(()),
        Ok(Err(_)) => Err(()),
        Err(_) => {
            tracing::warn!("Send timeout, dropping slow event client");
            Err(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::keys::test_keys::key;

    #[test]
    fn test_event_frame_json() {
        let event = AgentEvent::ContactSaved { key: key(1) };
        let json = serde_json::to_value(EventFrame::Event(&event)).unwrap();
        assert_eq!(json["frame"], "event");
        assert_eq!(json["event"], "contact_saved");
        assert_eq!(json["key"], key(1).to_address());
    }
}
