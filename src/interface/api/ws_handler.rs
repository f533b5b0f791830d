//! WebSocket controller transport
//!
//! Each socket is one attached controller. Outbound text frames are
//! controller events (catch-up first, then deltas); inbound text frames
//! are `{"request_id": .., "command": {"op": ..}}` and each one is
//! answered with a `{"type": "result"}` frame.

use super::state::AppState;
use crate::application::{ControllerCommand, ControllerHandle};
use crate::domain::shared::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

#[derive(Debug, Deserialize)]
pub struct CommandFrame {
    #[serde(default)]
    pub request_id: Option<Value>,
    pub command: ControllerCommand,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "type", rename = "result")]
pub struct ResultFrame {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Value>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ResultFrame {
    fn from_result(request_id: Option<Value>, result: Result<()>) -> Self {
        match result {
            Ok(()) => Self {
                request_id,
                success: true,
                error: None,
                code: None,
            },
            Err(e) => Self {
                request_id,
                success: false,
                error: Some(e.to_string()),
                code: Some(e.code().to_string()),
            },
        }
    }

    fn malformed(error: serde_json::Error) -> Self {
        Self {
            request_id: None,
            success: false,
            error: Some(error.to_string()),
            code: Some("invalid_request".to_string()),
        }
    }
}

/// WebSocket handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let mut controller = match state.broker.attach_controller().await {
        Ok(controller) => controller,
        Err(e) => {
            warn!("WebSocket controller refused: {}", e);
            return;
        }
    };
    let (mut sender, mut receiver) = socket.split();
    info!("WebSocket controller {} attached", controller.id());

    loop {
        tokio::select! {
            event = controller.next_event() => {
                let Some(event) = event else {
                    debug!("Broker stopped, closing controller {}", controller.id());
                    break;
                };
                if send_json(&mut sender, &event).await.is_err() {
                    break;
                }
            }
            message = receiver.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    let frame = execute(&controller, &text).await;
                    if send_json(&mut sender, &frame).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("WebSocket receive error: {}", e);
                    break;
                }
            }
        }
    }

    info!("WebSocket controller {} detached", controller.id());
}

async fn execute(controller: &ControllerHandle, text: &str) -> ResultFrame {
    let frame: CommandFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!("Malformed controller frame: {}", e);
            return ResultFrame::malformed(e);
        }
    };
    debug!(
        "Controller {} command {}",
        controller.id(),
        frame.command.name()
    );
    let result = controller.execute(frame.command).await;
    ResultFrame::from_result(frame.request_id, result)
}

async fn send_json<T: Serialize>(
    sender: &mut SplitSink<WebSocket, Message>,
    value: &T,
) -> std::result::Result<(), axum::Error> {
    match serde_json::to_string(value) {
        Ok(json) => sender.send(Message::Text(json)).await,
        Err(e) => {
            error!("Failed to serialize frame: {}", e);
            Ok(())
        }
    }
}
