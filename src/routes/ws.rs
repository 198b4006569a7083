//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! forwarded to core logic. We reply with a single JSON message per request.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{debug, error, info, instrument};

use crate::error::ServiceError;
use crate::logic;
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::state::AppState;
use crate::tutor::suggested_questions;

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "questline", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "questline", "WebSocket connected");
  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "questline", "WS received: {:?}", &incoming);
            handle_client_ws(incoming, &state).await
          }
          Err(e) => ServerWsMessage::Error {
            code: "bad_request".into(),
            message: format!("Invalid JSON: {}", e),
            retryable: false,
          },
        };

        let out = serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "code": "internal", "message": format!("Serialization error: {}", e), "retryable": false }).to_string()
        });

        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "questline", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }
  info!(target: "questline", "WebSocket disconnected");
}

fn ws_error(e: ServiceError) -> ServerWsMessage {
  ServerWsMessage::Error { code: e.code().into(), message: e.to_string(), retryable: e.is_retryable() }
}

#[instrument(level = "info", skip(state))]
pub(crate) async fn handle_client_ws(msg: ClientWsMessage, state: &AppState) -> ServerWsMessage {
  match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,

    ClientWsMessage::Chapters { user_id } => match logic::chapter_board(state, &user_id).await {
      Ok(chapters) => ServerWsMessage::Chapters { chapters },
      Err(e) => ws_error(e),
    },

    ClientWsMessage::SubmitQuest { user_id, quest_id, answers } => {
      match logic::submit_quest(state, &user_id, &quest_id, &answers).await {
        Ok(outcome) => {
          info!(target: "questline", %quest_id, score = outcome.score, result = ?outcome.result, "WS quest submitted");
          ServerWsMessage::QuestOutcome { outcome }
        }
        Err(e) => ws_error(e),
      }
    }

    ClientWsMessage::AskTutor { topic, question } => {
      let reply = logic::ask_tutor(state, &topic, &question).await;
      ServerWsMessage::TutorReply { reply }
    }

    ClientWsMessage::Suggestions { topic } => ServerWsMessage::Suggestions {
      questions: suggested_questions(&topic).into_iter().map(String::from).collect(),
    },
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::AppConfig;
  use crate::store::DocumentStore;

  async fn state() -> AppState {
    let store = DocumentStore::in_memory();
    crate::seeds::seed_if_empty(&store).await.unwrap();
    AppState::with_parts(store, AppConfig::default(), None)
  }

  #[tokio::test]
  async fn ping_and_locked_submission() {
    let st = state().await;
    assert!(matches!(handle_client_ws(ClientWsMessage::Ping, &st).await, ServerWsMessage::Pong));

    let msg = ClientWsMessage::SubmitQuest { user_id: "u3".into(), quest_id: "q4".into(), answers: vec![] };
    match handle_client_ws(msg, &st).await {
      ServerWsMessage::Error { code, retryable, .. } => {
        assert_eq!(code, "locked");
        assert!(!retryable);
      }
      other => panic!("unexpected {:?}", other),
    }
  }

  #[tokio::test]
  async fn unknown_user_board_is_not_found() {
    let st = state().await;
    let msg = ClientWsMessage::Chapters { user_id: "ghost".into() };
    assert!(matches!(handle_client_ws(msg, &st).await, ServerWsMessage::Error { code, .. } if code == "not_found"));
  }
}
