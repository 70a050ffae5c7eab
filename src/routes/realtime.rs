use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures::stream::SplitSink;
use futures::{Sink, SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::fanout::Timeline;
use crate::session::{parse_credential, AuthOutcome, Session, Signal};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct RealtimeQuery {
    pub stream: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/realtime", get(connect))
}

async fn connect(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<RealtimeQuery>,
) -> AppResult<Response> {
    let timeline = match query.stream.as_deref() {
        None | Some("") => Timeline::Home,
        Some(name) => Timeline::parse(name)
            .ok_or_else(|| AppError::BadFormat(format!("unknown stream {}", name)))?,
    };
    Ok(ws.on_upgrade(move |socket| run(socket, state, timeline)))
}

async fn send_signal(sink: &mut SplitSink<WebSocket, Message>, signal: &Signal) -> bool {
    sink.send(Message::Text(signal.to_frame().into())).await.is_ok()
}

async fn run(socket: WebSocket, state: AppState, timeline: Timeline) {
    let (mut sink, mut stream) = socket.split();
    let mut session = Session::new(timeline);

    // The first text frame carries the credential
    let credential = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => break parse_credential(text.as_str()),
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            Some(Ok(Message::Binary(_))) => break None,
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                session.disconnect();
                return;
            }
        }
    };

    let outcome = match credential {
        Some(token) => {
            session
                .authenticate(&token, &state.tokens, &state.records, &state.hub)
                .await
        }
        None => {
            session.disconnect();
            Ok(AuthOutcome::Rejected(AppError::Unauthorized.to_string()))
        }
    };

    let rx = match outcome {
        Ok(AuthOutcome::Accepted(rx)) => rx,
        Ok(AuthOutcome::Rejected(message)) => {
            send_signal(&mut sink, &Signal::Unauthorized { message }).await;
            let _ = sink.send(Message::Close(None)).await;
            return;
        }
        Err(e) => {
            tracing::warn!("Realtime session rejected: {}", e);
            let _ = sink.send(Message::Close(None)).await;
            return;
        }
    };

    if !send_signal(&mut sink, &Signal::Authenticated).await {
        session.disconnect();
        return;
    }

    let subscription = session.subscription().unwrap_or_default();
    tracing::debug!(
        session = %subscription,
        stream = session.timeline().as_str(),
        "Streaming to client"
    );
    let mut drain = tokio::spawn(forward(sink, rx, subscription));

    // Only control frames are expected from here on
    loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            _ = &mut drain => break,
        }
    }

    session.disconnect();
    drain.abort();
}

/// Write queued deliveries to the client until the hub drops the session.
///
/// A failed write is logged and the next delivery is still attempted; only the
/// read side decides that the client has gone.
async fn forward<S>(mut sink: S, mut rx: mpsc::Receiver<Arc<str>>, session: Uuid)
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    while let Some(frame) = rx.recv().await {
        if let Err(e) = sink.send(Message::Text(frame.to_string().into())).await {
            tracing::warn!(session = %session, "Failed to write delivery: {}", e);
        }
    }
}
