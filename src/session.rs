// Per-connection session state machine: Connected -> Authenticated -> Closed
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::auth::{Identity, TokenIssuer};
use crate::error::AppError;
use crate::fanout::{Hub, Registration, Timeline};
use crate::records::Records;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Authenticated(Identity),
    Closed,
}

impl SessionState {
    fn name(&self) -> &'static str {
        match self {
            SessionState::Connected => "connected",
            SessionState::Authenticated(_) => "authenticated",
            SessionState::Closed => "closed",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("cannot authenticate a session that is {0}")]
    InvalidTransition(&'static str),
}

/// Control frames sent to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum Signal {
    Authenticated,
    Unauthorized { message: String },
}

impl Signal {
    pub fn to_frame(&self) -> String {
        // Two fixed shapes with string fields; serialization cannot fail
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"event":"unauthorized"}"#.into())
    }
}

pub enum AuthOutcome {
    /// Registered with the hub; deliveries arrive on the receiver.
    Accepted(mpsc::Receiver<Arc<str>>),
    /// Credential refused. The session is closed and the transport must be too.
    Rejected(String),
}

#[derive(Deserialize)]
struct AuthenticateFrame {
    event: String,
    token: String,
}

/// Pull the bearer token out of the first client frame.
///
/// Accepts either the raw token or `{"event":"authenticate","token":"..."}`.
pub fn parse_credential(frame: &str) -> Option<String> {
    let frame = frame.trim();
    if frame.starts_with('{') {
        let parsed: AuthenticateFrame = serde_json::from_str(frame).ok()?;
        if parsed.event != "authenticate" || parsed.token.is_empty() {
            return None;
        }
        return Some(parsed.token);
    }
    if frame.is_empty() {
        None
    } else {
        Some(frame.to_string())
    }
}

pub struct Session {
    state: SessionState,
    timeline: Timeline,
    registration: Option<Registration>,
}

impl Session {
    pub fn new(timeline: Timeline) -> Self {
        Self {
            state: SessionState::Connected,
            timeline,
            registration: None,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn timeline(&self) -> Timeline {
        self.timeline
    }

    /// Hub subscription id while authenticated.
    pub fn subscription(&self) -> Option<Uuid> {
        self.registration.as_ref().map(Registration::id)
    }

    /// Verify a credential and, on success, register with the hub.
    ///
    /// Only valid while `Connected`. Any refusal moves the session to `Closed`.
    pub async fn authenticate(
        &mut self,
        token: &str,
        tokens: &TokenIssuer,
        records: &Records,
        hub: &Hub,
    ) -> Result<AuthOutcome, SessionError> {
        if self.state != SessionState::Connected {
            return Err(SessionError::InvalidTransition(self.state.name()));
        }

        let identity = match check_identity(token, tokens, records).await {
            Ok(identity) => identity,
            Err(err) => {
                self.state = SessionState::Closed;
                let message = match err {
                    AppError::Suspended => AppError::Suspended.to_string(),
                    AppError::Unauthorized | AppError::NotFound => {
                        AppError::Unauthorized.to_string()
                    }
                    other => {
                        tracing::error!("Session authentication failed: {}", other);
                        "internal server error".to_string()
                    }
                };
                return Ok(AuthOutcome::Rejected(message));
            }
        };

        let (registration, rx) = hub.register(&identity.user_id, self.timeline);
        tracing::info!(
            session = %registration.id(),
            user = %identity.user_id,
            "Session authenticated"
        );
        self.registration = Some(registration);
        self.state = SessionState::Authenticated(identity);
        Ok(AuthOutcome::Accepted(rx))
    }

    /// Leave the hub and close. Safe to call in any state.
    pub fn disconnect(&mut self) {
        if let Some(registration) = self.registration.take() {
            tracing::debug!(session = %registration.id(), "Session disconnected");
        }
        self.state = SessionState::Closed;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.disconnect();
    }
}

async fn check_identity(
    token: &str,
    tokens: &TokenIssuer,
    records: &Records,
) -> Result<Identity, AppError> {
    let identity = tokens.verify(token)?;
    let user = records.find_user(&identity.user_id).await?;
    if user.suspended {
        return Err(AppError::Suspended);
    }
    Ok(identity)
}
