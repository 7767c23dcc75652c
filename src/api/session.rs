use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use super::{error_detail, ApiError, ApiRequest, Transport};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    Uninitialized,
    Initializing,
    Active,
    Expired,
}

#[derive(Deserialize)]
struct SessionPayload {
    token: String,
}

struct SessionInner {
    phase: SessionPhase,
    token: Option<String>,
}

/// Opaque server session shared by all requests of one client.
pub struct SessionManager {
    endpoint: String,
    transport: Arc<dyn Transport>,
    timeout: Duration,
    inner: Mutex<SessionInner>,
    // Serialises handshakes so concurrent callers share one.
    handshake: tokio::sync::Mutex<()>,
}

impl SessionManager {
    pub fn new(endpoint: String, transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self {
            endpoint,
            transport,
            timeout,
            inner: Mutex::new(SessionInner {
                phase: SessionPhase::Uninitialized,
                token: None,
            }),
            handshake: tokio::sync::Mutex::new(()),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner.lock().unwrap().phase
    }

    pub fn token(&self) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        match inner.phase {
            SessionPhase::Active => inner.token.clone(),
            _ => None,
        }
    }

    /// Runs the handshake unconditionally and stores the new token.
    pub async fn acquire(&self) -> Result<String, ApiError> {
        let _handshake = self.handshake.lock().await;
        self.acquire_locked().await
    }

    /// Returns the active token, running the handshake first if needed.
    pub async fn ensure_active(&self) -> Result<String, ApiError> {
        if let Some(token) = self.token() {
            return Ok(token);
        }

        let _handshake = self.handshake.lock().await;
        if let Some(token) = self.token() {
            return Ok(token);
        }
        self.acquire_locked().await
    }

    pub fn invalidate(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.phase == SessionPhase::Active {
            log_warn!("session token invalidated by server");
        }
        inner.phase = SessionPhase::Expired;
        inner.token = None;
    }

    async fn acquire_locked(&self) -> Result<String, ApiError> {
        self.set_phase(SessionPhase::Initializing, None);

        match self.handshake_request().await {
            Ok(token) => {
                log_info!("session established");
                self.set_phase(SessionPhase::Active, Some(token.clone()));
                Ok(token)
            }
            Err(err) => {
                log_warn!("session handshake failed: {}", err);
                self.set_phase(SessionPhase::Uninitialized, None);
                Err(err)
            }
        }
    }

    async fn handshake_request(&self) -> Result<String, ApiError> {
        let send = self.transport.send(ApiRequest::get(self.endpoint.clone()));
        let response = tokio::time::timeout(self.timeout, send)
            .await
            .map_err(|_| ApiError::Session(format!("timed out after {}s", self.timeout.as_secs())))?
            .map_err(|err| ApiError::Session(err.to_string()))?;

        if !response.is_success() {
            let status = response.status();
            let body = tokio::time::timeout(self.timeout, response.text())
                .await
                .ok()
                .and_then(Result::ok)
                .unwrap_or_default();
            return Err(ApiError::Session(format!(
                "HTTP {status}: {}",
                error_detail(&body)
            )));
        }

        let payload: SessionPayload = tokio::time::timeout(self.timeout, response.json())
            .await
            .map_err(|_| ApiError::Session("timed out reading the session token".into()))?
            .map_err(|err| ApiError::Session(err.to_string()))?;
        if payload.token.trim().is_empty() {
            return Err(ApiError::Session("server returned an empty token".into()));
        }
        Ok(payload.token)
    }

    fn set_phase(&self, phase: SessionPhase, token: Option<String>) {
        let mut inner = self.inner.lock().unwrap();
        inner.phase = phase;
        inner.token = token;
    }
}

/// A 403 only means "session expired" when the body says so.
pub fn signals_session_expiry(body: &str) -> bool {
    body.to_ascii_lowercase().contains("session")
}
