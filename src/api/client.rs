use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};

use crate::settings::ClientSettings;

use super::{
    error_detail,
    session::signals_session_expiry,
    ApiError, ApiRequest, ApiResponse, ClientStatus, FilePart, RequestBody, RetryPolicy,
    SessionManager, StatusBoard, Transport,
};

// Set to true to trace every attempt in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

pub const SESSION_PATH: &str = "/get-session";
pub const HEALTH_PATH: &str = "/health";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HealthReport {
    pub alive: bool,
    pub endpoint: String,
    pub status: Option<u16>,
    pub message: String,
}

/// Retrying HTTP client for the translation API.
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    timeout: Duration,
    session: Option<Arc<SessionManager>>,
    session_header: String,
    blocked_hosts: Vec<String>,
    status: StatusBoard,
}

impl ApiClient {
    pub fn new(settings: &ClientSettings, transport: Arc<dyn Transport>) -> Self {
        let base_url = settings.api_base_url.trim_end_matches('/').to_string();
        let timeout = settings.request_timeout();
        let session = settings.session.enabled.then(|| {
            Arc::new(SessionManager::new(
                format!("{base_url}{SESSION_PATH}"),
                transport.clone(),
                timeout,
            ))
        });

        Self {
            base_url,
            transport,
            policy: settings.retry.policy(),
            timeout,
            session,
            session_header: settings.session.header_name.clone(),
            blocked_hosts: settings
                .blocked_hosts
                .iter()
                .map(|host| host.trim().to_ascii_lowercase())
                .filter(|host| !host.is_empty())
                .collect(),
            status: StatusBoard::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn status(&self) -> &StatusBoard {
        &self.status
    }

    pub fn session(&self) -> Option<&Arc<SessionManager>> {
        self.session.as_ref()
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse, ApiError> {
        self.execute(ApiRequest::get(self.endpoint(path))).await
    }

    pub async fn post_form(
        &self,
        path: &str,
        fields: Vec<(String, String)>,
    ) -> Result<ApiResponse, ApiError> {
        self.execute(ApiRequest::post(self.endpoint(path), RequestBody::Form(fields)))
            .await
    }

    pub async fn post_file(&self, path: &str, part: FilePart) -> Result<ApiResponse, ApiError> {
        self.execute(ApiRequest::post(
            self.endpoint(path),
            RequestBody::Multipart(part),
        ))
        .await
    }

    /// Sends `request` under the retry policy.
    ///
    /// A response is returned for success and for any status that is not
    /// retried (including a 503 on the last attempt). Errors come back for
    /// 429, 405, a blocked host, or when network failures exhaust the policy.
    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        self.execute_with(request, true).await
    }

    /// Same retry policy as [`ApiClient::execute`], but never handshakes or
    /// attaches a session token. Health checks go through here.
    pub async fn execute_without_session(
        &self,
        request: ApiRequest,
    ) -> Result<ApiResponse, ApiError> {
        self.execute_with(request, false).await
    }

    /// Buffers a response body under the per-attempt timeout.
    pub async fn read_body(&self, response: ApiResponse) -> Result<Bytes, ApiError> {
        tokio::time::timeout(self.timeout, response.bytes())
            .await
            .map_err(|_| ApiError::Timeout(self.timeout))?
            .map_err(ApiError::from)
    }

    pub async fn read_text(&self, response: ApiResponse) -> Result<String, ApiError> {
        let bytes = self.read_body(response).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub async fn read_json<T: DeserializeOwned>(
        &self,
        response: ApiResponse,
    ) -> Result<T, ApiError> {
        let bytes = self.read_body(response).await?;
        serde_json::from_slice(&bytes).map_err(|err| ApiError::Decode(err.to_string()))
    }

    async fn execute_with(
        &self,
        request: ApiRequest,
        with_session: bool,
    ) -> Result<ApiResponse, ApiError> {
        self.guard_host(&request.url)?;

        let max_attempts = self.policy.max_attempts;
        let mut attempt = 1;

        loop {
            self.status.publish(ClientStatus::Sending {
                url: request.url.clone(),
                attempt,
                max_attempts,
            });

            let outcome = if with_session {
                self.attempt_with_session(&request).await
            } else {
                self.send_once(request.clone()).await
            };
            match outcome {
                Ok(response) => match response.status() {
                    429 => {
                        let body = self.read_text(response).await.unwrap_or_default();
                        let detail = error_detail(&body);
                        self.fail(format!("rate limited: {detail}"));
                        return Err(ApiError::RateLimited(detail));
                    }
                    405 => {
                        let err = ApiError::MethodNotAllowed {
                            url: request.url.clone(),
                        };
                        self.fail(err.to_string());
                        return Err(err);
                    }
                    status
                        if self.policy.is_retryable_status(status)
                            && self.policy.has_attempts_left(attempt) =>
                    {
                        let wait = self.policy.delay_for(attempt);
                        log_warn!(
                            "{} answered {} (cold start), retry {}/{} in {:?}",
                            request.url,
                            status,
                            attempt,
                            max_attempts,
                            wait
                        );
                        self.status.publish(ClientStatus::ColdStart {
                            attempt,
                            max_attempts,
                            wait_ms: wait.as_millis() as u64,
                        });
                        tokio::time::sleep(wait).await;
                        attempt += 1;
                    }
                    status => {
                        log_debug!("{} answered {} on attempt {}", request.url, status, attempt);
                        self.status.publish(ClientStatus::Idle);
                        return Ok(response);
                    }
                },
                Err(err) if err.is_transient() && self.policy.has_attempts_left(attempt) => {
                    let wait = self.policy.delay_for(attempt);
                    log_warn!(
                        "{} failed on attempt {}/{}: {}; retrying in {:?}",
                        request.url,
                        attempt,
                        max_attempts,
                        err,
                        wait
                    );
                    self.status.publish(ClientStatus::NetworkRetry {
                        attempt,
                        max_attempts,
                        wait_ms: wait.as_millis() as u64,
                        reason: err.to_string(),
                    });
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(err) if err.is_transient() => {
                    let err = ApiError::Exhausted {
                        attempts: attempt,
                        source: Box::new(err),
                    };
                    self.fail(err.to_string());
                    return Err(err);
                }
                Err(err) => {
                    self.fail(err.to_string());
                    return Err(err);
                }
            }
        }
    }

    /// GET `/health`, falling back to `/`. A 404 still proves the server is up.
    /// Health checks skip the session handshake.
    pub async fn health_check(&self) -> HealthReport {
        let mut last_error = String::new();

        for path in [HEALTH_PATH, "/"] {
            let endpoint = self.endpoint(path);
            match self
                .execute_without_session(ApiRequest::get(endpoint.clone()))
                .await
            {
                Ok(response) => {
                    let status = response.status();
                    let alive = response.is_success() || status == 404;
                    log_info!("health check {} answered {}", endpoint, status);
                    return HealthReport {
                        alive,
                        endpoint,
                        status: Some(status),
                        message: if alive {
                            "translation server is reachable".to_string()
                        } else {
                            format!("translation server answered HTTP {status}")
                        },
                    };
                }
                Err(err @ (ApiError::BlockedHost { .. } | ApiError::InvalidUrl { .. })) => {
                    return HealthReport {
                        alive: false,
                        endpoint,
                        status: None,
                        message: err.to_string(),
                    };
                }
                Err(err) => {
                    log_warn!("health check {} failed: {}", endpoint, err);
                    last_error = err.to_string();
                }
            }
        }

        HealthReport {
            alive: false,
            endpoint: self.endpoint("/"),
            status: None,
            message: last_error,
        }
    }

    async fn attempt_with_session(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let Some(session) = &self.session else {
            return self.send_once(request.clone()).await;
        };

        let mut renewed = false;
        loop {
            let token = session.ensure_active().await?;
            let mut outgoing = request.clone();
            outgoing.headers.push((self.session_header.clone(), token));

            let response = self.send_once(outgoing).await?;
            if response.status() != 403 {
                return Ok(response);
            }

            let body = self.read_text(response).await?;
            if renewed || !signals_session_expiry(&body) {
                return Ok(ApiResponse::buffered(403, Bytes::from(body)));
            }

            log_warn!("session rejected by {}, renewing", request.url);
            self.status.publish(ClientStatus::SessionRenewing);
            session.invalidate();
            renewed = true;
        }
    }

    async fn send_once(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        tokio::time::timeout(self.timeout, self.transport.send(request))
            .await
            .map_err(|_| ApiError::Timeout(self.timeout))?
    }

    fn guard_host(&self, url: &str) -> Result<(), ApiError> {
        let parsed = reqwest::Url::parse(url).map_err(|err| ApiError::InvalidUrl {
            url: url.to_string(),
            reason: err.to_string(),
        })?;
        let host = parsed
            .host_str()
            .ok_or_else(|| ApiError::InvalidUrl {
                url: url.to_string(),
                reason: "missing host".to_string(),
            })?
            .to_ascii_lowercase();

        let blocked = self
            .blocked_hosts
            .iter()
            .any(|blocked| host == *blocked || host.ends_with(&format!(".{blocked}")));
        if blocked {
            let err = ApiError::BlockedHost {
                url: url.to_string(),
                host,
            };
            self.fail(err.to_string());
            return Err(err);
        }
        Ok(())
    }

    fn fail(&self, message: String) {
        self.status.publish(ClientStatus::Failed { message });
    }
}
