use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;

/// What the client is doing right now, for display only.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ClientStatus {
    Idle,
    Sending {
        url: String,
        attempt: u32,
        max_attempts: u32,
    },
    ColdStart {
        attempt: u32,
        max_attempts: u32,
        wait_ms: u64,
    },
    NetworkRetry {
        attempt: u32,
        max_attempts: u32,
        wait_ms: u64,
        reason: String,
    },
    SessionRenewing,
    Failed {
        message: String,
    },
}

impl ClientStatus {
    pub fn describe(&self) -> String {
        match self {
            ClientStatus::Idle => "idle".to_string(),
            ClientStatus::Sending {
                url,
                attempt,
                max_attempts,
            } => format!("sending {url} (attempt {attempt}/{max_attempts})"),
            ClientStatus::ColdStart {
                attempt,
                max_attempts,
                wait_ms,
            } => format!(
                "server is starting up, retrying in {:.1}s (attempt {attempt}/{max_attempts})",
                *wait_ms as f64 / 1000.0
            ),
            ClientStatus::NetworkRetry {
                attempt,
                max_attempts,
                wait_ms,
                reason,
            } => format!(
                "{reason}; retrying in {:.1}s (attempt {attempt}/{max_attempts})",
                *wait_ms as f64 / 1000.0
            ),
            ClientStatus::SessionRenewing => "session expired, renewing".to_string(),
            ClientStatus::Failed { message } => message.clone(),
        }
    }
}

/// Single-slot status display shared by every clone of the client.
#[derive(Clone)]
pub struct StatusBoard {
    tx: Arc<watch::Sender<ClientStatus>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ClientStatus::Idle);
        Self { tx: Arc::new(tx) }
    }

    pub fn publish(&self, status: ClientStatus) {
        self.tx.send_replace(status);
    }

    pub fn current(&self) -> ClientStatus {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ClientStatus> {
        self.tx.subscribe()
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_is_visible_to_subscribers() {
        let board = StatusBoard::new();
        let rx = board.subscribe();
        board.publish(ClientStatus::SessionRenewing);
        assert_eq!(*rx.borrow(), ClientStatus::SessionRenewing);
        assert_eq!(board.current(), ClientStatus::SessionRenewing);
    }

    #[test]
    fn cold_start_description_mentions_wait() {
        let status = ClientStatus::ColdStart {
            attempt: 1,
            max_attempts: 3,
            wait_ms: 3000,
        };
        assert_eq!(
            status.describe(),
            "server is starting up, retrying in 3.0s (attempt 1/3)"
        );
    }
}
