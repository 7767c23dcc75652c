use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::results::ResultEntry;
use crate::viewer::ViewerSnapshot;

use super::{FileFailure, RunKind};

const EVENT_CAPACITY: usize = 1024;

/// Everything a renderer needs to mirror the controllers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum AppEvent {
    RunStarted {
        run_id: Uuid,
        kind: RunKind,
        total: Option<usize>,
    },
    GalleryInfo {
        title: Option<String>,
        pages_to_process: Option<u32>,
    },
    ResultAdded {
        entry: ResultEntry,
    },
    Progress {
        percent: u8,
        label: String,
    },
    FileFailed {
        failure: FileFailure,
    },
    Warning {
        message: String,
    },
    /// The run aborted before any progress could be shown.
    ProgressHidden,
    RunFinished {
        run_id: Uuid,
        kind: RunKind,
        succeeded: usize,
        failed: usize,
    },
    Viewer {
        snapshot: ViewerSnapshot,
    },
}

#[derive(Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<AppEvent>,
}

impl EventEmitter {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    /// Fire-and-forget; having no subscriber is not an error.
    pub fn emit(&self, event: AppEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}
