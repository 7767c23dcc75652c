use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    api::{ApiClient, ApiError, HealthReport},
    results::{ImagePayload, ResultEntry},
    settings::ClientSettings,
    viewer::{
        ImageLoader, LoadTicket, Viewer, ViewerAction, ViewerError, ViewerInput, ViewerSnapshot,
        Viewport,
    },
};

use super::{
    events::{AppEvent, EventEmitter},
    state::{RunGuard, RunKind, TranslationSnapshot, TranslationState},
};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("a translation run is already in progress; wait for it to finish")]
    Busy,

    #[error("{0}")]
    InvalidInput(String),

    #[error("server rejected the request with HTTP {status}: {detail}")]
    Rejected { status: u16, detail: String },

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Owns the translation run state, the overlay image list and the viewer.
#[derive(Clone)]
pub struct TranslatorController {
    pub(super) client: ApiClient,
    loader: ImageLoader,
    pub(super) state: Arc<Mutex<TranslationState>>,
    viewer: Arc<Mutex<Viewer>>,
    busy: Arc<AtomicBool>,
    events: EventEmitter,
    pub(super) default_pages: String,
}

impl TranslatorController {
    pub fn new(client: ApiClient, settings: &ClientSettings, events: EventEmitter) -> Self {
        let viewer_settings = &settings.viewer;
        let viewer = Viewer::new(
            viewer_settings.zoom_config(),
            Viewport {
                width: viewer_settings.viewport_width,
                height: viewer_settings.viewport_height,
            },
            viewer_settings.scroll_step,
        );
        let loader = ImageLoader::new(client.transport(), settings.request_timeout());

        Self {
            client,
            loader,
            state: Arc::new(Mutex::new(TranslationState::new())),
            viewer: Arc::new(Mutex::new(viewer)),
            busy: Arc::new(AtomicBool::new(false)),
            events,
            default_pages: settings.default_pages.clone(),
        }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub async fn get_snapshot(&self) -> TranslationSnapshot {
        self.state.lock().await.snapshot()
    }

    pub async fn results(&self) -> Vec<ResultEntry> {
        self.state.lock().await.overlay.entries().to_vec()
    }

    pub async fn health_check(&self) -> HealthReport {
        self.client.health_check().await
    }

    pub(super) fn emit(&self, event: AppEvent) {
        self.events.emit(event);
    }

    /// Claims the busy flag and resets run state. The returned guard releases
    /// the flag when dropped, on every exit path.
    pub(super) async fn begin_run(
        &self,
        kind: RunKind,
        total: Option<usize>,
    ) -> Result<(RunGuard, Uuid), RunError> {
        let Some(guard) = RunGuard::try_acquire(&self.busy) else {
            log_warn!("rejected {:?} run: another run is in progress", kind);
            return Err(RunError::Busy);
        };

        let run_id = Uuid::new_v4();
        self.state.lock().await.begin_run(kind, run_id);
        {
            let mut viewer = self.viewer.lock().await;
            viewer.close();
            viewer.set_total(0);
        }
        log_info!("{:?} run {} started", kind, run_id);
        self.emit(AppEvent::RunStarted {
            run_id,
            kind,
            total,
        });
        self.emit_viewer().await;
        Ok((guard, run_id))
    }

    pub(super) async fn finish_run(
        &self,
        run_id: Uuid,
        kind: RunKind,
        succeeded: usize,
        failed: usize,
    ) {
        self.state.lock().await.finish_run();
        log_info!(
            "{:?} run {} finished: {} succeeded, {} failed",
            kind,
            run_id,
            succeeded,
            failed
        );
        self.emit(AppEvent::RunFinished {
            run_id,
            kind,
            succeeded,
            failed,
        });
    }

    /// Appends a result to the overlay list and announces it.
    pub(super) async fn record_result(
        &self,
        label: String,
        page: Option<u32>,
        source: String,
        image: ImagePayload,
    ) -> ResultEntry {
        let (entry, total) = {
            let mut state = self.state.lock().await;
            let entry = state.record_result(label, page, source, image);
            (entry, state.overlay.len())
        };
        self.viewer.lock().await.set_total(total);
        self.emit(AppEvent::ResultAdded {
            entry: entry.clone(),
        });
        entry
    }

    pub(super) async fn set_progress(&self, percent: u8, label: String) {
        self.state.lock().await.percent = Some(percent);
        self.emit(AppEvent::Progress { percent, label });
    }

    pub async fn viewer_snapshot(&self) -> ViewerSnapshot {
        self.viewer.lock().await.snapshot()
    }

    /// Opens the overlay on `index`, then loads the image and fits it.
    pub async fn open_viewer(&self, index: usize) -> Result<ViewerSnapshot, ViewerError> {
        let ticket = self.viewer.lock().await.open(index)?;
        self.emit_viewer().await;
        Ok(self.load_into_viewer(ticket).await)
    }

    pub async fn viewer_next(&self) -> ViewerSnapshot {
        let ticket = self.viewer.lock().await.next();
        match ticket {
            Some(ticket) => self.load_into_viewer(ticket).await,
            None => self.viewer_snapshot().await,
        }
    }

    pub async fn viewer_prev(&self) -> ViewerSnapshot {
        let ticket = self.viewer.lock().await.prev();
        match ticket {
            Some(ticket) => self.load_into_viewer(ticket).await,
            None => self.viewer_snapshot().await,
        }
    }

    pub async fn close_viewer(&self) -> ViewerSnapshot {
        let was_open = self.viewer.lock().await.close();
        if was_open {
            self.emit_viewer().await;
        }
        self.viewer_snapshot().await
    }

    pub async fn viewer_input(&self, input: ViewerInput) -> ViewerSnapshot {
        let action = self.viewer.lock().await.handle_input(input);
        match action {
            ViewerAction::Ignored => self.viewer_snapshot().await,
            ViewerAction::Updated | ViewerAction::Closed => {
                self.emit_viewer().await;
                self.viewer_snapshot().await
            }
            ViewerAction::Load(ticket) => self.load_into_viewer(ticket).await,
        }
    }

    async fn load_into_viewer(&self, ticket: LoadTicket) -> ViewerSnapshot {
        let payload = self
            .state
            .lock()
            .await
            .overlay
            .get(ticket.index)
            .map(|entry| entry.image.clone());

        if let Some(payload) = payload {
            match self.loader.load(&payload).await {
                Ok(size) => {
                    if !self.viewer.lock().await.apply_loaded(ticket, size) {
                        log_info!("dropping stale image load for index {}", ticket.index);
                    }
                }
                // The overlay stays open at the default zoom.
                Err(err) => log_warn!("failed to load image {}: {}", ticket.index, err),
            }
        }

        self.emit_viewer().await;
        self.viewer_snapshot().await
    }

    async fn emit_viewer(&self) {
        let snapshot = self.viewer.lock().await.snapshot();
        self.emit(AppEvent::Viewer { snapshot });
    }
}
