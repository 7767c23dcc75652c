use serde::Serialize;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use uuid::Uuid;

use crate::results::{ImagePayload, OverlayImageList, ResultEntry};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RunKind {
    Batch,
    Gallery,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(tag = "status", content = "kind", rename_all = "camelCase")]
pub enum RunStatus {
    Idle,
    Running(RunKind),
}

impl Default for RunStatus {
    fn default() -> Self {
        RunStatus::Idle
    }
}

#[derive(Debug, Clone, Default)]
pub struct TranslationState {
    pub status: RunStatus,
    pub run_id: Option<Uuid>,
    pub overlay: OverlayImageList,
    pub gallery_title: Option<String>,
    pub pages_to_process: Option<u32>,
    pub percent: Option<u8>,
    pub stream_complete: bool,
}

impl TranslationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a fresh run: previous results are dropped.
    pub fn begin_run(&mut self, kind: RunKind, run_id: Uuid) {
        *self = Self {
            status: RunStatus::Running(kind),
            run_id: Some(run_id),
            ..Self::default()
        };
    }

    pub fn finish_run(&mut self) {
        self.status = RunStatus::Idle;
    }

    pub fn record_result(
        &mut self,
        label: String,
        page: Option<u32>,
        source: String,
        image: ImagePayload,
    ) -> ResultEntry {
        self.overlay.push(label, page, source, image)
    }

    pub fn snapshot(&self) -> TranslationSnapshot {
        TranslationSnapshot {
            status: self.status,
            run_id: self.run_id,
            results: self.overlay.len(),
            gallery_title: self.gallery_title.clone(),
            pages_to_process: self.pages_to_process,
            percent: self.percent,
            stream_complete: self.stream_complete,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TranslationSnapshot {
    pub status: RunStatus,
    pub run_id: Option<Uuid>,
    pub results: usize,
    pub gallery_title: Option<String>,
    pub pages_to_process: Option<u32>,
    pub percent: Option<u8>,
    pub stream_complete: bool,
}

/// Holds the global busy flag for the lifetime of one run.
pub struct RunGuard {
    flag: Arc<AtomicBool>,
}

impl RunGuard {
    pub fn try_acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag: flag.clone() })
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// `round(done / total * 100)`, capped at 100.
pub fn percent(done: u64, total: u64) -> Option<u8> {
    if total == 0 {
        return None;
    }
    let value = (done as f64 / total as f64 * 100.0).round();
    Some(value.clamp(0.0, 100.0) as u8)
}
