//! Console front end: mirrors controller events and client status to a
//! writer, and saves translated pages to disk.

use std::{
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, watch};

use crate::api::ClientStatus;
use crate::results::{ImagePayload, ResultEntry};
use crate::translate::AppEvent;

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// One JSON object per line instead of text.
    pub json: bool,
    pub out_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub index: usize,
    pub label: String,
    pub page: Option<u32>,
    pub source: String,
    /// File name under the output directory, for inline images.
    pub file: Option<String>,
    /// Remote location, for images the server only linked to.
    pub url: Option<String>,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct RenderReport {
    pub events: usize,
    pub saved_files: usize,
    pub manifest: Vec<ManifestEntry>,
}

pub struct ConsoleRenderer<W: Write> {
    out: W,
    options: RenderOptions,
    report: RenderReport,
}

impl<W: Write> ConsoleRenderer<W> {
    pub fn new(out: W, options: RenderOptions) -> Self {
        Self {
            out,
            options,
            report: RenderReport::default(),
        }
    }

    /// Runs until every event sender is gone.
    pub async fn run(
        mut self,
        mut events: broadcast::Receiver<AppEvent>,
        mut status: watch::Receiver<ClientStatus>,
    ) -> Result<RenderReport> {
        let mut status_open = true;
        loop {
            tokio::select! {
                received = events.recv() => match received {
                    Ok(event) => self.handle(&event).await?,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log_warn!("renderer fell behind, {} events skipped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                changed = status.changed(), if status_open => match changed {
                    Ok(()) => {
                        let current = status.borrow_and_update().clone();
                        self.show_status(&current)?;
                    }
                    Err(_) => status_open = false,
                },
            }
        }
        self.out.flush()?;
        Ok(self.report)
    }

    pub async fn handle(&mut self, event: &AppEvent) -> Result<()> {
        self.report.events += 1;
        match event {
            AppEvent::RunStarted { .. } => self.report.manifest.clear(),
            AppEvent::ResultAdded { entry } => self.save_entry(entry).await?,
            AppEvent::RunFinished { .. } => self.write_manifest().await?,
            _ => {}
        }

        if self.options.json {
            let line = serde_json::to_string(event)?;
            writeln!(self.out, "{line}")?;
        } else if let Some(text) = describe(event) {
            writeln!(self.out, "{text}")?;
        }
        Ok(())
    }

    fn show_status(&mut self, status: &ClientStatus) -> Result<()> {
        match status {
            // Per-attempt chatter is left to the log.
            ClientStatus::Idle | ClientStatus::Sending { .. } => Ok(()),
            _ if self.options.json => {
                let line = serde_json::to_string(&serde_json::json!({
                    "event": "status",
                    "status": status,
                }))?;
                writeln!(self.out, "{line}")?;
                Ok(())
            }
            _ => {
                writeln!(self.out, "[status] {}", status.describe())?;
                Ok(())
            }
        }
    }

    async fn save_entry(&mut self, entry: &ResultEntry) -> Result<()> {
        let mut record = ManifestEntry {
            index: entry.index,
            label: entry.label.clone(),
            page: entry.page,
            source: entry.source.clone(),
            file: None,
            url: None,
            received_at: entry.received_at,
        };

        match (&entry.image, &self.options.out_dir) {
            (ImagePayload::Url { url }, _) => record.url = Some(url.clone()),
            (ImagePayload::DataUri { data, .. }, Some(dir)) => {
                let name = output_file_name(entry);
                let path = dir.join(&name);
                tokio::fs::create_dir_all(dir)
                    .await
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
                tokio::fs::write(&path, data)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                log_info!("saved {}", path.display());
                self.report.saved_files += 1;
                record.file = Some(name);
            }
            (ImagePayload::DataUri { .. }, None) => {}
        }

        self.report.manifest.push(record);
        Ok(())
    }

    async fn write_manifest(&self) -> Result<()> {
        let Some(dir) = &self.options.out_dir else {
            return Ok(());
        };
        write_manifest(dir, &self.report.manifest).await
    }
}

async fn write_manifest(dir: &Path, entries: &[ManifestEntry]) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join(MANIFEST_FILE);
    let serialized = serde_json::to_string_pretty(entries)?;
    tokio::fs::write(&path, serialized)
        .await
        .with_context(|| format!("Failed to write manifest to {}", path.display()))
}

/// `NNN_<label>.<ext>`, numbered from 1.
pub fn output_file_name(entry: &ResultEntry) -> String {
    format!(
        "{:03}_{}.{}",
        entry.index + 1,
        sanitize_label(&entry.label),
        entry.image.extension()
    )
}

fn sanitize_label(label: &str) -> String {
    let stem = Path::new(label)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let cleaned: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('_');
    if cleaned.is_empty() {
        "page".to_string()
    } else {
        cleaned.to_string()
    }
}

fn describe(event: &AppEvent) -> Option<String> {
    Some(match event {
        AppEvent::RunStarted { kind, total, .. } => match total {
            Some(total) => format!("Starting {kind:?} run ({total} files)"),
            None => format!("Starting {kind:?} run"),
        },
        AppEvent::GalleryInfo {
            title,
            pages_to_process,
        } => format!(
            "Gallery: {} ({} pages to process)",
            title.as_deref().unwrap_or("untitled"),
            pages_to_process
                .map(|pages| pages.to_string())
                .unwrap_or_else(|| "?".into())
        ),
        AppEvent::ResultAdded { entry } => format!("  + {} ready", entry.label),
        AppEvent::Progress { percent, label } => format!("  [{percent:>3}%] {label}"),
        AppEvent::FileFailed { failure } => match failure.status {
            Some(status) => format!(
                "  ! {} failed (HTTP {status}): {}",
                failure.file, failure.message
            ),
            None => format!("  ! {} failed: {}", failure.file, failure.message),
        },
        AppEvent::Warning { message } => format!("  warning: {message}"),
        AppEvent::ProgressHidden => return None,
        AppEvent::RunFinished {
            succeeded, failed, ..
        } => format!("Done: {succeeded} succeeded, {failed} failed"),
        AppEvent::Viewer { .. } => return None,
    })
}
