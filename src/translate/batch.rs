use std::path::{Path, PathBuf};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{error_detail, FilePart};
use crate::results::{ImagePayload, ResultEntry};

use super::{
    controller::{RunError, TranslatorController},
    events::AppEvent,
    state::{percent, RunKind},
};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

pub const PROCESS_PATH: &str = "/process";
const UPLOAD_FIELD: &str = "file";

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileFailure {
    pub index: usize,
    pub file: String,
    pub status: Option<u16>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub run_id: Uuid,
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: Vec<FileFailure>,
}

#[derive(Deserialize)]
struct ProcessResponse {
    #[serde(default)]
    result_image: Option<String>,
}

impl TranslatorController {
    /// Uploads `files` one at a time, in order. A failed file is recorded and
    /// the batch moves on; results already rendered are kept.
    pub async fn upload_batch(&self, files: &[PathBuf]) -> Result<BatchSummary, RunError> {
        if files.is_empty() {
            return Err(RunError::InvalidInput("no files selected".into()));
        }

        let total = files.len();
        let (_guard, run_id) = self.begin_run(RunKind::Batch, Some(total)).await?;
        let mut summary = BatchSummary {
            run_id,
            attempted: 0,
            succeeded: 0,
            failures: Vec::new(),
        };

        for (index, path) in files.iter().enumerate() {
            summary.attempted += 1;
            match self.upload_one(index, path).await {
                Ok(entry) => {
                    summary.succeeded += 1;
                    log_info!("translated {} ({}/{})", entry.label, index + 1, total);
                    if let Some(value) = percent(index as u64 + 1, total as u64) {
                        self.set_progress(value, format!("{}/{}", index + 1, total))
                            .await;
                    }
                }
                Err(failure) => {
                    log_warn!(
                        "file {} failed (status {:?}): {}",
                        failure.file,
                        failure.status,
                        failure.message
                    );
                    self.emit(AppEvent::FileFailed {
                        failure: failure.clone(),
                    });
                    summary.failures.push(failure);
                }
            }
        }

        self.finish_run(
            run_id,
            RunKind::Batch,
            summary.succeeded,
            summary.failures.len(),
        )
        .await;
        Ok(summary)
    }

    async fn upload_one(&self, index: usize, path: &Path) -> Result<ResultEntry, FileFailure> {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let failure = |status: Option<u16>, message: String| FileFailure {
            index,
            file: file_name.clone(),
            status,
            message,
        };

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|err| failure(None, format!("could not read file: {err}")))?;

        let part = FilePart {
            field: UPLOAD_FIELD.to_string(),
            file_name: file_name.clone(),
            mime: guess_mime(path).to_string(),
            bytes: Bytes::from(bytes),
        };

        let response = self
            .client
            .post_file(PROCESS_PATH, part)
            .await
            .map_err(|err| failure(None, err.to_string()))?;

        let status = response.status();
        if !response.is_success() {
            let body = self.client.read_text(response).await.unwrap_or_default();
            return Err(failure(Some(status), error_detail(&body)));
        }

        let parsed: ProcessResponse = self
            .client
            .read_json(response)
            .await
            .map_err(|err| failure(Some(status), err.to_string()))?;
        let raw = parsed
            .result_image
            .ok_or_else(|| failure(Some(status), "response carried no result image".into()))?;
        let image = ImagePayload::parse(&raw, self.client.base_url())
            .map_err(|err| failure(Some(status), err.to_string()))?;

        Ok(self
            .record_result(file_name.clone(), None, path.display().to_string(), image)
            .await)
    }
}

fn guess_mime(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase());
    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{png_data_uri, Scripted, ScriptedTransport};
    use crate::api::ApiClient;
    use crate::settings::ClientSettings;
    use crate::translate::controller::test_support::{controller, drain};
    use crate::translate::EventEmitter;
    use std::{sync::Arc, time::Duration};
    use tempfile::TempDir;
    use tokio::sync::Notify;

    fn write_files(dir: &TempDir, names: &[&str]) -> Vec<PathBuf> {
        names
            .iter()
            .map(|name| {
                let path = dir.path().join(name);
                std::fs::write(&path, b"fake image bytes").unwrap();
                path
            })
            .collect()
    }

    fn ok_body() -> String {
        format!(r#"{{"result_image":"{}"}}"#, png_data_uri(4, 4))
    }

    #[tokio::test]
    async fn uploads_every_file_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let files = write_files(&dir, &["01.png", "02.jpg", "03.webp"]);
        let transport = ScriptedTransport::new();
        for _ in 0..3 {
            transport.push(PROCESS_PATH, Scripted::json(200, &ok_body()));
        }
        let controller = controller(&transport);
        let mut rx = controller.events().subscribe();

        let summary = controller.upload_batch(&files).await.unwrap();
        assert_eq!(summary.attempted, 3);
        assert_eq!(summary.succeeded, 3);
        assert!(summary.failures.is_empty());

        let uploaded: Vec<_> = transport
            .requests_to(PROCESS_PATH)
            .into_iter()
            .filter_map(|request| request.file_name)
            .collect();
        assert_eq!(uploaded, vec!["01.png", "02.jpg", "03.webp"]);

        let progress: Vec<u8> = drain(&mut rx)
            .into_iter()
            .filter_map(|event| match event {
                AppEvent::Progress { percent, .. } => Some(percent),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![33, 67, 100]);

        let results = controller.results().await;
        assert_eq!(results.len(), 3);
        assert_eq!(results[1].label, "02.jpg");
        assert!(!controller.is_busy());
    }

    #[tokio::test]
    async fn next_upload_waits_for_previous_response() {
        let dir = tempfile::tempdir().unwrap();
        let files = write_files(&dir, &["a.png", "b.png"]);
        let transport = ScriptedTransport::new();
        let gate = Arc::new(Notify::new());
        transport.push(
            PROCESS_PATH,
            Scripted::Gated {
                gate: gate.clone(),
                then: Box::new(Scripted::json(200, &ok_body())),
            },
        );
        transport.push(PROCESS_PATH, Scripted::json(200, &ok_body()));
        let controller = controller(&transport);

        let running = controller.clone();
        let batch = tokio::spawn(async move { running.upload_batch(&files).await });

        for _ in 0..10_000 {
            if !transport.requests_to(PROCESS_PATH).is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(transport.requests_to(PROCESS_PATH).len(), 1);

        // The second file stays queued while the first response is pending.
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(transport.requests_to(PROCESS_PATH).len(), 1);
        assert!(controller.is_busy());

        gate.notify_one();
        let summary = batch.await.unwrap().unwrap();
        assert_eq!(summary.succeeded, 2);
        assert_eq!(transport.requests_to(PROCESS_PATH).len(), 2);
    }

    #[tokio::test]
    async fn failed_file_does_not_stop_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let files = write_files(&dir, &["a.png", "b.png", "c.png"]);
        let transport = ScriptedTransport::new();
        transport.push(PROCESS_PATH, Scripted::json(200, &ok_body()));
        transport.push(PROCESS_PATH, Scripted::json(422, r#"{"detail":"no text found"}"#));
        transport.push(PROCESS_PATH, Scripted::json(200, &ok_body()));
        let controller = controller(&transport);

        let summary = controller.upload_batch(&files).await.unwrap();
        assert_eq!(summary.attempted, 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(
            summary.failures,
            vec![FileFailure {
                index: 1,
                file: "b.png".into(),
                status: Some(422),
                message: "no text found".into(),
            }]
        );
        assert_eq!(controller.results().await.len(), 2);
    }

    #[tokio::test]
    async fn unreadable_file_is_recorded_without_upload() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = write_files(&dir, &["a.png"]);
        files.insert(0, dir.path().join("missing.png"));
        let transport = ScriptedTransport::new();
        transport.push(PROCESS_PATH, Scripted::json(200, &ok_body()));
        let controller = controller(&transport);

        let summary = controller.upload_batch(&files).await.unwrap();
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failures[0].file, "missing.png");
        assert_eq!(summary.failures[0].status, None);
        assert_eq!(transport.requests_to(PROCESS_PATH).len(), 1);
    }

    #[tokio::test]
    async fn ok_response_without_image_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let files = write_files(&dir, &["a.png"]);
        let transport = ScriptedTransport::new();
        transport.push(PROCESS_PATH, Scripted::json(200, r#"{"status":"queued"}"#));
        let controller = controller(&transport);

        let summary = controller.upload_batch(&files).await.unwrap();
        assert_eq!(summary.succeeded, 0);
        assert_eq!(summary.failures[0].message, "response carried no result image");
    }

    #[tokio::test]
    async fn stalled_response_body_fails_only_that_file() {
        let dir = tempfile::tempdir().unwrap();
        let files = write_files(&dir, &["a.png", "b.png"]);
        let transport = ScriptedTransport::new();
        transport.push(
            PROCESS_PATH,
            Scripted::Stall {
                status: 200,
                chunks: vec![Bytes::from_static(b"{\"result_image\":\"data:")],
            },
        );
        transport.push(PROCESS_PATH, Scripted::json(200, &ok_body()));
        let mut settings = ClientSettings::default();
        settings.api_base_url = "http://api.local".into();
        settings.session.enabled = false;
        settings.request_timeout_secs = 1;
        let client = ApiClient::new(&settings, transport.clone());
        let controller = TranslatorController::new(client, &settings, EventEmitter::new());

        let summary = controller.upload_batch(&files).await.unwrap();
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].file, "a.png");
        assert!(summary.failures[0].message.contains("timed out"));
        assert!(!controller.is_busy());
    }

    #[tokio::test]
    async fn empty_selection_is_rejected() {
        let transport = ScriptedTransport::new();
        let controller = controller(&transport);
        assert!(matches!(
            controller.upload_batch(&[]).await,
            Err(RunError::InvalidInput(_))
        ));
        assert!(!controller.is_busy());
    }

    #[test]
    fn mime_follows_extension() {
        assert_eq!(guess_mime(Path::new("x.JPG")), "image/jpeg");
        assert_eq!(guess_mime(Path::new("x.webp")), "image/webp");
        assert_eq!(guess_mime(Path::new("x")), "application/octet-stream");
    }
}
