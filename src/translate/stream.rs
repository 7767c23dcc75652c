use futures_util::StreamExt;
use serde::Serialize;
use uuid::Uuid;

use crate::api::error_detail;
use crate::ingest::{decode_lines, StreamEvent, StreamLine};
use crate::results::ImagePayload;

use super::{
    controller::{RunError, TranslatorController},
    events::AppEvent,
    state::{percent, RunKind},
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

pub const PROCESS_STREAM_PATH: &str = "/process_nhentai_stream";

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSummary {
    pub run_id: Uuid,
    pub title: Option<String>,
    pub pages_to_process: Option<u32>,
    pub results: usize,
    pub errors: usize,
    pub malformed_lines: usize,
    /// A `complete` event was seen.
    pub completed: bool,
    /// The body failed before it ended.
    pub interrupted: bool,
}

impl TranslatorController {
    /// Streams a whole gallery through the translation backend.
    ///
    /// Events are handled in arrival order. Progress is taken from the
    /// server's own counter against the `info` denominator, so nothing is
    /// tallied locally. Reading continues after `complete` until the body ends.
    pub async fn translate_gallery(
        &self,
        url: &str,
        pages: Option<&str>,
    ) -> Result<StreamSummary, RunError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(RunError::InvalidInput("gallery URL is empty".into()));
        }
        let pages = pages
            .map(str::trim)
            .filter(|pages| !pages.is_empty())
            .unwrap_or(self.default_pages.as_str())
            .to_string();

        let (_guard, run_id) = self.begin_run(RunKind::Gallery, None).await?;
        let mut summary = StreamSummary {
            run_id,
            ..StreamSummary::default()
        };

        let fields = vec![
            ("url".to_string(), url.to_string()),
            ("page_numbers".to_string(), pages.clone()),
        ];
        log_info!("streaming gallery {} (pages: {})", url, pages);

        let response = match self.client.post_form(PROCESS_STREAM_PATH, fields).await {
            Ok(response) if response.is_success() => response,
            Ok(response) => {
                let status = response.status();
                let body = self.client.read_text(response).await.unwrap_or_default();
                let detail = error_detail(&body);
                log_warn!("gallery stream rejected with HTTP {}: {}", status, detail);
                self.abort_stream(&summary).await;
                return Err(RunError::Rejected { status, detail });
            }
            Err(err) => {
                log_warn!("gallery stream could not be opened: {}", err);
                self.abort_stream(&summary).await;
                return Err(err.into());
            }
        };

        let mut lines = decode_lines(response.into_body_stream());
        while let Some(line) = lines.next().await {
            match line {
                Ok(StreamLine::Event(event)) => self.handle_event(event, url, &mut summary).await,
                Ok(StreamLine::Malformed { line, reason }) => {
                    summary.malformed_lines += 1;
                    log_warn!("skipping malformed stream line ({}): {}", reason, line);
                }
                Err(err) => {
                    summary.interrupted = true;
                    log_warn!("gallery stream interrupted: {}", err);
                    self.emit(AppEvent::Warning {
                        message: format!("connection lost: {err}"),
                    });
                    break;
                }
            }
        }

        self.finish_run(run_id, RunKind::Gallery, summary.results, summary.errors)
            .await;
        Ok(summary)
    }

    async fn handle_event(&self, event: StreamEvent, source: &str, summary: &mut StreamSummary) {
        log_debug!("stream event: {}", event.kind());
        match event {
            StreamEvent::Info {
                title,
                total_pages,
                pages_to_process,
            } => {
                let denominator = pages_to_process.or(total_pages);
                {
                    let mut state = self.state.lock().await;
                    state.gallery_title = title.clone();
                    state.pages_to_process = denominator;
                }
                log_info!(
                    "gallery {:?}: {:?} pages to process",
                    title.as_deref().unwrap_or("untitled"),
                    denominator
                );
                summary.title = title.clone();
                summary.pages_to_process = denominator;
                self.emit(AppEvent::GalleryInfo {
                    title,
                    pages_to_process: denominator,
                });
            }
            StreamEvent::Result {
                page,
                image,
                progress,
            } => {
                let payload = match ImagePayload::parse(&image, self.client.base_url()) {
                    Ok(payload) => payload,
                    Err(err) => {
                        summary.errors += 1;
                        log_warn!("unusable image for page {:?}: {}", page, err);
                        self.emit(AppEvent::Warning {
                            message: format!("page {}: {err}", page_label(page)),
                        });
                        return;
                    }
                };

                let label = format!("Page {}", page_label(page));
                self.record_result(label, page, source.to_string(), payload)
                    .await;
                summary.results += 1;

                let denominator = self.state.lock().await.pages_to_process;
                if let (Some(done), Some(total)) = (progress, denominator) {
                    if let Some(value) = percent(u64::from(done), u64::from(total)) {
                        self.set_progress(value, format!("{done}/{total}")).await;
                    }
                }
            }
            StreamEvent::Error { page, message } => {
                summary.errors += 1;
                let message = message.unwrap_or_else(|| "unknown error".to_string());
                log_warn!("server reported error for page {:?}: {}", page, message);
                self.emit(AppEvent::Warning {
                    message: match page {
                        Some(page) => format!("page {page}: {message}"),
                        None => message,
                    },
                });
            }
            StreamEvent::Complete { message } => {
                summary.completed = true;
                self.state.lock().await.stream_complete = true;
                log_info!(
                    "server marked gallery complete{}",
                    message.map(|m| format!(": {m}")).unwrap_or_default()
                );
            }
        }
    }

    async fn abort_stream(&self, summary: &StreamSummary) {
        self.emit(AppEvent::ProgressHidden);
        self.finish_run(summary.run_id, RunKind::Gallery, 0, 0).await;
    }
}

fn page_label(page: Option<u32>) -> String {
    page.map(|page| page.to_string())
        .unwrap_or_else(|| "?".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{png_data_uri, Scripted, ScriptedTransport};
    use crate::api::ApiError;
    use crate::translate::controller::test_support::{controller, drain};

    fn result_line(page: u32, progress: u32) -> String {
        format!(
            "{}\n",
            serde_json::json!({
                "type": "result",
                "page": page,
                "image": png_data_uri(2, 2),
                "progress": progress,
            })
        )
    }

    fn progress_of(events: &[AppEvent]) -> Vec<u8> {
        events
            .iter()
            .filter_map(|event| match event {
                AppEvent::Progress { percent, .. } => Some(*percent),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn sends_url_and_page_selection() {
        let transport = ScriptedTransport::new();
        transport.push(PROCESS_STREAM_PATH, Scripted::json(200, "{\"type\":\"complete\"}\n"));
        let controller = controller(&transport);

        controller
            .translate_gallery(" https://gallery.test/g/9 ", None)
            .await
            .unwrap();

        let request = &transport.requests_to(PROCESS_STREAM_PATH)[0];
        assert_eq!(
            request.form,
            vec![
                ("url".to_string(), "https://gallery.test/g/9".to_string()),
                ("page_numbers".to_string(), "all".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn chunk_boundaries_do_not_change_results() {
        let body = format!(
            "{}{}{}{}",
            "{\"type\":\"info\",\"title\":\"G\",\"pages_to_process\":4}\n",
            result_line(1, 1),
            result_line(2, 2),
            "{\"type\":\"complete\"}\n"
        );
        let (head, tail) = body.split_at(body.len() / 2);
        let pieces: Vec<&str> = vec![&head[..7], &head[7..], &tail[..3], &tail[3..]];

        let whole = ScriptedTransport::new();
        whole.push(PROCESS_STREAM_PATH, Scripted::chunks(200, &[body.as_str()]));
        let split = ScriptedTransport::new();
        split.push(PROCESS_STREAM_PATH, Scripted::chunks(200, &pieces));

        let whole = controller(&whole);
        let split = controller(&split);
        let mut whole_rx = whole.events().subscribe();
        let mut split_rx = split.events().subscribe();

        let a = whole.translate_gallery("https://g.test/1", None).await.unwrap();
        let b = split.translate_gallery("https://g.test/1", None).await.unwrap();

        assert_eq!(a.results, 2);
        assert_eq!(b.results, 2);
        assert!(a.completed && b.completed);
        assert_eq!(progress_of(&drain(&mut whole_rx)), vec![25, 50]);
        assert_eq!(progress_of(&drain(&mut split_rx)), vec![25, 50]);
    }

    #[tokio::test]
    async fn malformed_line_is_skipped() {
        let body = format!(
            "{}{}{}{}",
            "{\"type\":\"info\",\"pages_to_process\":2}\n",
            result_line(1, 1),
            "{\"type\":\"result\",\"page\":\n",
            result_line(2, 2),
        );
        let transport = ScriptedTransport::new();
        transport.push(PROCESS_STREAM_PATH, Scripted::chunks(200, &[body.as_str()]));
        let controller = controller(&transport);

        let summary = controller
            .translate_gallery("https://g.test/1", None)
            .await
            .unwrap();
        assert_eq!(summary.results, 2);
        assert_eq!(summary.malformed_lines, 1);
        assert!(!summary.completed);

        let labels: Vec<_> = controller
            .results()
            .await
            .into_iter()
            .map(|entry| entry.label)
            .collect();
        assert_eq!(labels, vec!["Page 1", "Page 2"]);
    }

    #[tokio::test]
    async fn progress_waits_for_info_denominator() {
        let body = format!(
            "{}{}{}",
            result_line(1, 1),
            "{\"type\":\"info\",\"title\":\"Late\",\"total_pages\":3}\n",
            result_line(2, 2),
        );
        let transport = ScriptedTransport::new();
        transport.push(PROCESS_STREAM_PATH, Scripted::chunks(200, &[body.as_str()]));
        let controller = controller(&transport);
        let mut rx = controller.events().subscribe();

        let summary = controller
            .translate_gallery("https://g.test/1", Some("1-3"))
            .await
            .unwrap();
        assert_eq!(summary.title.as_deref(), Some("Late"));
        assert_eq!(summary.pages_to_process, Some(3));
        assert_eq!(progress_of(&drain(&mut rx)), vec![67]);
    }

    #[tokio::test]
    async fn error_events_are_warnings_and_stream_continues() {
        let body = format!(
            "{}{}{}",
            "{\"type\":\"error\",\"page\":1,\"error\":\"OCR failed\"}\n",
            result_line(2, 2),
            "{\"type\":\"complete\"}\n{\"type\":\"info\",\"title\":\"after\"}\n",
        );
        let transport = ScriptedTransport::new();
        transport.push(PROCESS_STREAM_PATH, Scripted::chunks(200, &[body.as_str()]));
        let controller = controller(&transport);
        let mut rx = controller.events().subscribe();

        let summary = controller
            .translate_gallery("https://g.test/1", None)
            .await
            .unwrap();
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.results, 1);
        assert!(summary.completed);
        // Lines after `complete` are still read.
        assert_eq!(summary.title.as_deref(), Some("after"));

        let events = drain(&mut rx);
        assert!(events.iter().any(|event| matches!(
            event,
            AppEvent::Warning { message } if message == "page 1: OCR failed"
        )));
        assert!(controller.get_snapshot().await.stream_complete);
    }

    #[tokio::test]
    async fn rejected_stream_hides_progress_and_releases_guard() {
        let transport = ScriptedTransport::new();
        transport.push(
            PROCESS_STREAM_PATH,
            Scripted::json(400, r#"{"detail":"invalid gallery url"}"#),
        );
        let controller = controller(&transport);
        let mut rx = controller.events().subscribe();

        let err = controller
            .translate_gallery("https://g.test/bad", None)
            .await
            .unwrap_err();
        match err {
            RunError::Rejected { status, detail } => {
                assert_eq!(status, 400);
                assert_eq!(detail, "invalid gallery url");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(drain(&mut rx)
            .iter()
            .any(|event| matches!(event, AppEvent::ProgressHidden)));
        assert!(!controller.is_busy());
    }

    #[tokio::test]
    async fn rate_limit_aborts_before_reading() {
        let transport = ScriptedTransport::new();
        transport.push(
            PROCESS_STREAM_PATH,
            Scripted::json(429, r#"{"detail":"slow down"}"#),
        );
        let controller = controller(&transport);
        let mut rx = controller.events().subscribe();

        let err = controller
            .translate_gallery("https://g.test/1", None)
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Api(ApiError::RateLimited(_))));
        assert!(drain(&mut rx)
            .iter()
            .any(|event| matches!(event, AppEvent::ProgressHidden)));
        assert!(!controller.is_busy());
        assert!(controller.results().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_backend_hides_progress_after_retries() {
        let transport = ScriptedTransport::new();
        for _ in 0..3 {
            transport.push(PROCESS_STREAM_PATH, Scripted::Fail("connection refused".into()));
        }
        let controller = controller(&transport);
        let mut rx = controller.events().subscribe();

        let err = controller
            .translate_gallery("https://g.test/1", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RunError::Api(ApiError::Exhausted { attempts: 3, .. })
        ));
        assert_eq!(transport.requests_to(PROCESS_STREAM_PATH).len(), 3);

        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|event| matches!(event, AppEvent::ProgressHidden)));
        assert!(!events
            .iter()
            .any(|event| matches!(event, AppEvent::Progress { .. })));
        assert!(!controller.is_busy());
    }

    #[tokio::test]
    async fn empty_url_is_invalid() {
        let transport = ScriptedTransport::new();
        let controller = controller(&transport);
        assert!(matches!(
            controller.translate_gallery("  ", None).await,
            Err(RunError::InvalidInput(_))
        ));
        assert!(transport.requests().is_empty());
    }
}
