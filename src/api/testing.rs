//! In-process transport that replays canned responses for tests.

use std::{
    collections::{HashMap, VecDeque},
    io::Cursor,
    sync::{Arc, Mutex},
};

use base64::prelude::{Engine as _, BASE64_STANDARD};

use bytes::Bytes;
use futures_util::{future::BoxFuture, StreamExt};
use tokio::{sync::Notify, time::Instant};

use super::{ApiError, ApiRequest, ApiResponse, RequestBody, Transport};

pub enum Scripted {
    Respond { status: u16, chunks: Vec<Bytes> },
    Fail(String),
    /// Never resolves; exercises the client timeout.
    Hang,
    /// Waits for the gate before producing `then`.
    Gated { gate: Arc<Notify>, then: Box<Scripted> },
    /// Sends the headers and `chunks`, then the body never ends.
    Stall { status: u16, chunks: Vec<Bytes> },
}

impl Scripted {
    pub fn json(status: u16, body: &str) -> Self {
        Scripted::Respond {
            status,
            chunks: vec![Bytes::copy_from_slice(body.as_bytes())],
        }
    }

    pub fn chunks(status: u16, chunks: &[&str]) -> Self {
        Scripted::Respond {
            status,
            chunks: chunks
                .iter()
                .map(|chunk| Bytes::copy_from_slice(chunk.as_bytes()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub form: Vec<(String, String)>,
    pub file_name: Option<String>,
    pub at: Instant,
}

#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, VecDeque<Scripted>>>,
    log: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, path: &str, response: Scripted) {
        self.routes
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.log.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.path == path)
            .collect()
    }
}

fn path_of(url: &str) -> String {
    reqwest::Url::parse(url)
        .map(|parsed| parsed.path().to_string())
        .unwrap_or_else(|_| url.to_string())
}

fn resolve(response: Scripted) -> BoxFuture<'static, Result<ApiResponse, ApiError>> {
    Box::pin(async move {
        match response {
            Scripted::Respond { status, chunks } => {
                let stream = futures_util::stream::iter(chunks.into_iter().map(Ok));
                Ok(ApiResponse::streaming(status, Box::pin(stream)))
            }
            Scripted::Stall { status, chunks } => {
                let stream = futures_util::stream::iter(chunks.into_iter().map(Ok))
                    .chain(futures_util::stream::pending());
                Ok(ApiResponse::streaming(status, Box::pin(stream)))
            }
            Scripted::Fail(message) => Err(ApiError::Network(message)),
            Scripted::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            Scripted::Gated { gate, then } => {
                gate.notified().await;
                resolve(*then).await
            }
        }
    })
}

impl Transport for ScriptedTransport {
    fn send(&self, request: ApiRequest) -> BoxFuture<'_, Result<ApiResponse, ApiError>> {
        let path = path_of(&request.url);
        let (form, file_name) = match &request.body {
            RequestBody::Empty => (Vec::new(), None),
            RequestBody::Form(fields) => (fields.clone(), None),
            RequestBody::Multipart(part) => (Vec::new(), Some(part.file_name.clone())),
        };
        self.log.lock().unwrap().push(RecordedRequest {
            path: path.clone(),
            headers: request.headers.clone(),
            form,
            file_name,
            at: Instant::now(),
        });

        let next = self
            .routes
            .lock()
            .unwrap()
            .get_mut(&path)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Scripted::json(500, r#"{"detail":"unscripted request"}"#));

        resolve(next)
    }
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbImage::new(width, height);
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

pub fn png_data_uri(width: u32, height: u32) -> String {
    format!(
        "data:image/png;base64,{}",
        BASE64_STANDARD.encode(png_bytes(width, height))
    )
}
