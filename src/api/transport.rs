use std::{io, pin::Pin};

use bytes::{Bytes, BytesMut};
use futures_util::{future::BoxFuture, Stream, StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;

use super::ApiError;

/// Response body as it arrives on the wire.
pub type BodyStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone)]
pub struct FilePart {
    pub field: String,
    pub file_name: String,
    pub mime: String,
    pub bytes: Bytes,
}

#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Form(Vec<(String, String)>),
    Multipart(FilePart),
}

/// One outbound call. Cheap to clone so a retry can resend it.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

impl ApiRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn post(url: impl Into<String>, body: RequestBody) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            headers: Vec::new(),
            body,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

enum ResponseBody {
    Buffered(Bytes),
    Streaming(BodyStream),
}

pub struct ApiResponse {
    status: u16,
    body: ResponseBody,
}

impl std::fmt::Debug for ApiResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl ApiResponse {
    pub fn streaming(status: u16, body: BodyStream) -> Self {
        Self {
            status,
            body: ResponseBody::Streaming(body),
        }
    }

    pub fn buffered(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: ResponseBody::Buffered(body.into()),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub async fn bytes(self) -> io::Result<Bytes> {
        match self.body {
            ResponseBody::Buffered(bytes) => Ok(bytes),
            ResponseBody::Streaming(stream) => {
                let collected = stream
                    .try_fold(BytesMut::new(), |mut acc, chunk| async move {
                        acc.extend_from_slice(&chunk);
                        Ok(acc)
                    })
                    .await?;
                Ok(collected.freeze())
            }
        }
    }

    pub async fn text(self) -> io::Result<String> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub async fn json<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|err| ApiError::Decode(err.to_string()))
    }

    pub fn into_body_stream(self) -> BodyStream {
        match self.body {
            ResponseBody::Buffered(bytes) => {
                Box::pin(futures_util::stream::once(async move { Ok(bytes) }))
            }
            ResponseBody::Streaming(stream) => stream,
        }
    }
}

/// The seam between the retry client and the network.
pub trait Transport: Send + Sync {
    fn send(&self, request: ApiRequest) -> BoxFuture<'_, Result<ApiResponse, ApiError>>;
}

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("manga-translator/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| ApiError::Network(format!("http client init failed: {err}")))?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: ApiRequest) -> BoxFuture<'_, Result<ApiResponse, ApiError>> {
        Box::pin(async move {
            let mut builder = match request.method {
                Method::Get => self.client.get(&request.url),
                Method::Post => self.client.post(&request.url),
            };

            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }

            builder = match request.body {
                RequestBody::Empty => builder,
                RequestBody::Form(fields) => builder.form(&fields),
                RequestBody::Multipart(part) => {
                    let file = reqwest::multipart::Part::bytes(part.bytes.to_vec())
                        .file_name(part.file_name)
                        .mime_str(&part.mime)
                        .map_err(|err| ApiError::Network(format!("invalid mime type: {err}")))?;
                    builder.multipart(reqwest::multipart::Form::new().part(part.field, file))
                }
            };

            let response = builder
                .send()
                .await
                .map_err(|err| ApiError::Network(err.to_string()))?;

            let status = response.status().as_u16();
            let body = response.bytes_stream().map(|chunk| chunk.map_err(io::Error::other));
            Ok(ApiResponse::streaming(status, Box::pin(body)))
        })
    }
}
