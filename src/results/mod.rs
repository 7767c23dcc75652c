use base64::prelude::{Engine as _, BASE64_STANDARD};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("empty image payload")]
    Empty,
    #[error("data URI is missing its ',' separator")]
    MissingSeparator,
    #[error("only base64 data URIs are supported")]
    NotBase64,
    #[error("invalid base64 image data: {0}")]
    Base64(String),
    #[error("unrecognised image payload: {0}")]
    Unrecognised(String),
}

/// A translated page as returned by the server: inline bytes or a link.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ImagePayload {
    DataUri {
        mime: String,
        byte_len: usize,
        #[serde(skip_serializing)]
        data: Bytes,
    },
    Url {
        url: String,
    },
}

impl ImagePayload {
    /// Parses a `data:` URI or an absolute/root-relative URL. Root-relative
    /// paths are resolved against `base_url`.
    pub fn parse(raw: &str, base_url: &str) -> Result<Self, PayloadError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(PayloadError::Empty);
        }

        if let Some(rest) = raw.strip_prefix("data:") {
            let (header, encoded) = rest.split_once(',').ok_or(PayloadError::MissingSeparator)?;
            let mut parts = header.split(';');
            let mime = parts
                .next()
                .filter(|mime| !mime.is_empty())
                .unwrap_or("application/octet-stream")
                .to_string();
            if !parts.any(|part| part.eq_ignore_ascii_case("base64")) {
                return Err(PayloadError::NotBase64);
            }
            let data = BASE64_STANDARD
                .decode(encoded.trim())
                .map_err(|err| PayloadError::Base64(err.to_string()))?;
            return Ok(ImagePayload::DataUri {
                mime,
                byte_len: data.len(),
                data: Bytes::from(data),
            });
        }

        if raw.starts_with("http://") || raw.starts_with("https://") {
            return Ok(ImagePayload::Url {
                url: raw.to_string(),
            });
        }

        if raw.starts_with('/') {
            return Ok(ImagePayload::Url {
                url: format!("{}{}", base_url.trim_end_matches('/'), raw),
            });
        }

        Err(PayloadError::Unrecognised(raw.chars().take(48).collect()))
    }

    pub fn extension(&self) -> &'static str {
        let mime = match self {
            ImagePayload::DataUri { mime, .. } => mime.as_str(),
            ImagePayload::Url { url } => {
                let path = url.split(['?', '#']).next().unwrap_or(url);
                return match path.rsplit('.').next().map(str::to_ascii_lowercase).as_deref() {
                    Some("jpg") | Some("jpeg") => "jpg",
                    Some("webp") => "webp",
                    Some("gif") => "gif",
                    _ => "png",
                };
            }
        };

        match mime {
            "image/jpeg" | "image/jpg" => "jpg",
            "image/webp" => "webp",
            "image/gif" => "gif",
            "image/png" => "png",
            _ => "bin",
        }
    }
}

/// One rendered result card.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultEntry {
    pub index: usize,
    pub label: String,
    pub page: Option<u32>,
    pub source: String,
    pub image: ImagePayload,
    pub received_at: DateTime<Utc>,
}

/// Images available to the overlay viewer; append-only within a run.
#[derive(Debug, Clone, Default)]
pub struct OverlayImageList {
    entries: Vec<ResultEntry>,
}

impl OverlayImageList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a result and returns the stored entry with its index filled in.
    pub fn push(
        &mut self,
        label: String,
        page: Option<u32>,
        source: String,
        image: ImagePayload,
    ) -> ResultEntry {
        let entry = ResultEntry {
            index: self.entries.len(),
            label,
            page,
            source,
            image,
            received_at: Utc::now(),
        };
        self.entries.push(entry.clone());
        entry
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn get(&self, index: usize) -> Option<&ResultEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ResultEntry] {
        &self.entries
    }
}
