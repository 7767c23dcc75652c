use std::{io::Cursor, sync::Arc, time::Duration};

use bytes::Bytes;

use crate::api::{ApiError, ApiRequest, Transport};
use crate::results::ImagePayload;

use super::zoom::ImageSize;

/// Resolves an image payload to its natural dimensions.
#[derive(Clone)]
pub struct ImageLoader {
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

impl ImageLoader {
    pub fn new(transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    pub async fn load(&self, payload: &ImagePayload) -> Result<ImageSize, ApiError> {
        let bytes = match payload {
            ImagePayload::DataUri { data, .. } => data.clone(),
            ImagePayload::Url { url } => self.fetch(url).await?,
        };

        tokio::task::spawn_blocking(move || read_dimensions(&bytes))
            .await
            .map_err(|err| ApiError::Decode(format!("image header worker failed: {err}")))?
    }

    async fn fetch(&self, url: &str) -> Result<Bytes, ApiError> {
        let response = tokio::time::timeout(self.timeout, self.transport.send(ApiRequest::get(url)))
            .await
            .map_err(|_| ApiError::Timeout(self.timeout))??;
        if !response.is_success() {
            return Err(ApiError::Decode(format!(
                "image request {url} answered HTTP {}",
                response.status()
            )));
        }
        Ok(response.bytes().await?)
    }
}

/// Reads only the image header; pixels are never decoded.
pub fn read_dimensions(bytes: &[u8]) -> Result<ImageSize, ApiError> {
    let (width, height) = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_dimensions()
        .map_err(|err| ApiError::Decode(format!("unreadable image: {err}")))?;
    Ok(ImageSize { width, height })
}
