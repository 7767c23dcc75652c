use std::io;

use bytes::BytesMut;
use futures_util::Stream;
use tokio_util::{
    codec::{Decoder, FramedRead},
    io::StreamReader,
};

use crate::api::BodyStream;

use super::StreamEvent;

#[derive(Debug, Clone, PartialEq)]
pub enum StreamLine {
    Event(StreamEvent),
    /// A complete line that did not decode; the stream carries on.
    Malformed { line: String, reason: String },
}

/// Newline-delimited JSON decoder. Partial lines stay buffered until their
/// terminating `\n` arrives, so chunk boundaries never change the output.
#[derive(Debug, Default)]
pub struct NdjsonCodec {
    // Bytes of the buffer already scanned without finding a newline.
    scanned: usize,
}

impl NdjsonCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for NdjsonCodec {
    type Item = StreamLine;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<StreamLine>, io::Error> {
        loop {
            let Some(offset) = src[self.scanned..].iter().position(|byte| *byte == b'\n') else {
                self.scanned = src.len();
                return Ok(None);
            };

            let end = self.scanned + offset;
            self.scanned = 0;
            let line = src.split_to(end + 1);
            if let Some(item) = parse_line(&line[..end]) {
                return Ok(Some(item));
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<StreamLine>, io::Error> {
        if let Some(item) = self.decode(src)? {
            return Ok(Some(item));
        }

        self.scanned = 0;
        if src.is_empty() {
            return Ok(None);
        }
        let rest = src.split_to(src.len());
        Ok(parse_line(&rest))
    }
}

fn parse_line(raw: &[u8]) -> Option<StreamLine> {
    let text = String::from_utf8_lossy(raw);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    Some(match serde_json::from_str::<StreamEvent>(trimmed) {
        Ok(event) => StreamLine::Event(event),
        Err(err) => StreamLine::Malformed {
            line: trimmed.to_string(),
            reason: err.to_string(),
        },
    })
}

/// Decodes a response body into stream lines in arrival order.
pub fn decode_lines(body: BodyStream) -> impl Stream<Item = io::Result<StreamLine>> + Unpin {
    FramedRead::new(StreamReader::new(body), NdjsonCodec::new())
}
