use serde::{Deserialize, Serialize};

/// One line of the gallery translation stream, tagged by its `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    Info {
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        total_pages: Option<u32>,
        /// Denominator for progress; may be smaller than `total_pages` when a
        /// page selection was given.
        #[serde(default)]
        pages_to_process: Option<u32>,
    },
    Result {
        #[serde(default)]
        page: Option<u32>,
        #[serde(alias = "result_image")]
        image: String,
        #[serde(default)]
        progress: Option<u32>,
    },
    Error {
        #[serde(default)]
        page: Option<u32>,
        #[serde(default, alias = "error", alias = "detail")]
        message: Option<String>,
    },
    Complete {
        #[serde(default)]
        message: Option<String>,
    },
}

impl StreamEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Info { .. } => "info",
            StreamEvent::Result { .. } => "result",
            StreamEvent::Error { .. } => "error",
            StreamEvent::Complete { .. } => "complete",
        }
    }
}
