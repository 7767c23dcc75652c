pub mod batch;
pub mod controller;
pub mod events;
pub mod state;
pub mod stream;

pub use batch::{BatchSummary, FileFailure, PROCESS_PATH};
pub use controller::{RunError, TranslatorController};
pub use events::{AppEvent, EventEmitter};
pub use state::{RunKind, RunStatus, TranslationSnapshot, TranslationState};
pub use stream::{StreamSummary, PROCESS_STREAM_PATH};
