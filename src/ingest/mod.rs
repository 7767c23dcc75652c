pub mod codec;
pub mod events;

pub use codec::{decode_lines, NdjsonCodec, StreamLine};
pub use events::StreamEvent;
