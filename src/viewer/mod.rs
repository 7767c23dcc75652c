pub mod controller;
pub mod loader;
pub mod state;
pub mod zoom;

pub use controller::{LoadTicket, Viewer, ViewerAction, ViewerError, ViewerInput, ViewerKey};
pub use loader::ImageLoader;
pub use state::{OpenView, ViewerSnapshot, ViewerState};
pub use zoom::{ImageSize, Viewport, ZoomConfig};
