use serde::Serialize;

use super::zoom::{display_size, ImageSize};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenView {
    pub index: usize,
    pub zoom: f32,
    /// Unknown until the image at `index` has loaded.
    pub natural_size: Option<ImageSize>,
    pub scroll_y: u32,
    #[serde(skip)]
    pub generation: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ViewerState {
    Closed,
    Open(OpenView),
}

impl Default for ViewerState {
    fn default() -> Self {
        ViewerState::Closed
    }
}

impl ViewerState {
    pub fn is_open(&self) -> bool {
        matches!(self, ViewerState::Open(_))
    }

    pub fn view(&self) -> Option<&OpenView> {
        match self {
            ViewerState::Open(view) => Some(view),
            ViewerState::Closed => None,
        }
    }
}

/// What a renderer needs to draw the overlay.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerSnapshot {
    pub open: bool,
    pub index: Option<usize>,
    pub total: usize,
    pub zoom: Option<f32>,
    pub display_size: Option<ImageSize>,
    pub scroll_y: u32,
}

impl ViewerSnapshot {
    pub fn from_state(state: &ViewerState, total: usize) -> Self {
        match state {
            ViewerState::Closed => Self {
                open: false,
                index: None,
                total,
                zoom: None,
                display_size: None,
                scroll_y: 0,
            },
            ViewerState::Open(view) => Self {
                open: true,
                index: Some(view.index),
                total,
                zoom: Some(view.zoom),
                display_size: view.natural_size.map(|size| display_size(size, view.zoom)),
                scroll_y: view.scroll_y,
            },
        }
    }
}
