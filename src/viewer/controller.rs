use serde::Serialize;
use thiserror::Error;

use super::{
    state::{OpenView, ViewerSnapshot, ViewerState},
    zoom::{display_size, ImageSize, Viewport, ZoomConfig},
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ViewerError {
    #[error("there are no images to view")]
    Empty,
    #[error("image {index} does not exist ({len} available)")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Identifies the load started by a transition; results for an older
/// generation are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoadTicket {
    pub index: usize,
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerKey {
    ArrowLeft,
    ArrowRight,
    ArrowUp,
    ArrowDown,
    ZoomIn,
    ZoomOut,
    ResetZoom,
    Escape,
    Other,
}

impl ViewerKey {
    /// Maps a key name as reported by a keyboard event.
    pub fn from_key(key: &str) -> Self {
        match key {
            "ArrowLeft" | "Left" => ViewerKey::ArrowLeft,
            "ArrowRight" | "Right" => ViewerKey::ArrowRight,
            "ArrowUp" | "Up" => ViewerKey::ArrowUp,
            "ArrowDown" | "Down" => ViewerKey::ArrowDown,
            "+" | "=" => ViewerKey::ZoomIn,
            "-" | "_" => ViewerKey::ZoomOut,
            "0" => ViewerKey::ResetZoom,
            "Escape" | "Esc" => ViewerKey::Escape,
            _ => ViewerKey::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewerInput {
    /// `over_image` must only be true when the pointer is on the image itself.
    Wheel { delta_y: f32, over_image: bool },
    DoubleClick,
    Key(ViewerKey),
    Resize(Viewport),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerAction {
    Ignored,
    Updated,
    /// The caller must load the image and hand the size to `apply_loaded`.
    Load(LoadTicket),
    Closed,
}

/// Full-screen image overlay: current index, zoom and scroll.
#[derive(Debug, Clone)]
pub struct Viewer {
    zoom: ZoomConfig,
    scroll_step: u32,
    viewport: Viewport,
    state: ViewerState,
    total: usize,
    generation: u64,
}

impl Viewer {
    pub fn new(zoom: ZoomConfig, viewport: Viewport, scroll_step: u32) -> Self {
        Self {
            zoom,
            scroll_step: scroll_step.max(1),
            viewport,
            state: ViewerState::Closed,
            total: 0,
            generation: 0,
        }
    }

    pub fn state(&self) -> &ViewerState {
        &self.state
    }

    pub fn zoom_config(&self) -> &ZoomConfig {
        &self.zoom
    }

    pub fn snapshot(&self) -> ViewerSnapshot {
        ViewerSnapshot::from_state(&self.state, self.total)
    }

    /// Tracks the length of the image list. Shrinking below the open index
    /// closes the overlay so the index stays valid.
    pub fn set_total(&mut self, total: usize) {
        self.total = total;
        if let Some(view) = self.state.view() {
            if view.index >= total {
                self.state = ViewerState::Closed;
            }
        }
    }

    pub fn open(&mut self, index: usize) -> Result<LoadTicket, ViewerError> {
        if self.total == 0 {
            return Err(ViewerError::Empty);
        }
        if index >= self.total {
            return Err(ViewerError::IndexOutOfRange {
                index,
                len: self.total,
            });
        }

        self.generation += 1;
        self.state = ViewerState::Open(OpenView {
            index,
            zoom: self.zoom.default,
            natural_size: None,
            scroll_y: 0,
            generation: self.generation,
        });
        Ok(LoadTicket {
            index,
            generation: self.generation,
        })
    }

    pub fn next(&mut self) -> Option<LoadTicket> {
        let index = self.state.view()?.index;
        if index + 1 >= self.total {
            return None;
        }
        self.open(index + 1).ok()
    }

    pub fn prev(&mut self) -> Option<LoadTicket> {
        let index = self.state.view()?.index;
        if index == 0 {
            return None;
        }
        self.open(index - 1).ok()
    }

    pub fn close(&mut self) -> bool {
        let was_open = self.state.is_open();
        self.state = ViewerState::Closed;
        was_open
    }

    /// Records the natural size of a finished load and fits it to the
    /// viewport. Returns false when the load is stale.
    pub fn apply_loaded(&mut self, ticket: LoadTicket, natural: ImageSize) -> bool {
        let fitted = self.zoom.fit(natural, self.viewport);
        match &mut self.state {
            ViewerState::Open(view) if view.generation == ticket.generation => {
                view.natural_size = Some(natural);
                view.zoom = fitted;
                view.scroll_y = 0;
                true
            }
            _ => false,
        }
    }

    pub fn handle_input(&mut self, input: ViewerInput) -> ViewerAction {
        if let ViewerInput::Resize(viewport) = input {
            return self.resize(viewport);
        }
        if !self.state.is_open() {
            return ViewerAction::Ignored;
        }

        match input {
            ViewerInput::Wheel { delta_y, over_image } => {
                if !over_image || delta_y == 0.0 {
                    return ViewerAction::Ignored;
                }
                if delta_y < 0.0 {
                    self.update_zoom(|config, zoom| config.zoom_in(zoom))
                } else {
                    self.update_zoom(|config, zoom| config.zoom_out(zoom))
                }
            }
            ViewerInput::DoubleClick => self.update_zoom(|config, _| config.default),
            ViewerInput::Key(key) => match key {
                ViewerKey::ArrowLeft => self.prev().map_or(ViewerAction::Ignored, ViewerAction::Load),
                ViewerKey::ArrowRight => {
                    self.next().map_or(ViewerAction::Ignored, ViewerAction::Load)
                }
                ViewerKey::ArrowUp => self.scroll_by(-(self.scroll_step as i64)),
                ViewerKey::ArrowDown => self.scroll_by(self.scroll_step as i64),
                ViewerKey::ZoomIn => self.update_zoom(|config, zoom| config.zoom_in(zoom)),
                ViewerKey::ZoomOut => self.update_zoom(|config, zoom| config.zoom_out(zoom)),
                ViewerKey::ResetZoom => self.update_zoom(|config, _| config.default),
                ViewerKey::Escape => {
                    self.close();
                    ViewerAction::Closed
                }
                ViewerKey::Other => ViewerAction::Ignored,
            },
            ViewerInput::Resize(_) => ViewerAction::Ignored,
        }
    }

    fn resize(&mut self, viewport: Viewport) -> ViewerAction {
        self.viewport = viewport;
        let fitted = match self.state.view().and_then(|view| view.natural_size) {
            Some(natural) => self.zoom.fit(natural, viewport),
            None => return ViewerAction::Ignored,
        };
        self.update_zoom(|_, _| fitted)
    }

    fn update_zoom(&mut self, change: impl FnOnce(&ZoomConfig, f32) -> f32) -> ViewerAction {
        let config = self.zoom;
        let ViewerState::Open(view) = &mut self.state else {
            return ViewerAction::Ignored;
        };
        view.zoom = config.clamp(change(&config, view.zoom));
        self.clamp_scroll();
        ViewerAction::Updated
    }

    fn scroll_by(&mut self, delta: i64) -> ViewerAction {
        let ViewerState::Open(view) = &mut self.state else {
            return ViewerAction::Ignored;
        };
        view.scroll_y = (view.scroll_y as i64 + delta).max(0) as u32;
        self.clamp_scroll();
        ViewerAction::Updated
    }

    fn clamp_scroll(&mut self) {
        let viewport_height = self.viewport.height;
        if let ViewerState::Open(view) = &mut self.state {
            if let Some(natural) = view.natural_size {
                let shown = display_size(natural, view.zoom).height;
                view.scroll_y = view.scroll_y.min(shown.saturating_sub(viewport_height));
            }
        }
    }
}
