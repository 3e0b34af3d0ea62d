use serde::Serialize;

use crate::{BackgroundState, CarouselFrame, ImageId};

/// What the host paints underneath its content: an image, if any, and
/// whether to overlay a loading spinner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Backdrop {
    pub image: Option<ImageId>,
    pub loading: bool,
}

impl From<&BackgroundState> for Backdrop {
    fn from(state: &BackgroundState) -> Self {
        Self {
            image: state.image.clone(),
            loading: state.is_loading(),
        }
    }
}

impl From<&CarouselFrame> for Backdrop {
    fn from(frame: &CarouselFrame) -> Self {
        Self {
            image: Some(frame.image.clone()),
            loading: false,
        }
    }
}

impl From<Option<&ImageId>> for Backdrop {
    fn from(image: Option<&ImageId>) -> Self {
        Self {
            image: image.cloned(),
            loading: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerId(usize);

/// Stack of backdrop layers, bottom first. The topmost layer with an image
/// is the one shown.
#[derive(Debug, Default)]
pub struct BackdropStack {
    layers: Vec<Backdrop>,
}

impl BackdropStack {
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    pub fn push(&mut self, backdrop: Backdrop) -> LayerId {
        self.layers.push(backdrop);
        LayerId(self.layers.len() - 1)
    }

    pub fn update(&mut self, layer: LayerId, backdrop: Backdrop) {
        if let Some(slot) = self.layers.get_mut(layer.0) {
            *slot = backdrop;
        }
    }

    pub fn layers(&self) -> &[Backdrop] {
        &self.layers
    }

    pub fn compose(&self) -> Backdrop {
        Backdrop {
            image: self
                .layers
                .iter()
                .rev()
                .find_map(|layer| layer.image.clone()),
            loading: self.layers.iter().any(|layer| layer.loading),
        }
    }
}
