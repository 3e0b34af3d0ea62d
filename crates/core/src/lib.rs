//! Core library for the BeatTeller backdrop engine.
//!
//! Free text from searches, moods and genres is classified into a visual
//! category, an image is picked from that category's pool and preloaded with
//! a fixed fallback. Item cards get a lighter variant without preloading, and
//! a carousel rotates through every pooled image on its own timer. Each module
//! owns one of these pieces; [`BackdropEngine`] wires them from configuration.

pub mod assets;
pub mod background;
pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod preload;
pub mod render;
pub mod timeline;

pub use assets::{ImageId, ImagePool, RandomSource, Selector};
pub use background::{
    BackgroundState, CardBackground, ContextBackground, ContextMachine, EmptyQueryPolicy,
    LoadPhase, PreloadRequest, RequestToken, Transition,
};
pub use classify::{Category, Classification, Classifier, KeywordTable, SearchContext};
pub use config::{AppConfig, BackgroundConfig};
pub use engine::{AssetProblem, BackdropEngine};
pub use error::{BackdropError, Result};
pub use preload::{FsImageLoader, ImageLoader, PreloadOutcome, Preloader};
pub use render::{Backdrop, BackdropStack, LayerId};
pub use timeline::{Carousel, CarouselDriver, CarouselFrame, DEFAULT_CAROUSEL_PERIOD};
