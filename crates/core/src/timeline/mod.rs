use std::time::Duration;

use serde::Serialize;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};

use crate::{BackdropError, ImageId, ImagePool, RandomSource, Result};

/// Time between carousel advances unless configured otherwise.
pub const DEFAULT_CAROUSEL_PERIOD: Duration = Duration::from_secs(5);

/// Rotating backdrop that walks every pooled image in order.
#[derive(Debug, Clone)]
pub struct Carousel {
    images: Vec<ImageId>,
    index: usize,
    active: bool,
}

impl Carousel {
    /// Builds an inactive carousel over every pool, starting at the first image.
    pub fn new(pool: &ImagePool) -> Self {
        Self {
            images: pool.all(),
            index: 0,
            active: false,
        }
    }

    pub fn from_images(images: Vec<ImageId>) -> Result<Self> {
        if images.is_empty() {
            return Err(BackdropError::InvalidConfig(
                "carousel needs at least one image".to_string(),
            ));
        }
        Ok(Self {
            images,
            index: 0,
            active: false,
        })
    }

    pub fn with_random_start(mut self, random: &mut dyn RandomSource) -> Self {
        self.index = random.next_index(self.images.len());
        self
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn current(&self) -> &ImageId {
        &self.images[self.index]
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Pausing keeps the index; resuming continues from it.
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Advances one image, wrapping at the end. Returns `false` while paused.
    pub fn tick(&mut self) -> bool {
        if !self.active {
            return false;
        }
        self.index = (self.index + 1) % self.images.len();
        true
    }

    pub fn frame(&self) -> CarouselFrame {
        CarouselFrame {
            index: self.index,
            image: self.current().clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CarouselFrame {
    pub index: usize,
    pub image: ImageId,
}

/// Background task advancing a [`Carousel`] on a fixed period.
#[derive(Debug)]
pub struct CarouselDriver {
    frames: watch::Receiver<CarouselFrame>,
    handle: JoinHandle<Carousel>,
}

impl CarouselDriver {
    /// Spawns the timer task. The carousel runs while `activation` reads
    /// `true` and the task ends once the activation sender is dropped.
    pub fn spawn(
        carousel: Carousel,
        period: Duration,
        activation: watch::Receiver<bool>,
    ) -> Result<Self> {
        if period.is_zero() {
            return Err(BackdropError::InvalidConfig(
                "carousel period must be greater than zero".to_string(),
            ));
        }

        let (frames_tx, frames) = watch::channel(carousel.frame());
        let handle = tokio::spawn(run(carousel, period, activation, frames_tx));
        Ok(Self { frames, handle })
    }

    pub fn subscribe(&self) -> watch::Receiver<CarouselFrame> {
        self.frames.clone()
    }

    pub fn current(&self) -> CarouselFrame {
        self.frames.borrow().clone()
    }

    /// Waits for the task to finish and hands back the carousel.
    pub async fn join(self) -> Result<Carousel> {
        self.handle
            .await
            .map_err(|err| BackdropError::msg(format!("carousel task failed: {err}")))
    }
}

async fn run(
    mut carousel: Carousel,
    period: Duration,
    mut activation: watch::Receiver<bool>,
    frames: watch::Sender<CarouselFrame>,
) -> Carousel {
    loop {
        let active = *activation.borrow_and_update();
        carousel.set_active(active);

        if !active {
            if activation.changed().await.is_err() {
                break;
            }
            continue;
        }

        tracing::debug!(index = carousel.index(), "carousel running");
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    carousel.tick();
                    tracing::trace!(index = carousel.index(), image = %carousel.current(), "carousel advanced");
                    frames.send_replace(carousel.frame());
                }
                changed = activation.changed() => {
                    if changed.is_err() {
                        carousel.set_active(false);
                        return carousel;
                    }
                    if !*activation.borrow() {
                        tracing::debug!(index = carousel.index(), "carousel paused");
                        break;
                    }
                }
            }
        }
    }

    carousel
}
