use std::{fmt, sync::Arc};

use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{BackdropError, Category, Result};

/// Relative path of a backdrop image, resolved by the host's asset loader.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(String);

impl ImageId {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ImageId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Immutable mapping from [`Category`] to its ordered backdrop images.
///
/// The `general` pool doubles as the fallback pool and must not be empty;
/// its first entry is the fallback identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawImagePool")]
pub struct ImagePool {
    general: Vec<ImageId>,
    concert: Vec<ImageId>,
    vinyl: Vec<ImageId>,
}

#[derive(Deserialize)]
struct RawImagePool {
    general: Vec<ImageId>,
    #[serde(default)]
    concert: Vec<ImageId>,
    #[serde(default)]
    vinyl: Vec<ImageId>,
}

impl TryFrom<RawImagePool> for ImagePool {
    type Error = BackdropError;

    fn try_from(raw: RawImagePool) -> Result<Self> {
        Self::new(raw.general, raw.concert, raw.vinyl)
    }
}

impl ImagePool {
    pub fn new(general: Vec<ImageId>, concert: Vec<ImageId>, vinyl: Vec<ImageId>) -> Result<Self> {
        let pool = Self {
            general,
            concert,
            vinyl,
        };
        pool.validate()?;
        Ok(pool)
    }

    pub fn validate(&self) -> Result<()> {
        if self.general.is_empty() {
            return Err(BackdropError::InvalidConfig(
                "the `general` image pool must contain at least one image".to_string(),
            ));
        }
        Ok(())
    }

    /// Images configured for `category`, possibly empty.
    pub fn images(&self, category: Category) -> &[ImageId] {
        match category {
            Category::General => &self.general,
            Category::Concert => &self.concert,
            Category::Vinyl => &self.vinyl,
        }
    }

    /// Images eligible for `category`, substituting `general` when the
    /// category has nothing configured.
    pub fn eligible(&self, category: Category) -> &[ImageId] {
        let images = self.images(category);
        if images.is_empty() {
            &self.general
        } else {
            images
        }
    }

    pub fn fallback(&self) -> &ImageId {
        &self.general[0]
    }

    pub fn contains(&self, category: Category, image: &ImageId) -> bool {
        self.eligible(category).contains(image)
    }

    /// Every pool concatenated in `general, concert, vinyl` order. Images
    /// shared between pools appear once per pool.
    pub fn all(&self) -> Vec<ImageId> {
        Category::ALL
            .iter()
            .flat_map(|category| self.images(*category).iter().cloned())
            .collect()
    }

    pub fn total_len(&self) -> usize {
        self.general.len() + self.concert.len() + self.vinyl.len()
    }
}

impl Default for ImagePool {
    fn default() -> Self {
        fn images(paths: &[&str]) -> Vec<ImageId> {
            paths
                .iter()
                .map(|name| ImageId::new(format!("/images/backgrounds/{name}")))
                .collect()
        }

        Self {
            general: images(&[
                "beat_waves_1.png",
                "beat_waves_2.png",
                "beat_waves_3.png",
                "beat_waves_4.png",
                "L4F4YBMe4MQW.jpg",
                "cpg4bA2EF94F.jpg",
                "WJJgAdBrfIET.jpg",
            ]),
            concert: images(&[
                "beat_waves_2.png",
                "oxwwUhRR1BHc.jpg",
                "i57RQOfd6chf.jpg",
                "WzCW99P0gLk8.jpg",
            ]),
            vinyl: images(&["beat_waves_3.png", "T4kZxbtfqPfV.jpg", "PTOI6WAfDWMA.jpg"]),
        }
    }
}

/// Source of uniformly distributed indices.
pub trait RandomSource: Send {
    /// Returns an index in `0..len`. `len` is never zero.
    fn next_index(&mut self, len: usize) -> usize;
}

impl<R: Rng + Send> RandomSource for R {
    fn next_index(&mut self, len: usize) -> usize {
        self.gen_range(0..len)
    }
}

/// Picks a random image from the pool of a category.
pub struct Selector {
    pool: Arc<ImagePool>,
    random: Box<dyn RandomSource>,
}

impl Selector {
    /// Creates a selector backed by an entropy-seeded generator.
    pub fn new(pool: Arc<ImagePool>) -> Self {
        Self::with_random(pool, rand::rngs::StdRng::from_entropy())
    }

    pub fn with_random(pool: Arc<ImagePool>, random: impl RandomSource + 'static) -> Self {
        Self {
            pool,
            random: Box::new(random),
        }
    }

    pub fn pool(&self) -> &Arc<ImagePool> {
        &self.pool
    }

    /// Selects an image for `category`. Consecutive calls may repeat.
    pub fn select(&mut self, category: Category) -> ImageId {
        let images = self.pool.eligible(category);
        let index = self.random.next_index(images.len());
        images[index].clone()
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selector")
            .field("pool", &self.pool.total_len())
            .finish()
    }
}
