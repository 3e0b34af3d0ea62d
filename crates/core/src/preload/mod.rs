use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use serde::Serialize;

use crate::{BackdropError, ImageId, ImagePool, LoadPhase, Result};

const IMAGE_SIGNATURES: [&[u8]; 5] = [
    b"\x89PNG\r\n\x1a\n",
    b"\xff\xd8\xff",
    b"GIF87a",
    b"GIF89a",
    b"RIFF",
];

/// Materialises an image so the host can render it without a visible load.
#[async_trait]
pub trait ImageLoader: Send + Sync {
    /// Makes a single attempt to load `image`.
    async fn load(&self, image: &ImageId) -> Result<()>;
}

/// Loads images from an asset directory on disk.
#[derive(Debug, Clone)]
pub struct FsImageLoader {
    root: PathBuf,
}

impl FsImageLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves an identifier against the asset root. Identifiers are
    /// web-style paths, so a leading `/` refers to the root itself.
    pub fn resolve(&self, image: &ImageId) -> PathBuf {
        self.root.join(image.as_str().trim_start_matches('/'))
    }
}

#[async_trait]
impl ImageLoader for FsImageLoader {
    async fn load(&self, image: &ImageId) -> Result<()> {
        let path = self.resolve(image);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|err| BackdropError::preload(image.as_str(), err.to_string()))?;

        if bytes.is_empty() {
            return Err(BackdropError::preload(image.as_str(), "file is empty"));
        }
        if !looks_like_image(&bytes) {
            return Err(BackdropError::preload(
                image.as_str(),
                "unrecognised image signature",
            ));
        }
        Ok(())
    }
}

fn looks_like_image(bytes: &[u8]) -> bool {
    IMAGE_SIGNATURES.iter().any(|signature| {
        if *signature == b"RIFF" {
            bytes.starts_with(signature) && bytes.get(8..12) == Some(b"WEBP".as_slice())
        } else {
            bytes.starts_with(signature)
        }
    })
}

/// Result of a single preload attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreloadOutcome {
    pub image: ImageId,
    pub phase: LoadPhase,
}

/// Verifies images through an [`ImageLoader`], substituting the pool's
/// fallback image when loading fails.
#[derive(Debug)]
pub struct Preloader<L> {
    loader: L,
    pool: Arc<ImagePool>,
}

impl<L: ImageLoader> Preloader<L> {
    pub fn new(loader: L, pool: Arc<ImagePool>) -> Self {
        Self { loader, pool }
    }

    /// Makes one attempt to load `image`. Failures are logged and recovered
    /// locally; this never errors.
    pub async fn preload(&self, image: ImageId) -> PreloadOutcome {
        match self.loader.load(&image).await {
            Ok(()) => PreloadOutcome {
                image,
                phase: LoadPhase::Loaded,
            },
            Err(err) => {
                tracing::warn!(%image, error = %err, "preload failed, using fallback backdrop");
                PreloadOutcome {
                    image: self.pool.fallback().clone(),
                    phase: LoadPhase::Fallback,
                }
            }
        }
    }
}
