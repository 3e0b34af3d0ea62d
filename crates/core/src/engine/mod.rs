use std::{collections::HashSet, path::PathBuf, sync::Arc, time::Duration};

use serde::Serialize;

use crate::{
    BackgroundConfig, CardBackground, Carousel, Classifier, ContextBackground, ContextMachine,
    EmptyQueryPolicy, FsImageLoader, ImageId, ImageLoader, ImagePool, Preloader, RandomSource,
    Result, Selector,
};

/// Shared, read-only engine configuration from which backdrop units are built.
#[derive(Debug, Clone)]
pub struct BackdropEngine {
    pool: Arc<ImagePool>,
    classifier: Classifier,
    policy: EmptyQueryPolicy,
    asset_root: PathBuf,
    carousel_period: Duration,
}

/// An image that could not be loaded during [`BackdropEngine::verify_assets`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetProblem {
    pub image: ImageId,
    pub reason: String,
}

impl BackdropEngine {
    pub fn from_config(config: &BackgroundConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            pool: Arc::new(config.pools.clone()),
            classifier: Classifier::new(config.keywords.clone()),
            policy: config.empty_query,
            asset_root: config.asset_root.clone(),
            carousel_period: config.carousel_period(),
        })
    }

    pub fn pool(&self) -> &Arc<ImagePool> {
        &self.pool
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn carousel_period(&self) -> Duration {
        self.carousel_period
    }

    pub fn loader(&self) -> FsImageLoader {
        FsImageLoader::new(&self.asset_root)
    }

    pub fn selector(&self, random: impl RandomSource + 'static) -> Selector {
        Selector::with_random(Arc::clone(&self.pool), random)
    }

    pub fn context_machine(&self, random: impl RandomSource + 'static) -> ContextMachine {
        ContextMachine::new(self.classifier.clone(), self.selector(random)).with_policy(self.policy)
    }

    /// Context-driven backdrop that preloads from the asset root.
    pub fn context_background(
        &self,
        random: impl RandomSource + 'static,
    ) -> ContextBackground<FsImageLoader> {
        self.context_background_with(self.loader(), random)
    }

    pub fn context_background_with<L: ImageLoader + 'static>(
        &self,
        loader: L,
        random: impl RandomSource + 'static,
    ) -> ContextBackground<L> {
        ContextBackground::new(
            self.context_machine(random),
            Preloader::new(loader, Arc::clone(&self.pool)),
        )
    }

    pub fn card_background(&self, random: impl RandomSource + 'static) -> CardBackground {
        CardBackground::new(self.classifier.clone(), self.selector(random))
    }

    pub fn carousel(&self) -> Carousel {
        Carousel::new(&self.pool)
    }

    /// Attempts every distinct pooled image once and reports the failures.
    pub async fn verify_assets(&self, loader: &impl ImageLoader) -> Vec<AssetProblem> {
        let mut seen = HashSet::new();
        let mut problems = Vec::new();

        for image in self.pool.all() {
            if !seen.insert(image.clone()) {
                continue;
            }
            if let Err(err) = loader.load(&image).await {
                tracing::warn!(%image, error = %err, "backdrop asset failed to load");
                problems.push(AssetProblem {
                    image,
                    reason: err.to_string(),
                });
            }
        }

        problems
    }
}
