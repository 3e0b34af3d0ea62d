//! Reactive backdrop units.
//!
//! [`ContextMachine`] holds the transition logic for search-driven backdrops
//! and is deliberately free of any runtime so it can be driven step by step.
//! [`ContextBackground`] wraps it for tokio, spawning preloads and publishing
//! each state change over a watch channel. [`CardBackground`] is the
//! lightweight per-item variant without preloading.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::{sync::watch, task::JoinHandle};

use crate::{
    BackdropError, Category, Classifier, ImageId, ImageLoader, PreloadOutcome, Preloader, Result,
    SearchContext, Selector,
};

/// Loading lifecycle of a context-driven backdrop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadPhase {
    #[default]
    Idle,
    Pending,
    Loaded,
    Fallback,
}

/// What a context-driven backdrop shows when the query is empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyQueryPolicy {
    /// Show the fallback image straight away, already loaded.
    #[default]
    DefaultImage,
    /// Clear the backdrop and return to idle.
    Clear,
}

/// Snapshot exposed to the visual host.
///
/// While `Pending`, `image` still holds the previous backdrop, which has not
/// been confirmed for the new context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackgroundState {
    pub image: Option<ImageId>,
    pub phase: LoadPhase,
}

impl BackgroundState {
    pub fn is_loading(&self) -> bool {
        self.phase == LoadPhase::Pending
    }
}

/// Monotonic identifier of a preload request within one backdrop unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RequestToken(u64);

impl RequestToken {
    pub fn value(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreloadRequest {
    pub token: RequestToken,
    pub category: Category,
    pub image: ImageId,
}

/// Effect of feeding a new input into a [`ContextMachine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The effective input did not change; nothing happened.
    Unchanged,
    /// The state settled without a preload.
    Settled,
    /// The state is pending until `request` resolves.
    Preload(PreloadRequest),
}

/// Transition logic for a search-driven backdrop.
#[derive(Debug)]
pub struct ContextMachine {
    classifier: Classifier,
    selector: Selector,
    policy: EmptyQueryPolicy,
    enabled: bool,
    input: SearchContext,
    applied: Option<SearchContext>,
    issued: u64,
    state: BackgroundState,
}

impl ContextMachine {
    pub fn new(classifier: Classifier, selector: Selector) -> Self {
        Self {
            classifier,
            selector,
            policy: EmptyQueryPolicy::default(),
            enabled: true,
            input: SearchContext::default(),
            applied: None,
            issued: 0,
            state: BackgroundState::default(),
        }
    }

    pub fn with_policy(mut self, policy: EmptyQueryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn state(&self) -> &BackgroundState {
        &self.state
    }

    pub fn is_loading(&self) -> bool {
        self.state.is_loading()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Token of the most recent request, if any was issued.
    pub fn latest_token(&self) -> Option<RequestToken> {
        (self.issued > 0).then_some(RequestToken(self.issued))
    }

    pub fn update(&mut self, context: SearchContext) -> Transition {
        self.input = context;
        self.apply()
    }

    /// Disabling behaves as if the query were empty; re-enabling replays the
    /// last context.
    pub fn set_enabled(&mut self, enabled: bool) -> Transition {
        self.enabled = enabled;
        self.apply()
    }

    /// Applies a preload result. Returns `false` and leaves the state alone
    /// when `token` has been superseded by a newer request.
    pub fn resolve(&mut self, token: RequestToken, outcome: PreloadOutcome) -> bool {
        if token.0 != self.issued || self.state.phase != LoadPhase::Pending {
            tracing::debug!(
                token = token.0,
                latest = self.issued,
                image = %outcome.image,
                "discarding stale preload result"
            );
            return false;
        }

        self.state = BackgroundState {
            image: Some(outcome.image),
            phase: outcome.phase,
        };
        true
    }

    fn apply(&mut self) -> Transition {
        let effective = if self.enabled {
            self.input.clone()
        } else {
            SearchContext {
                query: String::new(),
                ..self.input.clone()
            }
        };

        if self.applied.as_ref() == Some(&effective) {
            return Transition::Unchanged;
        }

        // Any in-flight preload is stale from here on.
        self.issued += 1;
        let token = RequestToken(self.issued);

        let transition = if effective.has_query() {
            let category = self.classifier.classify_context(&effective);
            let image = self.selector.select(category);
            self.state.phase = LoadPhase::Pending;
            Transition::Preload(PreloadRequest {
                token,
                category,
                image,
            })
        } else {
            self.state = match self.policy {
                EmptyQueryPolicy::DefaultImage => BackgroundState {
                    image: Some(self.selector.pool().fallback().clone()),
                    phase: LoadPhase::Loaded,
                },
                EmptyQueryPolicy::Clear => BackgroundState::default(),
            };
            Transition::Settled
        };

        self.applied = Some(effective);
        transition
    }
}

/// Tokio host for a [`ContextMachine`].
pub struct ContextBackground<L> {
    machine: Arc<Mutex<ContextMachine>>,
    preloader: Arc<Preloader<L>>,
    state: Arc<watch::Sender<BackgroundState>>,
}

impl<L: ImageLoader + 'static> ContextBackground<L> {
    pub fn new(machine: ContextMachine, preloader: Preloader<L>) -> Self {
        let (state, _) = watch::channel(machine.state().clone());
        Self {
            machine: Arc::new(Mutex::new(machine)),
            preloader: Arc::new(preloader),
            state: Arc::new(state),
        }
    }

    /// Subscribes to backdrop state changes.
    pub fn subscribe(&self) -> watch::Receiver<BackgroundState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> BackgroundState {
        self.state.borrow().clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading()
    }

    /// Feeds a new search context. When a preload is started, the returned
    /// handle yields whether its result was applied.
    pub fn set_context(&self, context: SearchContext) -> Result<Option<JoinHandle<bool>>> {
        let mut machine = self.lock()?;
        let transition = machine.update(context);
        Ok(self.dispatch(&machine, transition))
    }

    pub fn set_enabled(&self, enabled: bool) -> Result<Option<JoinHandle<bool>>> {
        let mut machine = self.lock()?;
        let transition = machine.set_enabled(enabled);
        Ok(self.dispatch(&machine, transition))
    }

    /// Publishes the machine's state and starts any requested preload. The
    /// caller holds the machine lock so snapshots go out in transition order.
    fn dispatch(
        &self,
        machine: &ContextMachine,
        transition: Transition,
    ) -> Option<JoinHandle<bool>> {
        let request = match transition {
            Transition::Unchanged => return None,
            Transition::Settled => {
                self.state.send_replace(machine.state().clone());
                return None;
            }
            Transition::Preload(request) => request,
        };

        self.state.send_replace(machine.state().clone());
        tracing::debug!(
            token = request.token.value(),
            category = %request.category,
            image = %request.image,
            "preloading backdrop"
        );

        let machine = Arc::clone(&self.machine);
        let preloader = Arc::clone(&self.preloader);
        let state = Arc::clone(&self.state);

        Some(tokio::spawn(async move {
            let outcome = preloader.preload(request.image).await;
            let Ok(mut guard) = machine.lock() else {
                tracing::warn!("context background poisoned, dropping preload result");
                return false;
            };

            if !guard.resolve(request.token, outcome) {
                return false;
            }
            let resolved = guard.state().clone();
            tracing::info!(
                image = resolved.image.as_ref().map(ImageId::as_str),
                phase = ?resolved.phase,
                "backdrop resolved"
            );
            state.send_replace(resolved);
            true
        }))
    }

    fn lock(&self) -> Result<MutexGuard<'_, ContextMachine>> {
        self.machine
            .lock()
            .map_err(|_| BackdropError::Poisoned("context background"))
    }
}

impl<L> std::fmt::Debug for ContextBackground<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextBackground")
            .field("state", &*self.state.borrow())
            .finish()
    }
}

/// Backdrop for a single rendered item, chosen from its display name alone.
///
/// There is no preload step and no fallback: items are rendered in bulk and
/// a broken image is left to the host.
#[derive(Debug)]
pub struct CardBackground {
    classifier: Classifier,
    selector: Selector,
    name: Option<String>,
    image: Option<ImageId>,
}

impl CardBackground {
    pub fn new(classifier: Classifier, selector: Selector) -> Self {
        Self {
            classifier,
            selector,
            name: None,
            image: None,
        }
    }

    pub fn image(&self) -> Option<&ImageId> {
        self.image.as_ref()
    }

    /// Re-selects the backdrop when `name` changes. An empty name keeps
    /// whatever is currently shown.
    pub fn set_name(&mut self, name: &str) -> Option<&ImageId> {
        if name.is_empty() || self.name.as_deref() == Some(name) {
            return self.image.as_ref();
        }

        let category = self.classifier.classify(name);
        let image = self.selector.select(category);
        tracing::debug!(name, %category, %image, "selected card backdrop");

        self.name = Some(name.to_string());
        self.image = Some(image);
        self.image.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use rand::{rngs::StdRng, SeedableRng};
    use tokio::sync::oneshot;

    use super::*;
    use crate::{ImagePool, RandomSource};

    /// Always picks the same slot so selections are predictable.
    struct FirstIndex;

    impl RandomSource for FirstIndex {
        fn next_index(&mut self, _len: usize) -> usize {
            0
        }
    }

    fn pool() -> Arc<ImagePool> {
        Arc::new(
            ImagePool::new(
                vec!["general.png".into(), "waves.png".into()],
                vec!["stage.png".into()],
                vec!["crate.png".into()],
            )
            .unwrap(),
        )
    }

    fn machine() -> ContextMachine {
        ContextMachine::new(Classifier::default(), Selector::with_random(pool(), FirstIndex))
    }

    fn loaded(image: &str) -> PreloadOutcome {
        PreloadOutcome {
            image: image.into(),
            phase: LoadPhase::Loaded,
        }
    }

    fn expect_preload(transition: Transition) -> PreloadRequest {
        match transition {
            Transition::Preload(request) => request,
            other => panic!("expected a preload, got {other:?}"),
        }
    }

    #[test]
    fn query_starts_a_pending_preload() {
        let mut machine = machine();
        let request = expect_preload(machine.update(SearchContext::new("Live concert tonight")));

        assert_eq!(request.category, Category::Concert);
        assert_eq!(request.image, ImageId::new("stage.png"));
        assert!(machine.is_loading());

        assert!(machine.resolve(request.token, loaded("stage.png")));
        assert_eq!(machine.state().phase, LoadPhase::Loaded);
        assert_eq!(machine.state().image, Some("stage.png".into()));
        assert!(!machine.is_loading());
    }

    #[test]
    fn failed_preload_shows_fallback() {
        let mut machine = machine();
        let request = expect_preload(machine.update(SearchContext::new("vinyl")));

        let outcome = PreloadOutcome {
            image: "general.png".into(),
            phase: LoadPhase::Fallback,
        };
        assert!(machine.resolve(request.token, outcome));
        assert_eq!(
            machine.state(),
            &BackgroundState {
                image: Some("general.png".into()),
                phase: LoadPhase::Fallback,
            }
        );
    }

    #[test]
    fn empty_query_settles_immediately() {
        let mut machine = machine();
        assert_eq!(machine.update(SearchContext::default()), Transition::Settled);
        assert_eq!(
            machine.state(),
            &BackgroundState {
                image: Some("general.png".into()),
                phase: LoadPhase::Loaded,
            }
        );
    }

    #[test]
    fn clear_policy_returns_to_idle() {
        let mut machine = machine().with_policy(EmptyQueryPolicy::Clear);
        let request = expect_preload(machine.update(SearchContext::new("festival")));
        machine.resolve(request.token, loaded("stage.png"));

        assert_eq!(machine.update(SearchContext::default()), Transition::Settled);
        assert_eq!(machine.state(), &BackgroundState::default());
    }

    #[test]
    fn identical_context_is_ignored() {
        let mut machine = machine();
        let context = SearchContext::new("retro").with_mood("happy");
        expect_preload(machine.update(context.clone()));
        assert_eq!(machine.update(context), Transition::Unchanged);
    }

    #[test]
    fn mood_change_reclassifies() {
        let mut machine = machine();
        let first = expect_preload(machine.update(SearchContext::new("chill")));
        assert_eq!(first.category, Category::General);

        let second = expect_preload(machine.update(SearchContext::new("chill").with_mood("live")));
        assert_eq!(second.category, Category::Concert);
        assert!(second.token > first.token);
    }

    #[test]
    fn stale_resolution_is_discarded() {
        let mut machine = machine();
        let a = expect_preload(machine.update(SearchContext::new("concert")));
        let b = expect_preload(machine.update(SearchContext::new("vinyl")));

        assert!(machine.resolve(b.token, loaded("crate.png")));
        assert!(!machine.resolve(a.token, loaded("stage.png")));
        assert_eq!(machine.state().image, Some("crate.png".into()));
        assert_eq!(machine.latest_token(), Some(b.token));
    }

    #[test]
    fn emptied_query_invalidates_in_flight_preload() {
        let mut machine = machine();
        let request = expect_preload(machine.update(SearchContext::new("concert")));
        machine.update(SearchContext::default());

        assert!(!machine.resolve(request.token, loaded("stage.png")));
        assert_eq!(machine.state().image, Some("general.png".into()));
        assert!(!machine.is_loading());
    }

    #[test]
    fn disabling_masks_the_query() {
        let mut machine = machine();
        expect_preload(machine.update(SearchContext::new("concert")));

        assert_eq!(machine.set_enabled(false), Transition::Settled);
        assert!(!machine.is_enabled());
        assert_eq!(machine.state().image, Some("general.png".into()));

        let request = expect_preload(machine.set_enabled(true));
        assert!(machine.is_enabled());
        assert_eq!(request.category, Category::Concert);
    }

    /// Loader whose results are released by the test, one per image.
    #[derive(Default)]
    struct GatedLoader {
        gates: Mutex<HashMap<ImageId, oneshot::Receiver<bool>>>,
    }

    impl GatedLoader {
        fn gate(&self, image: &str) -> oneshot::Sender<bool> {
            let (tx, rx) = oneshot::channel();
            self.gates.lock().unwrap().insert(image.into(), rx);
            tx
        }
    }

    #[async_trait]
    impl ImageLoader for Arc<GatedLoader> {
        async fn load(&self, image: &ImageId) -> Result<()> {
            let gate = self.gates.lock().unwrap().remove(image);
            let Some(rx) = gate else {
                return Err(BackdropError::preload(image.as_str(), "no gate"));
            };
            if rx.await.unwrap_or(false) {
                Ok(())
            } else {
                Err(BackdropError::preload(image.as_str(), "gate closed"))
            }
        }
    }

    fn background(loader: Arc<GatedLoader>) -> ContextBackground<Arc<GatedLoader>> {
        ContextBackground::new(machine(), Preloader::new(loader, pool()))
    }

    #[tokio::test]
    async fn publishes_pending_then_loaded() {
        let loader = Arc::new(GatedLoader::default());
        let release = loader.gate("stage.png");
        let background = background(loader);
        let mut states = background.subscribe();

        let handle = background
            .set_context(SearchContext::new("stage lights"))
            .unwrap()
            .expect("preload should start");
        assert!(background.is_loading());
        states.borrow_and_update();

        release.send(true).unwrap();
        assert!(handle.await.unwrap());
        states.changed().await.unwrap();
        assert_eq!(
            *states.borrow(),
            BackgroundState {
                image: Some("stage.png".into()),
                phase: LoadPhase::Loaded,
            }
        );
    }

    #[tokio::test]
    async fn newer_context_wins_the_race() {
        let loader = Arc::new(GatedLoader::default());
        let release_a = loader.gate("stage.png");
        let release_b = loader.gate("crate.png");
        let background = background(loader);

        let a = background
            .set_context(SearchContext::new("concert"))
            .unwrap()
            .unwrap();
        let b = background
            .set_context(SearchContext::new("vinyl"))
            .unwrap()
            .unwrap();

        release_b.send(true).unwrap();
        assert!(b.await.unwrap());
        release_a.send(true).unwrap();
        assert!(!a.await.unwrap());

        assert_eq!(background.state().image, Some("crate.png".into()));
        assert_eq!(background.state().phase, LoadPhase::Loaded);
    }

    #[tokio::test]
    async fn empty_query_never_reports_pending() {
        let loader = Arc::new(GatedLoader::default());
        let background = background(loader);
        let states = background.subscribe();

        assert!(background.set_context(SearchContext::default()).unwrap().is_none());
        assert_eq!(states.borrow().phase, LoadPhase::Loaded);
        assert_eq!(states.borrow().image, Some("general.png".into()));
    }

    #[tokio::test]
    async fn failed_load_publishes_fallback() {
        let loader = Arc::new(GatedLoader::default());
        let release = loader.gate("crate.png");
        let background = background(loader);

        let handle = background
            .set_context(SearchContext::new("old school"))
            .unwrap()
            .unwrap();
        release.send(false).unwrap();
        assert!(handle.await.unwrap());

        assert_eq!(
            background.state(),
            BackgroundState {
                image: Some("general.png".into()),
                phase: LoadPhase::Fallback,
            }
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn published_state_matches_machine_across_threads() {
        let background = Arc::new(background(Arc::new(GatedLoader::default())));
        let runtime = tokio::runtime::Handle::current();

        let workers: Vec<_> = (0..8)
            .map(|worker| {
                let background = Arc::clone(&background);
                let runtime = runtime.clone();
                std::thread::spawn(move || {
                    let _entered = runtime.enter();
                    let mut preloads = Vec::new();
                    for round in 0..50 {
                        let query = if (worker + round) % 2 == 0 {
                            String::new()
                        } else {
                            format!("live set {worker}-{round}")
                        };
                        if let Some(handle) = background.set_context(SearchContext::new(query)).unwrap() {
                            preloads.push(handle);
                        }
                    }
                    preloads
                })
            })
            .collect();

        for worker in workers {
            for preload in worker.join().unwrap() {
                preload.await.unwrap();
            }
        }

        let expected = background.machine.lock().unwrap().state().clone();
        assert_eq!(background.state(), expected);
    }

    #[test]
    fn card_follows_item_name() {
        let mut card = CardBackground::new(
            Classifier::default(),
            Selector::with_random(pool(), StdRng::seed_from_u64(3)),
        );

        assert_eq!(card.set_name("Live at Wembley"), Some(&"stage.png".into()));
        assert_eq!(card.set_name("Vintage Grooves"), Some(&"crate.png".into()));
        assert_eq!(card.set_name(""), Some(&"crate.png".into()));

        let image = card.set_name("Midnight Drive").cloned().unwrap();
        assert!(pool().images(Category::General).contains(&image));
    }

    #[test]
    fn card_keeps_selection_for_same_name() {
        let mut card = CardBackground::new(
            Classifier::default(),
            Selector::with_random(pool(), StdRng::seed_from_u64(9)),
        );
        let first = card.set_name("Blue Monday").cloned();
        for _ in 0..10 {
            assert_eq!(card.set_name("Blue Monday").cloned(), first);
        }
    }
}
