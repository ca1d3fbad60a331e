//! Ordered processing chain attached to a connection.
//!
//! A [`Pipeline`] is a list of stages, each identified by a [`StageKey`] and
//! tagged with the [`HandlerRole`] of its handler. Inbound messages travel
//! from the first stage to the last. Stages may be added and removed while the
//! connection is live; [`install`] additionally places an [`HttpExtractor`]
//! ahead of handlers that decode framed objects from raw bytes.

mod extractor;
mod instrument;
mod stage;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::{sync::CancellationToken, task::TaskTracker};

pub use self::{
    extractor::HttpExtractor,
    instrument::{Position, auto_add_extractor, install},
    stage::{Forward, Handler, HandlerRole, PipelineMessage, StageKey},
};
use crate::error::PipelineError;

struct Stage {
    key: StageKey,
    role: HandlerRole,
    handler: Box<dyn Handler>,
    // Distinguishes successive installs under the same key.
    generation: u64,
    owner: Option<CancellationToken>,
}

impl Stage {
    fn is_stale(&self) -> bool { self.owner.as_ref().is_some_and(CancellationToken::is_cancelled) }
}

/// Ordered list of named stages.
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Stage>,
    next_generation: u64,
}

impl Pipeline {
    /// Create an empty pipeline.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Number of installed stages.
    #[must_use]
    pub fn len(&self) -> usize { self.stages.len() }

    /// Returns `true` if no stage is installed.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.stages.is_empty() }

    /// Keys of all stages in inbound order.
    #[must_use]
    pub fn keys(&self) -> Vec<StageKey> { self.stages.iter().map(|s| s.key.clone()).collect() }

    /// Returns `true` if a stage with `key` is installed.
    #[must_use]
    pub fn contains(&self, key: &StageKey) -> bool { self.position(key).is_some() }

    /// Returns `true` if any stage has the given role.
    #[must_use]
    pub fn contains_role(&self, role: HandlerRole) -> bool {
        self.stages.iter().any(|s| s.role == role)
    }

    /// Number of stages with the given role.
    #[must_use]
    pub fn count_role(&self, role: HandlerRole) -> usize {
        self.stages.iter().filter(|s| s.role == role).count()
    }

    fn position(&self, key: &StageKey) -> Option<usize> {
        self.stages.iter().position(|s| &s.key == key)
    }

    fn insert_at(
        &mut self,
        index: usize,
        key: StageKey,
        handler: Box<dyn Handler>,
        owner: Option<&CancellationToken>,
    ) -> Result<u64, PipelineError> {
        if self.contains(&key) {
            return Err(PipelineError::DuplicateName(key.to_string()));
        }
        self.next_generation += 1;
        let generation = self.next_generation;
        let stage = Stage {
            key,
            role: handler.role(),
            handler,
            generation,
            owner: owner.cloned(),
        };
        self.stages.insert(index, stage);
        Ok(generation)
    }

    /// Install `handler` at `position` on behalf of `owner`, returning the
    /// generation that identifies this install.
    pub(crate) fn place(
        &mut self,
        position: Position,
        key: StageKey,
        handler: Box<dyn Handler>,
        owner: Option<&CancellationToken>,
    ) -> Result<u64, PipelineError> {
        let index = match position {
            Position::First => 0,
            Position::Last => self.stages.len(),
        };
        self.insert_at(index, key, handler, owner)
    }

    /// Install `handler` before `anchor` on behalf of `owner`.
    pub(crate) fn place_before(
        &mut self,
        anchor: &StageKey,
        key: StageKey,
        handler: Box<dyn Handler>,
        owner: Option<&CancellationToken>,
    ) -> Result<u64, PipelineError> {
        let index = self
            .position(anchor)
            .ok_or_else(|| PipelineError::NoSuchStage(anchor.to_string()))?;
        self.insert_at(index, key, handler, owner)
    }

    /// Remove the stage at `key` if its owner already terminated.
    pub(crate) fn evict_stale(&mut self, key: &StageKey) -> bool {
        match self.position(key) {
            Some(index) if self.stages[index].is_stale() => {
                self.stages.remove(index);
                true
            }
            _ => false,
        }
    }

    /// Remove the stage at `key` only if it is still the install `generation`.
    pub(crate) fn remove_generation(&mut self, key: &StageKey, generation: u64) -> bool {
        let Some(index) = self.position(key) else { return false };
        if self.stages[index].generation != generation {
            return false;
        }
        self.stages.remove(index);
        true
    }

    /// Install `handler` as the first stage.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DuplicateName`] if `key` is already installed.
    pub fn add_first(&mut self, key: StageKey, handler: Box<dyn Handler>) -> Result<(), PipelineError> {
        self.place(Position::First, key, handler, None).map(drop)
    }

    /// Install `handler` as the last stage.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DuplicateName`] if `key` is already installed.
    pub fn add_last(&mut self, key: StageKey, handler: Box<dyn Handler>) -> Result<(), PipelineError> {
        self.place(Position::Last, key, handler, None).map(drop)
    }

    /// Install `handler` immediately before the stage named `anchor`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NoSuchStage`] if `anchor` is missing, or
    /// [`PipelineError::DuplicateName`] if `key` is already installed.
    pub fn add_before(
        &mut self,
        anchor: &StageKey,
        key: StageKey,
        handler: Box<dyn Handler>,
    ) -> Result<(), PipelineError> {
        self.place_before(anchor, key, handler, None).map(drop)
    }

    /// Remove the stage named `key`, returning its handler.
    pub fn remove(&mut self, key: &StageKey) -> Option<Box<dyn Handler>> {
        let index = self.position(key)?;
        Some(self.stages.remove(index).handler)
    }

    /// Pass `message` through every stage and collect what leaves the last.
    pub fn fire_read(&mut self, message: PipelineMessage) -> Vec<PipelineMessage> {
        let mut messages = vec![message];
        for stage in &mut self.stages {
            let mut next = Forward::default();
            for message in messages {
                stage.handler.read(message, &mut next);
            }
            messages = next.into_messages();
        }
        messages
    }
}

/// Pipeline shared between a connection and the exchanges borrowing it.
///
/// Removal tasks scheduled by [`install`] are tracked so callers can wait
/// for them to settle.
#[derive(Clone)]
pub struct SharedPipeline {
    inner: Arc<Mutex<Pipeline>>,
    tasks: TaskTracker,
}

impl SharedPipeline {
    /// Wrap an empty pipeline.
    #[must_use]
    pub fn new() -> Self { Self::from(Pipeline::new()) }

    /// Lock the pipeline for inspection or mutation.
    ///
    /// Stages are plain data, so a panic while the lock was held leaves
    /// nothing half-updated and the poison flag is ignored.
    pub fn lock(&self) -> MutexGuard<'_, Pipeline> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Tracker for stage-removal tasks bound to connection termination.
    #[must_use]
    pub fn tasks(&self) -> &TaskTracker { &self.tasks }
}

impl Default for SharedPipeline {
    fn default() -> Self { Self::new() }
}

impl From<Pipeline> for SharedPipeline {
    fn from(pipeline: Pipeline) -> Self {
        Self {
            inner: Arc::new(Mutex::new(pipeline)),
            tasks: TaskTracker::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{message::HttpObject, payload::Payload};

    struct Tagger(&'static str);

    impl Handler for Tagger {
        fn read(&mut self, message: PipelineMessage, out: &mut Forward) {
            if let PipelineMessage::Bytes(payload) = message {
                let mut bytes = payload.into_bytes().to_vec();
                bytes.extend_from_slice(self.0.as_bytes());
                out.push(PipelineMessage::Bytes(Payload::new(bytes)));
            } else {
                out.push(message);
            }
        }
    }

    #[test]
    fn stages_run_in_order() {
        let mut pipeline = Pipeline::new();
        pipeline
            .add_last(StageKey::named("a"), Box::new(Tagger("a")))
            .expect("add a");
        pipeline
            .add_last(StageKey::named("b"), Box::new(Tagger("b")))
            .expect("add b");
        pipeline
            .add_first(StageKey::named("c"), Box::new(Tagger("c")))
            .expect("add c");

        let out = pipeline.fire_read(PipelineMessage::Bytes(Payload::from("x")));
        assert!(matches!(
            out.as_slice(),
            [PipelineMessage::Bytes(p)] if p.as_slice() == b"xcab"
        ));
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let mut pipeline = Pipeline::new();
        pipeline
            .add_last(StageKey::named("a"), Box::new(Tagger("a")))
            .expect("add a");
        let err = pipeline
            .add_first(StageKey::named("a"), Box::new(Tagger("a")))
            .expect_err("duplicate");
        assert_eq!(err, PipelineError::DuplicateName("a".into()));
    }

    #[test]
    fn stale_generation_leaves_reinstalled_stage() {
        let mut pipeline = Pipeline::new();
        let owner = CancellationToken::new();
        let first = pipeline
            .place(Position::Last, StageKey::named("a"), Box::new(Tagger("a")), Some(&owner))
            .expect("first install");
        assert!(!pipeline.evict_stale(&StageKey::named("a")));

        owner.cancel();
        assert!(pipeline.evict_stale(&StageKey::named("a")));
        let second = pipeline
            .place(Position::Last, StageKey::named("a"), Box::new(Tagger("a")), None)
            .expect("second install");

        assert!(!pipeline.remove_generation(&StageKey::named("a"), first));
        assert!(pipeline.contains(&StageKey::named("a")));
        assert!(pipeline.remove_generation(&StageKey::named("a"), second));
        assert!(pipeline.is_empty());
    }

    #[test]
    fn add_before_requires_anchor() {
        let mut pipeline = Pipeline::new();
        let err = pipeline
            .add_before(&StageKey::named("missing"), StageKey::named("a"), Box::new(Tagger("a")))
            .expect_err("anchor missing");
        assert_eq!(err, PipelineError::NoSuchStage("missing".into()));
    }

    #[test]
    fn removed_stage_no_longer_runs() {
        let mut pipeline = Pipeline::new();
        pipeline
            .add_last(StageKey::named("a"), Box::new(Tagger("a")))
            .expect("add a");
        assert!(pipeline.remove(&StageKey::named("a")).is_some());
        assert!(pipeline.remove(&StageKey::named("a")).is_none());
        let out = pipeline.fire_read(PipelineMessage::Http(HttpObject::empty_last()));
        assert!(matches!(out.as_slice(), [PipelineMessage::Http(HttpObject::LastContent(_))]));
    }
}
