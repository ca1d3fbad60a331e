//! Automatic extractor installation.
//!
//! Handlers that decode framed objects from bytes cannot consume the HTTP
//! objects already flowing through an HTTP connection. When such a handler is
//! installed after the fact, an [`HttpExtractor`] is placed immediately ahead
//! of it. Installation is idempotent per stage name and, when a termination
//! token is supplied, both stages are removed once the token is cancelled.
//! Removal is tied to the install that scheduled it, so a stage re-added by a
//! later owner survives the earlier owner's cleanup.

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{
    SharedPipeline,
    extractor::HttpExtractor,
    stage::{Handler, HandlerRole, StageKey},
};
use crate::error::PipelineError;

/// Where a new stage is placed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Position {
    /// Ahead of every existing stage.
    First,
    /// After every existing stage.
    Last,
}

/// Install `handler` under `name`, adding an extractor ahead of it if needed.
///
/// A second install under a name that is still live is a no-op returning
/// `Ok(false)`. A stage left behind by an owner that already terminated is
/// replaced. When `termination` is given, the handler and its extractor are
/// removed after the token is cancelled. Returns `true` if an extractor was
/// added.
///
/// # Errors
///
/// Returns [`PipelineError`] if the stage could not be placed; the pipeline
/// is left unchanged.
pub fn install(
    pipeline: &SharedPipeline,
    position: Position,
    name: &str,
    handler: Box<dyn Handler>,
    termination: Option<&CancellationToken>,
) -> Result<bool, PipelineError> {
    let role = handler.role();
    let key = StageKey::named(name);
    let generation = {
        let mut chain = pipeline.lock();
        if chain.evict_stale(&key) {
            debug!(stage = %key, "replacing stage of a terminated owner");
        }
        if chain.contains(&key) {
            debug!(stage = %key, "stage already exists");
            return Ok(false);
        }
        chain.place(position, key.clone(), handler, termination)?
    };
    if let Some(token) = termination {
        schedule_removal(pipeline, key, generation, token);
    }
    Ok(auto_add_extractor(pipeline, name, role, termination))
}

/// Place an extractor ahead of the stage `name` if its `role` requires one.
///
/// Returns `false` without touching the pipeline when the role decodes
/// nothing, a live extractor is already installed, or `name` is missing.
pub fn auto_add_extractor(
    pipeline: &SharedPipeline,
    name: &str,
    role: HandlerRole,
    termination: Option<&CancellationToken>,
) -> bool {
    if !role.needs_extractor() {
        return false;
    }
    let key = StageKey::extractor_for(name);
    let generation = {
        let mut chain = pipeline.lock();
        chain.evict_stale(&key);
        if chain.contains(&key) {
            return false;
        }
        let anchor = StageKey::named(name);
        match chain.place_before(&anchor, key.clone(), Box::new(HttpExtractor), termination) {
            Ok(generation) => generation,
            Err(error) => {
                debug!(stage = %key, %error, "extractor not installed");
                return false;
            }
        }
    };
    debug!(stage = %key, "extractor installed");
    if let Some(token) = termination {
        schedule_removal(pipeline, key, generation, token);
    }
    true
}

fn schedule_removal(pipeline: &SharedPipeline, key: StageKey, generation: u64, token: &CancellationToken) {
    let Ok(runtime) = Handle::try_current() else {
        warn!(stage = %key, "no async runtime; stage will not be removed on termination");
        return;
    };
    let chain = pipeline.clone();
    let token = token.clone();
    pipeline.tasks().spawn_on(
        async move {
            token.cancelled().await;
            // A later install under the same key belongs to another owner.
            if chain.lock().remove_generation(&key, generation) {
                debug!(stage = %key, "stage removed on termination");
            }
        },
        &runtime,
    );
}
