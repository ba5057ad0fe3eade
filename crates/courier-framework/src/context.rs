//! The context handed to every handler and middleware.
//!
//! [`BotContext`] is a cheap handle (`Arc` inside) over everything that lives
//! for the whole lifetime of a bot:
//!
//! - the cancellation token shared with the poller and dispatcher,
//! - the per-chat [`StateMachine`],
//! - the per-chat [`ChatStore`],
//! - the [`Dependencies`] registry.
//!
//! One context is created at startup and cloned into each dispatch. Nothing in
//! it is specific to a single update; the update travels next to it.

use std::fmt;
use std::sync::Arc;

use courier_core::{Dependencies, DependencyResult};
use tokio_util::sync::CancellationToken;

use crate::state::{StateGraph, StateMachine};
use crate::store::ChatStore;

struct ContextInner {
    cancel: CancellationToken,
    states: StateMachine,
    store: ChatStore,
    deps: Arc<Dependencies>,
}

/// Shared, process-wide bot context.
#[derive(Clone)]
pub struct BotContext {
    inner: Arc<ContextInner>,
}

impl Default for BotContext {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl BotContext {
    /// Starts building a context.
    pub fn builder() -> BotContextBuilder {
        BotContextBuilder::default()
    }

    /// Returns the cancellation token of this bot.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.inner.cancel
    }

    /// Returns `true` once shutdown has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Requests shutdown: the poller stops fetching and in-flight handlers
    /// are allowed to finish.
    pub fn stop(&self) {
        self.inner.cancel.cancel();
    }

    /// Returns the conversation state machine.
    pub fn states(&self) -> &StateMachine {
        &self.inner.states
    }

    /// Returns the per-chat key/value store.
    pub fn store(&self) -> &ChatStore {
        &self.inner.store
    }

    /// Returns the dependency registry.
    pub fn deps(&self) -> &Arc<Dependencies> {
        &self.inner.deps
    }

    /// Resolves a dependency by type.
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.inner.deps.resolve::<T>()
    }

    /// Resolves a dependency by type, reporting a missing one as an error.
    pub fn require<T: ?Sized + Send + Sync + 'static>(&self) -> DependencyResult<Arc<T>> {
        self.inner.deps.require::<T>()
    }
}

impl fmt::Debug for BotContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotContext")
            .field("cancelled", &self.is_cancelled())
            .field("states", &self.inner.states)
            .field("deps", &self.inner.deps)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`BotContext`].
#[derive(Default)]
pub struct BotContextBuilder {
    cancel: Option<CancellationToken>,
    graph: Option<StateGraph>,
    deps: Option<Arc<Dependencies>>,
}

impl BotContextBuilder {
    /// Uses an existing cancellation token instead of a fresh one.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Sets the conversation state graph.
    pub fn states(mut self, graph: StateGraph) -> Self {
        self.graph = Some(graph);
        self
    }

    /// Shares an existing dependency registry.
    pub fn deps(mut self, deps: Arc<Dependencies>) -> Self {
        self.deps = Some(deps);
        self
    }

    /// Builds the context.
    pub fn build(self) -> BotContext {
        BotContext {
            inner: Arc::new(ContextInner {
                cancel: self.cancel.unwrap_or_default(),
                states: StateMachine::new(self.graph.unwrap_or_default()),
                store: ChatStore::new(),
                deps: self.deps.unwrap_or_default(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_cancels_shared_token() {
        let token = CancellationToken::new();
        let ctx = BotContext::builder().cancellation(token.clone()).build();
        let clone = ctx.clone();

        assert!(!ctx.is_cancelled());
        clone.stop();
        assert!(ctx.is_cancelled());
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_shared_dependencies() {
        let deps = Arc::new(Dependencies::new());
        deps.provide(String::from("db://memory"));

        let ctx = BotContext::builder().deps(deps.clone()).build();
        assert_eq!(ctx.resolve::<String>().as_deref().map(String::as_str), Some("db://memory"));
        assert!(ctx.require::<u64>().is_err());
    }
}
