//! Bot orchestration.
//!
//! A [`Bot`] owns everything one long-polling bot needs: the update source,
//! the router, the shared [`BotContext`] and the runtime configuration.
//! [`Bot::run`] starts the poller and feeds its stream into a
//! [`Dispatcher`] until the context's cancellation token fires.
//!
//! ```rust,ignore
//! let bot = Bot::builder(source)
//!     .router(Router::new().command("start", start).handle_states())
//!     .states(StateGraph::new("start").state("start", greet))
//!     .provide(Database::connect(url).await?)
//!     .build();
//!
//! bot.run_until_signal().await?;
//! ```

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use courier_core::{BoxedSource, Dependencies, Update, UpdateSource};
use courier_framework::{BotContext, Router, StateGraph};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{CourierConfig, DispatchConfig, PollerConfig};
use crate::dispatcher::Dispatcher;
use crate::error::{RuntimeError, RuntimeResult};
use crate::poller::Poller;

/// A long-polling bot.
pub struct Bot {
    source: BoxedSource,
    router: Router,
    ctx: BotContext,
    config: CourierConfig,
    running: AtomicBool,
}

impl Bot {
    /// Starts building a bot that reads updates from `source`.
    pub fn builder(source: impl UpdateSource + 'static) -> BotBuilder {
        BotBuilder::new(Arc::new(source))
    }

    /// Returns the context shared with every handler.
    pub fn context(&self) -> &BotContext {
        &self.ctx
    }

    /// Returns the router.
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Returns the runtime configuration.
    pub fn config(&self) -> &CourierConfig {
        &self.config
    }

    /// Returns `true` while [`run`](Self::run) is executing.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Processes one update inline, bypassing the poller.
    pub async fn handle(&self, update: Update) {
        self.router.process(&self.ctx, Arc::new(update)).await;
    }

    /// Requests shutdown.
    ///
    /// The poller stops fetching, handlers already started run to completion
    /// and [`run`](Self::run) returns afterwards.
    pub fn stop(&self) {
        info!("Stopping bot");
        self.ctx.stop();
    }

    /// Polls and dispatches updates until the bot is stopped.
    pub async fn run(&self) -> RuntimeResult<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(RuntimeError::AlreadyRunning);
        }
        let _running = RunningGuard(&self.running);

        info!(
            workers = self.config.dispatch.workers,
            timeout_secs = self.config.poller.timeout_secs,
            "Bot started"
        );

        let updates = Poller::new(
            Arc::clone(&self.source),
            self.config.poller.clone(),
            self.ctx.cancellation().clone(),
        )
        .start();
        let offset = updates.offset_handle();

        Dispatcher::new(
            self.router.clone(),
            self.ctx.clone(),
            self.config.dispatch.clone(),
        )
        .run(updates)
        .await;

        info!(offset = offset.get(), "Bot stopped");
        Ok(())
    }

    /// Runs until `shutdown` completes, then stops and waits for in-flight
    /// handlers.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        let mut run = std::pin::pin!(self.run());
        tokio::select! {
            result = &mut run => return result,
            () = shutdown => self.stop(),
        }
        run.await
    }

    /// Runs until Ctrl+C or SIGTERM.
    pub async fn run_until_signal(&self) -> RuntimeResult<()> {
        let shutdown = shutdown_signal()?;
        info!("Bot is running. Press Ctrl+C to stop.");
        self.run_until(shutdown).await
    }
}

impl std::fmt::Debug for Bot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bot")
            .field("routes", &self.router.routes().len())
            .field("config", &self.config)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Registers the signal handlers and returns a future completing on the
/// first shutdown signal.
fn shutdown_signal() -> RuntimeResult<impl Future<Output = ()>> {
    #[cfg(unix)]
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .map_err(RuntimeError::Signal)?;

    Ok(async move {
        let ctrl_c = async {
            match signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl+C, shutting down"),
                Err(e) => {
                    warn!(error = %e, "Failed to listen for Ctrl+C");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(unix)]
        tokio::select! {
            () = ctrl_c => {}
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
        }

        #[cfg(not(unix))]
        ctrl_c.await;
    })
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`Bot`].
pub struct BotBuilder {
    source: BoxedSource,
    router: Router,
    graph: Option<StateGraph>,
    deps: Arc<Dependencies>,
    config: CourierConfig,
    cancel: Option<CancellationToken>,
}

impl BotBuilder {
    fn new(source: BoxedSource) -> Self {
        Self {
            source,
            router: Router::new(),
            graph: None,
            deps: Arc::new(Dependencies::new()),
            config: CourierConfig::default(),
            cancel: None,
        }
    }

    /// Sets the router.
    pub fn router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    /// Sets the conversation state graph.
    pub fn states(mut self, graph: StateGraph) -> Self {
        self.graph = Some(graph);
        self
    }

    /// Shares an existing dependency registry.
    pub fn deps(mut self, deps: Arc<Dependencies>) -> Self {
        self.deps = deps;
        self
    }

    /// Provides a dependency handlers can resolve by type.
    pub fn provide<T: Send + Sync + 'static>(self, instance: T) -> Self {
        self.deps.provide(instance);
        self
    }

    /// Provides an already shared dependency, possibly a trait object.
    pub fn provide_arc<T: ?Sized + Send + Sync + 'static>(self, instance: Arc<T>) -> Self {
        self.deps.provide_arc(instance);
        self
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: CourierConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the poller configuration.
    pub fn poller(mut self, config: PollerConfig) -> Self {
        self.config.poller = config;
        self
    }

    /// Replaces the dispatch configuration.
    pub fn dispatch(mut self, config: DispatchConfig) -> Self {
        self.config.dispatch = config;
        self
    }

    /// Uses an existing cancellation token, e.g. one shared with other
    /// services of the process.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Builds the bot.
    pub fn build(self) -> Bot {
        let mut ctx = BotContext::builder().deps(self.deps);
        if let Some(graph) = self.graph {
            ctx = ctx.states(graph);
        }
        if let Some(token) = self.cancel {
            ctx = ctx.cancellation(token);
        }

        Bot {
            source: self.source,
            router: self.router,
            ctx: ctx.build(),
            config: self.config,
            running: AtomicBool::new(false),
        }
    }
}
