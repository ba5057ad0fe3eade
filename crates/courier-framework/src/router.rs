//! The update router.
//!
//! A [`Router`] holds routes (a matching rule plus a handler), per-match
//! middleware and global middleware. [`Router::process`] runs one update
//! through them:
//!
//! ```text
//! global middleware (first registered outermost)
//! └── match routes in registration order
//!     ├── nothing matched: no-op
//!     └── per-match middleware (first registered outermost)
//!         └── every matching handler, in order; failures do not stop the chain
//! ```
//!
//! Global middleware therefore sees every update, matched or not; per-match
//! middleware only runs when at least one route matched.
//!
//! # Example
//!
//! ```rust,ignore
//! let router = Router::new()
//!     .use_global(middleware::logging())
//!     .command("start", start)
//!     .text_contains("hello", greet)
//!     .callback_prefix("vote:", vote)
//!     .on_error(|update, err| tracing::error!(update_id = update.update_id, error = %err));
//! ```

use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};

use courier_core::Update;
use tower::{BoxError, Service, ServiceExt, service_fn};
use tracing::{Instrument, Level, debug, span, trace};

use crate::context::BotContext;
use crate::error::UpdateSkipped;
use crate::handler::{BoxedHandler, Handler, into_handler};
use crate::middleware::{BoxedService, Middleware, Request, boxed, wrap_all};
use crate::route::{Route, RouteKind};
use crate::state::state_handler;

/// Observer for handler failures.
pub type ErrorHook = Arc<dyn Fn(&Update, &BoxError) + Send + Sync>;

#[derive(Clone, Default)]
struct RouterInner {
    routes: Vec<Route>,
    middleware: Vec<Middleware>,
    global: Vec<Middleware>,
    error_hook: Option<ErrorHook>,
}

/// Routes updates to handlers.
///
/// # Cheap Cloning
///
/// `Router` keeps its tables behind an `Arc`; clones share them until one is
/// modified. The middleware stack is built on first dispatch and shared by
/// clones as well.
#[derive(Clone, Default)]
pub struct Router {
    inner: Arc<RouterInner>,
    stack: Arc<OnceLock<BoxedService>>,
}

impl Router {
    /// Creates an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    fn inner_mut(&mut self) -> &mut RouterInner {
        self.stack = Arc::default();
        Arc::make_mut(&mut self.inner)
    }

    fn route<H: Handler>(mut self, kind: RouteKind, pattern: &str, handler: H) -> Self {
        self.inner_mut()
            .routes
            .push(Route::new(kind, pattern, into_handler(handler)));
        self
    }

    // ------------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------------

    /// Runs `handler` for the `/command` message. `/Start@MyBot`, `/start`
    /// and `start` all register the same command.
    pub fn command<H: Handler>(self, command: &str, handler: H) -> Self {
        self.route(RouteKind::Command, command, handler)
    }

    /// Runs `handler` for messages containing `text`, case-insensitively.
    pub fn text_contains<H: Handler>(self, text: &str, handler: H) -> Self {
        self.route(RouteKind::TextContains, text, handler)
    }

    /// Runs `handler` for callback queries whose data starts with `prefix`.
    pub fn callback_prefix<H: Handler>(self, prefix: &str, handler: H) -> Self {
        self.route(RouteKind::CallbackPrefix, prefix, handler)
    }

    /// Runs `handler` for every new incoming message.
    pub fn handle_message<H: Handler>(self, handler: H) -> Self {
        self.route(RouteKind::Message, "", handler)
    }

    /// Runs `handler` for every update.
    pub fn handle_any<H: Handler>(self, handler: H) -> Self {
        self.route(RouteKind::Any, "", handler)
    }

    /// Feeds every new incoming message to the context's state machine.
    pub fn handle_states(self) -> Self {
        self.handle_message(state_handler())
    }

    /// Adds a prebuilt route.
    pub fn add_route(mut self, route: Route) -> Self {
        self.inner_mut().routes.push(route);
        self
    }

    /// Adds middleware around the matched handlers.
    pub fn use_middleware(mut self, middleware: Middleware) -> Self {
        self.inner_mut().middleware.push(middleware);
        self
    }

    /// Adds middleware around the whole dispatch, including matching.
    pub fn use_global(mut self, middleware: Middleware) -> Self {
        self.inner_mut().global.push(middleware);
        self
    }

    /// Sets the observer called with every handler failure.
    ///
    /// Without one, failures are logged at `debug` level.
    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Update, &BoxError) + Send + Sync + 'static,
    {
        self.inner_mut().error_hook = Some(Arc::new(hook));
        self
    }

    /// Appends the routes and middleware of `other`.
    ///
    /// `other`'s error hook is used only if this router has none.
    pub fn merge(mut self, other: Router) -> Self {
        let other = Arc::unwrap_or_clone(other.inner);
        let inner = self.inner_mut();
        inner.routes.extend(other.routes);
        inner.middleware.extend(other.middleware);
        inner.global.extend(other.global);
        if inner.error_hook.is_none() {
            inner.error_hook = other.error_hook;
        }
        self
    }

    /// Applies a registration function, for grouping routes in modules.
    pub fn configure<F>(self, f: F) -> Self
    where
        F: FnOnce(Router) -> Router,
    {
        f(self)
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    /// Returns the registered routes.
    pub fn routes(&self) -> &[Route] {
        &self.inner.routes
    }

    /// Returns the handlers whose routes match `update`, in registration order.
    pub fn matching(&self, update: &Update) -> Vec<BoxedHandler> {
        self.inner
            .matching(update)
            .map(|route| Arc::clone(route.handler()))
            .collect()
    }

    // ------------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------------

    /// Returns the full dispatch service: global middleware around matching.
    ///
    /// The stack is built once per set of routes; later calls clone it.
    pub fn service(&self) -> BoxedService {
        self.stack
            .get_or_init(|| build_stack(Arc::clone(&self.inner)))
            .clone()
    }

    /// Runs one update through the router.
    ///
    /// Every matching handler runs once. Errors from handlers and middleware
    /// never reach the caller.
    pub async fn process(&self, ctx: &BotContext, update: Arc<Update>) {
        let span = span!(
            Level::DEBUG,
            "process",
            update_id = update.update_id,
            kind = update.kind_name()
        );

        async move {
            let update_id = update.update_id;
            let req = Request::new(ctx.clone(), update);
            match self.service().oneshot(req).await {
                Ok(()) => {}
                Err(e) if e.is::<UpdateSkipped>() => trace!(update_id, "Update skipped"),
                Err(e) => debug!(update_id, error = %e, "Middleware failed"),
            }
        }
        .instrument(span)
        .await
    }
}

impl RouterInner {
    fn matching<'a>(&'a self, update: &'a Update) -> impl Iterator<Item = &'a Route> + 'a {
        self.routes.iter().filter(move |route| route.matches(update))
    }

    async fn run_handlers(&self, req: Request) {
        for (index, route) in self.matching(&req.update).enumerate() {
            trace!(handler_index = index, "Executing handler");
            let result = route
                .handler()
                .call(req.ctx.clone(), Arc::clone(&req.update))
                .await;
            if let Err(e) = result {
                match &self.error_hook {
                    Some(hook) => hook(&req.update, &e),
                    None => debug!(
                        update_id = req.update.update_id,
                        handler_index = index,
                        error = %e,
                        "Handler failed"
                    ),
                }
            }
        }
    }
}

/// Builds `global( match? per-match( handlers ) )`.
fn build_stack(inner: Arc<RouterInner>) -> BoxedService {
    let chain = {
        let inner = Arc::clone(&inner);
        boxed(service_fn(move |req: Request| {
            let inner = Arc::clone(&inner);
            async move {
                inner.run_handlers(req).await;
                Ok::<_, BoxError>(())
            }
        }))
    };
    let matched = wrap_all(&inner.middleware, chain);

    let dispatch = {
        let inner = Arc::clone(&inner);
        boxed(service_fn(move |req: Request| {
            let inner = Arc::clone(&inner);
            let matched = matched.clone();
            async move {
                let handler_count = inner.matching(&req.update).count();
                if handler_count == 0 {
                    trace!(update_id = req.update.update_id, "No route matched");
                    return Ok(());
                }
                debug!(update_id = req.update.update_id, handler_count, "Routes matched");
                matched.oneshot(req).await
            }
        }))
    };

    wrap_all(&inner.global, dispatch)
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.inner.routes)
            .field("middleware", &self.inner.middleware.len())
            .field("global", &self.inner.global.len())
            .field("error_hook", &self.inner.error_hook.is_some())
            .finish()
    }
}

// ============================================================================
// Tower Service Implementation for Router
// ============================================================================

/// A router is itself a service that never fails, so it can be stacked
/// under further tower layers.
impl Service<Request> for Router {
    type Response = ();
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<(), Infallible>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let router = self.clone();
        Box::pin(async move {
            router.process(&req.ctx, req.update).await;
            Ok(())
        })
    }
}
