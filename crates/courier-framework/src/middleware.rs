//! Tower-based middleware for the router.
//!
//! Every stage of dispatch is a [`BoxedService`] taking a [`Request`]. A
//! [`Middleware`] turns one service into another, so it can run code before
//! and after the wrapped stage, skip it, or replace it entirely.
//!
//! Middleware can be written as an async closure with [`Middleware::from_fn`]:
//!
//! ```rust,ignore
//! let timing = Middleware::from_fn(|req: Request, next: Next| async move {
//!     let start = Instant::now();
//!     let result = next.run(req).await;
//!     tracing::info!(elapsed_ms = start.elapsed().as_millis() as u64, "done");
//!     result
//! });
//! ```
//!
//! or taken from the tower ecosystem with [`Middleware::layer`]:
//!
//! ```rust,ignore
//! let limited = Middleware::layer(ConcurrencyLimitLayer::new(8));
//! ```

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use courier_core::Update;
use tower::filter::{FilterLayer, Predicate};
use tower::util::BoxCloneSyncService;
use tower::{BoxError, Service, ServiceExt, service_fn};
use tower_layer::Layer;
use tracing::{debug, info, trace, warn};

use crate::context::BotContext;
use crate::error::UpdateSkipped;

// ============================================================================
// Request and service types
// ============================================================================

/// What flows through the middleware stack: the context and the update.
#[derive(Debug, Clone)]
pub struct Request {
    /// The bot context.
    pub ctx: BotContext,
    /// The update being dispatched.
    pub update: Arc<Update>,
}

impl Request {
    /// Creates a request.
    pub fn new(ctx: BotContext, update: Arc<Update>) -> Self {
        Self { ctx, update }
    }
}

/// A type-erased, `Clone + Send + Sync` dispatch stage.
pub type BoxedService = BoxCloneSyncService<Request, (), BoxError>;

/// Erases a service into a [`BoxedService`].
pub fn boxed<S>(service: S) -> BoxedService
where
    S: Service<Request, Response = (), Error = BoxError> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
{
    BoxCloneSyncService::new(service)
}

/// The rest of the chain, handed to [`Middleware::from_fn`] closures.
pub struct Next {
    inner: BoxedService,
}

impl Next {
    /// Runs the wrapped stage.
    pub async fn run(self, req: Request) -> Result<(), BoxError> {
        self.inner.oneshot(req).await
    }
}

// ============================================================================
// Middleware
// ============================================================================

type WrapFn = dyn Fn(BoxedService) -> BoxedService + Send + Sync;

/// A service decorator.
#[derive(Clone)]
pub struct Middleware(Arc<WrapFn>);

impl Middleware {
    /// Creates middleware from a function that wraps a service.
    pub fn new<F>(wrap: F) -> Self
    where
        F: Fn(BoxedService) -> BoxedService + Send + Sync + 'static,
    {
        Self(Arc::new(wrap))
    }

    /// Creates middleware from an async `(Request, Next)` closure.
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(Request, Next) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        Self::new(move |inner: BoxedService| {
            let f = f.clone();
            boxed(service_fn(move |req: Request| {
                let next = Next {
                    inner: inner.clone(),
                };
                f(req, next)
            }))
        })
    }

    /// Creates middleware from a tower [`Layer`].
    pub fn layer<L>(layer: L) -> Self
    where
        L: Layer<BoxedService> + Send + Sync + 'static,
        L::Service: Service<Request, Response = (), Error = BoxError> + Clone + Send + Sync + 'static,
        <L::Service as Service<Request>>::Future: Send + 'static,
    {
        Self::new(move |inner| boxed(layer.layer(inner)))
    }

    /// Creates middleware that only lets updates through when `predicate`
    /// holds. Dropped updates end with [`UpdateSkipped`].
    pub fn filter<P>(predicate: P) -> Self
    where
        P: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        Self::layer(FilterLayer::new(RequestPredicate(Arc::new(predicate))))
    }

    /// Wraps `service` with this middleware.
    pub fn apply(&self, service: BoxedService) -> BoxedService {
        (self.0)(service)
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Middleware").finish_non_exhaustive()
    }
}

/// Wraps `service` with `middleware` so that the first entry is outermost.
pub(crate) fn wrap_all(middleware: &[Middleware], service: BoxedService) -> BoxedService {
    middleware.iter().rev().fold(service, |svc, m| m.apply(svc))
}

// ============================================================================
// RequestPredicate
// ============================================================================

/// A [`Predicate`] over requests rejecting with [`UpdateSkipped`].
#[derive(Clone)]
struct RequestPredicate(Arc<dyn Fn(&Request) -> bool + Send + Sync>);

impl Predicate<Request> for RequestPredicate {
    type Request = Request;

    fn check(&mut self, request: Request) -> Result<Request, BoxError> {
        if (self.0)(&request) {
            Ok(request)
        } else {
            Err(Box::new(UpdateSkipped))
        }
    }
}

// ============================================================================
// Built-in middleware
// ============================================================================

/// Logs every update passing through, with its outcome and duration.
pub fn logging() -> Middleware {
    Middleware::from_fn(|req: Request, next: Next| async move {
        let update_id = req.update.update_id;
        let kind = req.update.kind_name();
        let chat_id = req.update.chat_id();
        let start = Instant::now();
        debug!(update_id, kind, ?chat_id, "Update received");

        let result = next.run(req).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(()) => info!(update_id, kind, ?chat_id, elapsed_ms, "Update handled"),
            Err(e) if e.is::<UpdateSkipped>() => {
                trace!(update_id, kind, ?chat_id, "Update skipped")
            }
            Err(e) => warn!(update_id, kind, ?chat_id, elapsed_ms, error = %e, "Update failed"),
        }
        result
    })
}

/// Drops updates that do not belong to one of `chat_ids`.
///
/// Updates without a chat are dropped as well.
pub fn allow_chats(chat_ids: impl IntoIterator<Item = i64>) -> Middleware {
    let allowed: HashSet<i64> = chat_ids.into_iter().collect();
    Middleware::filter(move |req| {
        req.update
            .chat_id()
            .is_some_and(|chat_id| allowed.contains(&chat_id))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::{Message, UpdateKind};
    use parking_lot::Mutex;

    fn request(chat_id: i64) -> Request {
        Request::new(
            BotContext::default(),
            Arc::new(Update::new(
                1,
                UpdateKind::Message(Message::text_message(1, chat_id, "hi")),
            )),
        )
    }

    fn recording(log: Arc<Mutex<Vec<String>>>, name: &'static str) -> BoxedService {
        boxed(service_fn(move |_req: Request| {
            let log = log.clone();
            async move {
                log.lock().push(name.to_string());
                Ok::<_, BoxError>(())
            }
        }))
    }

    fn tag(log: Arc<Mutex<Vec<String>>>, name: &'static str) -> Middleware {
        Middleware::from_fn(move |req: Request, next: Next| {
            let log = log.clone();
            async move {
                log.lock().push(format!("{name}-enter"));
                let result = next.run(req).await;
                log.lock().push(format!("{name}-exit"));
                result
            }
        })
    }

    #[tokio::test]
    async fn test_wrap_all_first_is_outermost() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let svc = wrap_all(
            &[tag(log.clone(), "A"), tag(log.clone(), "B")],
            recording(log.clone(), "H"),
        );

        svc.oneshot(request(1)).await.unwrap();
        assert_eq!(
            *log.lock(),
            vec!["A-enter", "B-enter", "H", "B-exit", "A-exit"]
        );
    }

    #[tokio::test]
    async fn test_middleware_can_short_circuit() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let block =
            Middleware::from_fn(|_req: Request, _next: Next| async { Ok::<_, BoxError>(()) });
        let svc = block.apply(recording(log.clone(), "H"));

        svc.oneshot(request(1)).await.unwrap();
        assert!(log.lock().is_empty());
    }

    #[tokio::test]
    async fn test_allow_chats() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let svc = allow_chats([7]).apply(recording(log.clone(), "H"));

        svc.clone().oneshot(request(7)).await.unwrap();
        let err = svc.oneshot(request(8)).await.unwrap_err();

        assert!(err.is::<UpdateSkipped>());
        assert_eq!(*log.lock(), vec!["H"]);
    }

    #[tokio::test]
    async fn test_tower_layer_middleware() {
        let rewrite = Middleware::layer(tower::util::MapRequestLayer::new(|mut req: Request| {
            req.update = Arc::new(Update::new(99, req.update.kind.clone()));
            req
        }));
        let seen = Arc::new(Mutex::new(None));
        let s = seen.clone();
        let inner = boxed(service_fn(move |req: Request| {
            let s = s.clone();
            async move {
                *s.lock() = Some(req.update.update_id);
                Ok::<_, BoxError>(())
            }
        }));

        rewrite.apply(inner).oneshot(request(1)).await.unwrap();
        assert_eq!(*seen.lock(), Some(99));
    }
}
