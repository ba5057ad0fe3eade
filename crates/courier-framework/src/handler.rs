//! Handler system for the Courier framework.
//!
//! A handler is any async function taking the [`BotContext`] and the shared
//! [`Update`]:
//!
//! ```rust,ignore
//! async fn start(ctx: BotContext, update: Arc<Update>) -> Result<(), BoxError> {
//!     if let Some(chat_id) = update.chat_id() {
//!         ctx.states().set_state(chat_id, "ask_name")?;
//!     }
//!     Ok(())
//! }
//!
//! let router = Router::new().command("start", start);
//! ```
//!
//! Handlers may return `()` or any `Result<(), E>` whose error converts into
//! [`BoxError`]; see [`IntoHandlerResult`].

use std::future::Future;
use std::sync::Arc;

use courier_core::Update;
use futures::future::BoxFuture;
use tower::BoxError;

use crate::context::BotContext;

/// Result every handler is reduced to.
pub type HandlerResult = Result<(), BoxError>;

// ============================================================================
// IntoHandlerResult - Normalize handler return values
// ============================================================================

/// Types a handler may return.
pub trait IntoHandlerResult: Send {
    /// Converts the return value into a [`HandlerResult`].
    fn into_handler_result(self) -> HandlerResult;
}

impl IntoHandlerResult for () {
    fn into_handler_result(self) -> HandlerResult {
        Ok(())
    }
}

impl<E> IntoHandlerResult for Result<(), E>
where
    E: Into<BoxError> + Send,
{
    fn into_handler_result(self) -> HandlerResult {
        self.map_err(Into::into)
    }
}

// ============================================================================
// Handler Trait
// ============================================================================

/// The core trait for update handlers.
///
/// Implemented for every `Fn(BotContext, Arc<Update>) -> impl Future` whose
/// output implements [`IntoHandlerResult`]. Closures need their argument
/// types spelled out:
///
/// ```rust,ignore
/// router.handle_any(|_ctx: BotContext, update: Arc<Update>| async move {
///     tracing::info!(update_id = update.update_id, "seen");
/// });
/// ```
pub trait Handler: Send + Sync + 'static {
    /// Runs the handler for one update.
    fn call(&self, ctx: BotContext, update: Arc<Update>) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut, R> Handler for F
where
    F: Fn(BotContext, Arc<Update>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoHandlerResult,
{
    fn call(&self, ctx: BotContext, update: Arc<Update>) -> BoxFuture<'static, HandlerResult> {
        let fut = (self)(ctx, update);
        Box::pin(async move { fut.await.into_handler_result() })
    }
}

/// A type-erased handler that can be stored in route tables.
pub type BoxedHandler = Arc<dyn Handler>;

/// Converts a handler into a [`BoxedHandler`].
pub fn into_handler<H: Handler>(handler: H) -> BoxedHandler {
    Arc::new(handler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_unit_handler_is_ok() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let handler = into_handler(move |_ctx: BotContext, _update: Arc<Update>| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });

        let update = Arc::new(Update::new(1, courier_core::UpdateKind::Other(Default::default())));
        tokio_test::assert_ok!(handler.call(BotContext::default(), update).await);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_result_handler_error_is_boxed() {
        let handler = into_handler(|_ctx: BotContext, _update: Arc<Update>| async {
            Err::<(), _>(std::io::Error::other("boom"))
        });

        let update = Arc::new(Update::new(1, courier_core::UpdateKind::Other(Default::default())));
        let err = tokio_test::assert_err!(handler.call(BotContext::default(), update).await);
        assert_eq!(err.to_string(), "boom");
    }
}
