//! Route entries and matching rules.

use std::fmt;

use courier_core::Update;

use crate::handler::BoxedHandler;

/// The rule a [`Route`] matches updates with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteKind {
    /// A message whose text is the `/command`, case-insensitively, with any
    /// `@botname` suffix ignored.
    Command,
    /// A message whose text contains the pattern, case-insensitively.
    TextContains,
    /// A callback query whose data starts with the pattern.
    CallbackPrefix,
    /// Any new incoming message.
    Message,
    /// Every update.
    Any,
}

/// One registered handler together with its matching rule.
///
/// The pattern is normalized once at construction: command patterns go
/// through [`normalize_command`], text patterns are lower-cased.
#[derive(Clone)]
pub struct Route {
    kind: RouteKind,
    pattern: String,
    handler: BoxedHandler,
}

impl Route {
    /// Creates a route.
    pub fn new(kind: RouteKind, pattern: impl Into<String>, handler: BoxedHandler) -> Self {
        let pattern = pattern.into();
        let pattern = match kind {
            RouteKind::Command => normalize_command(&pattern),
            RouteKind::TextContains => pattern.to_lowercase(),
            RouteKind::CallbackPrefix | RouteKind::Message | RouteKind::Any => pattern,
        };
        Self {
            kind,
            pattern,
            handler,
        }
    }

    /// Returns the matching rule.
    pub fn kind(&self) -> RouteKind {
        self.kind
    }

    /// Returns the normalized pattern.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Returns the handler.
    pub fn handler(&self) -> &BoxedHandler {
        &self.handler
    }

    /// Returns `true` if this route's handler should run for `update`.
    pub fn matches(&self, update: &Update) -> bool {
        match self.kind {
            RouteKind::Command => update
                .text()
                .is_some_and(|text| text.starts_with('/') && normalize_command(text) == self.pattern),
            RouteKind::TextContains => update
                .text()
                .is_some_and(|text| !text.is_empty() && text.to_lowercase().contains(&self.pattern)),
            RouteKind::CallbackPrefix => update
                .callback_query()
                .and_then(|cb| cb.data.as_deref())
                .is_some_and(|data| data.starts_with(&self.pattern)),
            RouteKind::Message => update.message().is_some(),
            RouteKind::Any => true,
        }
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("kind", &self.kind)
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}

/// Normalizes a command for comparison.
///
/// Strips one leading `/`, lower-cases, and cuts at `@` so that
/// `/Start@MyBot`, `/start` and `start` all become `start`.
pub fn normalize_command(text: &str) -> String {
    let text = text.strip_prefix('/').unwrap_or(text);
    let text = text.split_once('@').map_or(text, |(cmd, _)| cmd);
    text.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::BotContext;
    use crate::handler::into_handler;
    use courier_core::{CallbackQuery, Message, UpdateKind, User};
    use std::sync::Arc;

    fn noop() -> BoxedHandler {
        into_handler(|_ctx: BotContext, _update: Arc<Update>| async {})
    }

    fn text(t: &str) -> Update {
        Update::new(1, UpdateKind::Message(Message::text_message(1, 10, t)))
    }

    fn callback(data: &str) -> Update {
        Update::new(
            2,
            UpdateKind::CallbackQuery(CallbackQuery {
                id: "q".into(),
                from: User {
                    id: 10,
                    is_bot: false,
                    first_name: "Alice".into(),
                    last_name: None,
                    username: None,
                },
                message: None,
                inline_message_id: None,
                chat_instance: String::new(),
                data: Some(data.into()),
            }),
        )
    }

    #[test]
    fn test_normalize_command() {
        assert_eq!(normalize_command("/Start@MyBot"), "start");
        assert_eq!(normalize_command("/start"), "start");
        assert_eq!(normalize_command("start"), "start");
        assert_eq!(normalize_command("//start"), "/start");
    }

    #[test]
    fn test_command_route() {
        for pattern in ["start", "/start", "/Start@MyBot"] {
            let route = Route::new(RouteKind::Command, pattern, noop());
            assert!(route.matches(&text("/start")), "pattern {pattern}");
            assert!(route.matches(&text("/START@MyBot")), "pattern {pattern}");
            assert!(!route.matches(&text("start")), "pattern {pattern}");
            assert!(!route.matches(&text("/start now")), "pattern {pattern}");
        }
    }

    #[test]
    fn test_text_contains_route() {
        let route = Route::new(RouteKind::TextContains, "Hello", noop());
        assert!(route.matches(&text("well HELLO there")));
        assert!(!route.matches(&text("bye")));
        assert!(!route.matches(&text("")));
        assert!(!route.matches(&callback("hello")));
    }

    #[test]
    fn test_callback_prefix_route() {
        let route = Route::new(RouteKind::CallbackPrefix, "vote:", noop());
        assert!(route.matches(&callback("vote:1")));
        assert!(!route.matches(&callback("Vote:1")));
        assert!(!route.matches(&text("vote:1")));
    }

    #[test]
    fn test_message_and_any_routes() {
        let message = Route::new(RouteKind::Message, "", noop());
        let any = Route::new(RouteKind::Any, "", noop());

        assert!(message.matches(&text("x")));
        assert!(!message.matches(&callback("x")));
        assert!(any.matches(&callback("x")));
    }
}
