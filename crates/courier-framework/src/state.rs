//! Per-chat conversation state.
//!
//! A [`StateGraph`] names the states of a conversation, the action run when a
//! chat enters each of them, and the transitions between them. A
//! [`StateMachine`] tracks which state every chat is in.
//!
//! ```rust,ignore
//! let graph = StateGraph::new("start")
//!     .state("start", ask_name)
//!     .state("write_name", save_name_and_ask_mail)
//!     .state("write_mail", save_mail)
//!     .next("start", "write_name")
//!     .next("write_name", "write_mail")
//!     .branch("write_mail", "again", "start")
//!     .on_command("reset", "start");
//! ```
//!
//! Two styles are supported and can be mixed:
//!
//! - **Flat**: states without transitions. The current state's action runs on
//!   every message, and handler code moves the chat with
//!   [`StateMachine::set_state`].
//! - **Graph**: states with transitions. On each message the first transition
//!   whose condition holds fires and the entered state's action runs
//!   ([`StateMachine::next_state`]).
//!
//! A chat seen for the first time is put in the reset state.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use courier_core::Update;
use parking_lot::Mutex;
use tower::BoxError;
use tracing::{debug, trace};

use crate::context::BotContext;
use crate::error::{StateError, StateResult};
use crate::handler::{BoxedHandler, Handler, into_handler};
use crate::route::normalize_command;

/// Name of the reset state of [`StateGraph::default`].
pub const DEFAULT_RESET_STATE: &str = "start";

// ============================================================================
// Conditions and transitions
// ============================================================================

/// When a transition fires.
#[derive(Clone)]
pub enum Condition {
    /// On any update.
    Always,
    /// When the message text equals the string exactly.
    TextEquals(String),
    /// When the predicate holds.
    Predicate(Arc<dyn Fn(&Update) -> bool + Send + Sync>),
}

impl Condition {
    /// Returns `true` if the condition holds for `update`.
    pub fn matches(&self, update: &Update) -> bool {
        match self {
            Condition::Always => true,
            Condition::TextEquals(expected) => update.text() == Some(expected.as_str()),
            Condition::Predicate(predicate) => predicate(update),
        }
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Always => f.write_str("Always"),
            Condition::TextEquals(text) => f.debug_tuple("TextEquals").field(text).finish(),
            Condition::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

#[derive(Debug, Clone)]
struct Transition {
    condition: Condition,
    target: String,
}

#[derive(Clone, Default)]
struct StateNode {
    action: Option<BoxedHandler>,
    transitions: Vec<Transition>,
}

// ============================================================================
// StateGraph
// ============================================================================

/// The states of a conversation and the transitions between them.
///
/// Built once at setup; read-only afterwards.
#[derive(Clone)]
pub struct StateGraph {
    states: HashMap<String, StateNode>,
    reset: String,
    commands: HashMap<String, String>,
}

impl Default for StateGraph {
    fn default() -> Self {
        Self::new(DEFAULT_RESET_STATE)
    }
}

impl StateGraph {
    /// Creates a graph whose reset state is `reset`.
    pub fn new(reset: impl Into<String>) -> Self {
        let reset = reset.into();
        let mut states = HashMap::new();
        states.insert(reset.clone(), StateNode::default());
        Self {
            states,
            reset,
            commands: HashMap::new(),
        }
    }

    fn node_mut(&mut self, name: impl Into<String>) -> &mut StateNode {
        self.states.entry(name.into()).or_default()
    }

    /// Registers a state and the action run when a chat enters it.
    pub fn state<H: Handler>(mut self, name: impl Into<String>, action: H) -> Self {
        self.node_mut(name).action = Some(into_handler(action));
        self
    }

    /// Registers a state without an action.
    pub fn passive(mut self, name: impl Into<String>) -> Self {
        self.node_mut(name);
        self
    }

    /// Adds a transition from `from` to `to` that fires on any update.
    pub fn next(self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.transition(from, Condition::Always, to)
    }

    /// Adds a transition from `from` to `to` that fires when the message
    /// text equals `text`.
    pub fn branch(
        self,
        from: impl Into<String>,
        text: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        self.transition(from, Condition::TextEquals(text.into()), to)
    }

    /// Adds a transition from `from` to `to` that fires when `predicate` holds.
    pub fn when<P>(self, from: impl Into<String>, predicate: P, to: impl Into<String>) -> Self
    where
        P: Fn(&Update) -> bool + Send + Sync + 'static,
    {
        self.transition(from, Condition::Predicate(Arc::new(predicate)), to)
    }

    /// Adds a transition with an explicit condition.
    ///
    /// Transitions of one state are tried in the order they were added.
    pub fn transition(
        mut self,
        from: impl Into<String>,
        condition: Condition,
        to: impl Into<String>,
    ) -> Self {
        let target = to.into();
        self.node_mut(target.clone());
        self.node_mut(from)
            .transitions
            .push(Transition { condition, target });
        self
    }

    /// Makes the `/command` message move a chat into `state` from anywhere.
    pub fn on_command(mut self, command: &str, state: impl Into<String>) -> Self {
        let state = state.into();
        self.node_mut(state.clone());
        self.commands.insert(normalize_command(command), state);
        self
    }

    /// Returns the name of the reset state.
    pub fn reset_state(&self) -> &str {
        &self.reset
    }

    /// Returns `true` if a state named `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.states.contains_key(name)
    }

    /// Returns the number of registered states.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Returns `true` if only the reset state is registered.
    pub fn is_empty(&self) -> bool {
        self.states.len() <= 1
    }

    fn action(&self, name: &str) -> Option<BoxedHandler> {
        self.states.get(name).and_then(|node| node.action.clone())
    }

    fn command_target(&self, update: &Update) -> Option<&str> {
        let text = update.text()?;
        if !text.starts_with('/') {
            return None;
        }
        self.commands
            .get(&normalize_command(text))
            .map(String::as_str)
    }
}

impl fmt::Debug for StateGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.states.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("StateGraph")
            .field("reset", &self.reset)
            .field("states", &names)
            .field("commands", &self.commands)
            .finish()
    }
}

// ============================================================================
// StateMachine
// ============================================================================

/// Tracks the current state of every chat.
///
/// The chat map is guarded by one mutex, held only for the lookup or update
/// and never while an action runs.
pub struct StateMachine {
    graph: Arc<StateGraph>,
    current: Mutex<HashMap<i64, String>>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new(StateGraph::default())
    }
}

impl StateMachine {
    /// Creates a state machine over `graph` with no chats tracked yet.
    pub fn new(graph: StateGraph) -> Self {
        Self {
            graph: Arc::new(graph),
            current: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the state graph.
    pub fn graph(&self) -> &StateGraph {
        &self.graph
    }

    /// Moves `chat_id` into `state` unconditionally.
    ///
    /// Fails with [`StateError::NotFound`] for an unregistered state and with
    /// [`StateError::AlreadyInState`] if the chat is already there; in both
    /// cases the chat keeps its state. An unseen chat counts as being in the
    /// reset state. The state's action is not run.
    pub fn set_state(&self, chat_id: i64, state: &str) -> StateResult<()> {
        if !self.graph.contains(state) {
            return Err(StateError::NotFound(state.to_string()));
        }

        let mut current = self.current.lock();
        let entry = current
            .entry(chat_id)
            .or_insert_with(|| self.graph.reset.clone());
        if entry.as_str() == state {
            return Err(StateError::AlreadyInState {
                chat_id,
                state: state.to_string(),
            });
        }
        *entry = state.to_string();
        debug!(chat_id, state, "State set");
        Ok(())
    }

    /// Returns the state of `chat_id`, putting an unseen chat in the reset
    /// state first.
    pub fn get_state(&self, chat_id: i64) -> String {
        self.current
            .lock()
            .entry(chat_id)
            .or_insert_with(|| self.graph.reset.clone())
            .clone()
    }

    /// Returns the state of `chat_id` without seeding it.
    pub fn current(&self, chat_id: i64) -> Option<String> {
        self.current.lock().get(&chat_id).cloned()
    }

    /// Forgets `chat_id`; its next access starts from the reset state.
    pub fn reset(&self, chat_id: i64) {
        self.current.lock().remove(&chat_id);
    }

    /// Returns the number of chats tracked.
    pub fn tracked_chats(&self) -> usize {
        self.current.lock().len()
    }

    /// Fires the first transition of the chat's current state whose
    /// condition holds for `update`, then runs the entered state's action.
    ///
    /// Returns whether a transition fired. An unseen chat is put in the reset
    /// state and no transition fires. Updates without a chat are ignored.
    pub async fn next_state(&self, ctx: &BotContext, update: &Arc<Update>) -> Result<bool, BoxError> {
        let Some(chat_id) = update.chat_id() else {
            return Ok(false);
        };

        let entered = {
            let mut current = self.current.lock();
            let Some(state) = current.get(&chat_id) else {
                current.insert(chat_id, self.graph.reset.clone());
                trace!(chat_id, state = %self.graph.reset, "Chat seeded with reset state");
                return Ok(false);
            };

            let target = self.graph.states.get(state).and_then(|node| {
                node.transitions
                    .iter()
                    .find(|t| t.condition.matches(update))
                    .map(|t| t.target.clone())
            });
            match target {
                Some(target) => {
                    debug!(chat_id, from = %state, to = %target, "State transition");
                    current.insert(chat_id, target.clone());
                    target
                }
                None => return Ok(false),
            }
        };

        self.run_action(&entered, ctx, update).await?;
        Ok(true)
    }

    /// Drives the conversation for one update.
    ///
    /// 1. A registered `/command` moves the chat into its state and runs it.
    /// 2. An unseen chat is put in the reset state and that state runs.
    /// 3. If the current state has transitions, [`next_state`](Self::next_state)
    ///    is applied.
    /// 4. Otherwise the current state's action runs.
    ///
    /// Returns whether an action ran.
    pub async fn handle(&self, ctx: &BotContext, update: &Arc<Update>) -> Result<bool, BoxError> {
        let Some(chat_id) = update.chat_id() else {
            return Ok(false);
        };

        if let Some(target) = self.graph.command_target(update) {
            self.current.lock().insert(chat_id, target.to_string());
            debug!(chat_id, state = target, "State entered by command");
            return self.run_action(target, ctx, update).await;
        }

        let (state, seeded) = {
            let mut current = self.current.lock();
            match current.get(&chat_id) {
                Some(state) => (state.clone(), false),
                None => {
                    current.insert(chat_id, self.graph.reset.clone());
                    (self.graph.reset.clone(), true)
                }
            }
        };

        let has_transitions = self
            .graph
            .states
            .get(&state)
            .is_some_and(|node| !node.transitions.is_empty());

        if !seeded && has_transitions {
            self.next_state(ctx, update).await
        } else {
            self.run_action(&state, ctx, update).await
        }
    }

    async fn run_action(
        &self,
        state: &str,
        ctx: &BotContext,
        update: &Arc<Update>,
    ) -> Result<bool, BoxError> {
        match self.graph.action(state) {
            Some(action) => {
                trace!(state, update_id = update.update_id, "Running state action");
                action.call(ctx.clone(), Arc::clone(update)).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl fmt::Debug for StateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachine")
            .field("graph", &self.graph)
            .field("tracked_chats", &self.tracked_chats())
            .finish()
    }
}

/// A handler that feeds every update to [`StateMachine::handle`].
pub fn state_handler() -> impl Handler {
    |ctx: BotContext, update: Arc<Update>| async move {
        ctx.states().handle(&ctx, &update).await.map(|_| ())
    }
}
