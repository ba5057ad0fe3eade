//! Console Bot Example
//!
//! Drives the whole Courier pipeline from the terminal: every line typed on
//! stdin is delivered as a text message, replies are printed to stdout and
//! logs go to stderr.
//!
//! # Commands
//!
//! ```text
//! /ping            - Pong!
//! /help            - This help
//! /signup          - Start the signup conversation
//! anything "hello" - A greeting
//! ```
//!
//! # Usage
//!
//! ```bash
//! cargo run --package console-bot
//! printf '/signup\nAlice\nalice@example.com\n' | cargo run --package console-bot
//! ```

mod console;

use anyhow::Result;
use clap::Parser;
use courier::prelude::*;
use courier::runtime::config::LogOutput;
use courier::runtime::{LoggingBuilder, load_config_from_file};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::console::ConsoleSource;

/// A console-driven Courier bot.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Configuration file; defaults to courier.toml / config.toml lookup.
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Chat id the typed messages belong to.
    #[arg(long, default_value_t = 1)]
    chat_id: i64,

    /// Only accept updates from these chats.
    #[arg(long, value_delimiter = ',')]
    allow: Vec<i64>,
}

// ============================================================================
// Replies
// ============================================================================

/// Where handlers send their answers.
struct Console;

impl Console {
    fn reply(&self, chat_id: i64, text: &str) {
        println!("[{chat_id}] bot> {text}");
    }
}

fn reply(ctx: &BotContext, update: &Update, text: &str) -> Result<(), BoxError> {
    let chat_id = update.chat_id().ok_or("update has no chat")?;
    ctx.require::<Console>()?.reply(chat_id, text);
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

async fn ping(ctx: BotContext, update: Arc<Update>) -> Result<(), BoxError> {
    reply(&ctx, &update, "Pong!")
}

async fn help(ctx: BotContext, update: Arc<Update>) -> Result<(), BoxError> {
    reply(
        &ctx,
        &update,
        "/ping - Pong!\n/help - This help\n/signup - Register your name and email",
    )
}

async fn greet(ctx: BotContext, update: Arc<Update>) -> Result<(), BoxError> {
    reply(&ctx, &update, "Hello there!")
}

// ============================================================================
// Signup Conversation
// ============================================================================

async fn ask_name(ctx: BotContext, update: Arc<Update>) -> Result<(), BoxError> {
    reply(&ctx, &update, "What is your name?")
}

async fn ask_mail(ctx: BotContext, update: Arc<Update>) -> Result<(), BoxError> {
    let chat_id = update.chat_id().ok_or("update has no chat")?;
    ctx.store()
        .set(chat_id, "name", update.text().unwrap_or_default())?;
    reply(&ctx, &update, "Name saved. And your email?")
}

async fn finish(ctx: BotContext, update: Arc<Update>) -> Result<(), BoxError> {
    let chat_id = update.chat_id().ok_or("update has no chat")?;
    let name: String = ctx.store().get(chat_id, "name")?.unwrap_or_default();
    let mail = update.text().unwrap_or_default();

    reply(&ctx, &update, &format!("Registered {name} <{mail}>"))?;
    ctx.store().reset(chat_id);
    ctx.states().set_state(chat_id, "idle")?;
    Ok(())
}

fn signup() -> StateGraph {
    StateGraph::new("idle")
        .passive("idle")
        .state("ask_name", ask_name)
        .state("ask_mail", ask_mail)
        .state("done", finish)
        .next("ask_name", "ask_mail")
        .next("ask_mail", "done")
        .on_command("/signup", "ask_name")
}

fn router(allow: Vec<i64>) -> Router {
    let mut router = Router::new()
        .use_global(middleware::logging())
        .command("ping", ping)
        .command("help", help)
        .text_contains("hello", greet)
        .handle_states()
        .on_error(|update, err| {
            tracing::warn!(update_id = update.update_id, error = %err, "Handler failed");
        });

    if !allow.is_empty() {
        router = router.use_global(middleware::allow_chats(allow));
    }
    router
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config_from_file(path)?,
        None => load_config()?,
    };

    let mut logging = LoggingBuilder::from_config(&config.logging);
    if config.logging.output != LogOutput::File {
        logging = logging.output(LogOutput::Stderr);
    }
    logging.init();
    debug!(?config, "Configuration loaded");

    let shutdown = CancellationToken::new();
    let source = ConsoleSource::spawn(args.chat_id, shutdown.clone());

    let bot = Bot::builder(source)
        .config(config)
        .router(router(args.allow))
        .states(signup())
        .provide(Console)
        .cancellation(shutdown)
        .build();

    info!(chat_id = args.chat_id, "Type messages, Ctrl+D to quit");
    bot.run_until_signal().await?;

    Ok(())
}
