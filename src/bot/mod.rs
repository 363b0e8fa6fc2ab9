//! Demo bot
//!
//! A small conversation that exercises the engine end to end:
//! - `/start`: main menu with inline buttons
//! - `name` button: prompt that waits for a free-text reply
//! - text in `ask_name`: greet and return to the menu
//! - `/notify`: replace the notification message
//! - `/sessions`: list cached sessions (administrators only)

use anyhow::Result;
use async_trait::async_trait;
use parley_core::{
    Button, Context, CorrespondentId, Handler, OutgoingMessage, Router, SessionManager, State,
    StateChange,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Main menu state
pub const MENU: &str = "menu";
/// Waiting for the correspondent's name
pub const ASK_NAME: &str = "ask_name";
/// Longest accepted name, in characters
pub const MAX_NAME_CHARS: usize = 64;

const SNAPSHOT_TIMEOUT: Duration = Duration::from_millis(200);

/// Build the demo router
pub fn router(manager: Arc<SessionManager>, admins: Vec<CorrespondentId>) -> Router {
    Router::new()
        .command("start", StartHandler)
        .command("notify", NotifyHandler)
        .command("sessions", SessionsHandler { manager, admins })
        .callback("name", AskNameHandler)
        .callback(MENU, BackToMenuHandler)
        .text(ASK_NAME, NameReplyHandler)
        .default_text(HintHandler)
}

fn menu_message(greeting: &str) -> OutgoingMessage {
    OutgoingMessage::text(format!("{greeting}\n\nWhat would you like to do?"))
        .with_row(vec![Button::callback("Tell me your name", "name")])
}

fn menu_state() -> StateChange {
    StateChange::Set(State::new(MENU))
}

/// `/start`: send a fresh main menu
struct StartHandler;

#[async_trait]
impl Handler for StartHandler {
    async fn handle(&self, ctx: &mut Context) -> Result<()> {
        let greeting = format!("Hello, {}!", ctx.session().identity().display_name());
        ctx.send_main(&menu_message(&greeting), menu_state()).await?;
        Ok(())
    }
}

/// `name` button: turn the menu into a prompt
struct AskNameHandler;

#[async_trait]
impl Handler for AskNameHandler {
    async fn handle(&self, ctx: &mut Context) -> Result<()> {
        let prompt = OutgoingMessage::text("What should I call you?")
            .with_row(vec![Button::callback("Cancel", MENU)]);
        ctx.edit_main(&prompt, StateChange::Set(State::awaiting_text(ASK_NAME)))
            .await?;
        ctx.answer(None).await?;
        Ok(())
    }
}

/// `menu` button: restore the menu in place
struct BackToMenuHandler;

#[async_trait]
impl Handler for BackToMenuHandler {
    async fn handle(&self, ctx: &mut Context) -> Result<()> {
        let greeting = format!("Hello, {}!", ctx.session().identity().display_name());
        ctx.edit_main(&menu_message(&greeting), menu_state()).await?;
        ctx.answer(None).await?;
        Ok(())
    }
}

/// Free text answering the name prompt
struct NameReplyHandler;

#[async_trait]
impl Handler for NameReplyHandler {
    async fn handle(&self, ctx: &mut Context) -> Result<()> {
        let name = ctx.event().text().unwrap_or_default().trim().to_string();
        if name.is_empty() || name.chars().count() > MAX_NAME_CHARS {
            let hint = format!("Please send a name of 1 to {MAX_NAME_CHARS} characters.");
            ctx.notify(&OutgoingMessage::text(hint)).await?;
            return Ok(());
        }

        if let Some(prompt) = ctx.session().last_awaiting_text() {
            ctx.session_mut().set_state(prompt, StateChange::Clear).await;
        }
        let greeting = format!("Nice to meet you, {name}!");
        ctx.send_main(&menu_message(&greeting), menu_state()).await?;
        Ok(())
    }
}

/// Free text nobody asked for
struct HintHandler;

#[async_trait]
impl Handler for HintHandler {
    async fn handle(&self, ctx: &mut Context) -> Result<()> {
        ctx.notify(&OutgoingMessage::text("Send /start to open the menu."))
            .await?;
        Ok(())
    }
}

/// `/notify [text]`: replace the notification message
struct NotifyHandler;

#[async_trait]
impl Handler for NotifyHandler {
    async fn handle(&self, ctx: &mut Context) -> Result<()> {
        let text = match ctx.args().trim() {
            "" => "Ping!".to_string(),
            args => args.to_string(),
        };
        ctx.notify(&OutgoingMessage::text(text)).await?;
        Ok(())
    }
}

/// `/sessions`: cached sessions, administrators only
struct SessionsHandler {
    manager: Arc<SessionManager>,
    admins: Vec<CorrespondentId>,
}

impl SessionsHandler {
    async fn describe(&self, ctx: &Context) -> Vec<String> {
        let mut sessions = self.manager.all();
        sessions.sort_by_key(|session| session.id());

        let mut lines = Vec::with_capacity(sessions.len());
        for session in sessions {
            // The caller's own record is already locked by this update.
            if session.id() == ctx.chat_id() {
                let own = ctx.session();
                lines.push(describe_line(
                    session.id(),
                    &own.identity().display_name(),
                    own.state_of(own.messages().main_id()).0.name(),
                ));
                continue;
            }
            match tokio::time::timeout(SNAPSHOT_TIMEOUT, session.snapshot()).await {
                Ok(record) => lines.push(describe_line(
                    record.id(),
                    &record.identity.display_name(),
                    record.state.state_of(record.messages.main_id()).0.name(),
                )),
                Err(_) => lines.push(format!("{} (busy)", session.id())),
            }
        }
        lines
    }
}

/// One listing line: id, display name and the state of the main message
fn describe_line(id: CorrespondentId, name: &str, state: &str) -> String {
    format!("{id} {name} [{state}]")
}

#[async_trait]
impl Handler for SessionsHandler {
    async fn handle(&self, ctx: &mut Context) -> Result<()> {
        if !self.admins.contains(&ctx.chat_id()) {
            debug!(correspondent = ctx.chat_id(), "Rejected admin command");
            ctx.send(&OutgoingMessage::text("This command is for administrators."))
                .await?;
            return Ok(());
        }

        let lines = self.describe(ctx).await;
        info!(correspondent = ctx.chat_id(), count = lines.len(), "Listing sessions");
        let text = format!("{} cached session(s)\n{}", lines.len(), lines.join("\n"));
        ctx.send(&OutgoingMessage::text(text)).await?;
        Ok(())
    }
}
