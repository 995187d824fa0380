//! Command errors
//!
//! Errors users are expected to run into get a configured phrase as reply.
//! Anything else gets the generic "unknown issue" phrase and goes to the
//! error log.

use crate::config::{Phrases, render};
use crate::{Data, ERROR_TARGET, Error, logging};
use poise::FrameworkError;
use tracing::{error, warn};

/// Errors raised by command checks
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum BotError {
    /// A guild-only check ran in a direct message
    #[error("Command used in a direct message")]
    NoPrivateMessage,

    /// The invoker lacks a required role
    #[error("Missing required role: {0}")]
    MissingRole(String),
}

impl BotError {
    /// Reply shown to the user for this error
    #[must_use]
    pub fn user_message(&self, phrases: &Phrases) -> String {
        match self {
            Self::NoPrivateMessage => phrases.no_dms.clone(),
            Self::MissingRole(role) => render(&phrases.missing_role, &[("role", role)]),
        }
    }
}

/// Why a command invocation was turned away
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// A command or check returned a [`BotError`]
    Bot(BotError),
    /// Guild-only command used in a direct message
    DirectMessage,
    /// Invoker lacks the required permissions
    NotAdmin,
    /// An argument was missing or could not be parsed
    BadArgument { command: String },
    /// Anything else, including owner-only commands run by non-owners
    Unrecognized,
}

impl Rejection {
    /// Classify a framework error
    #[must_use]
    pub fn of(error: &FrameworkError<'_, Data, Error>) -> Self {
        match error {
            FrameworkError::CommandCheckFailed { error: Some(err), .. }
            | FrameworkError::Command { error: err, .. } => Self::from_error(err.as_ref()),
            FrameworkError::GuildOnly { .. } => Self::DirectMessage,
            FrameworkError::MissingUserPermissions { .. } => Self::NotAdmin,
            FrameworkError::ArgumentParse { ctx, .. } => Self::BadArgument {
                command: ctx.command().qualified_name.clone(),
            },
            _ => Self::Unrecognized,
        }
    }

    /// Classify an error returned by a command body or check
    #[must_use]
    pub fn from_error(error: &(dyn std::error::Error + Send + Sync + 'static)) -> Self {
        error
            .downcast_ref::<BotError>()
            .map_or(Self::Unrecognized, |e| Self::Bot(e.clone()))
    }

    /// Reply shown to the user
    #[must_use]
    pub fn reply(&self, phrases: &Phrases) -> String {
        match self {
            Self::Bot(error) => error.user_message(phrases),
            Self::DirectMessage => phrases.no_dms.clone(),
            Self::NotAdmin => phrases.not_admin.clone(),
            Self::BadArgument { command } => {
                render(&phrases.missing_argument, &[("command", command)])
            }
            Self::Unrecognized => phrases.unknown_issue.clone(),
        }
    }

    /// Whether the rejection is one users are expected to run into
    #[must_use]
    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized)
    }
}

/// Framework error hook
pub async fn on_error(error: FrameworkError<'_, Data, Error>) {
    if let FrameworkError::UnknownCommand {
        ctx, msg, framework, ..
    } = &error
    {
        warn!(
            target: ERROR_TARGET,
            content = %msg.content,
            user_id = %msg.author.id,
            "Unknown command"
        );
        let phrase = &framework.user_data.config.phrases.unknown_command;
        if let Err(e) = msg.channel_id.say(*ctx, phrase).await {
            error!(target: ERROR_TARGET, "Failed to reply to unknown command: {e}");
        }
        return;
    }

    let Some(ctx) = error.ctx() else {
        // Setup and event handler errors have no invocation to answer
        logging::log_command_error(&error);
        if let Err(e) = poise::builtins::on_error(error).await {
            error!(target: ERROR_TARGET, "Error while handling error: {e}");
        }
        return;
    };

    let rejection = Rejection::of(&error);
    let reply = rejection.reply(&ctx.data().config.phrases);
    if rejection.is_recognized() {
        logging::log_command_rejection(ctx, &reply);
    }
    if let Err(e) = ctx.say(reply).await {
        error!(target: ERROR_TARGET, "Failed to send error reply: {e}");
    }
    if !rejection.is_recognized() {
        logging::log_command_error(&error);
    }
}
