use crate::brig::BrigError;
use crate::config::render;
use crate::error::BotError;
use crate::{Context, Data, Error};
use poise::serenity_prelude::{self as serenity, Colour, CreateEmbed, Mentionable};
use poise::{CreateReply, command};

/// Every command the bot registers
#[must_use]
pub fn all() -> Vec<poise::Command<Data, Error>> {
    vec![quit(), poke(), social(), brig(), unbrig(), listbrig(), help()]
}

/// Shut the bot down
#[command(prefix_command, slash_command, owners_only, hide_in_help, aliases("shutdown"))]
pub async fn quit(ctx: Context<'_>) -> Result<(), Error> {
    let data = ctx.data();
    ctx.say(data.config.phrases.shutdown.clone()).await?;

    data.stop_sweeper().await;
    ctx.framework().shard_manager.shutdown_all().await;
    Ok(())
}

/// Passes only if the invoker holds the configured poke role
async fn has_poke_role(ctx: Context<'_>) -> Result<bool, Error> {
    let role_name = &ctx.data().config.poke_role;
    let guild_id = ctx.guild_id().ok_or(BotError::NoPrivateMessage)?;

    let roles = guild_id.roles(ctx).await?;
    let Some(role_id) = crate::brig::gateway::find_role_by_name(roles.values(), role_name) else {
        return Err(BotError::MissingRole(role_name.clone()).into());
    };

    if ctx.author().has_role(ctx, guild_id, role_id).await? {
        Ok(true)
    } else {
        Err(BotError::MissingRole(role_name.clone()).into())
    }
}

/// Poke the bot
#[command(prefix_command, slash_command, check = has_poke_role)]
pub async fn poke(ctx: Context<'_>) -> Result<(), Error> {
    let reply = CreateReply::default()
        .content(ctx.data().config.phrases.poke.clone())
        .reply(true);
    ctx.send(reply).await?;
    Ok(())
}

/// Show the club's social media platforms
#[command(prefix_command, slash_command)]
pub async fn social(ctx: Context<'_>) -> Result<(), Error> {
    let config = &ctx.data().config;
    let embed = config.social_links.iter().fold(
        CreateEmbed::new()
            .title(config.social_title.clone())
            .colour(Colour::ORANGE),
        |embed, social| embed.field(social.platform.clone(), social.link.clone(), false),
    );

    ctx.send(CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Put someone in the brig
#[command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "ADMINISTRATOR"
)]
pub async fn brig(
    ctx: Context<'_>,
    #[description = "Member to put in the brig"] member: serenity::Member,
    #[description = "Sentence length in minutes, leave empty for indefinite"]
    duration: Option<i64>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or(BotError::NoPrivateMessage)?;
    let data = ctx.data();

    let reply = match data.brig.add(guild_id, member.user.id, duration).await {
        Ok(entry) => data.brig.added_message(&entry),
        Err(BrigError::InvalidDuration(_)) => data.config.phrases.invalid_num_input.clone(),
        Err(BrigError::RoleMissing { .. }) => data.brig.role_missing_message("brig"),
        Err(e) => return Err(e.into()),
    };

    ctx.say(reply).await?;
    Ok(())
}

/// Remove someone from the brig
#[command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "ADMINISTRATOR"
)]
pub async fn unbrig(
    ctx: Context<'_>,
    #[description = "Member to release"] member: serenity::Member,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or(BotError::NoPrivateMessage)?;
    let data = ctx.data();
    let phrases = &data.config.phrases;
    let mention = member.mention().to_string();

    let reply = match data.brig.remove(guild_id, member.user.id).await {
        Ok(Some(_)) => render(&phrases.brig_remove, &[("member", &mention)]),
        Ok(None) => render(&phrases.not_in_brig, &[("member", &mention)]),
        Err(BrigError::RoleMissing { .. }) => data.brig.role_missing_message("unbrig"),
        Err(e) => return Err(e.into()),
    };

    ctx.say(reply).await?;
    Ok(())
}

/// List brig members and their sentences
#[command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "ADMINISTRATOR"
)]
pub async fn listbrig(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or(BotError::NoPrivateMessage)?;
    let data = ctx.data();

    let entries = data.brig.list(guild_id);
    if entries.is_empty() {
        ctx.say(data.config.phrases.brig_empty.clone()).await?;
        return Ok(());
    }

    let offset = data.config.display_offset();
    let mut fields = Vec::with_capacity(entries.len());
    for entry in &entries {
        let name = match guild_id.member(ctx, entry.member_id).await {
            Ok(member) => member.user.tag(),
            Err(_) => entry.member_id.mention().to_string(),
        };
        fields.push((name, entry.window_label(&offset)));
    }

    ctx.send(CreateReply::default().embed(brig_embed(fields)))
        .await?;
    Ok(())
}

/// Embed limit on fields
const MAX_EMBED_FIELDS: usize = 25;

/// Build the `listbrig` embed from (member name, sentence window) pairs
fn brig_embed(fields: Vec<(String, String)>) -> CreateEmbed {
    let total = fields.len();
    let embed = CreateEmbed::new()
        .title("The Brig")
        .colour(Colour::ORANGE)
        .fields(
            fields
                .into_iter()
                .take(MAX_EMBED_FIELDS)
                .map(|(name, value)| (name, value, false)),
        );

    if total > MAX_EMBED_FIELDS {
        embed.footer(serenity::CreateEmbedFooter::new(format!(
            "and {} more",
            total - MAX_EMBED_FIELDS
        )))
    } else {
        embed
    }
}

/// Show help for commands
#[command(prefix_command, slash_command)]
pub async fn help(
    ctx: Context<'_>,
    #[description = "Command to show help about"] command: Option<String>,
) -> Result<(), Error> {
    poise::builtins::help(
        ctx,
        command.as_deref(),
        poise::builtins::HelpConfiguration::default(),
    )
    .await?;
    Ok(())
}
