//! Prefix and slash commands
//!
//! Everything under `entrybanner` is guild-only and requires the
//! `ADMINISTRATOR` permission. Replies for expected mistakes come from
//! `BannerError::user_message`; internal failures are also returned so the
//! framework's error hook logs them.

use crate::banner::{BannerResult, Rule, RuleId, RuleMetadata};
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use std::time::Duration;
use tracing::info;

mod reactions;

pub use reactions::{purge_message_reactions, purge_user_reactions};

/// How long an interactive prompt waits for a click
pub const PROMPT_TIMEOUT: Duration = Duration::from_secs(20);

const COMMAND_NAME: &str = "entrybanner";

fn guild_id(ctx: Context<'_>) -> Result<u64, Error> {
    ctx.guild_id()
        .map(serenity::GuildId::get)
        .ok_or_else(|| "this command can only be used in a guild".into())
}

/// Reply with the text of a successful operation, or explain the failure.
async fn respond(ctx: Context<'_>, result: BannerResult<String>) -> Result<(), Error> {
    match result {
        Ok(text) => {
            ctx.reply(text).await?;
            Ok(())
        }
        Err(e) => {
            ctx.reply(e.user_message()).await?;
            if e.is_expected() { Ok(()) } else { Err(e.into()) }
        }
    }
}

fn removal_prompt(rule: &Rule) -> String {
    format!(
        "remove pattern {} (`{}`)? It has banned {} member(s).",
        rule.id(),
        rule.pattern(),
        rule.bans().len()
    )
}

/// Manage the entry banner, which bans joining members whose name matches a pattern
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "ADMINISTRATOR",
    subcommands("info", "enable", "disable", "set_log_channel", "regex"),
    subcommand_required
)]
pub async fn entrybanner(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Show whether the entry banner is active and what it has done
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "ADMINISTRATOR"
)]
pub async fn info(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let result = ctx
        .data()
        .controller()
        .info(guild_id)
        .await
        .map(|summary| summary.to_string());
    respond(ctx, result).await
}

/// Start validating joining members
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "ADMINISTRATOR"
)]
pub async fn enable(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let result = ctx
        .data()
        .controller()
        .enable(guild_id)
        .await
        .map(|()| format!("{COMMAND_NAME} has been enabled"));
    respond(ctx, result).await
}

/// Stop validating joining members
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "ADMINISTRATOR"
)]
pub async fn disable(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let result = ctx
        .data()
        .controller()
        .disable(guild_id)
        .await
        .map(|()| format!("{COMMAND_NAME} has been disabled"));
    respond(ctx, result).await
}

/// Choose where bans are announced; defaults to the current channel
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "ADMINISTRATOR",
    rename = "set-log-channel"
)]
pub async fn set_log_channel(
    ctx: Context<'_>,
    #[description = "Channel for ban notices"] channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let channel_id = channel.map_or_else(|| ctx.channel_id(), |channel| channel.id);
    let result = ctx
        .data()
        .controller()
        .set_log_channel(guild_id, channel_id.get())
        .await
        .map(|()| format!("logs will be written to <#{channel_id}>"));
    respond(ctx, result).await
}

/// Manage the name patterns
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "ADMINISTRATOR",
    subcommands("regex_add", "regex_remove", "regex_list", "regex_enable", "regex_disable"),
    subcommand_required
)]
pub async fn regex(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Add a pattern; names are matched from their first character
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "ADMINISTRATOR",
    rename = "add"
)]
pub async fn regex_add(
    ctx: Context<'_>,
    #[description = "Regular expression matched against account names"] pattern: String,
    #[description = "Lowercase names before matching"] lowercase: Option<bool>,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let author = ctx.author();
    let metadata = RuleMetadata::new(author.name.clone(), author.id.get());
    let result = ctx
        .data()
        .controller()
        .add_rule(guild_id, &pattern, lowercase.unwrap_or(false), metadata)
        .await;

    if let Ok(id) = &result {
        info!(guild_id = %guild_id, rule_id = %id, pattern = %pattern, "Pattern added");
    }
    respond(
        ctx,
        result.map(|id| format!("new pattern has been added with id {id}")),
    )
    .await
}

/// Remove a pattern after confirmation
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "ADMINISTRATOR",
    rename = "remove"
)]
pub async fn regex_remove(
    ctx: Context<'_>,
    #[description = "Pattern id as shown by `regex list`"] id: u64,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let controller = ctx.data().controller();
    let rule_id = RuleId::new(id);

    let rule = match controller.rule(guild_id, rule_id).await {
        Ok(rule) => rule,
        Err(e) => return respond(ctx, Err(e)).await,
    };

    let confirmation = prompt_confirm_decline(ctx, removal_prompt(&rule)).await?;
    let Some(interaction) = confirmation else {
        return Ok(());
    };

    let text = match controller.remove_rule(guild_id, rule_id).await {
        Ok(removed) => {
            info!(guild_id = %guild_id, rule_id = %rule_id, "Pattern removed");
            format!("removed pattern '{removed}'")
        }
        Err(e) => {
            interaction
                .edit_response(
                    ctx.http(),
                    serenity::EditInteractionResponse::new().content(e.user_message()),
                )
                .await?;
            return if e.is_expected() { Ok(()) } else { Err(e.into()) };
        }
    };

    interaction
        .edit_response(ctx.http(), serenity::EditInteractionResponse::new().content(text))
        .await?;
    Ok(())
}

/// List the patterns in evaluation order
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "ADMINISTRATOR",
    rename = "list"
)]
pub async fn regex_list(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let result = ctx.data().controller().list_rules(guild_id).await;
    respond(ctx, result).await
}

/// Re-enable a pattern
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "ADMINISTRATOR",
    rename = "enable"
)]
pub async fn regex_enable(
    ctx: Context<'_>,
    #[description = "Pattern id as shown by `regex list`"] id: u64,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let result = ctx
        .data()
        .controller()
        .set_rule_enabled(guild_id, RuleId::new(id), true)
        .await
        .map(|()| "enabled.".to_string());
    respond(ctx, result).await
}

/// Keep a pattern but stop matching with it
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "ADMINISTRATOR",
    rename = "disable"
)]
pub async fn regex_disable(
    ctx: Context<'_>,
    #[description = "Pattern id as shown by `regex list`"] id: u64,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let result = ctx
        .data()
        .controller()
        .set_rule_enabled(guild_id, RuleId::new(id), false)
        .await
        .map(|()| "disabled.".to_string());
    respond(ctx, result).await
}

/// Ask the author to confirm with buttons.
///
/// Returns the confirming interaction, already acknowledged, or `None` when
/// the author declined or let the prompt time out.
async fn prompt_confirm_decline(
    ctx: Context<'_>,
    content: String,
) -> Result<Option<serenity::ComponentInteraction>, Error> {
    let ctx_id = ctx.id();
    let confirm_id = format!("{ctx_id}_confirm");
    let decline_id = format!("{ctx_id}_decline");

    let reply = ctx
        .send(
            poise::CreateReply::default()
                .content(content)
                .components(vec![serenity::CreateActionRow::Buttons(vec![
                    serenity::CreateButton::new(&confirm_id)
                        .label("Confirm")
                        .style(serenity::ButtonStyle::Danger),
                    serenity::CreateButton::new(&decline_id)
                        .label("Decline")
                        .style(serenity::ButtonStyle::Secondary),
                ])]),
        )
        .await?;

    let message = reply.message().await?.into_owned();
    let interaction = message
        .await_component_interaction(ctx)
        .author_id(ctx.author().id)
        .timeout(PROMPT_TIMEOUT)
        .await;

    let Some(interaction) = interaction else {
        message
            .channel_id
            .edit_message(
                ctx.http(),
                message.id,
                serenity::EditMessage::new()
                    .content("timed out; nothing was removed.")
                    .components(vec![]),
            )
            .await?;
        return Ok(None);
    };

    let declined = interaction.data.custom_id == decline_id;
    let text = if declined {
        "cancelled; nothing was removed."
    } else {
        "removing..."
    };
    interaction
        .create_response(
            ctx.http(),
            serenity::CreateInteractionResponse::UpdateMessage(
                serenity::CreateInteractionResponseMessage::new()
                    .content(text)
                    .components(vec![]),
            ),
        )
        .await?;

    Ok((!declined).then_some(interaction))
}

/// Basic ping command
/// This command is used to check if the bot is responsive.
#[poise::command(prefix_command, slash_command, owners_only)]
pub async fn ping(ctx: Context<'_>) -> Result<(), Error> {
    ctx.say("pong!").await?;
    Ok(())
}

/// The other half of `ping`
#[poise::command(prefix_command, slash_command, owners_only)]
pub async fn pong(ctx: Context<'_>) -> Result<(), Error> {
    ctx.say("ping!").await?;
    Ok(())
}

/// Disconnect every shard; the process closes the store and exits
#[poise::command(prefix_command, owners_only, hide_in_help)]
pub async fn shutdown(ctx: Context<'_>) -> Result<(), Error> {
    info!("Shutdown requested by {}", ctx.author().id);
    ctx.say("shutting down.").await?;
    ctx.framework().shard_manager().shutdown_all().await;
    Ok(())
}

/// Every command the framework registers
#[must_use]
pub fn all() -> Vec<poise::Command<crate::Data, Error>> {
    vec![
        entrybanner(),
        ping(),
        pong(),
        purge_user_reactions(),
        purge_message_reactions(),
        shutdown(),
    ]
}
