//! Owner tools for mass-removing reactions
//!
//! Reactions of banned or deleted accounts cannot be removed from the client,
//! so these commands do it through the API.

use super::PROMPT_TIMEOUT;
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use serenity::{GetMessages, MessageId, ReactionType};
use tracing::info;

/// Messages scanned when no amount is given
const DEFAULT_AMOUNT: i64 = 100;
/// Upper bound on messages scanned per call
const MAX_AMOUNT: i64 = 1000;
/// Page size of the message history endpoint
const HISTORY_PAGE: u16 = 100;

/// Number of messages to scan, or the reply explaining a bad amount
fn history_limit(amount: Option<i64>) -> Result<u16, &'static str> {
    let amount = amount.unwrap_or(DEFAULT_AMOUNT);
    if amount < 0 {
        return Err("Amount must be a positive number.");
    }
    if amount > MAX_AMOUNT {
        return Err("Amount must be at most 1000.");
    }
    u16::try_from(amount).map_err(|_| "Amount must be at most 1000.")
}

/// Purge every reaction of a user from the recent messages of this channel
#[poise::command(prefix_command, slash_command, owners_only, rename = "purge-user-reactions")]
pub async fn purge_user_reactions(
    ctx: Context<'_>,
    #[description = "User whose reactions to remove"] user: serenity::User,
    #[description = "Messages to scan, 100 by default"]
    #[min = 0]
    #[max = 1000]
    amount: Option<i64>,
) -> Result<(), Error> {
    let limit = match history_limit(amount) {
        Ok(limit) => limit,
        Err(reason) => {
            ctx.reply(reason).await?;
            return Ok(());
        }
    };
    ctx.defer().await?;

    let channel_id = ctx.channel_id();
    let mut remaining = limit;
    let mut before: Option<MessageId> = None;
    let mut removed = 0usize;

    while remaining > 0 {
        let page = remaining.min(HISTORY_PAGE);
        let mut request = GetMessages::new().limit(u8::try_from(page).unwrap_or(u8::MAX));
        if let Some(id) = before {
            request = request.before(id);
        }

        let messages = channel_id.messages(ctx.http(), request).await?;
        let Some(oldest) = messages.last() else {
            break;
        };
        before = Some(oldest.id);

        for message in &messages {
            for reaction in &message.reactions {
                channel_id
                    .delete_reaction(
                        ctx.http(),
                        message.id,
                        Some(user.id),
                        reaction.reaction_type.clone(),
                    )
                    .await?;
                removed += 1;
            }
        }

        let fetched = u16::try_from(messages.len()).unwrap_or(u16::MAX);
        if fetched < page {
            break;
        }
        remaining = remaining.saturating_sub(fetched);
    }

    info!(
        channel_id = %channel_id,
        user_id = %user.id,
        reactions = removed,
        "Purged user reactions"
    );
    ctx.reply("Purged reactions of that user.").await?;
    Ok(())
}

/// Name shown for a reaction in the selection menu
fn reaction_label(reaction: &ReactionType) -> String {
    match reaction {
        ReactionType::Unicode(emoji) => emoji.clone(),
        ReactionType::Custom { name, id, .. } => {
            name.clone().unwrap_or_else(|| id.to_string())
        }
        other => other.to_string(),
    }
}

/// Menu text pairing a letter with each reaction
fn reaction_menu(reactions: &[ReactionType]) -> String {
    let mut menu = String::from("Pick the letter of the emote to purge:\n```\n");
    for (letter, reaction) in ('a'..='z').zip(reactions) {
        menu.push(letter);
        menu.push_str(" - ");
        menu.push_str(&reaction_label(reaction));
        menu.push('\n');
    }
    menu.push_str("```");
    menu
}

/// Remove every reaction of one emote from a message, chosen from a menu
#[poise::command(prefix_command, owners_only, rename = "purge-message-reactions")]
pub async fn purge_message_reactions(
    ctx: Context<'_>,
    #[description = "Message to clean up"] message: serenity::Message,
) -> Result<(), Error> {
    if message.reactions.is_empty() {
        ctx.reply("Message has no reactions to purge.").await?;
        return Ok(());
    }

    let reactions: Vec<ReactionType> = message
        .reactions
        .iter()
        .take(25)
        .map(|reaction| reaction.reaction_type.clone())
        .collect();

    let ctx_id = ctx.id();
    let buttons: Vec<serenity::CreateButton> = ('a'..='z')
        .zip(&reactions)
        .enumerate()
        .map(|(index, (letter, _))| {
            serenity::CreateButton::new(format!("{ctx_id}_{index}"))
                .label(letter.to_string())
                .style(serenity::ButtonStyle::Secondary)
        })
        .collect();
    let rows = buttons
        .chunks(5)
        .map(|row| serenity::CreateActionRow::Buttons(row.to_vec()))
        .collect();

    let reply = ctx
        .send(
            poise::CreateReply::default()
                .content(reaction_menu(&reactions))
                .components(rows),
        )
        .await?;
    let menu = reply.message().await?.into_owned();

    let prefix = format!("{ctx_id}_");
    let interaction = menu
        .await_component_interaction(ctx)
        .author_id(ctx.author().id)
        .custom_ids(
            (0..reactions.len())
                .map(|index| format!("{prefix}{index}"))
                .collect(),
        )
        .timeout(PROMPT_TIMEOUT)
        .await;

    let Some(interaction) = interaction else {
        menu.channel_id
            .edit_message(
                ctx.http(),
                menu.id,
                serenity::EditMessage::new()
                    .content("Timed out. You have 20 seconds to select which emote to remove.")
                    .components(vec![]),
            )
            .await?;
        return Ok(());
    };

    let chosen = interaction
        .data
        .custom_id
        .strip_prefix(&prefix)
        .and_then(|index| index.parse::<usize>().ok())
        .and_then(|index| reactions.get(index))
        .ok_or("unknown reaction selection")?;

    message
        .channel_id
        .delete_reaction_emoji(ctx.http(), message.id, chosen.clone())
        .await?;
    info!(
        channel_id = %message.channel_id,
        message_id = %message.id,
        reaction = %reaction_label(chosen),
        "Purged message reaction"
    );

    interaction
        .create_response(
            ctx.http(),
            serenity::CreateInteractionResponse::UpdateMessage(
                serenity::CreateInteractionResponseMessage::new()
                    .content(format!("Removed {} reaction.", reaction_label(chosen)))
                    .components(vec![]),
            ),
        )
        .await?;
    Ok(())
}
