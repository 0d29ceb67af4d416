use crate::banner::{JoinOutcome, MemberJoin};
use crate::{BOT_NAME, Data, EVENT_TARGET};
use poise::serenity_prelude::{
    self as serenity, ChannelId, ChannelType, Context, EventHandler, Guild, GuildId, Member,
    Permissions, Ready, UnavailableGuild,
};
use tracing::{debug, error, info, warn};

/// Serenity event handler; shared state comes from the client's type map
pub struct Handler;

async fn data(ctx: &Context) -> Option<Data> {
    let data = ctx.data.read().await.get::<Data>().cloned();
    if data.is_none() {
        error!(target: EVENT_TARGET, "Bot data missing from the type map");
    }
    data
}

/// Greeting posted in the system channel, which becomes the log channel
fn greeting_with_log_channel() -> String {
    format!(
        "{BOT_NAME} has just joined! Using this channel as the default log channel, \
         this can be changed using the `entrybanner set-log-channel` command."
    )
}

/// Greeting posted when the guild has no system channel
fn greeting_without_log_channel(prefix: &str) -> String {
    format!(
        "{BOT_NAME} has just joined! Please set up the log channel by using \
         `{prefix}entrybanner set-log-channel` to be able to fully use the bot."
    )
}

/// Topmost text channel
fn first_text_channel(
    channels: impl IntoIterator<Item = (ChannelId, ChannelType, u16)>,
) -> Option<ChannelId> {
    channels
        .into_iter()
        .filter(|(_, kind, _)| *kind == ChannelType::Text)
        .min_by_key(|(id, _, position)| (*position, *id))
        .map(|(id, _, _)| id)
}

/// A guild channel as seen by the bot
#[derive(Debug, Clone, Copy)]
struct ChannelView {
    id: ChannelId,
    kind: ChannelType,
    position: u16,
    can_send: bool,
}

/// Where the join greeting goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GreetingTarget {
    /// The system channel, adopted as the log channel
    LogChannel(ChannelId),
    /// Topmost writable text channel; the log channel stays unset
    Fallback(ChannelId),
    Nowhere,
}

fn can_send(permissions: Permissions) -> bool {
    permissions.view_channel() && permissions.send_messages()
}

fn greeting_target(system_channel: Option<ChannelId>, channels: &[ChannelView]) -> GreetingTarget {
    if let Some(id) = system_channel {
        if channels.iter().any(|channel| channel.id == id && channel.can_send) {
            return GreetingTarget::LogChannel(id);
        }
    }

    first_text_channel(
        channels
            .iter()
            .filter(|channel| channel.can_send)
            .map(|channel| (channel.id, channel.kind, channel.position)),
    )
    .map_or(GreetingTarget::Nowhere, GreetingTarget::Fallback)
}

/// Channels of the guild with the bot's effective send permission in each
async fn channel_views(ctx: &Context, guild: &Guild) -> Vec<ChannelView> {
    let bot_id = ctx.cache.current_user().id;
    let member = match guild.member(ctx, bot_id).await {
        Ok(member) => Some(member.into_owned()),
        Err(e) => {
            warn!(target: EVENT_TARGET, guild_id = %guild.id, "Failed to resolve own member: {e}");
            None
        }
    };

    guild
        .channels
        .values()
        .map(|channel| ChannelView {
            id: channel.id,
            kind: channel.kind,
            position: channel.position,
            can_send: member
                .as_ref()
                .is_some_and(|member| can_send(guild.user_permissions_in(channel, member))),
        })
        .collect()
}

async fn greet(ctx: &Context, guild: &Guild, target: GreetingTarget, data: &Data) {
    let (channel_id, text) = match target {
        GreetingTarget::LogChannel(channel_id) => (channel_id, greeting_with_log_channel()),
        GreetingTarget::Fallback(channel_id) => {
            (channel_id, greeting_without_log_channel(&data.prefix))
        }
        GreetingTarget::Nowhere => {
            debug!(target: EVENT_TARGET, guild_id = %guild.id, "No channel to greet in");
            return;
        }
    };

    if let Err(e) = channel_id.say(&ctx.http, text).await {
        warn!(
            target: EVENT_TARGET,
            guild_id = %guild.id,
            channel_id = %channel_id,
            "Failed to send greeting: {e}"
        );
    }
}

#[serenity::async_trait]
impl EventHandler for Handler {
    /// Called when the bot is ready, but the cache may not be fully populated yet.
    async fn ready(&self, ctx: Context, ready: Ready) {
        let user_name = ready.user.name.clone();
        let shard_id = ctx.shard_id;
        info!(target: EVENT_TARGET, "Connected as {user_name}, shard {shard_id}");
    }

    /// Called when the cache is fully populated.
    async fn cache_ready(&self, ctx: Context, guilds: Vec<GuildId>) {
        let guild_count_cache = ctx.cache.guild_count();
        let guild_count = guilds.len();
        if guild_count != guild_count_cache {
            warn!(
                target: EVENT_TARGET,
                "Cache guild count mismatch: {guild_count_cache} (cache) vs {guild_count} (actual)"
            );
        }
        info!(target: EVENT_TARGET, "Cache ready! The bot is in {guild_count} guild(s)");
    }

    /// Register guilds the bot has not seen before and say hello in new ones.
    async fn guild_create(&self, ctx: Context, guild: Guild, is_new: Option<bool>) {
        let Some(data) = data(&ctx).await else {
            return;
        };

        if data.controller().is_known(guild.id.get()) {
            return;
        }

        let target = greeting_target(guild.system_channel_id, &channel_views(&ctx, &guild).await);
        let log_channel = match target {
            GreetingTarget::LogChannel(channel_id) => Some(channel_id.get()),
            GreetingTarget::Fallback(_) | GreetingTarget::Nowhere => None,
        };
        match data.controller().register_guild(guild.id.get(), log_channel).await {
            Ok(true) => {
                info!(
                    target: EVENT_TARGET,
                    guild_id = %guild.id,
                    guild_name = %guild.name,
                    "Joined new guild"
                );
                if is_new != Some(false) {
                    greet(&ctx, &guild, target, &data).await;
                }
            }
            Ok(false) => {}
            Err(e) => error!(
                target: EVENT_TARGET,
                guild_id = %guild.id,
                "Failed to register guild: {e}"
            ),
        }
    }

    /// Stored configs are kept so a returning guild finds its rules again.
    async fn guild_delete(&self, _ctx: Context, incomplete: UnavailableGuild, _full: Option<Guild>) {
        if incomplete.unavailable {
            warn!(target: EVENT_TARGET, guild_id = %incomplete.id, "Guild became unavailable");
        } else {
            info!(target: EVENT_TARGET, guild_id = %incomplete.id, "Removed from guild");
        }
    }

    async fn guild_member_addition(&self, ctx: Context, new_member: Member) {
        let Some(data) = data(&ctx).await else {
            return;
        };

        let join = MemberJoin {
            guild_id: new_member.guild_id.get(),
            user_id: new_member.user.id.get(),
            user_name: new_member.user.name.clone(),
        };

        match data.controller().on_member_join(&join).await {
            JoinOutcome::Banned(rule_id) => debug!(
                target: EVENT_TARGET,
                guild_id = %join.guild_id,
                user_id = %join.user_id,
                rule_id = %rule_id,
                "Join rejected"
            ),
            JoinOutcome::BanFailed(rule_id) => warn!(
                target: EVENT_TARGET,
                guild_id = %join.guild_id,
                user_id = %join.user_id,
                rule_id = %rule_id,
                "Join matched but the ban failed"
            ),
            JoinOutcome::Allowed | JoinOutcome::Ignored => {}
        }
    }
}
