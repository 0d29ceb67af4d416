use std::sync::Arc;

use entry_warden::banner::SerenityPlatform;
use entry_warden::config::BotConfig;
use entry_warden::{Data, Error, commands, handlers, logging, store};
use poise::serenity_prelude::{self as serenity};
use serenity::GatewayIntents;
use tracing::{error, info};

/// Main function to run the bot
async fn async_main() -> Result<(), Error> {
    let config = BotConfig::from_env()?;

    if !config.data_dir.exists() {
        std::fs::create_dir_all(&config.data_dir)?;
    }
    logging::init(&config.log_dir)?;

    let store = store::open(config.store, &config.data_dir).await?;
    info!("Opened {} store in {}", config.store, config.data_dir.display());

    let http = Arc::new(serenity::Http::new(&config.token));
    let platform = Arc::new(SerenityPlatform::new(Arc::clone(&http)));
    let data = Data::load(&config, store, platform).await?;

    let framework_data = data.clone();
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all(),
            prefix_options: poise::PrefixFrameworkOptions {
                prefix: Some(config.prefix.clone()),
                ..Default::default()
            },
            pre_command: |ctx| {
                Box::pin(async move {
                    logging::log_command_start(ctx);
                })
            },
            post_command: |ctx| {
                Box::pin(async move {
                    logging::log_command_end(ctx);
                })
            },
            on_error: |error| {
                Box::pin(async move {
                    logging::log_command_error(&error);
                    if let poise::FrameworkError::MissingUserPermissions { ctx, .. } = &error {
                        if let Err(e) = ctx.reply("error; you need the Administrator permission.").await {
                            error!("Failed to reply to unauthorized command: {e}");
                        }
                    }
                })
            },
            ..Default::default()
        })
        .setup(|ctx, _ready, framework| {
            Box::pin(async move {
                logging::log_console("Registering commands");
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                Ok(framework_data)
            })
        })
        .build();

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;
    let mut client = serenity::ClientBuilder::new(&config.token, intents)
        .type_map_insert::<Data>(data.clone())
        .event_handler(handlers::Handler)
        .framework(framework)
        .await?;

    let shard_manager = Arc::clone(&client.shard_manager);

    info!("Starting bot...");
    let run = tokio::select! {
        result = client.start() => result.map_err(Error::from),
        signal = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            shard_manager.shutdown_all().await;
            signal.map_err(Error::from)
        }
    };

    if let Err(e) = data.close().await {
        error!("Failed to close the store: {e}");
    }
    info!("Store closed");

    run
}

fn main() {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Error: failed to start the runtime: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(async_main()) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
