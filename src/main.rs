use std::collections::HashSet;
use std::env;
use std::sync::Arc;
use std::time::Duration;

use brig_keeper::brig::{BrigService, BrigStore, SerenityGateway};
use brig_keeper::config::{BotConfig, DEFAULT_CONFIG_PATH};
use brig_keeper::error::on_error;
use brig_keeper::{BOT_NAME, Data, Error, commands, handlers, logging};
use poise::serenity_prelude::{self as serenity, GatewayIntents, UserId};
use tracing::{error, info};

/// Main function to run the bot
async fn async_main() -> Result<(), Error> {
    let config_path = env::var("BOT_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = BotConfig::load(&config_path).await?;

    logging::init(&config.log_dir)?;

    let token = env::var("DISCORD_TOKEN").map_err(|_| "DISCORD_TOKEN must be set")?;

    // Load the brig before connecting so the first sweep sees every sentence
    let store = BrigStore::open(&config.data_file).await?;
    info!("Loaded {} brig sentence(s) from {}", store.len(), config.data_file);

    let owners: HashSet<UserId> = config
        .owners
        .iter()
        .filter(|id| **id != 0)
        .map(|id| UserId::new(*id))
        .collect();
    let prefix = config.prefix.clone();
    let activity = config.activity.clone();

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all(),
            prefix_options: poise::PrefixFrameworkOptions {
                prefix: Some(prefix),
                ..Default::default()
            },
            owners,
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
            on_error: |error| Box::pin(on_error(error)),
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                logging::log_console("Registering commands globally");
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                let gateway = SerenityGateway::new(
                    ctx.http.clone(),
                    ctx.cache.clone(),
                    config.brig_role.clone(),
                );
                let brig = BrigService::new(
                    store,
                    Arc::new(gateway),
                    config.brig_role.clone(),
                    config.phrases.clone(),
                );
                let period = Duration::from_secs(config.sweep_interval_secs.max(1));
                let sweeper = brig.start_sweeper(period);

                let data = Data::new(config, brig, sweeper);
                ctx.data.write().await.insert::<Data>(data.clone());
                Ok(data)
            })
        })
        .build();

    let intents = GatewayIntents::non_privileged()
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_MEMBERS;
    let mut client = serenity::ClientBuilder::new(token, intents)
        .event_handler(handlers::Handler::new(activity))
        .framework(framework)
        .await?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, shutting down");
            shard_manager.shutdown_all().await;
        }
    });

    info!("Starting {BOT_NAME}...");
    client.start().await?;

    info!("{BOT_NAME} stopped");
    Ok(())
}

fn main() {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Failed to start the async runtime: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(async_main()) {
        error!("Fatal error: {err}");
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
