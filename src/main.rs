use std::sync::Arc;

use lockwarden::config::BotConfig;
use lockwarden::{BOT_NAME, Data, Error, commands, handlers, logging};
use poise::serenity_prelude::{self as serenity};
use serenity::GatewayIntents;
use tracing::{error, info};

/// Main function to run the bot
async fn async_main() -> Result<(), Error> {
    let config = BotConfig::from_env()?;
    logging::init(&config.log_dir)?;

    let http = Arc::new(serenity::Http::new(&config.token));
    let data = Data::load(&config, http).await?;

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
                    if let Err(e) = poise::builtins::on_error(error).await {
                        error!("Error while handling error: {e}");
                    }
                })
            },
            ..Default::default()
        })
        .setup({
            let data = data.clone();
            move |ctx, _ready, framework| {
                Box::pin(async move {
                    logging::log_console("Registering commands");
                    poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                    Ok(data)
                })
            }
        })
        .build();

    // Member events and member listing need the privileged GUILD_MEMBERS intent
    let intents = GatewayIntents::non_privileged()
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_MEMBERS;
    let mut client = serenity::ClientBuilder::new(&config.token, intents)
        .event_handler(handlers::Handler::new(data))
        .framework(framework)
        .await?;

    info!("Starting {BOT_NAME}...");
    client.start().await?;
    Ok(())
}

fn main() {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Failed to start runtime: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(async_main()) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
