use dotenvy::dotenv;
use kino_gate::bot::admin;
use kino_gate::bot::handlers::{self, get_user_id_safe, Command};
use kino_gate::bot::state::State;
use kino_gate::config::Settings;
use kino_gate::store::MovieStore;
use std::sync::Arc;
use teloxide::dispatching::dialogue::InMemStorage;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::CallbackQuery;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    dotenv().ok();

    init_logging();

    info!("Starting kino-gate bot...");

    let settings = init_settings();
    let store = init_store(&settings).await;

    let bot = Bot::new(settings.bot_token.clone());
    let dialogue_storage = InMemStorage::<State>::new();
    let handler = schema();

    info!("Bot is running...");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![store, settings, dialogue_storage])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_settings() -> Arc<Settings> {
    match Settings::new() {
        Ok(s) => {
            info!("Configuration loaded successfully.");
            Arc::new(s)
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    }
}

async fn init_store(settings: &Settings) -> Arc<MovieStore> {
    let store = match MovieStore::connect(&settings.database_url).await {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to connect to the database: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = store.migrate().await {
        error!("Failed to migrate the database schema: {}", e);
        std::process::exit(1);
    }
    Arc::new(store)
}

fn schema() -> UpdateHandler<teloxide::RequestError> {
    dptree::entry().branch(callback_branch()).branch(
        Update::filter_message()
            .branch(admin_branch())
            .branch(user_branch()),
    )
}

fn callback_branch() -> UpdateHandler<teloxide::RequestError> {
    Update::filter_callback_query()
        .branch(
            dptree::filter(|q: CallbackQuery| {
                q.data.as_deref() == Some(handlers::CB_CHECK_SUBS)
            })
            .endpoint(handle_check_subs),
        )
        .branch(
            // Admin-only callbacks; anything unauthorized falls through
            // and is silently dropped
            dptree::filter(|q: CallbackQuery, settings: Arc<Settings>| {
                settings.is_admin(q.from.id.0.cast_signed())
            })
            .branch(
                dptree::filter(|q: CallbackQuery| {
                    q.data
                        .as_deref()
                        .is_some_and(|d| d.starts_with(admin::CB_DELETE_CHANNEL_PREFIX))
                })
                .endpoint(handle_delete_channel_callback),
            )
            .branch(
                dptree::filter(|q: CallbackQuery| {
                    q.data.as_deref() == Some(admin::CB_ADD_CHANNEL)
                })
                .endpoint(handle_add_channel_callback),
            ),
        )
}

fn admin_branch() -> UpdateHandler<teloxide::RequestError> {
    // Authorization is evaluated once here; every handler below this
    // filter may assume an admin sender
    dptree::filter(|msg: Message, settings: Arc<Settings>| {
        settings.is_admin(get_user_id_safe(&msg))
    })
    .enter_dialogue::<Message, InMemStorage<State>, State>()
    .branch(
        dptree::entry()
            .filter_command::<Command>()
            .endpoint(handle_admin_command),
    )
    .branch(dptree::case![State::AwaitingVideo].endpoint(handle_receive_video))
    .branch(dptree::case![State::AwaitingDeleteCode].endpoint(handle_receive_delete_code))
    .branch(dptree::case![State::AwaitingChannelId].endpoint(handle_receive_channel_id))
    .branch(
        dptree::case![State::AwaitingChannelUsername { channel_id }]
            .endpoint(handle_receive_channel_username),
    )
    .branch(dptree::case![State::Idle].endpoint(handle_admin_idle))
}

fn user_branch() -> UpdateHandler<teloxide::RequestError> {
    dptree::entry()
        .branch(
            dptree::entry()
                .filter_command::<Command>()
                .endpoint(handle_user_command),
        )
        .branch(
            // Plain text only; unknown commands are dropped
            dptree::filter(|msg: Message| {
                msg.text().is_some_and(|t| !t.starts_with('/'))
            })
            .endpoint(handle_user_message),
        )
}

async fn handle_check_subs(
    bot: Bot,
    q: CallbackQuery,
    store: Arc<MovieStore>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = handlers::check_subs_callback(bot, q, store).await {
        error!("Subscription check callback error: {}", e);
    }
    respond(())
}

async fn handle_delete_channel_callback(
    bot: Bot,
    q: CallbackQuery,
    store: Arc<MovieStore>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = admin::delete_channel_callback(bot, q, store).await {
        error!("Delete channel callback error: {}", e);
    }
    respond(())
}

async fn handle_add_channel_callback(
    bot: Bot,
    q: CallbackQuery,
    storage: Arc<InMemStorage<State>>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = admin::begin_add_channel_callback(bot, q, storage).await {
        error!("Add channel callback error: {}", e);
    }
    respond(())
}

async fn handle_admin_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    store: Arc<MovieStore>,
    dialogue: Dialogue<State, InMemStorage<State>>,
) -> Result<(), teloxide::RequestError> {
    let res = match cmd {
        Command::Start => admin::panel(bot, msg, store, dialogue).await,
        Command::Cancel => admin::cancel(bot, msg, dialogue).await,
    };
    if let Err(e) = res {
        error!("Admin command error: {}", e);
    }
    respond(())
}

async fn handle_admin_idle(
    bot: Bot,
    msg: Message,
    store: Arc<MovieStore>,
    settings: Arc<Settings>,
    dialogue: Dialogue<State, InMemStorage<State>>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = admin::idle(bot, msg, store, settings, dialogue).await {
        error!("Admin menu handler error: {}", e);
    }
    respond(())
}

async fn handle_receive_video(
    bot: Bot,
    msg: Message,
    store: Arc<MovieStore>,
    settings: Arc<Settings>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = admin::receive_video(bot, msg, store, settings).await {
        error!("Add movie handler error: {}", e);
    }
    respond(())
}

async fn handle_receive_delete_code(
    bot: Bot,
    msg: Message,
    store: Arc<MovieStore>,
    dialogue: Dialogue<State, InMemStorage<State>>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = admin::receive_delete_code(bot, msg, store, dialogue).await {
        error!("Delete movie handler error: {}", e);
    }
    respond(())
}

async fn handle_receive_channel_id(
    bot: Bot,
    msg: Message,
    dialogue: Dialogue<State, InMemStorage<State>>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = admin::receive_channel_id(bot, msg, dialogue).await {
        error!("Channel id handler error: {}", e);
    }
    respond(())
}

async fn handle_receive_channel_username(
    bot: Bot,
    msg: Message,
    channel_id: i64,
    store: Arc<MovieStore>,
    dialogue: Dialogue<State, InMemStorage<State>>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = admin::receive_channel_username(bot, msg, channel_id, store, dialogue).await {
        error!("Channel username handler error: {}", e);
    }
    respond(())
}

async fn handle_user_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    store: Arc<MovieStore>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = handlers::user_command(bot, msg, cmd, store).await {
        error!("User command error: {}", e);
    }
    respond(())
}

async fn handle_user_message(
    bot: Bot,
    msg: Message,
    store: Arc<MovieStore>,
    settings: Arc<Settings>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = handlers::user_message(bot, msg, store, settings).await {
        error!("User message handler error: {}", e);
    }
    respond(())
}
