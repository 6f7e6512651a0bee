mod config;
mod controller;
mod quiz;
mod session;
mod storage;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use config::{Config, StorageBackend};
use controller::{Controller, OutboundPayload};
use dotenv::dotenv;
use quiz::{gemini::GeminiBackend, generator::QuizGenerator};
use session::{InboundEvent, SessionMachine, UserId, CUSTOM_GENRE, GENRES};
use storage::{KeyValueStore, MemoryStore, PreferenceStore, RedisStore, SessionStore};
use teloxide::{
    prelude::*,
    types::{
        ChatAction, ChatId, KeyboardButton, KeyboardMarkup, KeyboardRemove, Me, ParseMode,
        ReplyMarkup,
    },
    utils::command::BotCommands,
};

type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "These commands are supported:")]
enum Command {
    #[command(description = "start a quiz")]
    Start,
    #[command(description = "choose a music genre")]
    Genre,
    #[command(description = "stop the current quiz")]
    Cancel,
    #[command(description = "contact the developer")]
    Support,
}

#[tokio::main]
async fn main() {
    // Settings may also come straight from the environment (e.g. docker), so .env is optional
    dotenv().ok();

    pretty_env_logger::init();
    log::info!("Starting music quiz bot...");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            log::error!("Invalid configuration: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = run(config).await {
        log::error!("Bot stopped with an error: {err}");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> HandlerResult {
    let bot = Bot::new(&config.bot_token);

    let (kv, redis): (Arc<dyn KeyValueStore>, Option<RedisStore>) = match &config.storage {
        StorageBackend::Redis(redis_config) => {
            log::info!("Establishing connection to Redis...");
            let redis = RedisStore::open(redis_config).await?;
            let kv: Arc<dyn KeyValueStore> = Arc::new(redis.clone());
            (kv, Some(redis))
        }
        StorageBackend::Memory => {
            log::warn!("Using in-memory storage, nothing survives a restart");
            let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
            (kv, None)
        }
    };

    let backend = Arc::new(GeminiBackend::new(
        config.gemini_api_key.clone(),
        &config.gemini_model,
    )?);
    let generator = Arc::new(QuizGenerator::new(backend));
    let preferences = PreferenceStore::new(kv.clone());
    let machine = SessionMachine::new(generator, preferences.clone());
    let controller = Arc::new(Controller::new(
        machine,
        SessionStore::new(kv),
        preferences,
        config.support_contact.clone(),
    ));

    bot.set_my_commands(Command::bot_commands()).await?;
    log::info!("Using model {}, waiting for messages", config.gemini_model);

    Dispatcher::builder(bot, Update::filter_message().endpoint(handle_message))
        .dependencies(dptree::deps![controller])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    if let Some(redis) = redis {
        redis.close();
    }
    Ok(())
}

async fn handle_message(
    bot: Bot,
    controller: Arc<Controller>,
    me: Me,
    msg: Message,
) -> HandlerResult {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let Some(text) = msg.text() else {
        bot.send_message(msg.chat.id, "Please answer with text").await?;
        return Ok(());
    };

    let event = match Command::parse(text, me.username()) {
        Ok(Command::Start) => InboundEvent::Start,
        Ok(Command::Genre) => InboundEvent::Genre,
        Ok(Command::Cancel) => InboundEvent::Cancel,
        Ok(Command::Support) => InboundEvent::Support,
        Err(_) if text == CUSTOM_GENRE || GENRES.contains(&text) => {
            InboundEvent::GenreMenuSelection(text.to_string())
        }
        Err(_) => InboundEvent::FreeText(text.to_string()),
    };

    // We don't really care if the typing indicator fails to show up
    let _ = bot.send_chat_action(msg.chat.id, ChatAction::Typing).await;

    let payload = controller.handle(UserId(user.id.0), event).await;
    send_payload(&bot, msg.chat.id, payload).await
}

async fn send_payload(bot: &Bot, chat_id: ChatId, payload: OutboundPayload) -> HandlerResult {
    bot.send_message(chat_id, payload.text)
        .parse_mode(ParseMode::Html)
        .reply_markup(reply_markup(payload.options))
        .await?;
    Ok(())
}

/// One button per row, or no keyboard at all when there is nothing to pick.
fn reply_markup(options: Vec<String>) -> ReplyMarkup {
    if options.is_empty() {
        return ReplyMarkup::KeyboardRemove(KeyboardRemove::new());
    }

    let keyboard = KeyboardMarkup::new(
        options
            .into_iter()
            .map(|option| vec![KeyboardButton::new(option)]),
    )
    .resize_keyboard(true)
    .input_field_placeholder("Select answer".to_string());
    ReplyMarkup::Keyboard(keyboard)
}
