//! User-facing handlers: the subscription gate, code lookup, name search
//! and video delivery.

use crate::caption;
use crate::config::Settings;
use crate::store::{Movie, MovieStore};
use crate::subscription::{check_subscription, format_channels_list};
use anyhow::Result;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{
    FileId, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, KeyboardRemove, ParseMode,
};
use teloxide::utils::command::BotCommands;
use tracing::info;

/// Callback data of the inline "check subscription" button on gate prompts
pub const CB_CHECK_SUBS: &str = "check_subs";

/// Supported commands for the bot
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    /// Start the bot and show the appropriate menu
    #[command(description = "Start the bot.")]
    Start,
    /// Abort the current admin conversation
    #[command(description = "Cancel the current action.")]
    Cancel,
}

/// Safe extraction of user ID from a message.
/// Returns 0 if the user information is missing.
#[must_use]
pub fn get_user_id_safe(msg: &Message) -> i64 {
    msg.from.as_ref().map_or(0, |u| u.id.0.cast_signed())
}

fn get_user_first_name(msg: &Message) -> String {
    msg.from
        .as_ref()
        .map(|u| u.first_name.clone())
        .unwrap_or_else(|| "there".to_string())
}

/// `/start` for regular users: register, gate, welcome.
///
/// # Errors
///
/// Returns an error if a Telegram API call fails.
pub async fn user_start(bot: Bot, msg: Message, store: Arc<MovieStore>) -> Result<()> {
    let user_id = get_user_id_safe(&msg);
    store.add_user(user_id).await;
    store.touch_user_activity(user_id).await;

    if !pass_gate(&bot, &msg, &store).await? {
        return Ok(());
    }

    let name = html_escape::encode_text(&get_user_first_name(&msg)).to_string();
    bot.send_message(
        msg.chat.id,
        format!(
            "👋 Hello, <b>{name}</b>!\n\n\
             🎬 Send a movie code (for example: <code>45</code>)\n\
             or type a movie title to search."
        ),
    )
    .parse_mode(ParseMode::Html)
    .reply_markup(KeyboardRemove::new())
    .await?;
    Ok(())
}

/// Commands in the regular-user branch.
///
/// # Errors
///
/// Returns an error if a Telegram API call fails.
pub async fn user_command(bot: Bot, msg: Message, cmd: Command, store: Arc<MovieStore>) -> Result<()> {
    match cmd {
        Command::Start => user_start(bot, msg, store).await,
        Command::Cancel => {
            bot.send_message(msg.chat.id, "❌ Cancelled.")
                .reply_markup(KeyboardRemove::new())
                .await?;
            Ok(())
        }
    }
}

/// Free-text message from a regular user: touch activity, gate, then
/// either a code lookup or a title search.
///
/// # Errors
///
/// Returns an error if a Telegram API call fails.
pub async fn user_message(
    bot: Bot,
    msg: Message,
    store: Arc<MovieStore>,
    settings: Arc<Settings>,
) -> Result<()> {
    let Some(text) = msg.text().map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(());
    };
    let text = text.to_string();

    let user_id = get_user_id_safe(&msg);
    store.add_user(user_id).await;
    store.touch_user_activity(user_id).await;

    if !pass_gate(&bot, &msg, &store).await? {
        return Ok(());
    }

    respond_to_query(&bot, &msg, &store, &settings, &text).await
}

/// The "✅ Check subscription" inline button: re-run the gate and either
/// complain or clear the prompt.
///
/// # Errors
///
/// Returns an error if a Telegram API call fails.
pub async fn check_subs_callback(bot: Bot, q: CallbackQuery, store: Arc<MovieStore>) -> Result<()> {
    let _ = bot.answer_callback_query(q.id.clone()).await;

    let Some(chat_id) = q.message.as_ref().map(|m| m.chat().id) else {
        return Ok(());
    };

    let required = store.required_channels().await;
    if !required.is_empty() {
        let missing = check_subscription(&bot, q.from.id.0, &required).await;
        if !missing.is_empty() {
            bot.send_message(chat_id, "❌ You have not joined all the channels yet!")
                .await?;
            return Ok(());
        }
    }

    // Gate is open: remove the prompt and confirm
    if let Some(m) = q.message.as_ref() {
        let _ = bot.delete_message(chat_id, m.id()).await;
    }
    bot.send_message(chat_id, "✅ Subscription confirmed!")
        .await?;
    Ok(())
}

/// Runs the subscription gate for the message's sender. Returns true if
/// access is granted; otherwise sends the join-these-channels prompt and
/// returns false.
async fn pass_gate(bot: &Bot, msg: &Message, store: &MovieStore) -> Result<bool> {
    let required = store.required_channels().await;
    if required.is_empty() {
        return Ok(true);
    }

    let user_id = get_user_id_safe(msg).cast_unsigned();
    let missing = check_subscription(bot, user_id, &required).await;
    if missing.is_empty() {
        return Ok(true);
    }

    info!(user_id, missing = missing.len(), "gate closed");
    let keyboard = InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "✅ Check subscription",
        CB_CHECK_SUBS,
    )]]);
    bot.send_message(msg.chat.id, format_channels_list(&missing))
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboard)
        .await?;
    Ok(false)
}

/// A movie code is plain digits; anything else is a title search.
fn is_code(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c.is_ascii_digit())
}

/// Shared lookup used by both the user branch (post-gate) and admin idle
/// text. Digits resolve by code; everything else searches by name.
pub(crate) async fn respond_to_query(
    bot: &Bot,
    msg: &Message,
    store: &MovieStore,
    settings: &Settings,
    text: &str,
) -> Result<()> {
    if is_code(text) {
        match store.movie_by_code(text).await {
            Some(movie) => deliver_movie(bot, msg.chat.id, store, settings, &movie).await?,
            None => {
                bot.send_message(msg.chat.id, "❌ Movie not found.").await?;
            }
        }
        return Ok(());
    }

    let movies = store.search_movies(text).await;
    if movies.is_empty() {
        bot.send_message(msg.chat.id, "🔍 Nothing found. Try a different title.")
            .await?;
        return Ok(());
    }

    let listing = movies
        .iter()
        .map(caption::movie_summary)
        .collect::<Vec<_>>()
        .join("\n\n");
    bot.send_message(msg.chat.id, listing)
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

/// Send the stored video and bump its view counter. The increment is a
/// detached task; the reply never waits on it and its failures are logged
/// by the store.
async fn deliver_movie(
    bot: &Bot,
    chat_id: ChatId,
    store: &MovieStore,
    settings: &Settings,
    movie: &Movie,
) -> Result<()> {
    let clean = caption::sanitize(
        movie.caption.as_deref().unwrap_or(""),
        &settings.bot_username,
    );

    bot.send_video(chat_id, InputFile::file_id(FileId(movie.video_id.clone())))
        .caption(clean)
        .parse_mode(ParseMode::Html)
        .await?;

    let store = store.clone();
    let code = movie.movie_code.clone();
    tokio::spawn(async move {
        store.increment_views(&code).await;
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_code() {
        assert!(is_code("45"));
        assert!(is_code("007"));
        assert!(!is_code(""));
        assert!(!is_code("45a"));
        assert!(!is_code("the matrix"));
        assert!(!is_code("-1"));
    }
}
