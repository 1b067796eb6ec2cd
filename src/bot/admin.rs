//! Admin panel, stats and the content-management conversations.
//!
//! Authorization is not checked here: every handler in this module sits
//! behind the single admin filter in the dispatch tree, so an unauthorized
//! update never reaches it.

use crate::bot::handlers::{get_user_id_safe, respond_to_query};
use crate::bot::state::State;
use crate::caption;
use crate::config::Settings;
use crate::store::MovieStore;
use anyhow::{anyhow, Result};
use std::sync::Arc;
use teloxide::dispatching::dialogue::InMemStorage;
use teloxide::prelude::*;
use teloxide::types::{
    InlineKeyboardButton, InlineKeyboardMarkup, InputFile, KeyboardButton, KeyboardMarkup,
    KeyboardRemove, ParseMode,
};
use tracing::{error, info};

/// Admin reply-keyboard button labels; matching on these drives the menu.
pub const BTN_ADD_MOVIE: &str = "➕ Add movie";
pub const BTN_DEL_MOVIE: &str = "🗑 Delete movie";
pub const BTN_STATS: &str = "📊 Stats";
pub const BTN_LIST_MOVIES: &str = "🎬 Movie list";
pub const BTN_MANAGE_CHANNELS: &str = "📢 Manage channels";
pub const BTN_ADD_CHANNEL: &str = "➕ Add channel";

/// Callback data of the inline "add channel" button on the channel listing
pub const CB_ADD_CHANNEL: &str = "add_new_channel";
/// Callback data prefix of the per-channel inline delete buttons
pub const CB_DELETE_CHANNEL_PREFIX: &str = "del_ch_";

const MOVIE_LIST_LIMIT: i64 = 20;

const PROMPT_ADD_MOVIE: &str = "🎬 <b>Add movie</b>\n\n\
     Send the movie as a video file. Its caption is kept, with\n\
     links and mentions scrubbed.\n\n\
     ❌ To stop: /cancel";
const PROMPT_DELETE_MOVIE: &str = "🗑 <b>Delete movie</b>\n\n\
     Send the CODE of the movie to delete (for example: 45).\n\
     ❌ To cancel: /cancel";
const PROMPT_ADD_CHANNEL: &str =
    "📢 <b>Add channel</b>\n\nSend the channel ID (for example: -100123456789).";

type AdminDialogue = Dialogue<State, InMemStorage<State>>;

/// The admin reply keyboard shown when no conversation is active.
#[must_use]
pub fn admin_keyboard() -> KeyboardMarkup {
    let keyboard = vec![
        vec![
            KeyboardButton::new(BTN_ADD_MOVIE),
            KeyboardButton::new(BTN_DEL_MOVIE),
        ],
        vec![
            KeyboardButton::new(BTN_STATS),
            KeyboardButton::new(BTN_LIST_MOVIES),
        ],
        vec![
            KeyboardButton::new(BTN_MANAGE_CHANNELS),
            KeyboardButton::new(BTN_ADD_CHANNEL),
        ],
    ];
    KeyboardMarkup::new(keyboard).resize_keyboard()
}

/// `/start` for an admin: reset any conversation and show the panel.
///
/// # Errors
///
/// Returns an error if the dialogue update or the Telegram call fails.
pub async fn panel(
    bot: Bot,
    msg: Message,
    store: Arc<MovieStore>,
    dialogue: AdminDialogue,
) -> Result<()> {
    let user_id = get_user_id_safe(&msg);
    store.add_user(user_id).await;
    store.touch_user_activity(user_id).await;

    dialogue
        .update(State::Idle)
        .await
        .map_err(|e| anyhow!(e.to_string()))?;

    bot.send_message(
        msg.chat.id,
        "👋 Welcome back, Admin!\n\n🎬 <b>Control panel</b>",
    )
    .parse_mode(ParseMode::Html)
    .reply_markup(admin_keyboard())
    .await?;
    Ok(())
}

/// `/cancel`: universal fallback out of any conversation state.
///
/// # Errors
///
/// Returns an error if the dialogue update or the Telegram call fails.
pub async fn cancel(bot: Bot, msg: Message, dialogue: AdminDialogue) -> Result<()> {
    dialogue
        .update(State::Idle)
        .await
        .map_err(|e| anyhow!(e.to_string()))?;
    bot.send_message(msg.chat.id, "❌ Cancelled.")
        .reply_markup(admin_keyboard())
        .await?;
    Ok(())
}

/// Idle-state admin messages: menu buttons start a flow or a report;
/// anything else is treated as a movie lookup (admins skip the gate).
///
/// # Errors
///
/// Returns an error if a dialogue update or Telegram call fails.
pub async fn idle(
    bot: Bot,
    msg: Message,
    store: Arc<MovieStore>,
    settings: Arc<Settings>,
    dialogue: AdminDialogue,
) -> Result<()> {
    let Some(text) = msg.text().map(str::trim) else {
        return Ok(());
    };

    if let Some((state, prompt)) = flow_entry(text) {
        dialogue
            .update(state)
            .await
            .map_err(|e| anyhow!(e.to_string()))?;
        bot.send_message(msg.chat.id, prompt)
            .parse_mode(ParseMode::Html)
            .reply_markup(KeyboardRemove::new())
            .await?;
        return Ok(());
    }

    match text {
        BTN_STATS => stats(&bot, &msg, &store).await?,
        BTN_LIST_MOVIES => list_movies(&bot, &msg, &store).await?,
        BTN_MANAGE_CHANNELS => manage_channels(&bot, &msg, &store).await?,
        "" => {}
        other if other.starts_with('/') => {}
        other => {
            store.touch_user_activity(get_user_id_safe(&msg)).await;
            respond_to_query(&bot, &msg, &store, &settings, other).await?;
        }
    }
    Ok(())
}

/// Add-movie flow: consume one video, assign the next code, persist,
/// re-broadcast to the public channel — and stay in the same state so the
/// admin can keep sending videos.
///
/// # Errors
///
/// Returns an error if a Telegram call fails.
pub async fn receive_video(
    bot: Bot,
    msg: Message,
    store: Arc<MovieStore>,
    settings: Arc<Settings>,
) -> Result<()> {
    let Some(video) = msg.video() else {
        bot.send_message(
            msg.chat.id,
            "❌ Please send a video file, or /cancel to stop.",
        )
        .await?;
        return Ok(());
    };

    let raw_caption = msg.caption().unwrap_or("");
    let name = display_name(msg.caption(), video.file_name.as_deref());
    let clean = caption::sanitize(raw_caption, &settings.bot_username);
    // Sequential assignment; under concurrent admins the unique constraint
    // rejects the loser and the failure reply below covers it
    let code = next_code(store.count_movies().await);

    let file_id = video.file.id.clone();
    if !store
        .add_movie(&code, file_id.0.as_str(), &name, Some(&clean))
        .await
    {
        bot.send_message(
            msg.chat.id,
            "❌ Could not save the movie. Please try again.",
        )
        .reply_markup(KeyboardRemove::new())
        .await?;
        return Ok(());
    }

    info!(%code, %name, "movie added");

    let broadcast = bot
        .send_video(
            ChatId(settings.channel_id),
            InputFile::file_id(file_id.clone()),
        )
        .caption(caption::broadcast_caption(
            &clean,
            &code,
            &settings.bot_username,
        ))
        .parse_mode(ParseMode::Html)
        .await;

    let reply = match broadcast {
        Ok(_) => format!(
            "✅ <b>Movie added!</b>\n\n\
             🆔 Code: <code>{code}</code>\n\
             🎬 Name: {}\n\n\
             <i>Posted to the channel.</i>\n\
             ➡️ <b>You can send the next video…</b>\n\
             ❌ To stop: /cancel",
            html_escape::encode_text(&name)
        ),
        Err(e) => {
            error!(%code, error = %e, "broadcast to public channel failed");
            format!(
                "⚠️ Movie saved with code <code>{code}</code>, but posting \
                 to the channel failed. You can send the next video or /cancel."
            )
        }
    };

    bot.send_message(msg.chat.id, reply)
        .parse_mode(ParseMode::Html)
        .reply_markup(KeyboardRemove::new())
        .await?;
    Ok(())
}

/// Delete-movie flow: one code, one attempt, always back to idle.
///
/// # Errors
///
/// Returns an error if a dialogue update or Telegram call fails.
pub async fn receive_delete_code(
    bot: Bot,
    msg: Message,
    store: Arc<MovieStore>,
    dialogue: AdminDialogue,
) -> Result<()> {
    let Some(code) = msg.text().map(str::trim).filter(|t| !t.is_empty()) else {
        bot.send_message(msg.chat.id, "❌ Send the movie code as text, or /cancel.")
            .await?;
        return Ok(());
    };

    let reply = if store.delete_movie(code).await {
        format!(
            "✅ <b>Movie deleted!</b>\n\
             Code: {code}\n\n\
             <i>Note: the channel post stays up, but the movie is no longer \
             served by the bot.</i>"
        )
    } else {
        format!("❌ <b>Error!</b>\nNo movie with that code: {code}")
    };

    bot.send_message(msg.chat.id, reply)
        .parse_mode(ParseMode::Html)
        .reply_markup(admin_keyboard())
        .await?;

    dialogue
        .update(State::Idle)
        .await
        .map_err(|e| anyhow!(e.to_string()))?;
    Ok(())
}

/// Add-channel flow, step 1: the numeric channel id. Non-integer input
/// re-prompts without advancing.
///
/// # Errors
///
/// Returns an error if a dialogue update or Telegram call fails.
pub async fn receive_channel_id(bot: Bot, msg: Message, dialogue: AdminDialogue) -> Result<()> {
    let Some(next) = msg.text().and_then(channel_id_transition) else {
        bot.send_message(msg.chat.id, "❌ The ID must be a number!")
            .await?;
        return Ok(());
    };

    dialogue
        .update(next)
        .await
        .map_err(|e| anyhow!(e.to_string()))?;
    bot.send_message(
        msg.chat.id,
        "Now send the channel username (for example: @movies):",
    )
    .await?;
    Ok(())
}

/// Add-channel flow, step 2: the display handle, taken verbatim.
///
/// # Errors
///
/// Returns an error if a dialogue update or Telegram call fails.
pub async fn receive_channel_username(
    bot: Bot,
    msg: Message,
    channel_id: i64,
    store: Arc<MovieStore>,
    dialogue: AdminDialogue,
) -> Result<()> {
    let Some(username) = msg.text().map(str::trim).filter(|t| !t.is_empty()) else {
        bot.send_message(msg.chat.id, "❌ Send the channel username as text, or /cancel.")
            .await?;
        return Ok(());
    };

    let reply = if store.add_channel(channel_id, Some(username), true).await {
        format!("✅ Channel added: {}", html_escape::encode_text(username))
    } else {
        "❌ Could not add the channel (already registered?)".to_string()
    };

    bot.send_message(msg.chat.id, reply)
        .parse_mode(ParseMode::Html)
        .reply_markup(admin_keyboard())
        .await?;

    dialogue
        .update(State::Idle)
        .await
        .map_err(|e| anyhow!(e.to_string()))?;
    Ok(())
}

/// Inline "add channel" button on the channel listing: enters the same
/// add-channel flow as the menu button.
///
/// # Errors
///
/// Returns an error if a dialogue update or Telegram call fails.
pub async fn begin_add_channel_callback(
    bot: Bot,
    q: CallbackQuery,
    storage: Arc<InMemStorage<State>>,
) -> Result<()> {
    let _ = bot.answer_callback_query(q.id.clone()).await;

    let Some(chat_id) = q.message.as_ref().map(|m| m.chat().id) else {
        return Ok(());
    };

    let dialogue: AdminDialogue = Dialogue::new(storage, chat_id);
    dialogue
        .update(State::AwaitingChannelId)
        .await
        .map_err(|e| anyhow!(e.to_string()))?;

    bot.send_message(chat_id, PROMPT_ADD_CHANNEL)
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

/// Per-channel inline delete button on the channel listing.
///
/// # Errors
///
/// Returns an error if a Telegram call fails.
pub async fn delete_channel_callback(
    bot: Bot,
    q: CallbackQuery,
    store: Arc<MovieStore>,
) -> Result<()> {
    let Some(channel_id) = q
        .data
        .as_deref()
        .and_then(|d| d.strip_prefix(CB_DELETE_CHANNEL_PREFIX))
        .and_then(|raw| raw.parse::<i64>().ok())
    else {
        let _ = bot.answer_callback_query(q.id.clone()).await;
        return Ok(());
    };

    if store.delete_channel(channel_id).await {
        let _ = bot
            .answer_callback_query(q.id.clone())
            .text("Channel removed!")
            .await;
        if let Some(m) = q.message.as_ref() {
            let _ = bot.delete_message(m.chat().id, m.id()).await;
        }
    } else {
        let _ = bot
            .answer_callback_query(q.id.clone())
            .text("Failed to remove the channel")
            .await;
    }
    Ok(())
}

async fn stats(bot: &Bot, msg: &Message, store: &MovieStore) -> Result<()> {
    let total_users = store.count_users().await;
    let active_today = store.count_active_users_today().await;
    let total_movies = store.count_movies().await;

    bot.send_message(
        msg.chat.id,
        format!(
            "📊 <b>Stats</b>\n\n\
             👥 Users: {total_users}\n\
             ⚡️ Active today: {active_today}\n\
             🎬 Movies: {total_movies}"
        ),
    )
    .parse_mode(ParseMode::Html)
    .await?;
    Ok(())
}

async fn list_movies(bot: &Bot, msg: &Message, store: &MovieStore) -> Result<()> {
    let movies = store.list_movies(MOVIE_LIST_LIMIT).await;
    if movies.is_empty() {
        bot.send_message(msg.chat.id, "📭 No movies yet").await?;
        return Ok(());
    }

    let mut text = format!("🎬 <b>Latest {MOVIE_LIST_LIMIT} movies:</b>\n\n");
    for movie in &movies {
        let name = html_escape::encode_text(movie.video_name.as_deref().unwrap_or("Untitled"));
        text.push_str(&format!(
            "• {name} (Code: <code>{}</code>)\n",
            movie.movie_code
        ));
    }

    bot.send_message(msg.chat.id, text)
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

async fn manage_channels(bot: &Bot, msg: &Message, store: &MovieStore) -> Result<()> {
    let channels = store.all_channels().await;

    let mut text = String::from("📢 <b>Channels:</b>\n\n");
    let mut keyboard: Vec<Vec<InlineKeyboardButton>> = Vec::new();

    if channels.is_empty() {
        text.push_str("No channels yet.");
    }
    for channel in &channels {
        let label = channel
            .channel_username
            .clone()
            .unwrap_or_else(|| format!("ID: {}", channel.channel_id));
        text.push_str(&format!("• {}\n", html_escape::encode_text(&label)));
        keyboard.push(vec![InlineKeyboardButton::callback(
            format!("🗑 Remove: {label}"),
            format!("{CB_DELETE_CHANNEL_PREFIX}{}", channel.channel_id),
        )]);
    }
    keyboard.push(vec![InlineKeyboardButton::callback(
        "➕ Add channel",
        CB_ADD_CHANNEL,
    )]);

    bot.send_message(msg.chat.id, text)
        .parse_mode(ParseMode::Html)
        .reply_markup(InlineKeyboardMarkup::new(keyboard))
        .await?;
    Ok(())
}

const DISPLAY_NAME_MAX_CHARS: usize = 100;

/// Next sequential movie code, derived from the current count.
fn next_code(count: i64) -> String {
    (count + 1).to_string()
}

/// Display name for a new movie: first caption line (truncated), else the
/// file name, else a placeholder.
fn display_name(raw_caption: Option<&str>, file_name: Option<&str>) -> String {
    let from_caption = raw_caption
        .and_then(|c| c.lines().next())
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| truncate_chars(line, DISPLAY_NAME_MAX_CHARS));

    from_caption
        .or_else(|| file_name.map(String::from))
        .unwrap_or_else(|| "Untitled movie".to_string())
}

/// UTF-8 safe truncation by character count.
fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((pos, _)) => s[..pos].to_string(),
        None => s.to_string(),
    }
}

/// Channel ids must parse as integers; anything else re-prompts.
fn parse_channel_id(text: &str) -> Option<i64> {
    text.trim().parse::<i64>().ok()
}

/// Conversation entry from an idle-state menu button: the state to move to
/// and the prompt to send. Non-button text is a lookup, not a flow.
fn flow_entry(text: &str) -> Option<(State, &'static str)> {
    match text {
        BTN_ADD_MOVIE => Some((State::AwaitingVideo, PROMPT_ADD_MOVIE)),
        BTN_DEL_MOVIE => Some((State::AwaitingDeleteCode, PROMPT_DELETE_MOVIE)),
        BTN_ADD_CHANNEL => Some((State::AwaitingChannelId, PROMPT_ADD_CHANNEL)),
        _ => None,
    }
}

/// Step decision for the channel-id state. `None` keeps the conversation
/// where it is.
fn channel_id_transition(text: &str) -> Option<State> {
    parse_channel_id(text).map(|channel_id| State::AwaitingChannelUsername { channel_id })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_code_is_sequential() {
        // Two back-to-back additions see counts N and N+1
        assert_eq!(next_code(0), "1");
        assert_eq!(next_code(41), "42");
        assert_eq!(next_code(42), "43");
    }

    #[test]
    fn test_menu_buttons_enter_their_flows() {
        assert_eq!(
            flow_entry(BTN_ADD_MOVIE).map(|(s, _)| s),
            Some(State::AwaitingVideo)
        );
        assert_eq!(
            flow_entry(BTN_DEL_MOVIE).map(|(s, _)| s),
            Some(State::AwaitingDeleteCode)
        );
        assert_eq!(
            flow_entry(BTN_ADD_CHANNEL).map(|(s, _)| s),
            Some(State::AwaitingChannelId)
        );
        // Reports and free text never start a conversation
        assert_eq!(flow_entry(BTN_STATS), None);
        assert_eq!(flow_entry("the matrix"), None);
    }

    #[test]
    fn test_channel_id_step_requires_numeric_id() {
        assert_eq!(
            channel_id_transition("-100123456789"),
            Some(State::AwaitingChannelUsername {
                channel_id: -100_123_456_789
            })
        );
        // Bad input does not advance the conversation
        assert_eq!(channel_id_transition("@movies"), None);
        assert_eq!(channel_id_transition("soon"), None);
    }

    #[test]
    fn test_parse_channel_id() {
        assert_eq!(parse_channel_id("-100123456789"), Some(-100_123_456_789));
        assert_eq!(parse_channel_id(" 42 "), Some(42));
        assert_eq!(parse_channel_id("@movies"), None);
        assert_eq!(parse_channel_id("12.5"), None);
        assert_eq!(parse_channel_id(""), None);
    }

    #[test]
    fn test_display_name_prefers_caption_first_line() {
        let name = display_name(Some("The Matrix\nsecond line"), Some("file.mp4"));
        assert_eq!(name, "The Matrix");
    }

    #[test]
    fn test_display_name_falls_back_to_file_name() {
        assert_eq!(display_name(None, Some("file.mp4")), "file.mp4");
        assert_eq!(display_name(Some("   \n"), Some("file.mp4")), "file.mp4");
        assert_eq!(display_name(None, None), "Untitled movie");
    }

    #[test]
    fn test_display_name_truncates_long_captions() {
        let long = "x".repeat(500);
        assert_eq!(display_name(Some(&long), None).chars().count(), 100);

        // Multi-byte characters are not split
        let cyrillic = "я".repeat(500);
        let name = display_name(Some(&cyrillic), None);
        assert_eq!(name.chars().count(), 100);
    }
}
