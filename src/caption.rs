//! Caption sanitizing and message formatting.
//!
//! Captions attached to forwarded videos routinely carry links and @mentions
//! pointing at other channels. Before a caption is stored or re-broadcast,
//! every such reference is replaced with the bot's own username so the only
//! handle a viewer ever sees is ours.
//!
//! Patterns are compile-time validated via the `lazy_regex!` macro.

// lazy_regex! uses once_cell internally; patterns are validated at compile time
#![allow(clippy::non_std_lazy_statics)]

use crate::store::Movie;
use lazy_regex::lazy_regex;

/// Match HTTP(S) URLs and bare t.me links
static RE_LINK: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"(https?://\S+|t\.me/\S+)");

/// Match @mention tokens
static RE_MENTION: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"@[A-Za-z0-9_]+");

/// Prefix of the trailing identity block appended to every caption
const IDENTITY_MARKER: &str = "🤖";

/// Rewrites a raw caption so it advertises nothing but this bot.
///
/// Applied in order: links are replaced with `bot_username`, then @mentions,
/// then the result is trimmed. If the bot's username still does not appear,
/// an identity block is appended on a trailing line. Empty input yields just
/// the identity block.
///
/// The function is pure, and a fixed point once the marker is present: the
/// inserted username is itself an @mention and replaces with itself.
///
/// # Examples
///
/// ```
/// use kino_gate::caption::sanitize;
///
/// let out = sanitize("Watch at https://example.com or @other_channel", "@kino_gate_bot");
/// assert_eq!(out, "Watch at @kino_gate_bot or @kino_gate_bot");
///
/// assert_eq!(sanitize("", "@kino_gate_bot"), "🤖 @kino_gate_bot");
/// ```
#[must_use]
pub fn sanitize(raw: &str, bot_username: &str) -> String {
    let text = RE_LINK.replace_all(raw, bot_username);
    let text = RE_MENTION.replace_all(&text, bot_username);
    let text = text.trim();

    if text.is_empty() {
        return format!("{IDENTITY_MARKER} {bot_username}");
    }
    if text.contains(bot_username) {
        text.to_string()
    } else {
        format!("{text}\n\n{IDENTITY_MARKER} {bot_username}")
    }
}

/// Caption used when re-broadcasting a freshly added movie to the public
/// channel: the sanitized caption plus the lookup code.
#[must_use]
pub fn broadcast_caption(clean_caption: &str, code: &str, bot_username: &str) -> String {
    format!("{clean_caption}\n\n🆔 Code: {code}\n{IDENTITY_MARKER} {bot_username}")
}

/// Short HTML summary of a movie for search results and the admin listing.
///
/// The display name originates from user-supplied captions and file names,
/// so it is HTML-escaped before interpolation.
#[must_use]
pub fn movie_summary(movie: &Movie) -> String {
    let name = html_escape::encode_text(movie.video_name.as_deref().unwrap_or("Untitled"));
    format!(
        "🎬 <b>{name}</b>\n🆔 Code: <code>{}</code>\n👁 Views: {}",
        movie.movie_code, movie.views
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const BOT: &str = "@kino_gate_bot";

    fn movie(name: Option<&str>) -> Movie {
        Movie {
            id: 1,
            movie_code: "45".to_string(),
            video_id: "file-id".to_string(),
            video_name: name.map(String::from),
            caption: None,
            views: 3,
            added_at: Utc::now(),
        }
    }

    #[test]
    fn test_empty_input_yields_identity_block_only() {
        assert_eq!(sanitize("", BOT), format!("🤖 {BOT}"));
        assert_eq!(sanitize("   \n ", BOT), format!("🤖 {BOT}"));
    }

    #[test]
    fn test_links_replaced() {
        let out = sanitize("see https://evil.example/path and t.me/other", BOT);
        assert!(!out.contains("https://"));
        assert!(!out.contains("t.me/"));
        assert_eq!(out, format!("see {BOT} and {BOT}"));
    }

    #[test]
    fn test_mentions_replaced() {
        let out = sanitize("join @some_channel now", BOT);
        assert_eq!(out, format!("join {BOT} now"));
    }

    #[test]
    fn test_identity_appended_when_missing() {
        let out = sanitize("Plain caption text", BOT);
        assert_eq!(out, format!("Plain caption text\n\n🤖 {BOT}"));
    }

    #[test]
    fn test_output_always_contains_identity() {
        for input in ["", "hello", "https://x/y", "@anything", "🤖 robots"] {
            assert!(sanitize(input, BOT).contains(BOT), "input: {input:?}");
        }
    }

    #[test]
    fn test_sanitize_is_fixed_point() {
        for input in ["", "some text", "link https://a.b/c and @mention"] {
            let once = sanitize(input, BOT);
            let twice = sanitize(&once, BOT);
            assert_eq!(once, twice, "input: {input:?}");
        }
    }

    #[test]
    fn test_broadcast_caption_carries_code() {
        let out = broadcast_caption("clean text", "17", BOT);
        assert!(out.contains("clean text"));
        assert!(out.contains("Code: 17"));
        assert!(out.contains(BOT));
    }

    #[test]
    fn test_movie_summary_escapes_html() {
        let summary = movie_summary(&movie(Some("<script>alert(1)</script>")));
        assert!(!summary.contains("<script>"));
        assert!(summary.contains("&lt;script&gt;"));
        assert!(summary.contains("<code>45</code>"));
    }

    #[test]
    fn test_movie_summary_untitled_fallback() {
        let summary = movie_summary(&movie(None));
        assert!(summary.contains("Untitled"));
    }
}
