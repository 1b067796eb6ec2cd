//! Mandatory channel-subscription gate.
//!
//! Before serving a non-admin user, the bot asks Telegram for the user's
//! membership status in every required channel. The check is fail-closed:
//! a user who has left, was kicked or banned is not subscribed, and so is
//! any channel the bot cannot query (missing admin rights, deleted channel).
//! Nothing is cached; every gate is checked fresh.

use crate::store::Channel;
use anyhow::Result;
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ChatId, UserId};
use tracing::warn;

/// Seam over the platform's membership lookup, so the gating algorithm is
/// testable without a live bot.
#[async_trait]
pub trait MembershipApi {
    /// True if the user is currently present in the channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform query fails; callers treat that as
    /// not-subscribed.
    async fn is_member(&self, channel_id: i64, user_id: u64) -> Result<bool>;
}

#[async_trait]
impl MembershipApi for Bot {
    async fn is_member(&self, channel_id: i64, user_id: u64) -> Result<bool> {
        let member = self
            .get_chat_member(ChatId(channel_id), UserId(user_id))
            .await?;
        // left / kicked / banned all count as absent
        Ok(member.is_present())
    }
}

/// Returns the subset of `required` the user is NOT subscribed to, in input
/// order. Channels are checked independently; an empty result means the
/// gate is open.
pub async fn check_subscription<A>(api: &A, user_id: u64, required: &[Channel]) -> Vec<Channel>
where
    A: MembershipApi + Sync,
{
    let mut missing = Vec::new();
    for channel in required {
        match api.is_member(channel.channel_id, user_id).await {
            Ok(true) => {}
            Ok(false) => missing.push(channel.clone()),
            Err(e) => {
                // Fail closed: an unanswerable channel blocks access
                warn!(
                    channel_id = channel.channel_id,
                    user_id,
                    error = %e,
                    "membership check failed, treating as not subscribed"
                );
                missing.push(channel.clone());
            }
        }
    }
    missing
}

/// HTML message listing the channels a user still has to join. Public
/// channels render as @handles; private ones get a tg:// deep link.
#[must_use]
pub fn format_channels_list(channels: &[Channel]) -> String {
    let mut text = String::from("⚠️ <b>Subscribe to these channels to use the bot:</b>\n\n");

    for channel in channels {
        match channel.channel_username.as_deref() {
            Some(handle) if !handle.is_empty() => {
                if handle.starts_with('@') {
                    text.push_str(&format!("➕ {handle}\n"));
                } else {
                    text.push_str(&format!("➕ @{handle}\n"));
                }
            }
            _ => {
                // Private channel: strip the -100 supergroup prefix for the link
                let raw = channel.channel_id.to_string();
                let peer = raw.strip_prefix("-100").unwrap_or(&raw);
                text.push_str(&format!(
                    "➕ <a href=\"tg://resolve?domain=c&amp;post={peer}\">Open channel</a>\n"
                ));
            }
        }
    }

    text.push_str("\n✅ <i>Once subscribed, press «Check».</i>");
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    /// Scripted membership source: known members, channels that error out,
    /// everyone else absent.
    struct StubApi {
        members: HashMap<i64, HashSet<u64>>,
        failing: HashSet<i64>,
    }

    impl StubApi {
        fn new() -> Self {
            Self {
                members: HashMap::new(),
                failing: HashSet::new(),
            }
        }

        fn with_member(mut self, channel_id: i64, user_id: u64) -> Self {
            self.members.entry(channel_id).or_default().insert(user_id);
            self
        }

        fn with_failing(mut self, channel_id: i64) -> Self {
            self.failing.insert(channel_id);
            self
        }
    }

    #[async_trait]
    impl MembershipApi for StubApi {
        async fn is_member(&self, channel_id: i64, user_id: u64) -> Result<bool> {
            if self.failing.contains(&channel_id) {
                anyhow::bail!("bot is not an administrator of channel {channel_id}");
            }
            Ok(self
                .members
                .get(&channel_id)
                .is_some_and(|m| m.contains(&user_id)))
        }
    }

    fn channel(id: i64, username: Option<&str>) -> Channel {
        Channel {
            id: 0,
            channel_id: id,
            channel_username: username.map(String::from),
            required: true,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn test_left_channel_reported_member_channel_not() {
        let api = StubApi::new().with_member(-200, 7);
        let required = vec![channel(-100, Some("@a")), channel(-200, Some("@b"))];

        let missing = check_subscription(&api, 7, &required).await;

        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].channel_id, -100);
    }

    #[tokio::test]
    async fn test_query_error_fails_closed() {
        let api = StubApi::new().with_failing(-300);
        let required = vec![channel(-300, Some("@broken"))];

        let missing = check_subscription(&api, 1, &required).await;

        assert_eq!(missing.len(), 1);
    }

    #[tokio::test]
    async fn test_fully_subscribed_user_passes() {
        let api = StubApi::new().with_member(-1, 9).with_member(-2, 9);
        let required = vec![channel(-1, None), channel(-2, None)];

        assert!(check_subscription(&api, 9, &required).await.is_empty());
    }

    #[tokio::test]
    async fn test_result_preserves_input_order() {
        let api = StubApi::new();
        let required = vec![channel(-3, None), channel(-1, None), channel(-2, None)];

        let missing = check_subscription(&api, 5, &required).await;

        let ids: Vec<i64> = missing.iter().map(|c| c.channel_id).collect();
        assert_eq!(ids, vec![-3, -1, -2]);
    }

    #[test]
    fn test_channels_list_formats_handles() {
        let channels = vec![channel(-1, Some("@movies")), channel(-2, Some("series"))];
        let text = format_channels_list(&channels);

        assert!(text.contains("➕ @movies"));
        assert!(text.contains("➕ @series"));
    }

    #[test]
    fn test_channels_list_links_private_channels() {
        let channels = vec![channel(-100_123_456, None)];
        let text = format_channels_list(&channels);

        assert!(text.contains("tg://"));
        assert!(text.contains("123456"));
        assert!(!text.contains("-100"));
    }
}
