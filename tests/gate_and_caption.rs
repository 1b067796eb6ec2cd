//! End-to-end checks of the two pure core pieces exposed by the library:
//! the subscription gate algorithm (against a scripted membership source)
//! and the caption sanitizing pipeline.

use anyhow::Result;
use async_trait::async_trait;
use kino_gate::caption::{broadcast_caption, sanitize};
use kino_gate::store::Channel;
use kino_gate::subscription::{check_subscription, format_channels_list, MembershipApi};
use std::collections::HashSet;

/// Membership source where the scripted user is a member everywhere except
/// the listed channels; `failing` channels error out entirely.
struct ScriptedApi {
    absent: HashSet<i64>,
    failing: HashSet<i64>,
}

#[async_trait]
impl MembershipApi for ScriptedApi {
    async fn is_member(&self, channel_id: i64, _user_id: u64) -> Result<bool> {
        if self.failing.contains(&channel_id) {
            anyhow::bail!("chat not found");
        }
        Ok(!self.absent.contains(&channel_id))
    }
}

fn channel(id: i64, username: &str) -> Channel {
    Channel {
        id: 0,
        channel_id: id,
        channel_username: Some(username.to_string()),
        required: true,
        is_active: true,
    }
}

#[tokio::test]
async fn gate_reports_exactly_the_missing_channels() {
    let api = ScriptedApi {
        absent: HashSet::from([-100]),
        failing: HashSet::new(),
    };
    let required = vec![channel(-100, "@a"), channel(-200, "@b")];

    let missing = check_subscription(&api, 7, &required).await;

    let ids: Vec<i64> = missing.iter().map(|c| c.channel_id).collect();
    assert_eq!(ids, vec![-100]);
}

#[tokio::test]
async fn gate_fails_closed_when_a_channel_cannot_be_queried() {
    let api = ScriptedApi {
        absent: HashSet::new(),
        failing: HashSet::from([-300]),
    };
    let required = vec![channel(-300, "@gone"), channel(-400, "@fine")];

    let missing = check_subscription(&api, 7, &required).await;

    let ids: Vec<i64> = missing.iter().map(|c| c.channel_id).collect();
    assert_eq!(ids, vec![-300]);
}

#[tokio::test]
async fn gate_prompt_lists_every_missing_channel() {
    let api = ScriptedApi {
        absent: HashSet::from([-1, -2]),
        failing: HashSet::new(),
    };
    let required = vec![channel(-1, "@first"), channel(-2, "second")];

    let missing = check_subscription(&api, 7, &required).await;
    let prompt = format_channels_list(&missing);

    assert!(prompt.contains("@first"));
    assert!(prompt.contains("@second"));
}

#[test]
fn caption_pipeline_strips_foreign_handles_and_stamps_identity() {
    let bot = "@kino_gate_bot";
    let raw = "Best movie ever!\nMore at https://rival.example and @rival_channel";

    let clean = sanitize(raw, bot);
    assert!(!clean.contains("rival"));
    assert!(clean.contains(bot));

    // Re-sanitizing the stored caption at delivery time changes nothing
    assert_eq!(sanitize(&clean, bot), clean);

    let posted = broadcast_caption(&clean, "12", bot);
    assert!(posted.contains("Code: 12"));
    assert!(posted.contains(bot));
}
