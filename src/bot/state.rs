use serde::{Deserialize, Serialize};

/// Dialogue state of one admin chat. One active conversation per chat;
/// `/cancel` drops back to `Idle` from anywhere. The state lives in
/// `InMemStorage` only and does not survive a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum State {
    /// No conversation in progress; menu buttons and lookups are handled here
    #[default]
    Idle,
    /// Add-movie flow: waiting for a video message. The flow loops on this
    /// state so an admin can submit several movies back to back.
    AwaitingVideo,
    /// Delete-movie flow: waiting for the code to delete
    AwaitingDeleteCode,
    /// Add-channel flow: waiting for the numeric channel id
    AwaitingChannelId,
    /// Add-channel flow: id accepted, waiting for the display handle
    AwaitingChannelUsername {
        /// The channel id collected in the previous step
        channel_id: i64,
    },
}
