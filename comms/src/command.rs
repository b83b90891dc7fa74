use anyhow::Context;
use serde::{Deserialize, Serialize};

/// A chat message submitted by a client to the room it is connected to.
///
/// This is the only payload a client ever sends. The room is implied by the
/// connection, so the envelope carries just the display name and the text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Display name chosen by the client, not verified by the server
    pub username: String,
    /// The text of the message
    pub message: String,
}

impl ChatMessage {
    pub fn new(username: &str, message: &str) -> Self {
        ChatMessage {
            username: String::from(username),
            message: String::from(message),
        }
    }

    /// Decode a text frame received from a client.
    ///
    /// Fails if the frame is not JSON or if either field is missing or not a string.
    pub fn decode(text: &str) -> anyhow::Result<Self> {
        serde_json::from_str::<ChatMessage>(text).context("failed to decode chat message")
    }

    /// Encode the message as a text frame, the way a client sends it
    pub fn encode(&self) -> anyhow::Result<String> {
        serde_json::to_string(self).context("failed to encode chat message")
    }
}
