use std::fmt;

/// Text sent to the remaining members of a room when one of them leaves
pub const CLIENT_DISCONNECTED_NOTICE: &str = "A client disconnected";

const USER_MESSAGE_SEPARATOR: &str = ": ";

/// Events that can be sent to the client.
///
/// On the wire an event is a plain text frame, not JSON: `"<username>: <message>"`
/// for a relayed chat message, or the literal [CLIENT_DISCONNECTED_NOTICE].
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A member of the room has sent a message, the sender receives it as well
    UserMessage { username: String, message: String },
    /// A member of the room has disconnected
    ClientDisconnected,
}

impl Event {
    pub fn user_message(username: &str, message: &str) -> Self {
        Event::UserMessage {
            username: String::from(username),
            message: String::from(message),
        }
    }

    /// Render the event as the text frame sent to clients
    pub fn to_text(&self) -> String {
        self.to_string()
    }

    /// Parse a text frame received from the server.
    ///
    /// The text format has no escaping, so a username that itself contains `": "`
    /// is split at its first separator. Clients only use this for display purposes.
    pub fn from_text(text: &str) -> anyhow::Result<Self> {
        if text == CLIENT_DISCONNECTED_NOTICE {
            return Ok(Event::ClientDisconnected);
        }

        text.split_once(USER_MESSAGE_SEPARATOR)
            .map(|(username, message)| Event::user_message(username, message))
            .ok_or_else(|| anyhow::anyhow!("unrecognized event text '{}'", text))
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::UserMessage { username, message } => {
                write!(f, "{}{}{}", username, USER_MESSAGE_SEPARATOR, message)
            }
            Event::ClientDisconnected => f.write_str(CLIENT_DISCONNECTED_NOTICE),
        }
    }
}

impl From<crate::command::ChatMessage> for Event {
    fn from(message: crate::command::ChatMessage) -> Self {
        Event::UserMessage {
            username: message.username,
            message: message.message,
        }
    }
}
