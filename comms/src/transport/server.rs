use anyhow::Context;
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use futures_util::{future, stream::SplitSink, SinkExt, StreamExt};

use crate::{command, event};

use super::common::BoxedStream;

/// [CommandStream] is a stream of [crate::command::ChatMessage]s sent by the client
///
/// An `Err` item means the client sent a frame which is not a valid chat message.
/// The stream ends when the client sends a close frame or the connection breaks.
///
/// # Cancel Safety
///
/// This stream is cancel-safe, meaning that it can be used in [tokio::select!]
/// without the risk of missing commands.
pub type CommandStream = BoxedStream<anyhow::Result<command::ChatMessage>>;

/// Why the server is closing a client connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The session is over, e.g. the client went away
    Normal,
    /// The client sent a frame which could not be decoded
    InvalidPayload,
    /// The server is shutting down
    Shutdown,
}

impl CloseReason {
    fn into_frame(self) -> CloseFrame {
        let (code, reason) = match self {
            CloseReason::Normal => (close_code::NORMAL, "bye"),
            CloseReason::InvalidPayload => (close_code::INVALID, "malformed chat message"),
            CloseReason::Shutdown => (close_code::AWAY, "server shutting down"),
        };

        CloseFrame {
            code,
            reason: reason.into(),
        }
    }
}

/// [EventWriter] is a wrapper around the sending half of a [WebSocket] which writes [crate::event::Event]s to the client
pub struct EventWriter {
    sink: SplitSink<WebSocket, Message>,
}

impl EventWriter {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self { sink }
    }

    /// Send a [crate::event::Event] to the client as a text frame
    ///
    /// # Cancel Safety
    ///
    /// This method is not cancellation safe. If it is used as the event
    /// in a [tokio::select!] statement and some other
    /// branch completes first, the frame may or may not have been queued on the socket.
    pub async fn write(&mut self, event: &event::Event) -> anyhow::Result<()> {
        self.sink
            .send(Message::Text(event.to_text().into()))
            .await
            .context("could not write event to the client")
    }

    /// Send a close frame with the given reason and close the socket
    ///
    /// Fails if the close frame could not be sent, e.g. the client is already gone.
    pub async fn close(mut self, reason: CloseReason) -> anyhow::Result<()> {
        self.sink
            .send(Message::Close(Some(reason.into_frame())))
            .await
            .context("could not send close frame to the client")?;

        // the close handshake is already underway, flushing may race with the client's reply
        let _ = self.sink.close().await;

        Ok(())
    }
}

// a read error or a close frame both mean the client is gone
fn is_open(frame: &Result<Message, axum::Error>) -> bool {
    matches!(frame, Ok(message) if !matches!(message, Message::Close(_)))
}

/// Splits an upgraded [WebSocket] into a stream of chat messages and an event writer.
///
/// # Arguments
///
/// - `socket` - An accepted [WebSocket] to split
pub fn split_websocket(socket: WebSocket) -> (CommandStream, EventWriter) {
    let (sink, stream) = socket.split();

    (
        Box::pin(
            stream
                .take_while(|frame| future::ready(is_open(frame)))
                .filter_map(|frame| {
                    future::ready(match frame {
                        Ok(Message::Text(text)) => Some(command::ChatMessage::decode(text.as_str())),
                        Ok(Message::Binary(_)) => {
                            Some(Err(anyhow::anyhow!("binary frames are not supported")))
                        }
                        // pings are answered by the socket itself
                        _ => None,
                    })
                }),
        ),
        EventWriter::new(sink),
    )
}
