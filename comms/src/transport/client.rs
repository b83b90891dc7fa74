use anyhow::Context;
use futures_util::{future, stream::SplitSink, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{tungstenite::Message, MaybeTlsStream, WebSocketStream};

use crate::{command, event};

use super::common::BoxedStream;

type ClientSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// [EventStream] is a stream of [crate::event::Event]s sent by the server
///
/// The stream ends once the server closes the connection.
///
/// # Cancel Safety
///
/// This stream is cancel-safe, meaning that it can be used in [tokio::select]
/// without the risk of missing events.
pub type EventStream = BoxedStream<anyhow::Result<event::Event>>;

/// [CommandWriter] is a wrapper around the sending half of a WebSocket which writes [crate::command::ChatMessage]s to the server
pub struct CommandWriter {
    sink: SplitSink<ClientSocket, Message>,
}

impl CommandWriter {
    pub fn new(sink: SplitSink<ClientSocket, Message>) -> Self {
        Self { sink }
    }

    /// Send a [crate::command::ChatMessage] to the room this connection belongs to
    ///
    /// # Cancel Safety
    ///
    /// This method is not cancellation safe. If it is used as the event
    /// in a [tokio::select!] statement and some other
    /// branch completes first, the frame may or may not have been queued on the socket.
    pub async fn write(&mut self, command: &command::ChatMessage) -> anyhow::Result<()> {
        self.write_text(command.encode()?).await
    }

    /// Send an arbitrary text frame, the server expects it to be an encoded chat message
    pub async fn write_text(&mut self, text: String) -> anyhow::Result<()> {
        self.sink
            .send(Message::text(text))
            .await
            .context("could not write to the server")
    }

    /// Close the connection, the server will tell the rest of the room
    pub async fn close(&mut self) -> anyhow::Result<()> {
        self.sink
            .close()
            .await
            .context("could not close the connection to the server")
    }
}

/// Connects to a room of the chat server and splits the connection into a stream of events and a command writer.
///
/// # Arguments
///
/// - `url` - WebSocket url of the room, e.g. `ws://localhost:8000/ws/lobby`
pub async fn connect(url: &str) -> anyhow::Result<(EventStream, CommandWriter)> {
    let (socket, _response) = tokio_tungstenite::connect_async(url)
        .await
        .with_context(|| format!("could not connect to '{}'", url))?;

    Ok(split_websocket(socket))
}

/// Splits an established WebSocket into a stream of events and a command writer.
pub fn split_websocket(socket: ClientSocket) -> (EventStream, CommandWriter) {
    let (sink, stream) = socket.split();

    (
        Box::pin(
            stream
                .take_while(|frame| future::ready(!matches!(frame, Ok(Message::Close(_)))))
                .filter_map(|frame| {
                    future::ready(match frame {
                        Ok(Message::Text(text)) => Some(event::Event::from_text(text.as_str())),
                        Ok(Message::Binary(_)) => {
                            Some(Err(anyhow::anyhow!("server sent an unexpected binary frame")))
                        }
                        Ok(_) => None,
                        Err(e) => Some(Err(e).context("could not read from the server")),
                    })
                }),
        ),
        CommandWriter::new(sink),
    )
}
