use std::{sync::Arc, time::Duration};

use anyhow::Context;
use axum::extract::ws::WebSocket;
use comms::{
    event::Event,
    transport::{
        self,
        server::{CloseReason, CommandStream, EventWriter},
    },
};
use tokio::{
    sync::{broadcast, mpsc, oneshot},
    task::JoinHandle,
    time::timeout,
};
use tokio_stream::StreamExt;
use tracing::Instrument;

use crate::{
    config::RelaySettings,
    registry::{ConnectionHandle, RoomRegistry},
};

pub use self::fan_out::broadcast;

mod fan_out;

/// Why a session left the active state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Departure {
    /// The client closed the connection or it broke while reading
    Disconnected,
    /// Writing to the client failed
    WriteFailed,
    /// The client sent a frame which is not a chat message
    Malformed,
    /// The server is shutting down
    Shutdown,
}

impl Departure {
    fn close_reason(self) -> CloseReason {
        match self {
            Departure::Disconnected | Departure::WriteFailed => CloseReason::Normal,
            Departure::Malformed => CloseReason::InvalidPayload,
            Departure::Shutdown => CloseReason::Shutdown,
        }
    }
}

/// Given an accepted websocket and the room it asked for, relays chat messages
/// between the client and the rest of the room until the client goes away,
/// sends something that is not a chat message, or the server shuts down
pub async fn handle_connection(
    registry: Arc<RoomRegistry>,
    settings: RelaySettings,
    room: String,
    quit_rx: broadcast::Receiver<()>,
    socket: WebSocket,
) -> anyhow::Result<()> {
    let (connection, outbound_rx) = ConnectionHandle::new(settings.outbound_capacity);
    let span = tracing::info_span!("connection", room = %room, connection_id = %connection.id());

    run_session(
        registry,
        settings,
        room,
        quit_rx,
        socket,
        connection,
        outbound_rx,
    )
    .instrument(span)
    .await
}

async fn run_session(
    registry: Arc<RoomRegistry>,
    settings: RelaySettings,
    room: String,
    quit_rx: broadcast::Receiver<()>,
    socket: WebSocket,
    connection: ConnectionHandle,
    outbound_rx: mpsc::Receiver<Event>,
) -> anyhow::Result<()> {
    // Split the websocket into a chat message stream and an event writer with better ergonomics
    let (commands, event_writer) = transport::server::split_websocket(socket);

    // Events queued by any broadcast are written to the socket by a dedicated task,
    // so a busy socket never holds up the room's broadcasts
    let writer = WriterTask::spawn(event_writer, outbound_rx);

    relay_messages(
        &registry,
        settings,
        &room,
        quit_rx,
        commands,
        connection,
        writer,
    )
    .await?;

    Ok(())
}

/// Runs a connection through the room: joins it, relays its chat messages until
/// it departs, then takes it out of the room again
async fn relay_messages(
    registry: &RoomRegistry,
    settings: RelaySettings,
    room: &str,
    mut quit_rx: broadcast::Receiver<()>,
    mut commands: CommandStream,
    connection: ConnectionHandle,
    mut writer: WriterTask,
) -> anyhow::Result<Departure> {
    // The transport has already accepted the connection, from now on the client is a member of the room
    registry.join(room, connection.clone());
    tracing::info!(members = registry.members_of(room).len(), "client joined room");

    let departure = loop {
        tokio::select! {
            cmd = commands.next() => match cmd {
                Some(Ok(message)) => {
                    broadcast(registry, room, Event::from(message), settings.send_timeout).await;
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %format!("{:#}", e), "closing connection after malformed message");
                    break Departure::Malformed;
                }
                None => break Departure::Disconnected,
            },
            result = writer.finished() => {
                if let Err(e) = result {
                    tracing::debug!(error = %format!("{:#}", e), "could not write to client");
                }
                break Departure::WriteFailed;
            }
            // If the server is shutting down, the other members are leaving as well
            // so there is nobody to notify about the departure
            Ok(_) = quit_rx.recv() => break Departure::Shutdown,
        }
    };

    // Nothing may be written to the client once it has left the room,
    // so the writer lets go of the outbound queue before the leave
    writer.stop(departure.close_reason(), settings.send_timeout).await;

    if let Err(e) = registry.leave(room, &connection) {
        tracing::error!(error = %e, "registry lost track of a connection");
        writer.abort();

        return Err(e).context("could not remove connection from its room");
    }
    drop(connection);

    if departure != Departure::Shutdown {
        let notified = broadcast(
            registry,
            room,
            Event::ClientDisconnected,
            settings.send_timeout,
        )
        .await;
        tracing::info!(?departure, notified, "client left room");
    } else {
        tracing::info!("closing connection for shutdown");
    }

    if let Err(e) = writer.join().await {
        tracing::debug!(error = %format!("{:#}", e), "could not close client connection");
    }

    Ok(departure)
}

/// Asks the writer to close the connection, acknowledged once the writer stopped
/// taking events off the outbound queue
struct StopRequest {
    reason: CloseReason,
    stopped: oneshot::Sender<()>,
}

/// Handle to the task writing a connection's outbound events to its socket
struct WriterTask {
    handle: Option<JoinHandle<anyhow::Result<()>>>,
    stop_tx: Option<oneshot::Sender<StopRequest>>,
}

impl WriterTask {
    fn spawn(event_writer: EventWriter, outbound_rx: mpsc::Receiver<Event>) -> Self {
        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(write_events(event_writer, outbound_rx, stop_rx).in_current_span());

        WriterTask {
            handle: Some(handle),
            stop_tx: Some(stop_tx),
        }
    }

    /// Wait for the writer to stop on its own, which only happens when the socket fails.
    /// Never resolves again once it has resolved.
    ///
    /// # Cancel Safety
    ///
    /// This method is cancel-safe, the task keeps running if the future is dropped.
    async fn finished(&mut self) -> anyhow::Result<()> {
        match self.handle.as_mut() {
            Some(handle) => {
                let result = flatten(handle.await);
                self.handle = None;

                result
            }
            None => std::future::pending().await,
        }
    }

    /// Tell the writer to close the connection with `reason`. Returns once the writer
    /// no longer takes events off the outbound queue, a writer that does not get
    /// there within `grace` is aborted.
    async fn stop(&mut self, reason: CloseReason, grace: Duration) {
        let Some(stop_tx) = self.stop_tx.take() else {
            return;
        };
        let (stopped_tx, stopped_rx) = oneshot::channel();

        // a writer which is already gone can not write anything either
        if stop_tx
            .send(StopRequest {
                reason,
                stopped: stopped_tx,
            })
            .is_err()
        {
            return;
        }

        if timeout(grace, stopped_rx).await.is_err() {
            tracing::warn!(?grace, "writer did not stop in time, aborting it");
            self.abort();

            if let Some(handle) = self.handle.take() {
                // resolves once the aborted task is gone
                let _ = handle.await;
            }
        }
    }

    fn abort(&self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }

    /// Wait for the writer to flush the close frame and exit
    async fn join(self) -> anyhow::Result<()> {
        match self.handle {
            Some(handle) => flatten(handle.await),
            None => Ok(()),
        }
    }
}

fn flatten(result: Result<anyhow::Result<()>, tokio::task::JoinError>) -> anyhow::Result<()> {
    result.context("writer task did not run to completion")?
}

async fn write_events(
    mut event_writer: EventWriter,
    mut outbound_rx: mpsc::Receiver<Event>,
    mut stop_rx: oneshot::Receiver<StopRequest>,
) -> anyhow::Result<()> {
    let reason = loop {
        tokio::select! {
            // a stop request wins over queued events, those were meant for a member that is leaving
            biased;
            request = &mut stop_rx => {
                outbound_rx.close();

                match request {
                    Ok(StopRequest { reason, stopped }) => {
                        let _ = stopped.send(());
                        break reason;
                    }
                    Err(_) => break CloseReason::Normal,
                }
            }
            event = outbound_rx.recv() => match event {
                Some(event) => event_writer.write(&event).await?,
                None => break CloseReason::Normal,
            },
        }
    };

    event_writer.close(reason).await
}
