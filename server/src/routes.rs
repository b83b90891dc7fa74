use std::{future::Future, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    extract::{Path, State, WebSocketUpgrade},
    response::{Html, Response},
    routing::get,
    Router,
};
use tokio::{net::TcpListener, sync::broadcast, time::timeout};
use tokio_util::task::TaskTracker;

use crate::{config::RelaySettings, registry::RoomRegistry, session};

const INDEX_HTML: &str = include_str!("../resources/index.html");

/// State shared by every request handler
#[derive(Debug, Clone)]
pub struct AppState {
    pub registry: Arc<RoomRegistry>,
    pub settings: RelaySettings,
    quit_tx: broadcast::Sender<()>,
    // upgraded connections run outside of the http server's own bookkeeping
    sessions: TaskTracker,
}

impl AppState {
    pub fn new(settings: RelaySettings) -> Self {
        let (quit_tx, _) = broadcast::channel::<()>(1);

        AppState {
            registry: Arc::new(RoomRegistry::new()),
            settings,
            quit_tx,
            sessions: TaskTracker::new(),
        }
    }

    /// Tell every open connection to close, connections accepted afterwards are not affected
    pub fn shutdown(&self) {
        // no receivers just means there are no open connections
        let _ = self.quit_tx.send(());
    }

    /// How many connection tasks are still running
    pub fn open_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Wait until every connection task has finished, returns `false` if some
    /// were still running after `grace`
    pub async fn wait_for_sessions(&self, grace: Duration) -> bool {
        self.sessions.close();

        timeout(grace, self.sessions.wait()).await.is_ok()
    }
}

/// The relay's HTTP surface: the landing page and one websocket endpoint per room
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ws/{room}", get(join_room))
        .with_state(state)
}

/// Serve the relay until `signal` resolves, then close every open connection and
/// wait up to `grace` for them to leave their rooms
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    signal: impl Future<Output = ()> + Send + 'static,
    grace: Duration,
) -> anyhow::Result<()> {
    axum::serve(listener, app(state.clone()))
        .with_graceful_shutdown({
            let state = state.clone();

            async move {
                signal.await;
                state.shutdown();
            }
        })
        .await
        .context("server failed")?;

    if !state.wait_for_sessions(grace).await {
        tracing::warn!(
            sessions = state.open_sessions(),
            "connections did not close in time"
        );
    }

    Ok(())
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn join_room(
    State(state): State<AppState>,
    Path(room): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    let quit_rx = state.quit_tx.subscribe();
    let sessions = state.sessions.clone();

    ws.on_upgrade(move |socket| {
        sessions.track_future(async move {
            if let Err(e) =
                session::handle_connection(state.registry, state.settings, room, quit_rx, socket)
                    .await
            {
                tracing::error!(error = %format!("{:#}", e), "connection task failed");
            }
        })
    })
}
