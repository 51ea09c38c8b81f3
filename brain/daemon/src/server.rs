//! WebSocket Server
//!
//! Accepts face connections over WebSocket and bridges each one to the
//! shared [`Brain`]:
//! - one task per connection, reading inbound frames and writing the
//!   connection's outbound channel
//! - a connection limit checked before the upgrade
//! - a periodic sweep of registry entries whose channel has closed
//! - graceful shutdown that aborts every connection task
//!
//! ```text
//!                      WsServer
//!                         │
//!          ┌──────────────┼──────────────┐
//!          │              │              │
//!      face (conn-1)  face (conn-2)  face (conn-3)
//!          │              │              │
//!          └──────────────┴──────────────┘
//!                         │
//!                       Brain
//!            (registry, dispatcher, turn worker)
//! ```

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn, Instrument};

use brain_core::{Brain, ConnectionId, DispatchOutcome, OutboundEvent, ServerConfig};

/// How often registry entries with a closed channel are swept
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Server-side bookkeeping for one socket, separate from the registry entry
struct ConnectionState {
    connected_at: Instant,
    peer: SocketAddr,
    abort_handle: tokio::task::AbortHandle,
}

/// The WebSocket front end of the brain
pub struct WsServer {
    listener: TcpListener,
    brain: Arc<Brain>,
    max_connections: usize,
    connection_channel_capacity: usize,
    connection_states: Arc<DashMap<ConnectionId, ConnectionState>>,
}

impl WsServer {
    /// Bind the listening socket
    pub async fn bind(settings: &ServerConfig, brain: Arc<Brain>) -> Result<Self> {
        let listener = TcpListener::bind(&settings.bind_address)
            .await
            .with_context(|| format!("Failed to bind to {}", settings.bind_address))?;

        Ok(Self {
            listener,
            brain,
            max_connections: settings.max_connections,
            connection_channel_capacity: settings.connection_channel_capacity,
            connection_states: Arc::new(DashMap::new()),
        })
    }

    /// Address the server is listening on
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("Failed to read listener address")
    }

    /// Accept connections until `shutdown` resolves
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        tokio::pin!(shutdown);

        info!(addr = %self.local_addr()?, "Listening for faces");

        let registry = self.brain.registry().clone();
        let sweeper = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = registry.cleanup_disconnected();
                if removed > 0 {
                    debug!(removed, "Swept closed connections");
                }
            }
        });

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("Shutdown requested, stopping accept loop");
                    break;
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => self.admit(stream, peer),
                        Err(e) => error!(error = %e, "Accept failed"),
                    }
                }
            }
        }

        sweeper.abort();
        self.shutdown();
        Ok(())
    }

    fn admit(&self, stream: TcpStream, peer: SocketAddr) {
        if self.connection_states.len() >= self.max_connections {
            warn!(
                %peer,
                max_connections = self.max_connections,
                "Connection limit reached, rejecting new connection"
            );
            drop(stream);
            return;
        }

        let id = ConnectionId::new();
        info!(
            connection_id = %id,
            %peer,
            active_connections = self.connection_states.len() + 1,
            "New connection accepted"
        );

        let task = tokio::spawn(
            handle_connection(
                id,
                stream,
                peer,
                Arc::clone(&self.brain),
                self.connection_channel_capacity,
                Arc::clone(&self.connection_states),
            )
            .instrument(tracing::info_span!("connection", connection_id = %id)),
        );

        self.connection_states.insert(
            id,
            ConnectionState {
                connected_at: Instant::now(),
                peer,
                abort_handle: task.abort_handle(),
            },
        );
        // A handler that already exited cannot remove its own entry
        if task.is_finished() {
            self.connection_states.remove(&id);
        }
    }

    fn shutdown(&self) {
        info!("Initiating graceful shutdown");

        let ids: Vec<ConnectionId> = self.connection_states.iter().map(|r| *r.key()).collect();
        for id in ids {
            if let Some((_, state)) = self.connection_states.remove(&id) {
                info!(
                    connection_id = %id,
                    peer = %state.peer,
                    uptime_secs = state.connected_at.elapsed().as_secs(),
                    "Aborting connection"
                );
                state.abort_handle.abort();
                self.brain.disconnect(&id);
            }
        }

        info!("Shutdown complete");
    }
}

/// Serve one face until it leaves or its channel is pruned
async fn handle_connection(
    id: ConnectionId,
    stream: TcpStream,
    peer: SocketAddr,
    brain: Arc<Brain>,
    channel_capacity: usize,
    connection_states: Arc<DashMap<ConnectionId, ConnectionState>>,
) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(error = %e, "WebSocket handshake failed");
            connection_states.remove(&id);
            return;
        }
    };
    let (mut sink, mut source) = ws.split();

    let (tx, mut rx) = mpsc::channel::<OutboundEvent>(channel_capacity);
    if brain.connect_as(id, tx, Some(peer.to_string())).await.is_none() {
        connection_states.remove(&id);
        return;
    }

    loop {
        tokio::select! {
            incoming = source.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => report(brain.handle_inbound(id, &text)),
                    Some(Ok(Message::Binary(bytes))) => {
                        let text = String::from_utf8_lossy(&bytes);
                        report(brain.handle_inbound(id, &text));
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Face disconnected");
                        break;
                    }
                    // Ping/pong are answered by tungstenite
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "Read error");
                        break;
                    }
                }
            }

            outgoing = rx.recv() => {
                let Some(event) = outgoing else {
                    info!("Connection pruned from registry");
                    break;
                };
                match event.to_json() {
                    Ok(json) => {
                        if let Err(e) = sink.send(Message::Text(json)).await {
                            warn!(error = %e, "Write error");
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "Failed to encode event"),
                }
            }
        }
    }

    brain.disconnect(&id);
    connection_states.remove(&id);
    let _ = sink.close().await;

    info!(
        active_connections = connection_states.len(),
        "Connection handler finished"
    );
}

fn report(outcome: DispatchOutcome) {
    debug!(?outcome, "Inbound handled");
}
