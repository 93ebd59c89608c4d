//! Unix socket server for one cluster node

use anyhow::Context;
use roomcast_broadcaster::{
    ChannelClient, ClientHandle, ClusterPublisher, DispatchSubscriber, LocalBus,
    MemoryRoomRegistry, Packet, RoomBroadcast,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::protocol::{ClientCommand, ServerEvent};
use crate::socket_utils::secure_socket_permissions;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Socket setup failed: {0}")]
    Socket(String),

    #[error("Node server not started")]
    NotStarted,

    #[error("Node server already running")]
    AlreadyRunning,
}

/// State shared by every connection of one node
struct NodeContext {
    node_id: String,
    registry: Arc<MemoryRoomRegistry>,
    publisher: Arc<dyn ClusterPublisher>,
}

impl NodeContext {
    async fn execute(&self, command: ClientCommand, client: &Arc<ChannelClient>) -> ServerEvent {
        match command {
            ClientCommand::Join { room } => {
                self.registry.join(&room, client.clone());
                ServerEvent::Joined { room }
            }
            ClientCommand::Leave { room } => {
                let was_member = self.registry.leave(&room, &client.id());
                ServerEvent::Left { room, was_member }
            }
            ClientCommand::Emit {
                rooms,
                event,
                data,
                exclude_self,
            } => {
                let mut broadcast =
                    RoomBroadcast::new(rooms, self.registry.as_ref(), self.publisher.clone());
                if exclude_self {
                    broadcast = broadcast.with_exclude(client.id());
                }
                let report = broadcast.send_event(event, data).await;
                ServerEvent::Emitted {
                    delivered: report.delivered,
                    published: report.published,
                    failed: report.failures.into_iter().map(|f| f.room).collect(),
                }
            }
        }
    }
}

/// One cluster node: accepts socket clients and links to peers via the bus
pub struct NodeServer {
    socket_path: PathBuf,
    bus: LocalBus,
    context: Arc<NodeContext>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    running: Arc<RwLock<bool>>,
    /// Flipped to true on stop; every open connection watches it
    shutdown: watch::Sender<bool>,
}

impl NodeServer {
    pub fn new(socket_path: impl AsRef<Path>, node_id: impl Into<String>, bus: &LocalBus) -> Self {
        let node_id = node_id.into();
        let publisher: Arc<dyn ClusterPublisher> = Arc::new(bus.publisher(node_id.clone()));
        let (shutdown, _) = watch::channel(false);

        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
            bus: bus.clone(),
            context: Arc::new(NodeContext {
                node_id,
                registry: Arc::new(MemoryRoomRegistry::new()),
                publisher,
            }),
            tasks: Mutex::new(Vec::new()),
            running: Arc::new(RwLock::new(false)),
            shutdown,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.context.node_id
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn registry(&self) -> &Arc<MemoryRoomRegistry> {
        &self.context.registry
    }

    /// Start listening for clients and for peers' dispatch events
    pub async fn start(&self) -> Result<(), ServerError> {
        let is_running = *self.running.read().await;
        if is_running {
            return Err(ServerError::AlreadyRunning);
        }

        // Remove stale socket file
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        // Create Unix socket listener (0600 = owner-only access)
        let listener = UnixListener::bind(&self.socket_path)?;
        secure_socket_permissions(&self.socket_path)
            .map_err(|e| ServerError::Socket(format!("{:#}", e)))?;

        info!(
            "Node {} listening on {:?} (permissions: 0600)",
            self.context.node_id, self.socket_path
        );

        // Mark as running and re-arm the shutdown signal
        *self.running.write().await = true;
        self.shutdown.send_replace(false);

        // Deliver peers' dispatch events to local members
        let subscriber =
            DispatchSubscriber::new(self.context.node_id.clone(), self.context.registry.clone());
        let subscriber_task = tokio::spawn(subscriber.run(self.bus.subscribe()));

        // Spawn client acceptance task
        let context = Arc::clone(&self.context);
        let running = Arc::clone(&self.running);
        let shutdown = self.shutdown.subscribe();
        let accept_task = tokio::spawn(async move {
            loop {
                // Check if still running
                if !*running.read().await {
                    break;
                }

                match listener.accept().await {
                    Ok((stream, _addr)) => {
                        let context = Arc::clone(&context);
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, context, shutdown).await {
                                warn!("Connection ended with error: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept client: {}", e);
                    }
                }
            }
            info!("Client acceptance task stopped");
        });

        let mut tasks = self.tasks.lock().await;
        tasks.push(subscriber_task);
        tasks.push(accept_task);

        Ok(())
    }

    /// Stop the node
    pub async fn stop(&self) -> Result<(), ServerError> {
        let is_running = *self.running.read().await;
        if !is_running {
            return Err(ServerError::NotStarted);
        }

        // Mark as not running
        *self.running.write().await = false;

        // Close every open connection; each one leaves its rooms on the way out
        self.shutdown.send_replace(true);

        // Abort accept and subscriber tasks
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }

        // Remove socket file
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        info!("Node {} stopped", self.context.node_id);
        Ok(())
    }
}

impl Drop for NodeServer {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
        if let Ok(mut tasks) = self.tasks.try_lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
        if self.socket_path.exists() {
            let _ = std::fs::remove_file(&self.socket_path);
        }
    }
}

/// Resolves once the node is stopping (or gone)
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stopping| *stopping).await;
}

/// Serve one client until it disconnects or the node stops
async fn handle_connection(
    stream: UnixStream,
    context: Arc<NodeContext>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let (read_half, write_half) = stream.into_split();
    let (client, packets) = ChannelClient::new();
    let client = Arc::new(client);
    let client_id = client.id();
    let (replies, reply_rx) = mpsc::unbounded_channel();

    info!("Client {} connected to node {}", client_id, context.node_id);
    let writer = tokio::spawn(write_events(write_half, packets, reply_rx));

    let _ = replies.send(ServerEvent::Welcome {
        client_id: client_id.to_string(),
        node_id: context.node_id.clone(),
    });

    let mut lines = BufReader::new(read_half).lines();
    let result = loop {
        let next = tokio::select! {
            biased;
            _ = stopped(&mut shutdown) => {
                debug!("Closing client {}: node {} stopped", client_id, context.node_id);
                break Ok(());
            }
            next = lines.next_line() => next,
        };
        let line = match next {
            Ok(Some(line)) => line,
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        };
        if line.trim().is_empty() {
            continue;
        }
        debug!("Client {} sent: {}", client_id, line.trim());

        let reply = match ClientCommand::parse(&line) {
            Ok(command) => context.execute(command, &client).await,
            Err(e) => ServerEvent::Error {
                message: format!("Invalid command: {}", e),
            },
        };
        if replies.send(reply).is_err() {
            break Ok(());
        }
    };

    context.registry.leave_all(&client_id);
    drop(client);
    drop(replies);
    if let Err(e) = writer.await {
        warn!("Writer for client {} failed: {}", client_id, e);
    }
    info!("Client {} disconnected", client_id);

    result.context("Failed to read from client")
}

/// Write packets and replies to the socket as JSON lines
async fn write_events(
    mut stream: OwnedWriteHalf,
    mut packets: mpsc::UnboundedReceiver<Packet>,
    mut replies: mpsc::UnboundedReceiver<ServerEvent>,
) {
    loop {
        let event = tokio::select! {
            Some(packet) = packets.recv() => ServerEvent::from(packet),
            Some(reply) = replies.recv() => reply,
            else => break,
        };

        let line = match event.to_json_line() {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to encode event: {}", e);
                continue;
            }
        };
        if let Err(e) = stream.write_all(line.as_bytes()).await {
            warn!("Failed to write to client: {}", e);
            break;
        }
    }
}
