//! Room-scoped broadcast fan-out for clustered socket servers
//!
//! A broadcast targets an explicit set of rooms. Locally, every client in any
//! of those rooms receives the packet exactly once. Across the cluster, one
//! dispatch event per requested room is published so peer nodes can deliver
//! to their own members of that room, and only that room.
//!
//! # Components
//!
//! - [`RoomRegistry`] - which local clients are in which room
//! - [`ClientHandle`] - a connected client that accepts packets
//! - [`ClusterPublisher`] - emits dispatch events to peer nodes
//! - [`RoomBroadcast`] - resolves rooms to clients and performs the send
//! - [`DispatchSubscriber`] - delivers peers' dispatch events locally
//!
//! # Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use roomcast_broadcaster::{
//!     ChannelClient, LocalBus, MemoryRoomRegistry, RoomBroadcast,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bus = LocalBus::new(1024);
//!     let registry = MemoryRoomRegistry::new();
//!
//!     let (client, mut packets) = ChannelClient::new();
//!     registry.join("lobby", Arc::new(client));
//!
//!     let publisher = Arc::new(bus.publisher("node-1"));
//!     let delivered = RoomBroadcast::new(["lobby", "game-7"], &registry, publisher)
//!         .send_event("chat", serde_json::json!({"text": "hello"}))
//!         .await
//!         .into_result()?;
//!
//!     assert_eq!(delivered, 1);
//!     assert_eq!(packets.recv().await.map(|p| p.event), Some("chat".to_string()));
//!     Ok(())
//! }
//! ```

pub mod broadcaster;
pub mod client;
pub mod error;
pub mod events;
pub mod publisher;
pub mod registry;
pub mod subscriber;

// Re-exports
pub use broadcaster::{RoomBroadcast, RoomPublishFailure, SendReport};
pub use client::{ChannelClient, ClientHandle, ClientId};
pub use error::{BroadcasterError, PublishError, Result};
pub use events::{DispatchMessage, Packet, PubSubEnvelope, PubSubType};
pub use publisher::{BusPublisher, ClusterPublisher, LocalBus};
pub use registry::{MemoryRoomRegistry, RoomRegistry};
pub use subscriber::DispatchSubscriber;
