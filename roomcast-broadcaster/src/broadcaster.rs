use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use crate::client::{ClientHandle, ClientId};
use crate::error::{BroadcasterError, PublishError};
use crate::events::{DispatchMessage, Packet, PubSubType};
use crate::publisher::ClusterPublisher;
use crate::registry::RoomRegistry;

/// Broadcast scoped to an explicit set of rooms.
///
/// Membership is snapshotted at construction: the local recipients are the
/// union of every requested room's members, one entry per client. `send`
/// delivers to that snapshot and publishes one dispatch event per requested
/// room, never for any other room a recipient happens to be in.
///
/// Peers receive one dispatch event per room, so a remote client sitting in
/// two requested rooms is only deduplicated if the receiving node does it.
pub struct RoomBroadcast {
    rooms: BTreeSet<String>,
    clients: Vec<Arc<dyn ClientHandle>>,
    publisher: Arc<dyn ClusterPublisher>,
    exclude: Option<ClientId>,
}

impl RoomBroadcast {
    /// Resolve `rooms` against the registry
    pub fn new<I, S, R>(rooms: I, registry: &R, publisher: Arc<dyn ClusterPublisher>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        R: RoomRegistry + ?Sized,
    {
        let rooms: BTreeSet<String> = rooms.into_iter().map(Into::into).collect();

        let mut seen = HashSet::new();
        let mut clients = Vec::new();
        for room in &rooms {
            for client in registry.clients_in(room) {
                if seen.insert(client.id()) {
                    clients.push(client);
                }
            }
        }

        tracing::debug!(
            "Resolved {} local clients across {} rooms",
            clients.len(),
            rooms.len()
        );

        Self {
            rooms,
            clients,
            publisher,
            exclude: None,
        }
    }

    /// Skip `client` locally and ask peers to skip it too
    pub fn with_exclude(mut self, client: ClientId) -> Self {
        self.exclude = Some(client);
        self
    }

    pub fn rooms(&self) -> impl Iterator<Item = &str> {
        self.rooms.iter().map(String::as_str)
    }

    pub fn clients(&self) -> &[Arc<dyn ClientHandle>] {
        &self.clients
    }

    /// Clients a [`send`](Self::send) would reach locally, i.e. without the
    /// excluded one
    pub fn client_count(&self) -> usize {
        self.clients
            .iter()
            .filter(|client| !self.is_excluded(client.id()))
            .count()
    }

    fn is_excluded(&self, id: ClientId) -> bool {
        self.exclude == Some(id)
    }

    /// Deliver locally, then publish once per requested room.
    ///
    /// Neither phase stops on a failure: every client gets its send and
    /// every room gets its publish attempt.
    pub async fn send(&self, packet: &Packet) -> SendReport {
        let mut delivered = 0;
        for client in &self.clients {
            if self.is_excluded(client.id()) {
                continue;
            }
            client.send(packet);
            delivered += 1;
        }

        let exclude_id = self.exclude.map(|id| id.to_string()).unwrap_or_default();
        let mut published = 0;
        let mut failures = Vec::new();
        for room in &self.rooms {
            let message = DispatchMessage::new(room.clone(), packet.clone(), exclude_id.clone());
            match self.publisher.publish(PubSubType::Dispatch, message).await {
                Ok(()) => published += 1,
                Err(error) => {
                    tracing::warn!("Failed to publish dispatch for room '{}': {}", room, error);
                    failures.push(RoomPublishFailure {
                        room: room.clone(),
                        error,
                    });
                }
            }
        }

        SendReport {
            delivered,
            published,
            failures,
        }
    }

    /// Build a packet from an event name and payload, then [`send`](Self::send) it
    pub async fn send_event(
        &self,
        event: impl Into<String>,
        data: serde_json::Value,
    ) -> SendReport {
        self.send(&Packet::new(event, data)).await
    }
}

/// Publish attempt that failed for one room
#[derive(Debug)]
pub struct RoomPublishFailure {
    pub room: String,
    pub error: PublishError,
}

/// Outcome of one [`RoomBroadcast::send`]
#[derive(Debug, Default)]
pub struct SendReport {
    /// Local `ClientHandle::send` calls made
    pub delivered: usize,
    /// Rooms whose dispatch event was published
    pub published: usize,
    pub failures: Vec<RoomPublishFailure>,
}

impl SendReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Local delivery count, or the publish failures as an error
    pub fn into_result(mut self) -> crate::Result<usize> {
        let attempted = self.published + self.failures.len();
        match self.failures.len() {
            0 => Ok(self.delivered),
            1 => {
                let RoomPublishFailure { room, error } = self.failures.remove(0);
                Err(BroadcasterError::Publish {
                    room,
                    source: error,
                })
            }
            failed => Err(BroadcasterError::PartialPublish { failed, attempted }),
        }
    }
}
