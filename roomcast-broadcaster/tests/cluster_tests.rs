use roomcast_broadcaster::{
    ChannelClient, DispatchSubscriber, LocalBus, MemoryRoomRegistry, Packet, RoomBroadcast,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

struct Node {
    registry: Arc<MemoryRoomRegistry>,
}

impl Node {
    fn start(bus: &LocalBus, node_id: &str) -> Self {
        let registry = Arc::new(MemoryRoomRegistry::new());
        let subscriber = DispatchSubscriber::new(node_id, registry.clone());
        tokio::spawn(subscriber.run(bus.subscribe()));
        Self { registry }
    }

    fn connect(&self, rooms: &[&str]) -> UnboundedReceiver<Packet> {
        let (client, rx) = ChannelClient::new();
        let client = Arc::new(client);
        for room in rooms {
            self.registry.join(room, client.clone());
        }
        rx
    }
}

async fn received(rx: &mut UnboundedReceiver<Packet>) -> Vec<String> {
    let mut events = Vec::new();
    while let Ok(Some(packet)) = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await {
        events.push(packet.event);
    }
    events
}

#[tokio::test]
async fn test_local_and_remote_members_of_requested_rooms() {
    let bus = LocalBus::new(64);
    let node1 = Node::start(&bus, "node-1");
    let node2 = Node::start(&bus, "node-2");

    let mut local_a = node1.connect(&["A", "other"]);
    let mut local_other = node1.connect(&["other"]);
    let mut remote_a = node2.connect(&["A"]);
    let mut remote_b = node2.connect(&["B"]);
    let mut remote_other = node2.connect(&["other"]);

    let publisher = Arc::new(bus.publisher("node-1"));
    let report = RoomBroadcast::new(["A", "B"], node1.registry.as_ref(), publisher)
        .send(&Packet::new("news", json!({"n": 1})))
        .await;
    assert_eq!(report.delivered, 1);
    assert_eq!(report.published, 2);

    // node-1 ignores its own dispatch events, so local members get one copy
    assert_eq!(received(&mut local_a).await, vec!["news"]);
    assert!(received(&mut local_other).await.is_empty());
    assert_eq!(received(&mut remote_a).await, vec!["news"]);
    assert_eq!(received(&mut remote_b).await, vec!["news"]);
    assert!(received(&mut remote_other).await.is_empty());
}

#[tokio::test]
async fn test_remote_client_in_two_rooms_gets_one_copy_per_room_event() {
    let bus = LocalBus::new(64);
    let node1 = Node::start(&bus, "node-1");
    let node2 = Node::start(&bus, "node-2");

    let mut local = node1.connect(&["A", "B"]);
    let mut remote = node2.connect(&["A", "B"]);

    let publisher = Arc::new(bus.publisher("node-1"));
    RoomBroadcast::new(["A", "B", "A"], node1.registry.as_ref(), publisher)
        .send_event("tick", json!(null))
        .await;

    assert_eq!(received(&mut local).await.len(), 1);
    // One dispatch event per room reaches the peer; dedup across events
    // needs a correlation id the wire shape does not carry.
    assert_eq!(received(&mut remote).await.len(), 2);
}

#[tokio::test]
async fn test_exclude_applies_on_every_node() {
    let bus = LocalBus::new(64);
    let node1 = Node::start(&bus, "node-1");
    let node2 = Node::start(&bus, "node-2");

    let (sender, mut sender_rx) = ChannelClient::new();
    let sender_id = roomcast_broadcaster::ClientHandle::id(&sender);
    node1.registry.join("A", Arc::new(sender));
    let mut peer = node2.connect(&["A"]);

    let publisher = Arc::new(bus.publisher("node-1"));
    let report = RoomBroadcast::new(["A"], node1.registry.as_ref(), publisher)
        .with_exclude(sender_id)
        .send_event("typing", json!({}))
        .await;

    assert_eq!(report.delivered, 0);
    assert!(received(&mut sender_rx).await.is_empty());
    assert_eq!(received(&mut peer).await, vec!["typing"]);
}
