//! In-process publish/subscribe rooms keyed by run identifier.
//!
//! Each room fans events out over a `tokio::sync::broadcast` channel and
//! keeps a bounded replay history so a subscriber that connects (or
//! reconnects) after a run has started still sees what it missed. Events are
//! serialized to their wire text exactly once, at publish. Publishing to a
//! run with no room is a silent no-op; callers never check room existence
//! first.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{error, trace};

use runcast_core_types::{EventEnvelope, RunEvent, RunId};

const DEFAULT_HISTORY_LIMIT: usize = 256;
const BROADCAST_CAPACITY: usize = 64;

/// One published event: the typed envelope plus its wire text, serialized
/// once for every subscriber.
#[derive(Clone, Debug)]
pub struct Delivery {
    pub envelope: EventEnvelope,
    pub text: Arc<str>,
}

/// Room registry. Cheap to clone via `Arc`; one instance serves the whole
/// process.
pub struct EventBus {
    rooms: DashMap<String, Arc<Room>>,
    history_limit: usize,
}

/// What a subscriber gets back: buffered history first, then the live feed.
pub struct Subscription {
    pub history: Vec<Delivery>,
    pub receiver: broadcast::Receiver<Delivery>,
}

struct Room {
    sender: broadcast::Sender<Delivery>,
    history: Mutex<RoomHistory>,
}

struct RoomHistory {
    next_id: u64,
    events: VecDeque<Delivery>,
    /// Frames arrive at streaming rate and would cycle everything else out
    /// of the buffer; only the newest one is kept for replay.
    latest_frame: Option<Delivery>,
    limit: usize,
}

impl RoomHistory {
    fn new(limit: usize) -> Self {
        Self {
            next_id: 0,
            events: VecDeque::new(),
            latest_frame: None,
            limit,
        }
    }

    fn record(&mut self, event: RunEvent) -> Option<Delivery> {
        let envelope = EventEnvelope {
            id: self.next_id,
            event,
        };
        let text: Arc<str> = match serde_json::to_string(&envelope) {
            Ok(text) => text.into(),
            Err(err) => {
                error!(target: "bus", %err, kind = envelope.event.kind(), "event not serializable, dropped");
                return None;
            }
        };
        self.next_id = self.next_id.wrapping_add(1);
        let delivery = Delivery { envelope, text };
        if matches!(delivery.envelope.event, RunEvent::Frame { .. }) {
            self.latest_frame = Some(delivery.clone());
        } else {
            self.events.push_back(delivery.clone());
            if self.events.len() > self.limit {
                self.events.pop_front();
            }
        }
        Some(delivery)
    }

    fn since(&self, cursor: Option<u64>) -> Vec<Delivery> {
        let keep =
            |delivery: &Delivery| cursor.map(|id| delivery.envelope.id > id).unwrap_or(true);
        let mut replay: Vec<Delivery> = self.events.iter().filter(|d| keep(d)).cloned().collect();
        if let Some(frame) = self.latest_frame.as_ref().filter(|d| keep(d)) {
            let position = replay.partition_point(|d| d.envelope.id < frame.envelope.id);
            replay.insert(position, frame.clone());
        }
        replay
    }
}

impl EventBus {
    pub fn new(history_limit: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            history_limit: history_limit.max(1),
        }
    }

    /// Create the room for a run ahead of its first event so that nothing
    /// published during setup is lost.
    pub fn open_room(&self, run_id: &RunId) {
        self.ensure_room(run_id.as_str());
    }

    /// Record `event` in the room's history and push it to every live
    /// subscriber. No room, no-op.
    pub fn publish(&self, run_id: &RunId, event: RunEvent) {
        let Some(room) = self.rooms.get(run_id.as_str()).map(|r| r.value().clone()) else {
            trace!(target: "bus", run = %run_id, kind = event.kind(), "publish to absent room dropped");
            return;
        };
        let Some(delivery) = room.history.lock().record(event) else {
            return;
        };
        // A send error only means there are no receivers right now; the
        // delivery stays in history for late subscribers.
        let _ = room.sender.send(delivery);
    }

    /// Join a run's room, creating it if absent. `since` skips history the
    /// reconnecting client already saw.
    pub fn subscribe(&self, run_id: &RunId, since: Option<u64>) -> Subscription {
        let room = self.ensure_room(run_id.as_str());
        let receiver = room.sender.subscribe();
        let history = room.history.lock().since(since);
        Subscription { history, receiver }
    }

    /// Number of live receivers in a room, zero when the room does not exist.
    pub fn subscriber_count(&self, run_id: &RunId) -> usize {
        self.rooms
            .get(run_id.as_str())
            .map(|room| room.sender.receiver_count())
            .unwrap_or(0)
    }

    /// Drop a room and its history. Live receivers observe channel closure.
    pub fn release(&self, run_id: &RunId) {
        self.rooms.remove(run_id.as_str());
    }

    fn ensure_room(&self, key: &str) -> Arc<Room> {
        if let Some(room) = self.rooms.get(key) {
            return room.value().clone();
        }
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        let room = Arc::new(Room {
            sender,
            history: Mutex::new(RoomHistory::new(self.history_limit)),
        });
        self.rooms
            .entry(key.to_string())
            .or_insert_with(|| room)
            .value()
            .clone()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runcast_core_types::{FrameImage, RunEvent};
    use tokio::time::{timeout, Duration};

    fn nav(url: &str) -> RunEvent {
        RunEvent::Nav { url: url.into() }
    }

    fn frame(data: &str) -> RunEvent {
        RunEvent::Frame {
            image: FrameImage::Jpeg(data.into()),
        }
    }

    #[tokio::test]
    async fn publish_without_room_is_a_no_op() {
        let bus = EventBus::default();
        let ghost = RunId::new();
        bus.publish(&ghost, nav("https://example.com"));
        assert_eq!(bus.subscriber_count(&ghost), 0);
    }

    #[tokio::test]
    async fn subscribers_receive_live_events_with_wire_text() {
        let bus = EventBus::default();
        let run = RunId::new();
        bus.open_room(&run);

        let mut first = bus.subscribe(&run, None);
        let mut second = bus.subscribe(&run, None);
        bus.publish(&run, nav("https://example.com"));

        for sub in [&mut first, &mut second] {
            let delivery = timeout(Duration::from_millis(100), sub.receiver.recv())
                .await
                .expect("event available")
                .expect("channel open");
            assert_eq!(delivery.envelope.id, 0);
            assert_eq!(delivery.envelope.event, nav("https://example.com"));
            let value: serde_json::Value = serde_json::from_str(&delivery.text).unwrap();
            assert_eq!(value["type"], "nav");
            assert_eq!(value["id"], 0);
        }
    }

    #[tokio::test]
    async fn late_subscriber_replays_history() {
        let bus = EventBus::default();
        let run = RunId::new();
        bus.open_room(&run);
        bus.publish(&run, nav("https://a.example"));
        bus.publish(&run, nav("https://b.example"));

        let sub = bus.subscribe(&run, None);
        assert_eq!(sub.history.len(), 2);
        assert_eq!(sub.history[0].envelope.id, 0);
        assert_eq!(sub.history[1].envelope.id, 1);

        let resumed = bus.subscribe(&run, Some(0));
        assert_eq!(resumed.history.len(), 1);
        assert_eq!(resumed.history[0].envelope.event, nav("https://b.example"));
    }

    #[tokio::test]
    async fn history_is_bounded() {
        let bus = EventBus::new(2);
        let run = RunId::new();
        bus.open_room(&run);
        for i in 0..5 {
            bus.publish(&run, nav(&format!("https://{i}.example")));
        }
        let sub = bus.subscribe(&run, None);
        assert_eq!(sub.history.len(), 2);
        assert_eq!(sub.history[0].envelope.id, 3);
        assert_eq!(sub.history[1].envelope.id, 4);
    }

    #[tokio::test]
    async fn frames_do_not_evict_lifecycle_history() {
        let bus = EventBus::new(4);
        let run = RunId::new();
        bus.open_room(&run);

        bus.publish(&run, nav("https://a.example"));
        for i in 0..100 {
            bus.publish(&run, frame(&format!("ZnJhbWUt{i}")));
        }
        bus.publish(&run, nav("https://b.example"));

        let history = bus.subscribe(&run, None).history;
        let kinds: Vec<&str> = history
            .iter()
            .map(|delivery| delivery.envelope.event.kind())
            .collect();
        // Only the newest frame survives, ordered by envelope id between the
        // lifecycle events around it.
        assert_eq!(kinds, vec!["nav", "frame", "nav"]);
        assert_eq!(history[1].envelope.event, frame("ZnJhbWUt99"));
        let ids: Vec<u64> = history.iter().map(|d| d.envelope.id).collect();
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[tokio::test]
    async fn released_room_drops_events() {
        let bus = EventBus::default();
        let run = RunId::new();
        bus.open_room(&run);
        bus.publish(&run, nav("https://a.example"));
        bus.release(&run);
        bus.publish(&run, nav("https://b.example"));

        let sub = bus.subscribe(&run, None);
        assert!(sub.history.is_empty());
    }
}
