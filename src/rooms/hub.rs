use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use tokio::sync::{broadcast, Mutex as WriteLock, OwnedMutexGuard};
use tracing::debug;

use crate::model::RoomId;

use super::msg::{Broadcast, ServerEvent};

/// Broadcast channel and sequence counter of one room.
#[derive(Debug, Clone)]
pub struct RoomChannel {
    tx: broadcast::Sender<Broadcast>,
    seq: Arc<AtomicU64>,
    write: Arc<WriteLock<()>>,
}

impl RoomChannel {
    fn new(capacity: usize) -> Self {
        Self {
            tx: broadcast::channel(capacity).0,
            seq: Arc::new(AtomicU64::new(0)),
            write: Arc::default(),
        }
    }

    /// Sequence number of the last event sent.
    pub fn seq(&self) -> u64 {
        self.seq.load(Ordering::SeqCst)
    }

    /// Serialises the room's writes. Hold it from the database write until the
    /// resulting event is sent, so `seq` order matches commit order.
    pub async fn lock(&self) -> OwnedMutexGuard<()> {
        self.write.clone().lock_owned().await
    }

    /// Stamps and sends `event` to every subscriber. Returns the stamp.
    pub fn send(&self, event: ServerEvent) -> u64 {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        // no subscribers is fine; the next joiner gets a snapshot
        let _ = self.tx.send(Broadcast { seq, event });
        seq
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Every room that currently has a channel.
#[derive(Debug, Clone)]
pub struct Hub {
    rooms: Arc<Mutex<HashMap<RoomId, RoomChannel>>>,
    capacity: usize,
}

impl Hub {
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: Arc::default(),
            capacity: capacity.max(1),
        }
    }

    fn rooms(&self) -> std::sync::MutexGuard<'_, HashMap<RoomId, RoomChannel>> {
        self.rooms.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Opens the room's channel if needed and subscribes to it.
    ///
    /// The receiver is created while the map is locked, so [`Hub::release`] cannot drop the
    /// channel between lookup and subscription.
    pub fn subscribe(&self, room_id: RoomId) -> (RoomChannel, broadcast::Receiver<Broadcast>) {
        let mut rooms = self.rooms();
        let channel = rooms
            .entry(room_id)
            .or_insert_with(|| RoomChannel::new(self.capacity));
        let rx = channel.tx.subscribe();
        (channel.clone(), rx)
    }

    pub fn get(&self, room_id: RoomId) -> Option<RoomChannel> {
        self.rooms().get(&room_id).cloned()
    }

    /// Takes the room's write lock, if the room has a channel.
    pub async fn lock(&self, room_id: RoomId) -> Option<OwnedMutexGuard<()>> {
        let channel = self.get(room_id)?;
        Some(channel.lock().await)
    }

    /// Sends to the room if anybody has ever opened its channel.
    pub fn send(&self, room_id: RoomId, event: ServerEvent) -> Option<u64> {
        let channel = self.get(room_id)?;
        Some(channel.send(event))
    }

    /// Last sequence number sent to the room, 0 if it has no channel.
    pub fn seq(&self, room_id: RoomId) -> u64 {
        self.rooms().get(&room_id).map_or(0, RoomChannel::seq)
    }

    /// Forgets the room's channel once nobody listens to it anymore.
    pub fn release(&self, room_id: RoomId) {
        let mut rooms = self.rooms();
        if rooms
            .get(&room_id)
            .is_some_and(|channel| channel.receiver_count() == 0)
        {
            debug!(%room_id, "dropping idle room channel");
            rooms.remove(&room_id);
        }
    }

    pub fn remove(&self, room_id: RoomId) {
        self.rooms().remove(&room_id);
    }

    pub fn len(&self) -> usize {
        self.rooms().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
