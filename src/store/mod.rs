//! In-memory projection of groups, rooms, tasks and votes.
//!
//! State lives in an immutable [`PokerState`] record. Every change goes through
//! [`reduce`] (or a caller-supplied transform) and is published as a new snapshot.

mod collection;
mod state;
mod votes;

use std::sync::Arc;

use tokio::sync::watch;

pub use collection::{Collection, Entity, GroupPatch, RoomPatch, TaskPatch};
pub use state::{reduce, Action, PokerState};
pub use votes::{VoteStatistics, VoteStore};

/// Publishes [`PokerState`] snapshots to any number of subscribers.
#[derive(Debug)]
pub struct Store {
    tx: watch::Sender<Arc<PokerState>>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new(PokerState::default())
    }
}

impl Store {
    pub fn new(initial: PokerState) -> Self {
        Self {
            tx: watch::Sender::new(Arc::new(initial)),
        }
    }

    pub fn snapshot(&self) -> Arc<PokerState> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<PokerState>> {
        self.tx.subscribe()
    }

    pub fn dispatch(&self, action: Action) -> Arc<PokerState> {
        self.update(|state| reduce(state, action))
    }

    /// Builds the next snapshot from the current one and publishes it.
    ///
    /// `f` runs under the channel's write lock, so concurrent updates never
    /// build on the same snapshot.
    pub fn update(&self, f: impl FnOnce(&PokerState) -> PokerState) -> Arc<PokerState> {
        let mut next = None;
        self.tx.send_modify(|current| {
            *current = Arc::new(f(&**current));
            next = Some(current.clone());
        });
        next.unwrap_or_else(|| self.snapshot())
    }
}
