//! Client-side view of one room, driven by the server's broadcasts.
//!
//! A [`RoomSession`] tracks the connection phase and applies every broadcast to its [`Store`].
//! Everything after the handshake is derived from the cached state, so the phase can never
//! disagree with what the store shows.

use std::{collections::BTreeSet, sync::Arc};

use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    model::{Estimate, RoomId, User, UserId, Vote},
    rooms::msg::{Broadcast, ClientEvent, ErrorKind, RoomSnapshot, ServerEvent},
    store::{Action, PokerState, RoomPatch, Store, TaskPatch},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomPhase {
    Disconnected,
    Connecting,
    Joined,
    Voting,
    Revealed,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("identity token rejected: {0}")]
    Unauthorized(String),
    #[error("server rejected event ({kind:?}): {message}")]
    Rejected { kind: ErrorKind, message: String },
}

#[derive(Debug)]
pub struct RoomSession {
    room_id: RoomId,
    user_id: UserId,
    joined: bool,
    connecting: bool,
    last_seq: Option<u64>,
    online: BTreeSet<UserId>,
    store: Store,
}

impl RoomSession {
    pub fn new(room_id: RoomId, user_id: UserId) -> Self {
        Self {
            room_id,
            user_id,
            joined: false,
            connecting: false,
            last_seq: None,
            online: BTreeSet::new(),
            store: Store::default(),
        }
    }

    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn state(&self) -> Arc<PokerState> {
        self.store.snapshot()
    }

    pub fn online(&self) -> &BTreeSet<UserId> {
        &self.online
    }

    pub fn phase(&self) -> RoomPhase {
        if !self.joined {
            return if self.connecting {
                RoomPhase::Connecting
            } else {
                RoomPhase::Disconnected
            };
        }
        match self.state().active_task(self.room_id) {
            Some(task) if task.is_resolved() => RoomPhase::Revealed,
            Some(_) => RoomPhase::Voting,
            None => RoomPhase::Joined,
        }
    }

    /// Starts a connection attempt and returns the handshake to send once the socket is open.
    pub fn connect(&mut self, user_token: impl Into<String>) -> ClientEvent {
        self.connecting = true;
        ClientEvent::RoomJoin {
            room_id: self.room_id,
            user_token: user_token.into(),
        }
    }

    /// The transport dropped. Cached state is kept until the next snapshot replaces it.
    pub fn disconnected(&mut self) {
        debug!(room_id = %self.room_id, "room session lost its connection");
        self.joined = false;
        self.connecting = true;
        self.online.clear();
    }

    pub fn close(&mut self) {
        self.joined = false;
        self.connecting = false;
        self.online.clear();
    }

    pub fn cast_vote(&self, estimate: impl Into<Estimate>) -> Option<ClientEvent> {
        let state = self.state();
        let task = state.active_task(self.room_id)?;
        if task.is_resolved() {
            return None;
        }
        Some(ClientEvent::VoteCast {
            task_id: task.id,
            user_id: self.user_id,
            estimate: estimate.into(),
        })
    }

    pub fn handle(&mut self, broadcast: Broadcast) -> Result<RoomPhase, SessionError> {
        let Broadcast { seq, event } = broadcast;

        match event {
            ServerEvent::RoomSnapshot(snapshot) => {
                self.hydrate(snapshot);
                return Ok(self.phase());
            }
            ServerEvent::RoomClosed { room_id } if room_id == self.room_id => {
                debug!(%room_id, "room was deleted");
                self.close();
                return Ok(self.phase());
            }
            ServerEvent::Error { kind, message } => {
                if kind == ErrorKind::Unauthorized && !self.joined {
                    self.close();
                    return Err(SessionError::Unauthorized(message));
                }
                return Err(SessionError::Rejected { kind, message });
            }
            _ if !self.joined => {
                debug!(seq, "dropping broadcast received before snapshot");
                return Ok(self.phase());
            }
            _ if self.last_seq.is_some_and(|last| seq <= last) => {
                warn!(seq, last = ?self.last_seq, "dropping stale broadcast");
                return Ok(self.phase());
            }
            event => {
                self.last_seq = Some(seq);
                if let Some(action) = self.action_for(event) {
                    self.store.dispatch(action);
                }
            }
        }

        Ok(self.phase())
    }

    fn action_for(&mut self, event: ServerEvent) -> Option<Action> {
        let room_id = self.room_id;
        let action = match event {
            ServerEvent::UserJoined { user_id, name } => {
                self.online.insert(user_id);
                Action::ParticipantJoined {
                    room_id,
                    user: User { id: user_id, name },
                }
            }
            ServerEvent::UserLeft { user_id } => {
                self.online.remove(&user_id);
                return None;
            }
            ServerEvent::VoteCast {
                task_id,
                user_id,
                estimate,
            } => Action::RecordVote(Vote {
                task_id,
                user_id,
                estimate,
            }),
            ServerEvent::VoteRetracted { task_id, user_id } => {
                Action::RetractVote { task_id, user_id }
            }
            ServerEvent::TaskCreated { task } => Action::AddTask(task),
            ServerEvent::TaskUpdated { task } => Action::UpdateTask(
                task.id,
                TaskPatch {
                    title: Some(task.title),
                    description: task.description,
                    final_estimate: task.final_estimate,
                },
            ),
            ServerEvent::TaskDeleted { task_id } => Action::RemoveTask(task_id),
            ServerEvent::RoomUpdated { room } => Action::UpdateRoom(
                room.id,
                RoomPatch {
                    name: Some(room.name),
                    group_id: Some(room.group_id),
                },
            ),
            ServerEvent::TaskActivate { room_id, task_id } => {
                Action::ActivateTask { room_id, task_id }
            }
            ServerEvent::TaskDeactivate { room_id } => Action::DeactivateTask { room_id },
            ServerEvent::TaskResolve {
                task_id,
                final_estimate,
                ..
            } => Action::ResolveTask {
                task_id,
                final_estimate,
            },
            ServerEvent::VotesCleared { task_id, .. } => Action::ClearTaskVotes(task_id),
            ServerEvent::RoomSnapshot(_)
            | ServerEvent::RoomClosed { .. }
            | ServerEvent::Error { .. } => return None,
        };
        Some(action)
    }

    /// Replaces the whole cache with the server's view of the room.
    fn hydrate(&mut self, snapshot: RoomSnapshot) {
        let RoomSnapshot {
            seq,
            room,
            group,
            participants,
            tasks,
            votes,
        } = snapshot;

        let current_task = room.current_task_id;
        let mut state = PokerState::default();
        state.groups.set(group.into_iter().collect());
        state.groups.select(room.group_id);
        state.rooms.set(vec![room]);
        state.rooms.select(Some(self.room_id));
        state.tasks.set(tasks);
        state.tasks.select(current_task);
        state.votes.set_votes(votes);
        state.users = participants;

        self.store.update(|_| state);
        self.last_seq = Some(seq);
        self.joined = true;
        self.connecting = false;
        self.online.insert(self.user_id);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::model::{Room, Task, TaskId};

    struct Fixture {
        session: RoomSession,
        room: Room,
        t1: Task,
        t2: Task,
        me: UserId,
    }

    fn fixture() -> Fixture {
        let me = UserId::new();
        let room = Room {
            id: RoomId::new(),
            group_id: None,
            name: "Sprint".to_owned(),
            invite_code: "0A1B2C3D".to_owned(),
            participants: BTreeSet::from([me]),
            current_task_id: None,
        };
        let task = |title: &str| Task {
            id: TaskId::new(),
            room_id: room.id,
            title: title.to_owned(),
            description: None,
            final_estimate: None,
        };
        let (t1, t2) = (task("T1"), task("T2"));
        Fixture {
            session: RoomSession::new(room.id, me),
            room,
            t1,
            t2,
            me,
        }
    }

    fn snapshot(f: &Fixture, seq: u64) -> Broadcast {
        Broadcast {
            seq,
            event: ServerEvent::RoomSnapshot(RoomSnapshot {
                seq,
                room: f.room.clone(),
                group: None,
                participants: vec![User { id: f.me, name: "me".to_owned() }],
                tasks: vec![f.t1.clone(), f.t2.clone()],
                votes: vec![],
            }),
        }
    }

    fn at(seq: u64, event: ServerEvent) -> Broadcast {
        Broadcast { seq, event }
    }

    #[test]
    fn full_round_walks_every_phase() {
        let mut f = fixture();
        assert_eq!(f.session.phase(), RoomPhase::Disconnected);

        f.session.connect("token");
        assert_eq!(f.session.phase(), RoomPhase::Connecting);

        let snap = snapshot(&f, 1);
        assert_eq!(f.session.handle(snap), Ok(RoomPhase::Joined));

        let activate = ServerEvent::TaskActivate { room_id: f.room.id, task_id: f.t1.id };
        assert_eq!(f.session.handle(at(2, activate)), Ok(RoomPhase::Voting));

        let vote = f.session.cast_vote("5").unwrap();
        assert!(matches!(vote, ClientEvent::VoteCast { task_id, .. } if task_id == f.t1.id));

        let resolve = ServerEvent::TaskResolve {
            task_id: f.t1.id,
            final_estimate: Estimate::from("5"),
            statistics: None,
        };
        assert_eq!(f.session.handle(at(3, resolve)), Ok(RoomPhase::Revealed));
        assert!(f.session.cast_vote("8").is_none());

        let next = ServerEvent::TaskActivate { room_id: f.room.id, task_id: f.t2.id };
        assert_eq!(f.session.handle(at(4, next)), Ok(RoomPhase::Voting));

        let off = ServerEvent::TaskDeactivate { room_id: f.room.id };
        assert_eq!(f.session.handle(at(5, off)), Ok(RoomPhase::Joined));
    }

    #[test]
    fn disconnect_keeps_cache_until_resync() {
        let mut f = fixture();
        f.session.connect("token");
        f.session.handle(snapshot(&f, 1)).unwrap();
        let vote = ServerEvent::VoteCast {
            task_id: f.t1.id,
            user_id: f.me,
            estimate: Estimate::from("3"),
        };
        f.session.handle(at(2, vote)).unwrap();

        f.session.disconnected();

        assert_eq!(f.session.phase(), RoomPhase::Connecting);
        assert_eq!(f.session.state().votes.len(), 1);

        // the server no longer has that vote; the snapshot wins
        f.session.handle(snapshot(&f, 9)).unwrap();
        assert!(f.session.state().votes.is_empty());
        assert_eq!(f.session.phase(), RoomPhase::Joined);
    }

    #[test]
    fn stale_broadcasts_are_dropped() {
        let mut f = fixture();
        f.session.connect("token");
        f.session.handle(snapshot(&f, 5)).unwrap();

        let late = ServerEvent::TaskActivate { room_id: f.room.id, task_id: f.t1.id };
        assert_eq!(f.session.handle(at(5, late)), Ok(RoomPhase::Joined));
        assert!(f.session.state().tasks.current().is_none());
    }

    #[test]
    fn unauthorized_handshake_disconnects() {
        let mut f = fixture();
        f.session.connect("bad");
        let err = f
            .session
            .handle(at(0, ServerEvent::Error {
                kind: ErrorKind::Unauthorized,
                message: "unknown token".to_owned(),
            }))
            .unwrap_err();

        assert_eq!(err, SessionError::Unauthorized("unknown token".to_owned()));
        assert_eq!(f.session.phase(), RoomPhase::Disconnected);
    }

    #[test]
    fn closed_room_disconnects() {
        let mut f = fixture();
        f.session.connect("token");
        f.session.handle(snapshot(&f, 1)).unwrap();

        let closed = ServerEvent::RoomClosed { room_id: f.room.id };
        assert_eq!(f.session.handle(at(2, closed)), Ok(RoomPhase::Disconnected));
    }

    #[test]
    fn edits_and_deletes_reach_the_cache() {
        let mut f = fixture();
        f.session.connect("token");
        f.session.handle(snapshot(&f, 1)).unwrap();
        let activate = ServerEvent::TaskActivate { room_id: f.room.id, task_id: f.t1.id };
        f.session.handle(at(2, activate)).unwrap();

        let edited = Task { title: "T1 (split)".to_owned(), ..f.t1.clone() };
        f.session.handle(at(3, ServerEvent::TaskUpdated { task: edited.clone() })).unwrap();
        assert_eq!(f.session.state().tasks.current(), Some(&edited));

        let renamed = Room { name: "Sprint 13".to_owned(), ..f.room.clone() };
        f.session.handle(at(4, ServerEvent::RoomUpdated { room: renamed })).unwrap();
        assert_eq!(f.session.state().rooms.current().unwrap().name, "Sprint 13");

        let deleted = ServerEvent::TaskDeleted { task_id: f.t1.id };
        assert_eq!(f.session.handle(at(5, deleted)), Ok(RoomPhase::Joined));
        assert!(f.session.state().tasks.get(f.t1.id).is_none());
        assert!(f.session.state().tasks.current().is_none());
    }

    #[test]
    fn presence_follows_join_and_leave() {
        let mut f = fixture();
        f.session.connect("token");
        f.session.handle(snapshot(&f, 1)).unwrap();
        let other = UserId::new();

        f.session
            .handle(at(2, ServerEvent::UserJoined { user_id: other, name: "Bo".to_owned() }))
            .unwrap();
        assert!(f.session.online().contains(&other));
        assert!(f.session.state().user(other).is_some());

        f.session.handle(at(3, ServerEvent::UserLeft { user_id: other })).unwrap();
        assert!(!f.session.online().contains(&other));
        assert!(f.session.state().rooms.get(f.room.id).unwrap().participants.contains(&other));
    }
}
