use crate::model::{
    Estimate, Group, GroupId, Room, RoomId, Task, TaskId, TaskStatus, User, UserId, Vote,
};

use super::{Collection, GroupPatch, RoomPatch, TaskPatch, VoteStore};

/// Everything a client knows about its groups, rooms, tasks and votes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PokerState {
    pub groups: Collection<Group>,
    pub rooms: Collection<Room>,
    pub tasks: Collection<Task>,
    pub votes: VoteStore,
    pub users: Vec<User>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SetGroups(Vec<Group>),
    AddGroup(Group),
    UpdateGroup(GroupId, GroupPatch),
    RemoveGroup(GroupId),
    SelectGroup(Option<GroupId>),

    SetRooms(Vec<Room>),
    AddRoom(Room),
    UpdateRoom(RoomId, RoomPatch),
    RemoveRoom(RoomId),
    SelectRoom(Option<RoomId>),
    ParticipantJoined { room_id: RoomId, user: User },
    ParticipantLeft { room_id: RoomId, user_id: UserId },

    SetTasks(Vec<Task>),
    AddTask(Task),
    UpdateTask(TaskId, TaskPatch),
    RemoveTask(TaskId),
    SelectTask(Option<TaskId>),

    SetVotes(Vec<Vote>),
    RecordVote(Vote),
    RetractVote { task_id: TaskId, user_id: UserId },
    ClearVote(UserId),
    ClearTaskVotes(TaskId),

    ActivateTask { room_id: RoomId, task_id: TaskId },
    DeactivateTask { room_id: RoomId },
    ResolveTask { task_id: TaskId, final_estimate: Estimate },
}

/// Applies one action to a snapshot and returns the next snapshot.
pub fn reduce(state: &PokerState, action: Action) -> PokerState {
    let mut next = state.clone();
    next.apply(action);
    next
}

impl PokerState {
    fn apply(&mut self, action: Action) {
        use Action::*;
        match action {
            SetGroups(groups) => self.groups.set(groups),
            AddGroup(group) => self.groups.add(group),
            UpdateGroup(id, patch) => self.groups.update(id, &patch),
            RemoveGroup(id) => {
                self.groups.remove(id);
                let detached: Vec<RoomId> = self
                    .rooms
                    .items()
                    .iter()
                    .filter(|room| room.group_id == Some(id))
                    .map(|room| room.id)
                    .collect();
                for room_id in detached {
                    self.rooms.update(
                        room_id,
                        &RoomPatch {
                            group_id: Some(None),
                            ..Default::default()
                        },
                    );
                }
            }
            SelectGroup(id) => self.groups.select(id),

            SetRooms(rooms) => self.rooms.set(rooms),
            AddRoom(room) => self.rooms.add(room),
            UpdateRoom(id, patch) => self.rooms.update(id, &patch),
            RemoveRoom(id) => {
                self.rooms.remove(id);
            }
            SelectRoom(id) => self.rooms.select(id),
            ParticipantJoined { room_id, user } => {
                self.rooms.modify(room_id, |room| {
                    room.participants.insert(user.id);
                });
                match self.users.iter_mut().find(|known| known.id == user.id) {
                    Some(known) => *known = user,
                    None => self.users.push(user),
                }
            }
            ParticipantLeft { room_id, user_id } => {
                self.rooms.modify(room_id, |room| {
                    room.participants.remove(&user_id);
                });
            }

            SetTasks(tasks) => self.tasks.set(tasks),
            AddTask(task) => self.tasks.add(task),
            UpdateTask(id, patch) => self.tasks.update(id, &patch),
            RemoveTask(id) => {
                if self.tasks.remove(id).is_some() {
                    self.votes.clear_task(id);
                }
                let pointing: Vec<RoomId> = self
                    .rooms
                    .items()
                    .iter()
                    .filter(|room| room.current_task_id == Some(id))
                    .map(|room| room.id)
                    .collect();
                for room_id in pointing {
                    self.rooms.modify(room_id, |room| room.current_task_id = None);
                }
            }
            SelectTask(id) => self.tasks.select(id),

            SetVotes(votes) => self.votes.set_votes(votes),
            RecordVote(vote) => {
                if !self.is_resolved(vote.task_id) {
                    self.votes.record_vote(vote.task_id, vote.user_id, vote.estimate);
                }
            }
            RetractVote { task_id, user_id } => {
                if !self.is_resolved(task_id) {
                    self.votes.retract_vote(task_id, user_id);
                }
            }
            ClearVote(user_id) => self.votes.clear_vote(user_id),
            ClearTaskVotes(task_id) => {
                self.votes.clear_task(task_id);
            }

            ActivateTask { room_id, task_id } => {
                let belongs = self
                    .tasks
                    .get(task_id)
                    .is_some_and(|task| task.room_id == room_id);
                if belongs && self.rooms.contains(room_id) {
                    self.rooms
                        .modify(room_id, |room| room.current_task_id = Some(task_id));
                    self.tasks.select(Some(task_id));
                }
            }
            DeactivateTask { room_id } => {
                let mut previous = None;
                self.rooms.modify(room_id, |room| {
                    previous = room.current_task_id.take();
                });
                if previous.is_some() && self.tasks.current_id() == previous {
                    self.tasks.select(None);
                }
            }
            ResolveTask {
                task_id,
                final_estimate,
            } => self.tasks.update(
                task_id,
                &TaskPatch {
                    final_estimate: Some(final_estimate),
                    ..Default::default()
                },
            ),
        }
    }

    fn is_resolved(&self, task_id: TaskId) -> bool {
        self.tasks.get(task_id).is_some_and(Task::is_resolved)
    }

    pub fn user(&self, id: UserId) -> Option<&User> {
        self.users.iter().find(|user| user.id == id)
    }

    pub fn rooms_in_group(&self, group_id: GroupId) -> impl Iterator<Item = &Room> {
        self.rooms
            .items()
            .iter()
            .filter(move |room| room.group_id == Some(group_id))
    }

    pub fn tasks_in_room(&self, room_id: RoomId) -> impl Iterator<Item = &Task> {
        self.tasks
            .items()
            .iter()
            .filter(move |task| task.room_id == room_id)
    }

    /// The task the room is voting on (or has just revealed).
    pub fn active_task(&self, room_id: RoomId) -> Option<&Task> {
        let task_id = self.rooms.get(room_id)?.current_task_id?;
        self.tasks.get(task_id)
    }

    /// Votes on the room's active task. Votes on other tasks are history.
    pub fn active_votes(&self, room_id: RoomId) -> Vec<Vote> {
        self.active_task(room_id)
            .map(|task| self.votes.votes_for(task.id))
            .unwrap_or_default()
    }

    pub fn task_status(&self, task_id: TaskId) -> Option<TaskStatus> {
        let task = self.tasks.get(task_id)?;
        if task.is_resolved() {
            return Some(TaskStatus::Resolved);
        }
        let active = self
            .rooms
            .get(task.room_id)
            .is_some_and(|room| room.current_task_id == Some(task_id));
        Some(if active {
            TaskStatus::Voting
        } else {
            TaskStatus::Pending
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    struct Fixture {
        state: PokerState,
        room: RoomId,
        t1: TaskId,
        t2: TaskId,
        u1: UserId,
    }

    fn fixture() -> Fixture {
        let room = Room {
            id: RoomId::new(),
            group_id: None,
            name: "Sprint 12".to_owned(),
            invite_code: "ABCD1234".to_owned(),
            participants: BTreeSet::new(),
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
        let fixture = Fixture {
            room: room.id,
            t1: t1.id,
            t2: t2.id,
            u1: UserId::new(),
            state: PokerState::default(),
        };
        let state = reduce(&fixture.state, Action::AddRoom(room));
        let state = reduce(&state, Action::SetTasks(vec![t1, t2]));
        Fixture { state, ..fixture }
    }

    fn vote(task_id: TaskId, user_id: UserId, card: &str) -> Action {
        Action::RecordVote(Vote {
            task_id,
            user_id,
            estimate: Estimate::from(card),
        })
    }

    #[test]
    fn revote_keeps_only_latest() {
        let f = fixture();
        let state = reduce(&f.state, Action::SelectTask(Some(f.t1)));
        let state = reduce(&state, vote(f.t1, f.u1, "5"));
        let state = reduce(&state, vote(f.t1, f.u1, "8"));

        assert_eq!(
            state.votes.list_votes(),
            vec![Vote {
                task_id: f.t1,
                user_id: f.u1,
                estimate: Estimate::from("8"),
            }]
        );
    }

    #[test]
    fn removing_current_task_clears_pointer_and_votes() {
        let f = fixture();
        let state = reduce(&f.state, Action::ActivateTask { room_id: f.room, task_id: f.t1 });
        let state = reduce(&state, vote(f.t1, f.u1, "3"));
        let state = reduce(&state, Action::RemoveTask(f.t1));

        assert!(state.tasks.current().is_none());
        assert!(!state.tasks.contains(f.t1));
        assert!(state.votes.is_empty());
        assert!(state.active_task(f.room).is_none());
    }

    #[test]
    fn reduce_leaves_input_untouched() {
        let f = fixture();
        let before = f.state.clone();
        let _ = reduce(&f.state, Action::RemoveTask(f.t1));
        assert_eq!(f.state, before);
    }

    #[test]
    fn activation_switches_active_subset() {
        let f = fixture();
        let state = reduce(&f.state, Action::ActivateTask { room_id: f.room, task_id: f.t1 });
        let state = reduce(&state, vote(f.t1, f.u1, "5"));
        let state = reduce(&state, Action::ActivateTask { room_id: f.room, task_id: f.t2 });

        assert!(state.active_votes(f.room).is_empty());
        assert_eq!(state.votes.count_for(f.t1), 1);
        assert_eq!(state.task_status(f.t2), Some(TaskStatus::Voting));
        assert_eq!(state.task_status(f.t1), Some(TaskStatus::Pending));
    }

    #[test]
    fn activation_rejects_foreign_task() {
        let f = fixture();
        let state = reduce(
            &f.state,
            Action::ActivateTask { room_id: RoomId::new(), task_id: f.t1 },
        );
        assert_eq!(state, f.state);
    }

    #[test]
    fn resolved_votes_are_frozen() {
        let f = fixture();
        let state = reduce(&f.state, Action::ActivateTask { room_id: f.room, task_id: f.t1 });
        let state = reduce(&state, vote(f.t1, f.u1, "5"));
        let state = reduce(
            &state,
            Action::ResolveTask { task_id: f.t1, final_estimate: Estimate::from("5") },
        );
        let state = reduce(&state, vote(f.t1, f.u1, "13"));
        let state = reduce(&state, Action::RetractVote { task_id: f.t1, user_id: f.u1 });

        assert_eq!(state.task_status(f.t1), Some(TaskStatus::Resolved));
        assert_eq!(state.votes.votes_for(f.t1)[0].estimate, Estimate::from("5"));
    }

    #[test]
    fn deactivate_clears_room_and_task_pointer() {
        let f = fixture();
        let state = reduce(&f.state, Action::ActivateTask { room_id: f.room, task_id: f.t1 });
        let state = reduce(&state, Action::DeactivateTask { room_id: f.room });

        assert!(state.active_task(f.room).is_none());
        assert!(state.tasks.current().is_none());
    }

    #[test]
    fn removing_group_detaches_rooms() {
        let f = fixture();
        let group = Group {
            id: GroupId::new(),
            name: "Platform".to_owned(),
            description: None,
        };
        let state = reduce(&f.state, Action::AddGroup(group.clone()));
        let state = reduce(&state, Action::SelectGroup(Some(group.id)));
        let state = reduce(
            &state,
            Action::UpdateRoom(f.room, RoomPatch { group_id: Some(Some(group.id)), ..Default::default() }),
        );
        assert_eq!(state.rooms_in_group(group.id).count(), 1);

        let state = reduce(&state, Action::RemoveGroup(group.id));

        assert!(state.groups.current().is_none());
        assert_eq!(state.rooms.get(f.room).unwrap().group_id, None);
    }

    #[test]
    fn removing_current_room_clears_pointer() {
        let f = fixture();
        let state = reduce(&f.state, Action::SelectRoom(Some(f.room)));
        let state = reduce(&state, Action::RemoveRoom(RoomId::new()));
        assert_eq!(state.rooms.current_id(), Some(f.room));

        let state = reduce(&state, Action::RemoveRoom(f.room));
        assert!(state.rooms.current_id().is_none());
    }

    #[test]
    fn participants_join_and_leave() {
        let f = fixture();
        let user = User { id: f.u1, name: "Ada".to_owned() };
        let state = reduce(&f.state, Action::ParticipantJoined { room_id: f.room, user: user.clone() });
        assert!(state.rooms.get(f.room).unwrap().participants.contains(&f.u1));
        assert_eq!(state.user(f.u1), Some(&user));

        let state = reduce(&state, Action::ParticipantLeft { room_id: f.room, user_id: f.u1 });
        assert!(state.rooms.get(f.room).unwrap().participants.is_empty());
    }
}
