use serde::{Deserialize, Serialize};

use crate::{
    model::{Estimate, Group, Room, RoomId, Task, TaskId, User, UserId, Vote},
    store::VoteStatistics,
};

/// Events a client sends over the room socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "room:join", rename_all = "camelCase")]
    RoomJoin { room_id: RoomId, user_token: String },
    #[serde(rename = "room:leave")]
    RoomLeave {},
    #[serde(rename = "vote:cast", rename_all = "camelCase")]
    VoteCast {
        task_id: TaskId,
        user_id: UserId,
        estimate: Estimate,
    },
    #[serde(rename = "vote:retract", rename_all = "camelCase")]
    VoteRetract { task_id: TaskId },
    #[serde(rename = "task:create", rename_all = "camelCase")]
    TaskCreate {
        title: String,
        #[serde(default)]
        description: Option<String>,
    },
    #[serde(rename = "task:update", rename_all = "camelCase")]
    TaskUpdate {
        task_id: TaskId,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        description: Option<String>,
    },
    #[serde(rename = "task:delete", rename_all = "camelCase")]
    TaskDelete { task_id: TaskId },
    #[serde(rename = "task:activate", rename_all = "camelCase")]
    TaskActivate { room_id: RoomId, task_id: TaskId },
    #[serde(rename = "task:deactivate", rename_all = "camelCase")]
    TaskDeactivate { room_id: RoomId },
    #[serde(rename = "task:resolve", rename_all = "camelCase")]
    TaskResolve {
        task_id: TaskId,
        final_estimate: Estimate,
    },
    #[serde(rename = "votes:clear", rename_all = "camelCase")]
    VotesClear { task_id: TaskId },
}

/// Full authoritative state of one room, used on join and for resynchronisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub seq: u64,
    pub room: Room,
    pub group: Option<Group>,
    pub participants: Vec<User>,
    pub tasks: Vec<Task>,
    pub votes: Vec<Vote>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unauthorized,
    NotFound,
    Invalid,
    Internal,
}

/// Events the server sends to room members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "room:snapshot")]
    RoomSnapshot(RoomSnapshot),
    #[serde(rename = "user:joined", rename_all = "camelCase")]
    UserJoined { user_id: UserId, name: String },
    #[serde(rename = "user:left", rename_all = "camelCase")]
    UserLeft { user_id: UserId },
    #[serde(rename = "vote:cast", rename_all = "camelCase")]
    VoteCast {
        task_id: TaskId,
        user_id: UserId,
        estimate: Estimate,
    },
    #[serde(rename = "vote:retracted", rename_all = "camelCase")]
    VoteRetracted { task_id: TaskId, user_id: UserId },
    #[serde(rename = "task:created", rename_all = "camelCase")]
    TaskCreated { task: Task },
    #[serde(rename = "task:updated", rename_all = "camelCase")]
    TaskUpdated { task: Task },
    #[serde(rename = "task:deleted", rename_all = "camelCase")]
    TaskDeleted { task_id: TaskId },
    #[serde(rename = "task:activate", rename_all = "camelCase")]
    TaskActivate { room_id: RoomId, task_id: TaskId },
    #[serde(rename = "task:deactivate", rename_all = "camelCase")]
    TaskDeactivate { room_id: RoomId },
    #[serde(rename = "task:resolve", rename_all = "camelCase")]
    TaskResolve {
        task_id: TaskId,
        final_estimate: Estimate,
        statistics: Option<VoteStatistics>,
    },
    #[serde(rename = "votes:cleared", rename_all = "camelCase")]
    VotesCleared { task_id: TaskId, deleted_count: u64 },
    #[serde(rename = "room:updated", rename_all = "camelCase")]
    RoomUpdated { room: Room },
    #[serde(rename = "room:closed", rename_all = "camelCase")]
    RoomClosed { room_id: RoomId },
    #[serde(rename = "error")]
    Error { kind: ErrorKind, message: String },
}

/// A server event stamped with the room's sequence number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Broadcast {
    pub seq: u64,
    pub event: ServerEvent,
}
