use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::{
    appresult::PokerError,
    db,
    model::{RoomId, Task, TaskId, User, Vote},
    store::VoteStatistics,
    AppResult,
};

use super::{
    hub::{Hub, RoomChannel},
    msg::{ClientEvent, RoomSnapshot, ServerEvent},
};

/// A socket that completed `room:join`.
#[derive(Debug, Clone)]
pub struct Member {
    pub user: User,
    pub room_id: RoomId,
}

/// Result of a successful join. The receiver is subscribed before the snapshot is read, so
/// nothing sent after the snapshot can be missed.
pub struct Joined {
    pub member: Member,
    pub channel: RoomChannel,
    pub rx: tokio::sync::broadcast::Receiver<super::msg::Broadcast>,
    pub snapshot: RoomSnapshot,
}

pub async fn join(
    db_pool: &SqlitePool,
    hub: &Hub,
    room_id: RoomId,
    user_token: &str,
) -> AppResult<Joined> {
    let user = db::user_by_token(db_pool, user_token)
        .await?
        .ok_or(PokerError::Unauthorized("unknown user token"))?;
    if db::room(db_pool, room_id).await?.is_none() {
        return Err(PokerError::NotFound("room").into());
    }

    let (channel, rx) = hub.subscribe(room_id);
    let _write = channel.lock().await;
    db::add_participant(db_pool, room_id, user.id).await?;
    let snapshot = db::snapshot(db_pool, room_id, channel.seq())
        .await?
        .ok_or(PokerError::NotFound("room"))?;

    info!(%room_id, user_id = %user.id, "user joined room");
    channel.send(ServerEvent::UserJoined {
        user_id: user.id,
        name: user.name.clone(),
    });

    Ok(Joined {
        member: Member { user, room_id },
        channel,
        rx,
        snapshot,
    })
}

pub fn leave(hub: &Hub, channel: &RoomChannel, member: &Member) {
    info!(room_id = %member.room_id, user_id = %member.user.id, "user left room");
    channel.send(ServerEvent::UserLeft {
        user_id: member.user.id,
    });
    hub.release(member.room_id);
}

fn task_title(title: &str) -> AppResult<&str> {
    let title = title.trim();
    if title.is_empty() {
        return Err(PokerError::Invalid("task title must not be empty".to_owned()).into());
    }
    Ok(title)
}

pub async fn create_task(
    db_pool: &SqlitePool,
    room_id: RoomId,
    title: &str,
    description: Option<&str>,
) -> AppResult<Task> {
    let title = task_title(title)?;
    let description = description.map(str::trim).filter(|d| !d.is_empty());
    db::create_task(db_pool, room_id, title, description).await
}

/// Edits title and/or description. Fields left out stay as they are.
pub async fn update_task(
    db_pool: &SqlitePool,
    room_id: RoomId,
    task_id: TaskId,
    title: Option<&str>,
    description: Option<&str>,
) -> AppResult<Task> {
    room_task(db_pool, room_id, task_id).await?;
    let title = title.map(task_title).transpose()?;
    let description = description.map(str::trim);

    db::update_task(db_pool, task_id, title, description).await?;
    db::task(db_pool, task_id)
        .await?
        .ok_or_else(|| PokerError::NotFound("task").into())
}

/// Deletes the task with its votes and detaches it from the room.
pub async fn delete_task(db_pool: &SqlitePool, room_id: RoomId, task_id: TaskId) -> AppResult<()> {
    room_task(db_pool, room_id, task_id).await?;
    db::delete_task(db_pool, task_id).await?;
    Ok(())
}

async fn room_task(db_pool: &SqlitePool, room_id: RoomId, task_id: TaskId) -> AppResult<Task> {
    match db::task(db_pool, task_id).await? {
        Some(task) if task.room_id == room_id => Ok(task),
        _ => Err(PokerError::NotFound("task").into()),
    }
}

/// The task must be the room's active task and still open for votes.
async fn open_task(db_pool: &SqlitePool, member: &Member, task_id: TaskId) -> AppResult<Task> {
    let task = room_task(db_pool, member.room_id, task_id).await?;
    let room = db::room(db_pool, member.room_id)
        .await?
        .ok_or(PokerError::NotFound("room"))?;
    if room.current_task_id != Some(task_id) {
        return Err(PokerError::Invalid("task is not active for voting".to_owned()).into());
    }
    if task.is_resolved() {
        return Err(PokerError::Invalid("votes for this task are already revealed".to_owned()).into());
    }
    Ok(task)
}

fn same_room(member: &Member, room_id: RoomId) -> AppResult<()> {
    if room_id != member.room_id {
        return Err(PokerError::Invalid(format!(
            "socket is joined to room {}, not {room_id}",
            member.room_id
        ))
        .into());
    }
    Ok(())
}

/// Applies one event from a joined socket and broadcasts the outcome to the room.
///
/// The room's write lock is held until the broadcast is sent.
pub async fn handle(
    db_pool: &SqlitePool,
    channel: &RoomChannel,
    member: &Member,
    event: ClientEvent,
) -> AppResult<()> {
    debug!(room_id = %member.room_id, user_id = %member.user.id, ?event, "room event");
    let _write = channel.lock().await;

    match event {
        ClientEvent::RoomJoin { .. } => {
            return Err(PokerError::Invalid("socket already joined a room".to_owned()).into());
        }
        ClientEvent::RoomLeave {} => {}
        ClientEvent::VoteCast {
            task_id,
            user_id,
            estimate,
        } => {
            if user_id != member.user.id {
                return Err(PokerError::Unauthorized("cannot vote for another user").into());
            }
            open_task(db_pool, member, task_id).await?;
            let vote = Vote {
                task_id,
                user_id,
                estimate,
            };
            db::upsert_vote(db_pool, &vote).await?;
            channel.send(ServerEvent::VoteCast {
                task_id: vote.task_id,
                user_id: vote.user_id,
                estimate: vote.estimate,
            });
        }
        ClientEvent::VoteRetract { task_id } => {
            open_task(db_pool, member, task_id).await?;
            if db::delete_vote(db_pool, task_id, member.user.id).await? {
                channel.send(ServerEvent::VoteRetracted {
                    task_id,
                    user_id: member.user.id,
                });
            }
        }
        ClientEvent::TaskCreate { title, description } => {
            let task = create_task(db_pool, member.room_id, &title, description.as_deref()).await?;
            channel.send(ServerEvent::TaskCreated { task });
        }
        ClientEvent::TaskUpdate {
            task_id,
            title,
            description,
        } => {
            let task = update_task(
                db_pool,
                member.room_id,
                task_id,
                title.as_deref(),
                description.as_deref(),
            )
            .await?;
            channel.send(ServerEvent::TaskUpdated { task });
        }
        ClientEvent::TaskDelete { task_id } => {
            delete_task(db_pool, member.room_id, task_id).await?;
            info!(room_id = %member.room_id, %task_id, "task deleted");
            channel.send(ServerEvent::TaskDeleted { task_id });
        }
        ClientEvent::TaskActivate { room_id, task_id } => {
            same_room(member, room_id)?;
            if !db::activate_task(db_pool, room_id, task_id).await? {
                return Err(PokerError::NotFound("task").into());
            }
            info!(%room_id, %task_id, "task activated");
            channel.send(ServerEvent::TaskActivate { room_id, task_id });
        }
        ClientEvent::TaskDeactivate { room_id } => {
            same_room(member, room_id)?;
            db::deactivate_task(db_pool, room_id).await?;
            channel.send(ServerEvent::TaskDeactivate { room_id });
        }
        ClientEvent::TaskResolve {
            task_id,
            final_estimate,
        } => {
            room_task(db_pool, member.room_id, task_id).await?;
            db::resolve_task(db_pool, task_id, &final_estimate).await?;
            let votes = db::votes_for_task(db_pool, task_id).await?;
            let statistics = VoteStatistics::from_votes(&votes);
            info!(%task_id, %final_estimate, votes = votes.len(), "votes revealed");
            channel.send(ServerEvent::TaskResolve {
                task_id,
                final_estimate,
                statistics,
            });
        }
        ClientEvent::VotesClear { task_id } => {
            let task = room_task(db_pool, member.room_id, task_id).await?;
            if task.is_resolved() {
                return Err(PokerError::Invalid("votes for this task are already revealed".to_owned()).into());
            }
            let deleted_count = db::clear_votes(db_pool, task_id).await?;
            info!(%task_id, deleted_count, "votes cleared");
            channel.send(ServerEvent::VotesCleared {
                task_id,
                deleted_count,
            });
        }
    }

    Ok(())
}
