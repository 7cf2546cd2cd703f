use axum::{
    debug_handler,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Deserializer};
use sqlx::SqlitePool;
use tracing::info;

use crate::{
    appresult::PokerError,
    auth::CurrentUser,
    db,
    model::{GroupId, Room, RoomId, Task, TaskId, UserId},
    AppResult,
};

use super::{actions, msg::{RoomSnapshot, ServerEvent}, Hub};

/// Rooms the user is not part of look the same as rooms that don't exist.
async fn visible_room(db_pool: &SqlitePool, room_id: RoomId, user_id: UserId) -> AppResult<()> {
    if !db::is_participant(db_pool, room_id, user_id).await? {
        return Err(PokerError::NotFound("room").into());
    }
    Ok(())
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn room(
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
    CurrentUser(user): CurrentUser,
    Path(room_id): Path<RoomId>,
) -> AppResult<Json<RoomSnapshot>> {
    visible_room(&db_pool, room_id, user.id).await?;

    let snapshot = db::snapshot(&db_pool, room_id, hub.seq(room_id))
        .await?
        .ok_or(PokerError::NotFound("room"))?;

    Ok(Json(snapshot))
}

/// Distinguishes a missing `groupId` from an explicit `null`.
fn some_group<'de, D>(deserializer: D) -> Result<Option<Option<GroupId>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<GroupId>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EditRoomQuery {
    name: Option<String>,
    #[serde(default, deserialize_with = "some_group")]
    group_id: Option<Option<GroupId>>,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn edit_room(
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
    CurrentUser(user): CurrentUser,
    Path(room_id): Path<RoomId>,
    Json(EditRoomQuery { name, group_id }): Json<EditRoomQuery>,
) -> AppResult<Json<Room>> {
    visible_room(&db_pool, room_id, user.id).await?;
    let name = name.as_deref().map(str::trim);
    if name.is_some_and(str::is_empty) {
        return Err(PokerError::Invalid("room name must not be empty".to_owned()).into());
    }
    if let Some(Some(group_id)) = group_id {
        if db::group(&db_pool, group_id).await?.is_none() {
            return Err(PokerError::NotFound("group").into());
        }
    }

    let _write = hub.lock(room_id).await;
    let room = db::update_room(&db_pool, room_id, name, group_id)
        .await?
        .ok_or(PokerError::NotFound("room"))?;
    info!(%room_id, user_id = %user.id, "room updated");
    hub.send(room_id, ServerEvent::RoomUpdated { room: room.clone() });

    Ok(Json(room))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn delete_room(
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
    CurrentUser(user): CurrentUser,
    Path(room_id): Path<RoomId>,
) -> AppResult<StatusCode> {
    visible_room(&db_pool, room_id, user.id).await?;

    let _write = hub.lock(room_id).await;
    db::delete_room(&db_pool, room_id).await?;
    hub.send(room_id, ServerEvent::RoomClosed { room_id });
    hub.remove(room_id);
    info!(%room_id, user_id = %user.id, "room deleted");

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub(crate) struct NewTaskQuery {
    title: String,
    description: Option<String>,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn new_task(
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
    CurrentUser(user): CurrentUser,
    Path(room_id): Path<RoomId>,
    Json(NewTaskQuery { title, description }): Json<NewTaskQuery>,
) -> AppResult<(StatusCode, Json<Task>)> {
    visible_room(&db_pool, room_id, user.id).await?;

    let _write = hub.lock(room_id).await;
    let task = actions::create_task(&db_pool, room_id, &title, description.as_deref()).await?;
    info!(%room_id, task_id = %task.id, "task created");
    hub.send(room_id, ServerEvent::TaskCreated { task: task.clone() });

    Ok((StatusCode::CREATED, Json(task)))
}

#[derive(Debug, Deserialize)]
pub(crate) struct EditTaskQuery {
    title: Option<String>,
    description: Option<String>,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn edit_task(
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
    CurrentUser(user): CurrentUser,
    Path((room_id, task_id)): Path<(RoomId, TaskId)>,
    Json(EditTaskQuery { title, description }): Json<EditTaskQuery>,
) -> AppResult<Json<Task>> {
    visible_room(&db_pool, room_id, user.id).await?;

    let _write = hub.lock(room_id).await;
    let task = actions::update_task(
        &db_pool,
        room_id,
        task_id,
        title.as_deref(),
        description.as_deref(),
    )
    .await?;
    hub.send(room_id, ServerEvent::TaskUpdated { task: task.clone() });

    Ok(Json(task))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn delete_task(
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
    CurrentUser(user): CurrentUser,
    Path((room_id, task_id)): Path<(RoomId, TaskId)>,
) -> AppResult<StatusCode> {
    visible_room(&db_pool, room_id, user.id).await?;

    let _write = hub.lock(room_id).await;
    actions::delete_task(&db_pool, room_id, task_id).await?;
    info!(%room_id, %task_id, user_id = %user.id, "task deleted");
    hub.send(room_id, ServerEvent::TaskDeleted { task_id });

    Ok(StatusCode::NO_CONTENT)
}
