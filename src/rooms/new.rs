use axum::{debug_handler, extract::State, http::StatusCode, Json};
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::info;

use crate::{
    appresult::PokerError,
    auth::CurrentUser,
    db,
    model::{GroupId, Room},
    AppResult,
};

use super::{msg::ServerEvent, Hub};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NewRoomQuery {
    name: String,
    group_id: Option<GroupId>,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn new_room(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user): CurrentUser,
    Json(NewRoomQuery { name, group_id }): Json<NewRoomQuery>,
) -> AppResult<(StatusCode, Json<Room>)> {
    let name = name.trim();
    if name.is_empty() {
        return Err(PokerError::Invalid("room name must not be empty".to_owned()).into());
    }
    if let Some(group_id) = group_id {
        if db::group(&db_pool, group_id).await?.is_none() {
            return Err(PokerError::NotFound("group").into());
        }
    }

    let room = db::create_room(&db_pool, name, group_id, user.id).await?;
    info!(room_id = %room.id, user_id = %user.id, invite_code = %room.invite_code, "room created");

    Ok((StatusCode::CREATED, Json(room)))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn list_rooms(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<Vec<Room>>> {
    Ok(Json(db::rooms_for_user(&db_pool, user.id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct JoinQuery {
    invite_code: String,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn join_by_invite(
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
    CurrentUser(user): CurrentUser,
    Json(JoinQuery { invite_code }): Json<JoinQuery>,
) -> AppResult<Json<Room>> {
    let Some(mut room) = db::room_by_invite(&db_pool, &invite_code).await? else {
        return Err(PokerError::NotFound("room").into());
    };

    let _write = hub.lock(room.id).await;
    if db::add_participant(&db_pool, room.id, user.id).await? {
        info!(room_id = %room.id, user_id = %user.id, "joined room by invite");
        room.participants.insert(user.id);
        hub.send(
            room.id,
            ServerEvent::UserJoined {
                user_id: user.id,
                name: user.name,
            },
        );
    }

    Ok(Json(room))
}
