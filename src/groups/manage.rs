use axum::{
    debug_handler,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::info;

use crate::{
    appresult::PokerError,
    auth::CurrentUser,
    db,
    model::{Group, GroupId},
    AppResult,
};

#[derive(Debug, Deserialize)]
pub(crate) struct NewGroupQuery {
    name: String,
    description: Option<String>,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn list_groups(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<Vec<Group>>> {
    Ok(Json(db::groups_for_user(&db_pool, user.id).await?))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn new_group(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user): CurrentUser,
    Json(NewGroupQuery { name, description }): Json<NewGroupQuery>,
) -> AppResult<(StatusCode, Json<Group>)> {
    let name = name.trim();
    if name.is_empty() {
        return Err(PokerError::Invalid("group name must not be empty".to_owned()).into());
    }
    let description = description.as_deref().map(str::trim).filter(|d| !d.is_empty());

    let group = db::create_group(&db_pool, name, description, user.id).await?;
    info!(group_id = %group.id, user_id = %user.id, "group created");

    Ok((StatusCode::CREATED, Json(group)))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn delete_group(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user): CurrentUser,
    Path(group_id): Path<GroupId>,
) -> AppResult<StatusCode> {
    if !db::delete_group(&db_pool, group_id).await? {
        return Err(PokerError::NotFound("group").into());
    }
    info!(%group_id, user_id = %user.id, "group deleted, rooms detached");

    Ok(StatusCode::NO_CONTENT)
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn group(
    State(db_pool): State<SqlitePool>,
    CurrentUser(_): CurrentUser,
    Path(group_id): Path<GroupId>,
) -> AppResult<Json<Group>> {
    let group = db::group(&db_pool, group_id)
        .await?
        .ok_or(PokerError::NotFound("group"))?;
    Ok(Json(group))
}

#[derive(Debug, Deserialize)]
pub(crate) struct EditGroupQuery {
    name: Option<String>,
    description: Option<String>,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn edit_group(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user): CurrentUser,
    Path(group_id): Path<GroupId>,
    Json(EditGroupQuery { name, description }): Json<EditGroupQuery>,
) -> AppResult<Json<Group>> {
    let name = name.as_deref().map(str::trim);
    if name.is_some_and(str::is_empty) {
        return Err(PokerError::Invalid("group name must not be empty".to_owned()).into());
    }

    let group = db::update_group(&db_pool, group_id, name, description.as_deref().map(str::trim))
        .await?
        .ok_or(PokerError::NotFound("group"))?;
    info!(%group_id, user_id = %user.id, "group updated");

    Ok(Json(group))
}
