use axum::{debug_handler, extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::info;

use crate::{db, model::UserId, AppResult};

use super::random_alias;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RegisterRequest {
    name: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct RegisterResponse {
    id: UserId,
    name: String,
    token: String,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn register(
    State(db_pool): State<SqlitePool>,
    Json(RegisterRequest { name }): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<RegisterResponse>)> {
    let name = name
        .map(|name| name.trim().to_owned())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(random_alias);

    let (user, token) = db::create_user(&db_pool, &name).await?;
    info!(user_id = %user.id, name = %user.name, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            id: user.id,
            name: user.name,
            token,
        }),
    ))
}
