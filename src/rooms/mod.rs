pub mod actions;
pub mod hub;
pub mod msg;
mod new;
mod room;
mod ws;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::AppState;

pub use hub::Hub;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(new::list_rooms).post(new::new_room))
        .route("/join", post(new::join_by_invite))
        .route(
            "/{id}",
            get(room::room)
                .put(room::edit_room)
                .delete(room::delete_room),
        )
        .route("/{id}/tasks", post(room::new_task))
        .route(
            "/{id}/tasks/{task_id}",
            put(room::edit_task).delete(room::delete_task),
        )
        .route("/{id}/ws", get(ws::room_ws))
}
