mod manage;

use axum::{
    routing::get,
    Router,
};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(manage::list_groups).post(manage::new_group))
        .route(
            "/{id}",
            get(manage::group)
                .put(manage::edit_group)
                .delete(manage::delete_group),
        )
}
