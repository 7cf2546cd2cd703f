//! Identity. Users are issued an opaque bearer token; everything else about login lives
//! outside this service.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
    routing::post,
    Router,
};
use rand::seq::IndexedRandom;
use sqlx::SqlitePool;

use crate::{appresult::PokerError, db, model::User, AppError, AppState};

mod register;

pub fn router() -> Router<AppState> {
    Router::new().route("/users", post(register::register))
}

/// The user behind the request's `Authorization: Bearer` token.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl<S> FromRequestParts<S> for CurrentUser
where
    SqlitePool: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(PokerError::Unauthorized("missing bearer token"))?;

        let db_pool = SqlitePool::from_ref(state);
        let user = db::user_by_token(&db_pool, token)
            .await?
            .ok_or(PokerError::Unauthorized("unknown user token"))?;

        Ok(CurrentUser(user))
    }
}

pub(crate) fn random_alias() -> String {
    let adjectives = [
        "Quick", "Lazy", "Mysterious", "Jolly", "Brave", "Silent", "Witty", "Fierce",
        "Clever", "Gentle", "Wild", "Calm", "Bold", "Shy", "Proud", "Happy", "Sad",
        "Eager", "Fancy", "Rusty", "Golden", "Silver", "Bright", "Dark", "Lucky",
    ];
    let nouns = [
        "Fox", "Bear", "Eagle", "Wolf", "Dragon", "Tiger", "Lion", "Owl", "Rabbit",
        "Falcon", "Hawk", "Shark", "Panda", "Kitten", "Puppy", "Phoenix", "Griffin",
        "Unicorn", "Turtle", "Dolphin", "Whale", "Elephant", "Giraffe", "Zebra",
    ];

    let mut rng = rand::rng();
    format!(
        "{} {}",
        adjectives.choose(&mut rng).copied().unwrap_or("Nameless"),
        nouns.choose(&mut rng).copied().unwrap_or("User"),
    )
}
