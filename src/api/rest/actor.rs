use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::actor::{ActorContext, Role};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Caller identity taken from the `x-user-id` and `x-user-role` headers.
pub struct Actor(pub ActorContext);

#[axum::async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header(parts, USER_ID_HEADER)?;
        let user_id = Uuid::parse_str(user_id)
            .map_err(|_| AppError::Validation(format!("{USER_ID_HEADER} must be a uuid")))?;

        let role = header(parts, USER_ROLE_HEADER)?;
        let role = Role::parse(role)
            .ok_or_else(|| AppError::Validation(format!("unknown role {role}")))?;

        Ok(Actor(ActorContext::new(user_id, role)))
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, AppError> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::Validation(format!("missing {name} header")))
}
