use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::api::error::ApiError;
use crate::domain::history::{Actor, ActorType};

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_NAME_HEADER: &str = "x-actor-name";
pub const ACTOR_TYPE_HEADER: &str = "x-actor-type";

/// The caller recorded in history. Requests without actor headers act as
/// the system.
pub struct RequestActor(pub Actor);

#[axum::async_trait]
impl<S> FromRequestParts<S> for RequestActor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| -> Result<Option<String>, ApiError> {
            match parts.headers.get(name) {
                None => Ok(None),
                Some(value) => value
                    .to_str()
                    .map(|v| Some(v.trim().to_string()).filter(|v| !v.is_empty()))
                    .map_err(|_| ApiError::bad_request(format!("{name} must be visible ASCII"))),
            }
        };

        let Some(id) = header(ACTOR_ID_HEADER)? else {
            return Ok(Self(Actor::system()));
        };
        let actor_type = match header(ACTOR_TYPE_HEADER)? {
            Some(t) => t.parse::<ActorType>().map_err(|e| ApiError::bad_request(e.to_string()))?,
            None => ActorType::Admin,
        };
        let name = header(ACTOR_NAME_HEADER)?.unwrap_or_else(|| id.clone());
        Ok(Self(Actor::new(id, name, actor_type)))
    }
}
