//! Caller identity forwarded by the gateway in request headers.

use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::warn;
use uuid::Uuid;

use crate::{
    error::AppError,
    state::{Actor, ActorRole},
};

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_NAME_HEADER: &str = "x-actor-name";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";
pub const ACTOR_TEAM_HEADER: &str = "x-actor-team";

impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
        };

        let id = header(ACTOR_ID_HEADER)
            .ok_or_else(|| AppError::Unauthorized("missing caller identity header".into()))?;
        let id = Uuid::parse_str(id).map_err(|_| {
            warn!("rejected malformed caller identity");
            AppError::Unauthorized("invalid caller identity".into())
        })?;
        let role = match header(ACTOR_ROLE_HEADER).map(str::to_ascii_lowercase).as_deref() {
            Some("organizer") => ActorRole::Organizer,
            Some("participant") | None => ActorRole::Participant,
            Some(other) => {
                return Err(AppError::Unauthorized(format!("unknown caller role `{other}`")));
            }
        };
        let team_id = header(ACTOR_TEAM_HEADER)
            .map(Uuid::parse_str)
            .transpose()
            .map_err(|_| AppError::BadRequest("invalid team header".into()))?;

        Ok(Actor {
            id,
            name: header(ACTOR_NAME_HEADER).unwrap_or("unknown").to_owned(),
            role,
            team_id,
        })
    }
}

/// Reject callers that are not organizers.
pub fn require_organizer(actor: &Actor) -> Result<(), AppError> {
    match actor.role {
        ActorRole::Organizer => Ok(()),
        ActorRole::Participant => Err(AppError::Forbidden("organizer role required".into())),
    }
}

/// Allow organizers, or the caller acting on its own profile.
pub fn require_owner_or_organizer(actor: &Actor, owner: Uuid) -> Result<(), AppError> {
    if actor.role == ActorRole::Organizer || actor.id == owner {
        return Ok(());
    }
    Err(AppError::Forbidden("only the profile owner or an organizer may do this".into()))
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    async fn extract(request: Request<()>) -> Result<Actor, AppError> {
        let (mut parts, _) = request.into_parts();
        Actor::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn reads_participant_headers() {
        let id = Uuid::new_v4();
        let team = Uuid::new_v4();
        let request = Request::builder()
            .header(ACTOR_ID_HEADER, id.to_string())
            .header(ACTOR_NAME_HEADER, "Sam")
            .header(ACTOR_TEAM_HEADER, team.to_string())
            .body(())
            .unwrap();
        let actor = extract(request).await.unwrap();
        assert_eq!(actor.id, id);
        assert_eq!(actor.role, ActorRole::Participant);
        assert_eq!(actor.team_id, Some(team));
        assert!(require_organizer(&actor).is_err());
    }

    #[tokio::test]
    async fn profile_owner_may_act_on_their_own_profile() {
        let owner = Uuid::new_v4();
        let request = Request::builder()
            .header(ACTOR_ID_HEADER, owner.to_string())
            .body(())
            .unwrap();
        let actor = extract(request).await.unwrap();
        assert!(require_owner_or_organizer(&actor, owner).is_ok());
        assert!(matches!(
            require_owner_or_organizer(&actor, Uuid::new_v4()),
            Err(AppError::Forbidden(_))
        ));

        let organizer = Actor {
            role: ActorRole::Organizer,
            ..actor
        };
        assert!(require_owner_or_organizer(&organizer, Uuid::new_v4()).is_ok());
    }

    #[tokio::test]
    async fn missing_identity_is_unauthorized() {
        let request = Request::builder()
            .header(ACTOR_ROLE_HEADER, "organizer")
            .body(())
            .unwrap();
        assert!(matches!(extract(request).await, Err(AppError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn unknown_role_is_rejected() {
        let request = Request::builder()
            .header(ACTOR_ID_HEADER, Uuid::new_v4().to_string())
            .header(ACTOR_ROLE_HEADER, "referee")
            .body(())
            .unwrap();
        assert!(matches!(extract(request).await, Err(AppError::Unauthorized(_))));
    }
}
