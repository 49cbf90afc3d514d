use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use chrono::{DateTime, Utc};
use tracing::warn;
use utils::api::users::{Profile, Role};
use uuid::Uuid;

use crate::{
    AppState,
    db::{
        auth::{AuthSessionError, AuthSessionRepository},
        profiles::{ProfileError, ProfileRepository},
    },
    policy::Actor,
    routes::error::ErrorResponse,
};

/// Context for user-authenticated requests.
#[derive(Clone)]
pub struct RequestContext {
    pub user: Profile,
    pub session_id: Uuid,
    pub access_token_expires_at: DateTime<Utc>,
}

impl RequestContext {
    pub fn actor(&self) -> Actor {
        Actor::from_profile(&self.user)
    }
}

pub async fn require_session(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let bearer = match req.headers().typed_get::<Authorization<Bearer>>() {
        Some(Authorization(token)) => token.token().to_owned(),
        None => return ErrorResponse::unauthorized().into_response(),
    };

    let identity = match state.jwt().decode_access_token(&bearer) {
        Ok(details) => details,
        Err(error) => {
            warn!(?error, "failed to decode access token");
            return ErrorResponse::unauthorized().into_response();
        }
    };

    let pool = state.pool();
    let session_repo = AuthSessionRepository::new(pool);
    let session = match session_repo.get(identity.session_id).await {
        Ok(session) => session,
        Err(AuthSessionError::NotFound) => {
            warn!("session `{}` not found", identity.session_id);
            return ErrorResponse::unauthorized().into_response();
        }
        Err(AuthSessionError::Database(error)) => {
            tracing::error!(?error, "failed to load session");
            return ErrorResponse::internal().into_response();
        }
    };

    if session.user_id != identity.user_id {
        warn!(
            "session `{}` does not belong to user `{}`",
            session.id, identity.user_id
        );
        return ErrorResponse::unauthorized().into_response();
    }

    if session.is_revoked() {
        warn!("session `{}` rejected (revoked)", session.id);
        return ErrorResponse::unauthorized().into_response();
    }

    if session.inactivity_duration(Utc::now()) > state.config().session_inactivity {
        warn!("session `{}` expired due to inactivity; revoking", session.id);
        if let Err(error) = session_repo.revoke(session.id).await {
            warn!(?error, "failed to revoke inactive session");
        }
        return ErrorResponse::unauthorized().into_response();
    }

    let user = match ProfileRepository::new(pool).fetch(identity.user_id).await {
        Ok(user) => user,
        Err(ProfileError::Database(error)) => {
            tracing::error!(?error, "failed to load user");
            return ErrorResponse::internal().into_response();
        }
        Err(_) => {
            warn!("user `{}` missing", identity.user_id);
            return ErrorResponse::unauthorized().into_response();
        }
    };

    req.extensions_mut().insert(RequestContext {
        user,
        session_id: session.id,
        access_token_expires_at: identity.expires_at,
    });

    if let Err(error) = session_repo.touch(session.id).await {
        warn!(?error, "failed to update session last-used timestamp");
    }

    next.run(req).await
}

/// Role gate for route groups; must be layered inside [`require_session`].
pub async fn require_manager(req: Request<Body>, next: Next) -> Response {
    require_role(Role::Manager, req, next).await
}

/// Role gate for route groups; must be layered inside [`require_session`].
pub async fn require_admin(req: Request<Body>, next: Next) -> Response {
    require_role(Role::Admin, req, next).await
}

async fn require_role(required: Role, req: Request<Body>, next: Next) -> Response {
    match check_role(req.extensions().get::<RequestContext>(), required) {
        Ok(()) => next.run(req).await,
        Err(status) => {
            let path = req.uri().path().to_owned();
            warn!(%path, %required, "request rejected by role gate");
            if status == StatusCode::UNAUTHORIZED {
                ErrorResponse::unauthorized().into_response()
            } else {
                ErrorResponse::new(status, format!("{required} role required")).into_response()
            }
        }
    }
}

/// Decides a role gate: no session is 401, too little privilege is 403.
pub(crate) fn check_role(ctx: Option<&RequestContext>, required: Role) -> Result<(), StatusCode> {
    match ctx {
        None => Err(StatusCode::UNAUTHORIZED),
        Some(ctx) if ctx.user.role.at_least(required) => Ok(()),
        Some(_) => Err(StatusCode::FORBIDDEN),
    }
}
