//! Bearer-token gate for the protected issue routes
//!
//! A handler that takes [`CurrentUser`] only runs for a caller with a valid
//! token; role checks then happen in the handler through
//! [`CurrentUser::require_role`] or [`CurrentUser::act_as`].

use axum::{extract::FromRequestParts, http::request::Parts};
use shared::error::AppError;
use shared::models::Role;

use crate::auth::{CurrentUser, JwtError, JwtService};
use crate::lifecycle::Actor;
use crate::security_log;
use crate::state::ServerState;

impl From<JwtError> for AppError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::ExpiredToken => AppError::token_expired(),
            JwtError::GenerationFailed(e) => AppError::internal(e),
            JwtError::InvalidToken(_) | JwtError::InvalidSignature => {
                AppError::invalid_token("Invalid token")
            }
        }
    }
}

fn bearer_token(parts: &Parts) -> Result<&str, AppError> {
    let Some(header) = parts.headers.get(http::header::AUTHORIZATION) else {
        security_log!(WARN, "auth_missing", uri = %parts.uri);
        return Err(AppError::unauthorized());
    };
    header
        .to_str()
        .ok()
        .and_then(JwtService::extract_from_header)
        .ok_or_else(|| AppError::invalid_token("Invalid authorization header"))
}

impl FromRequestParts<ServerState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<CurrentUser>() {
            return Ok(user.clone());
        }

        let claims = state.jwt.validate_token(bearer_token(parts)?).map_err(|e| {
            security_log!(WARN, "auth_failed", error = %e, uri = %parts.uri);
            AppError::from(e)
        })?;
        let user = CurrentUser::try_from(claims)
            .map_err(|e| AppError::invalid_token(format!("Malformed JWT claims: {e}")))?;

        parts.extensions.insert(user.clone());
        Ok(user)
    }
}

impl CurrentUser {
    /// Reject callers whose role is not in `roles`
    pub fn require_role(&self, roles: &[Role]) -> Result<(), AppError> {
        if self.has_role(roles) {
            return Ok(());
        }
        security_log!(WARN, "role_denied", user_id = %self.id, role = %self.role);
        let names: Vec<&str> = roles.iter().map(Role::as_str).collect();
        Err(AppError::role_required(&names))
    }

    /// Role check, then the lifecycle actor the caller moves issues as
    pub fn act_as(&self, roles: &[Role]) -> Result<Actor, AppError> {
        self.require_role(roles)?;
        Ok(self.actor())
    }
}
