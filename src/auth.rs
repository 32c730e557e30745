// Identity is resolved by the external auth service; this module only
// presents its verdict as extractors. No identity, no handler.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::RequestPartsExt;
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use serde::Deserialize;

use crate::error::AppError;
use crate::routes::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct CurrentUser {
    pub id: String,
    #[serde(default)]
    pub admin: bool,
}

#[axum::async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AppError::Unauthorized)?;

        let res = state
            .http
            .get(&state.auth_verify_url)
            .bearer_auth(bearer.token())
            .send()
            .await
            .map_err(|_| AppError::Unauthorized)?;
        if !res.status().is_success() {
            return Err(AppError::Unauthorized);
        }
        res.json::<CurrentUser>()
            .await
            .map_err(|_| AppError::Unauthorized)
    }
}

/// A resolved identity carrying the admin flag.
pub struct AdminUser(pub CurrentUser);

#[axum::async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        if !user.admin {
            return Err(AppError::Unauthorized);
        }
        Ok(AdminUser(user))
    }
}
