//! Shopper identity: the API-key user and the session's guest token.

use std::convert::Infallible;

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
};
use tower_sessions::Session;

use corner_shop_core::GuestToken;

use crate::db::ShopperKey;
use crate::error::set_sentry_user;
use crate::models::{User, session_keys};
use crate::state::AppState;

/// Header carrying a user's API key.
pub const API_KEY_HEADER: &str = "x-spree-token";

/// Extractor for the signed-in user, if any.
///
/// The user is looked up by the API key in `X-Spree-Token` or an
/// `Authorization: Bearer` header. Unknown keys are treated as guests.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(CurrentUser(user): CurrentUser) -> impl IntoResponse {
///     match user {
///         Some(u) => format!("Hello, {}!", u.email),
///         None => "Hello, guest!".to_string(),
///     }
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct CurrentUser(pub Option<User>);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(api_key) = api_key(&parts.headers) else {
            return Ok(Self(None));
        };

        let user = state.users().find_by_api_key(api_key).await;
        match &user {
            Some(user) => set_sentry_user(&user.id, Some(user.email.as_str())),
            None => tracing::debug!("Unknown API key, serving as guest"),
        }
        Ok(Self(user))
    }
}

fn api_key(headers: &HeaderMap) -> Option<&str> {
    if let Some(key) = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) {
        return Some(key);
    }
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// The session's guest token, if it has one.
pub async fn guest_token(session: &Session) -> Option<GuestToken> {
    session
        .get::<GuestToken>(session_keys::GUEST_TOKEN)
        .await
        .ok()
        .flatten()
}

/// The session's guest token, creating one if needed.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn ensure_guest_token(
    session: &Session,
) -> Result<GuestToken, tower_sessions::session::Error> {
    if let Some(token) = guest_token(session).await {
        return Ok(token);
    }
    let token = GuestToken::generate();
    session.insert(session_keys::GUEST_TOKEN, &token).await?;
    Ok(token)
}

/// Who is shopping on this request.
pub async fn shopper_key(session: &Session, user: Option<&User>) -> ShopperKey {
    ShopperKey {
        user_id: user.map(|u| u.id),
        guest_token: guest_token(session).await,
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn test_api_key_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(api_key(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(api_key(&headers), Some("abc"));

        headers.insert(API_KEY_HEADER, HeaderValue::from_static("def"));
        assert_eq!(api_key(&headers), Some("def"));
    }

    #[test]
    fn test_basic_auth_is_not_an_api_key() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic Zm9vOmJhcg=="));
        assert_eq!(api_key(&headers), None);
    }
}
