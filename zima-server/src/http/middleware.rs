//! Token checks in front of protected routes

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};

use super::error::ApiError;
use crate::auth::{cookie_value, tokens_match, TOKEN_COOKIE};
use crate::state::AppState;

enum TokenCheck {
    Missing,
    Wrong,
    Valid,
}

fn check(state: &AppState, request: &Request) -> TokenCheck {
    match cookie_value(request.headers(), TOKEN_COOKIE) {
        None => TokenCheck::Missing,
        Some(token) if tokens_match(&token, state.token()) => TokenCheck::Valid,
        Some(_) => TokenCheck::Wrong,
    }
}

/// Pages: no cookie sends the browser to `/login`, a wrong one is 401
pub async fn require_login(State(state): State<AppState>, request: Request, next: Next) -> Response {
    match check(&state, &request) {
        TokenCheck::Valid => next.run(request).await,
        TokenCheck::Missing => Redirect::to("/login").into_response(),
        TokenCheck::Wrong => {
            tracing::warn!(path = %request.uri().path(), "request with invalid token");
            ApiError::Unauthorized.into_response()
        }
    }
}

/// Socket upgrade: refused outright without a valid token
pub async fn require_token(State(state): State<AppState>, request: Request, next: Next) -> Response {
    match check(&state, &request) {
        TokenCheck::Valid => next.run(request).await,
        TokenCheck::Missing | TokenCheck::Wrong => {
            tracing::warn!(path = %request.uri().path(), "socket connection refused");
            ApiError::Unauthorized.into_response()
        }
    }
}
