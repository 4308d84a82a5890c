//! Token login form
//!
//! A correct token sets the `api_token` cookie and redirects to `/`.

use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::{routing::get, Form, Router};
use serde::Deserialize;
use zima_widgets::markup::Element;

use crate::auth::{token_cookie, tokens_match};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    token: String,
}

fn login_page(error: Option<&str>) -> String {
    let head = Element::new("head")
        .child(Element::new("meta").attr("charset", "UTF-8"))
        .child(
            Element::new("meta")
                .attr("name", "viewport")
                .attr("content", "width=device-width, initial-scale=1.0"),
        )
        .child(Element::new("title").text("Login"));

    let mut body = Element::new("body").child(Element::new("h1").text("Login"));
    if let Some(error) = error {
        body = body.child(Element::new("p").attr("style", "color: red;").text(error));
    }
    let form = Element::new("form")
        .attr("method", "POST")
        .child(Element::new("label").attr("for", "token").text("API Token:"))
        .child(
            Element::new("input")
                .attr("type", "password")
                .id("token")
                .attr("name", "token")
                .attr("required", ""),
        )
        .child(Element::new("button").attr("type", "submit").text("Login"));
    body = body.child(form);

    let html = Element::new("html").attr("lang", "en").child(head).child(body);
    format!("<!DOCTYPE html>\n{}", html.to_html())
}

/// GET /login
async fn show() -> Html<String> {
    Html(login_page(None))
}

/// POST /login
async fn submit(State(state): State<AppState>, Form(form): Form<LoginForm>) -> Response {
    if tokens_match(form.token.trim(), state.token()) {
        tracing::info!("browser logged in");
        ([(SET_COOKIE, token_cookie(state.token()))], Redirect::to("/")).into_response()
    } else {
        tracing::warn!("login with invalid token");
        Html(login_page(Some("Invalid token"))).into_response()
    }
}

/// Login routes
pub fn router() -> Router<AppState> {
    Router::new().route("/login", get(show).post(submit))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_without_error() {
        let html = login_page(None);
        assert!(html.contains(r#"<form method="POST">"#));
        assert!(html.contains(r#"name="token""#));
        assert!(!html.contains("Invalid token"));
    }

    #[test]
    fn page_with_error_is_escaped() {
        let html = login_page(Some("<bad>"));
        assert!(html.contains("&lt;bad&gt;"));
    }
}
