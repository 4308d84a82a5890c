//! Table data endpoint
//!
//! `POST /data?cell=<id>&table=<name>` speaks the table renderer's
//! server-side processing convention. Parameters are read from the query
//! string and the form body; body values win.

use axum::body::Bytes;
use axum::extract::{RawQuery, State};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use url::form_urlencoded;
use zima_widgets::datatables::{wants_columns, DrawRequest};

use crate::error::ServerError;
use crate::http::error::ApiError;
use crate::state::AppState;
use crate::table_source::CsvTable;

fn collect_params(query: Option<&str>, body: &[u8]) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = Vec::new();
    if let Some(query) = query {
        params.extend(form_urlencoded::parse(query.as_bytes()).into_owned());
    }
    params.extend(form_urlencoded::parse(body).into_owned());
    params
}

fn param<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .rev()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
        .filter(|v| !v.is_empty())
}

/// POST /data - column names or one page of rows
async fn data(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Result<Response, ApiError> {
    let params = collect_params(query.as_deref(), &body);
    let cell = param(&params, "cell").ok_or_else(|| ApiError::bad_request("missing cell parameter"))?;
    let table = param(&params, "table").ok_or_else(|| ApiError::bad_request("missing table parameter"))?;

    let path = state.notebook().read().await.table_path(cell, table)?;
    let source = tokio::task::spawn_blocking(move || CsvTable::load(&path))
        .await
        .map_err(|e| ApiError::Internal {
            message: format!("table load task failed: {e}"),
        })??;

    let pairs = || params.iter().map(|(k, v)| (k.as_str(), v.as_str()));

    if wants_columns(pairs()) {
        tracing::debug!(cell, table, columns = source.columns().len(), "serving columns");
        return Ok(Json(source.columns().to_vec()).into_response());
    }

    let request = DrawRequest::from_params(pairs()).map_err(ServerError::from)?;
    let response = source.draw(&request);
    tracing::debug!(
        cell,
        table,
        draw = response.draw,
        filtered = response.records_filtered,
        "serving table page"
    );
    Ok(Json(response).into_response())
}

/// Data routes
pub fn router() -> Router<AppState> {
    Router::new().route("/data", post(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_values_override_query() {
        let params = collect_params(Some("cell=a&table=t&draw=1"), b"draw=4&search%5Bvalue%5D=x+y");
        assert_eq!(param(&params, "cell"), Some("a"));
        assert_eq!(param(&params, "draw"), Some("4"));
        assert_eq!(param(&params, "search[value]"), Some("x y"));
    }

    #[test]
    fn empty_values_count_as_missing() {
        let params = collect_params(Some("cell="), b"");
        assert_eq!(param(&params, "cell"), None);
        assert_eq!(param(&params, "table"), None);
    }
}
