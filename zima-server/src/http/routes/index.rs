//! Page shell
//!
//! The shell only carries the `live-document` host and the `#content`
//! container; everything inside is pushed over the socket.

use axum::response::Html;
use axum::{routing::get, Router};
use zima_widgets::live;
use zima_widgets::markup::Element;

use crate::render::TITLE;
use crate::state::AppState;

const STYLE: &str = "\
body { font-family: Arial, sans-serif; }
.cell { border: 1px solid #ddd; margin: 10px 0; padding: 10px; }
.cell-id { font-weight: bold; }
pre { background-color: #f0f0f0; padding: 10px; }
.tables { margin-top: 20px; }
.cell-state { margin-top: 10px; font-style: italic; }
.scroll-focus { border-color: #888; }
";

pub fn page_shell() -> String {
    let head = Element::new("head")
        .child(Element::new("meta").attr("charset", "UTF-8"))
        .child(Element::new("title").text(TITLE))
        .child(Element::new("style").text(STYLE));

    let body = Element::new("body").child(
        Element::new(live::TAG).child(Element::new("div").id(live::CONTENT_ID).text("Loading...")),
    );

    let html = Element::new("html").attr("lang", "en").child(head).child(body);
    format!("<!DOCTYPE html>\n{}", html.to_html())
}

/// GET /
async fn index() -> Html<String> {
    Html(page_shell())
}

/// Index routes
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(index))
}
