//! Notebook HTML rendering.
//!
//! Produces the fragment pushed to live documents as `update`. The same
//! notebook state always renders to the same string, so the update loop
//! can skip broadcasts when nothing changed.

use std::path::Path;

use url::form_urlencoded;
use zima_widgets::event::EventDescriptor;
use zima_widgets::live::SCROLL_FOCUS_CLASS;
use zima_widgets::markup::{Element, Markup};
use zima_widgets::{table, textarea};

use crate::notebook::{CellDef, Notebook};

pub const TITLE: &str = "Zima Notebook";

/// Event a code editor raises on every edit, with `cell_id` and `content`
pub const SAVE_CODE_EVENT: &str = "save-code";
/// Event a code editor raises on focus, with `cell_id`
pub const FOCUS_CELL_EVENT: &str = "focus-cell";

pub const MAX_LOG_LINES: usize = 1000;
pub const MAX_LOG_LINE_CHARS: usize = 1000;

/// Render the whole notebook
pub fn render_notebook(notebook: &Notebook) -> String {
    let focus = notebook.last_started();
    let cells = notebook
        .cells()
        .iter()
        .map(|cell| render_cell(notebook, cell, focus == Some(cell.id.as_str())));

    Element::new("div")
        .child(Element::new("h1").text(TITLE))
        .children(cells)
        .to_html()
}

/// `/data` URL serving one of a cell's tables
pub fn table_url(cell_id: &str, table: &str) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("cell", cell_id)
        .append_pair("table", table)
        .finish();
    format!("/data?{query}")
}

fn render_cell(notebook: &Notebook, cell: &CellDef, focused: bool) -> Element {
    let id = cell.id.as_str();

    let mut block = Element::new("div").id(format!("cell-{id}")).class("cell");
    if focused {
        block = block.class(SCROLL_FOCUS_CLASS);
    }

    block
        .child(
            Element::new("div").child(
                Element::new("span")
                    .class("cell-id")
                    .text(format!("Cell ID: {id}")),
            ),
        )
        .child(render_editor(cell))
        .child(render_tables(notebook, id))
        .child(render_state(notebook, id))
        .child(
            Element::new("button")
                .class("run-cell-button")
                .attr("data-cell-id", id)
                .text("Run Cell"),
        )
        .child(Element::new("hr"))
}

fn render_editor(cell: &CellDef) -> Element {
    let modify = EventDescriptor::new(SAVE_CODE_EVENT).with_param("cell_id", cell.id.as_str());
    let focus = EventDescriptor::new(FOCUS_CELL_EVENT).with_param("cell_id", cell.id.as_str());

    Element::new(textarea::TAG)
        .attr(textarea::TEXT, cell.code.as_str())
        .attr(textarea::MODIFY_EVENT, modify.to_attribute())
        .attr(textarea::FOCUS_EVENT, focus.to_attribute())
}

fn render_tables(notebook: &Notebook, id: &str) -> Element {
    let names = notebook.table_names(id).unwrap_or_else(|e| {
        tracing::warn!(cell_id = %id, error = %e, "failed to list tables");
        Vec::new()
    });

    let tables = names.iter().map(|name| {
        Element::new("div")
            .class("table")
            .child(Element::new("div").class("table-name").text(name.as_str()))
            .child(Element::new(table::TAG).attr(table::SERVER_URL, table_url(id, name)))
    });

    Element::new("div").class("tables").children(tables)
}

fn render_state(notebook: &Notebook, id: &str) -> Element {
    let mut state = Element::new("div")
        .class("cell-state")
        .child(Element::new("div").text("Cell State:"));

    if let Ok(record) = notebook.record(id) {
        state = state.child(
            Element::new("span")
                .class("status")
                .class(record.status.label())
                .text(record.status.label()),
        );
    }

    if let Ok(freshness) = notebook.freshness(id) {
        let marker: Markup = if freshness.is_fresh() {
            Markup::text("fresh")
        } else {
            Element::new("div")
                .class("stale")
                .attr("title", freshness.stale_reasons().join(", "))
                .text("stale")
                .into()
        };
        state = state.child(marker);
    }

    state
        .child(render_log("Current log", &notebook.current_log(id)))
        .child(render_log("Pending log", &notebook.pending_log(id)))
}

fn render_log(title: &str, path: &Path) -> Element {
    match read_log_tail(path, MAX_LOG_LINES, MAX_LOG_LINE_CHARS) {
        Some(content) => Element::new("div")
            .class("log")
            .text(title)
            .child(Element::new("pre").text(content)),
        None => Element::new("div"),
    }
}

/// Last `max_lines` lines of a log, each cut to `max_chars` characters.
/// `None` when the file does not exist.
pub fn read_log_tail(path: &Path, max_lines: usize, max_chars: usize) -> Option<String> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => return Some(format!("Error reading log file: {e}")),
    };
    let text = String::from_utf8_lossy(&bytes);

    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(max_lines);
    let tail: Vec<String> = lines[start..]
        .iter()
        .map(|line| line.chars().take(max_chars).collect())
        .collect();
    Some(tail.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::RunOutcome;
    use tempfile::TempDir;
    use zima_widgets::markup::parse_fragment;

    fn notebook(dir: &TempDir) -> Notebook {
        let path = dir.path().join("nb.zima");
        std::fs::write(&path, "#%cell a\necho <a>\n#%cell b\nls\n").unwrap();
        Notebook::open(path).unwrap()
    }

    #[test]
    fn renders_cells_with_editor_and_run_button() {
        let dir = TempDir::new().unwrap();
        let html = render_notebook(&notebook(&dir));

        assert!(html.starts_with("<div><h1>Zima Notebook</h1>"));
        assert!(html.contains(r#"<div id="cell-a" class="cell">"#));
        assert!(html.contains(r#"<tracked-textarea text="echo &lt;a&gt;""#));
        assert!(html.contains(r#"data-cell-id="b""#));
        assert!(html.contains(r#"title="preamble, code">stale</div>"#));
        assert!(!html.contains(SCROLL_FOCUS_CLASS));
    }

    #[test]
    fn rendered_html_parses_back() {
        let dir = TempDir::new().unwrap();
        let html = render_notebook(&notebook(&dir));
        let nodes = parse_fragment(&html).unwrap();
        assert_eq!(nodes.len(), 1);
    }

    #[test]
    fn editor_events_carry_cell_id() {
        let dir = TempDir::new().unwrap();
        let nb = notebook(&dir);
        let editor = render_editor(nb.cell("a").unwrap());
        let modify = EventDescriptor::parse(editor.get_attr(textarea::MODIFY_EVENT).unwrap(), "test").unwrap();
        assert_eq!(modify.name, SAVE_CODE_EVENT);
        assert_eq!(modify.params["cell_id"], "a");
    }

    #[test]
    fn last_started_cell_gets_scroll_focus() {
        let dir = TempDir::new().unwrap();
        let mut nb = notebook(&dir);
        let request = nb.begin_run("b").unwrap();
        nb.finish_run(&request, &Ok(RunOutcome::exited(0))).unwrap();

        let html = render_notebook(&nb);
        assert!(html.contains(r#"<div id="cell-b" class="cell scroll-focus">"#));
        assert!(html.contains(r#"<div id="cell-a" class="cell">"#));
    }

    #[test]
    fn tables_link_to_data_endpoint() {
        let dir = TempDir::new().unwrap();
        let nb = notebook(&dir);
        std::fs::create_dir_all(nb.output_dir("a")).unwrap();
        std::fs::write(nb.output_dir("a").join("files.csv"), "x\n1\n").unwrap();

        let html = render_notebook(&nb);
        assert!(html.contains(r#"<data-table server-url="/data?cell=a&amp;table=files">"#));
    }

    #[test]
    fn logs_are_rendered_when_present() {
        let dir = TempDir::new().unwrap();
        let nb = notebook(&dir);
        std::fs::write(nb.pending_log("a"), "working\n").unwrap();

        let html = render_notebook(&nb);
        assert!(html.contains("Pending log<pre>working</pre>"));
        assert!(!html.contains("Current log"));
    }

    #[test]
    fn log_tail_limits_lines_and_width() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log");
        let content: String = (0..1500).map(|i| format!("line {i}\n")).collect();
        std::fs::write(&path, content).unwrap();

        let tail = read_log_tail(&path, MAX_LOG_LINES, MAX_LOG_LINE_CHARS).unwrap();
        let lines: Vec<&str> = tail.lines().collect();
        assert_eq!(lines.len(), 1000);
        assert_eq!(lines[0], "line 500");
        assert_eq!(lines[999], "line 1499");

        std::fs::write(&path, "x".repeat(5000)).unwrap();
        assert_eq!(read_log_tail(&path, 10, 1000).unwrap().len(), 1000);

        assert!(read_log_tail(&dir.path().join("missing"), 10, 10).is_none());
    }

    #[test]
    fn same_state_renders_identically() {
        let dir = TempDir::new().unwrap();
        let nb = notebook(&dir);
        assert_eq!(render_notebook(&nb), render_notebook(&nb));
    }
}
