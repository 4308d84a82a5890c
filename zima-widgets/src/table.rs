//! Remote table widget.
//!
//! Given a `server-url`, asks the server for column names and then hands a
//! server-side-processing configuration to the table renderer. Every URL
//! change tears down the rendered table and starts over.

use serde::{Deserialize, Serialize};

use crate::datatables::GET_COLUMNS;
use crate::dom::{Dom, NodeId};
use crate::element::{CustomElement, HostEvent};

pub const TAG: &str = "data-table";
pub const SERVER_URL: &str = "server-url";

const OBSERVED: &[&str] = &[SERVER_URL];

/// Identifies one column request. Only the latest ticket is honoured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FetchTicket(u64);

/// HTTP transport. The response must be fed back through
/// [`RemoteTable::on_columns`] with the same ticket.
pub trait HttpClient {
    fn post(&mut self, url: &str, ticket: FetchTicket);
}

/// The third-party table renderer
pub trait TableRenderer {
    /// Take over `table` and start drawing pages from the server
    fn init(&mut self, dom: &mut Dom, table: NodeId, config: &TableConfig);

    /// Release whatever `init` set up
    fn destroy(&mut self);
}

/// Blocking user-visible alert
pub trait Alerts {
    fn alert(&mut self, message: &str);
}

/// Renderer configuration, serialized with the renderer's option names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableConfig {
    pub processing: bool,
    pub server_side: bool,
    pub ajax: AjaxConfig,
    pub columns: Vec<ColumnDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AjaxConfig {
    pub url: String,
    #[serde(rename = "type")]
    pub method: String,
}

/// Column name used both as data key and title
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub data: String,
    pub title: String,
}

impl TableConfig {
    /// Server-paginated table posting draws to `url`
    pub fn server_side(url: &str, columns: &[String]) -> Self {
        Self {
            processing: true,
            server_side: true,
            ajax: AjaxConfig {
                url: url.to_string(),
                method: "POST".to_string(),
            },
            columns: columns
                .iter()
                .map(|name| ColumnDef {
                    data: name.clone(),
                    title: name.clone(),
                })
                .collect(),
        }
    }
}

/// URL of the column-name request for a table endpoint
pub fn columns_url(server_url: &str) -> String {
    let separator = if server_url.contains('?') { '&' } else { '?' };
    format!("{server_url}{separator}{GET_COLUMNS}=true")
}

pub struct RemoteTable<H, R, A> {
    http: H,
    renderer: R,
    alerts: A,
    shadow: Dom,
    server_url: Option<String>,
    table: Option<NodeId>,
    pending: Option<FetchTicket>,
    next_ticket: u64,
    columns: Vec<String>,
}

impl<H: HttpClient, R: TableRenderer, A: Alerts> RemoteTable<H, R, A> {
    pub fn new(http: H, renderer: R, alerts: A) -> Self {
        Self {
            http,
            renderer,
            alerts,
            shadow: Dom::new("#shadow-root"),
            server_url: None,
            table: None,
            pending: None,
            next_ticket: 0,
            columns: Vec::new(),
        }
    }

    pub fn server_url(&self) -> Option<&str> {
        self.server_url.as_deref()
    }

    /// Columns of the current table, empty until the fetch succeeds
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn shadow(&self) -> &Dom {
        &self.shadow
    }

    pub fn http(&self) -> &H {
        &self.http
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn alerts(&self) -> &A {
        &self.alerts
    }

    /// Drop the rendered table and any request in flight
    fn reset(&mut self) {
        if self.table.take().is_some() {
            self.renderer.destroy();
        }
        let root = self.shadow.root();
        if let Err(e) = self.shadow.clear_children(root) {
            tracing::warn!(error = %e, "failed to clear table shadow root");
        }
        self.pending = None;
        self.columns.clear();
    }

    fn load(&mut self, url: &str) {
        self.reset();
        self.server_url = Some(url.to_string());

        let root = self.shadow.root();
        let table = self.shadow.create_element("table");
        if let Err(e) = self
            .shadow
            .set_attr(table, "class", "display")
            .and_then(|_| self.shadow.append_child(root, table))
        {
            tracing::warn!(error = %e, "failed to render table placeholder");
            return;
        }
        self.table = Some(table);

        self.next_ticket += 1;
        let ticket = FetchTicket(self.next_ticket);
        self.pending = Some(ticket);

        let request_url = columns_url(url);
        tracing::debug!(url = %request_url, "fetching table columns");
        self.http.post(&request_url, ticket);
    }

    /// Deliver the column response for `ticket`
    pub fn on_columns(&mut self, ticket: FetchTicket, result: Result<Vec<String>, String>) {
        if self.pending != Some(ticket) {
            tracing::debug!(?ticket, "dropping stale column response");
            return;
        }
        self.pending = None;

        match result {
            Ok(columns) => {
                let (Some(url), Some(table)) = (self.server_url.clone(), self.table) else {
                    return;
                };
                tracing::debug!(url = %url, columns = columns.len(), "initializing table");
                let config = TableConfig::server_side(&url, &columns);
                self.columns = columns;
                self.renderer.init(&mut self.shadow, table, &config);
            }
            Err(error) => {
                tracing::warn!(error = %error, "column fetch failed");
                self.alerts
                    .alert(&format!("Failed to fetch table columns: {error}"));
            }
        }
    }
}

impl<H: HttpClient, R: TableRenderer, A: Alerts> CustomElement for RemoteTable<H, R, A> {
    fn observed_attributes(&self) -> &'static [&'static str] {
        OBSERVED
    }

    fn attribute_changed(&mut self, name: &str, old: Option<&str>, new: Option<&str>) {
        if name != SERVER_URL || old == new {
            return;
        }
        match new {
            Some(url) => self.load(url),
            None => {
                self.reset();
                self.server_url = None;
            }
        }
    }

    fn handle_event(&mut self, event: &HostEvent) {
        if let HostEvent::Columns { ticket, result } = event {
            self.on_columns(*ticket, result.clone());
        }
    }

    fn shadow_root(&self) -> Option<&Dom> {
        Some(&self.shadow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::ElementHost;

    #[derive(Default)]
    struct FakeHttp {
        requests: Vec<(String, FetchTicket)>,
    }

    impl HttpClient for FakeHttp {
        fn post(&mut self, url: &str, ticket: FetchTicket) {
            self.requests.push((url.to_string(), ticket));
        }
    }

    #[derive(Default)]
    struct FakeRenderer {
        configs: Vec<TableConfig>,
        destroyed: usize,
    }

    impl TableRenderer for FakeRenderer {
        fn init(&mut self, dom: &mut Dom, table: NodeId, config: &TableConfig) {
            let head = dom.create_element("thead");
            dom.append_child(table, head).unwrap();
            self.configs.push(config.clone());
        }

        fn destroy(&mut self) {
            self.destroyed += 1;
        }
    }

    #[derive(Default)]
    struct FakeAlerts {
        messages: Vec<String>,
    }

    impl Alerts for FakeAlerts {
        fn alert(&mut self, message: &str) {
            self.messages.push(message.to_string());
        }
    }

    type Table = RemoteTable<FakeHttp, FakeRenderer, FakeAlerts>;

    fn host() -> ElementHost<Table> {
        ElementHost::new(
            TAG,
            RemoteTable::new(FakeHttp::default(), FakeRenderer::default(), FakeAlerts::default()),
        )
    }

    fn last_ticket(table: &Table) -> FetchTicket {
        table.http().requests.last().unwrap().1
    }

    #[test]
    fn columns_url_appends_flag() {
        assert_eq!(columns_url("/data"), "/data?get-columns=true");
        assert_eq!(columns_url("/data?table=t"), "/data?table=t&get-columns=true");
    }

    #[test]
    fn url_change_fetches_columns() {
        let mut host = host();
        host.set_attribute(SERVER_URL, "/data?table=t");

        let table = host.element();
        assert_eq!(table.http().requests.len(), 1);
        assert_eq!(table.http().requests[0].0, "/data?table=t&get-columns=true");
        assert_eq!(table.shadow().inner_html(table.shadow().root()), r#"<table class="display"></table>"#);
    }

    #[test]
    fn equal_url_does_not_rerender() {
        let mut host = host();
        host.set_attribute(SERVER_URL, "/data?table=t");
        let ticket = last_ticket(host.element());
        host.element_mut().on_columns(ticket, Ok(vec!["a".into()]));

        host.set_attribute(SERVER_URL, "/data?table=t");

        let table = host.element();
        assert_eq!(table.http().requests.len(), 1);
        assert_eq!(table.renderer().destroyed, 0);
        assert_eq!(table.columns(), &["a".to_string()]);
    }

    #[test]
    fn different_url_clears_and_rebuilds() {
        let mut host = host();
        host.set_attribute(SERVER_URL, "/data?table=t");
        let ticket = last_ticket(host.element());
        host.element_mut().on_columns(ticket, Ok(vec!["a".into()]));

        host.set_attribute(SERVER_URL, "/data?table=u");

        let table = host.element();
        assert_eq!(table.http().requests.len(), 2);
        assert_eq!(table.renderer().destroyed, 1);
        assert!(table.columns().is_empty());
        // Old thead is gone, only the fresh placeholder remains
        assert_eq!(table.shadow().inner_html(table.shadow().root()), r#"<table class="display"></table>"#);
    }

    #[test]
    fn successful_fetch_configures_named_columns() {
        let mut host = host();
        host.set_attribute(SERVER_URL, "/data?table=t");
        let ticket = last_ticket(host.element());
        host.element_mut()
            .on_columns(ticket, Ok(vec!["a".into(), "b".into()]));

        let table = host.element();
        assert_eq!(table.renderer().configs.len(), 1);
        let config = &table.renderer().configs[0];
        assert_eq!(config.columns.len(), 2);
        assert_eq!(config.columns[0].title, "a");
        assert_eq!(config.columns[1].title, "b");
        assert_eq!(config.columns[1].data, "b");
        assert_eq!(config.ajax.url, "/data?table=t");
        assert!(config.server_side);
    }

    #[test]
    fn failed_fetch_alerts_once() {
        let mut host = host();
        host.set_attribute(SERVER_URL, "/data?table=t");
        let ticket = last_ticket(host.element());
        host.element_mut()
            .on_columns(ticket, Err("502 Bad Gateway".into()));
        // A duplicate delivery of the same ticket is ignored
        host.element_mut()
            .on_columns(ticket, Err("502 Bad Gateway".into()));

        let table = host.element();
        assert_eq!(table.alerts().messages.len(), 1);
        assert!(table.alerts().messages[0].contains("502 Bad Gateway"));
        assert!(table.renderer().configs.is_empty());
    }

    #[test]
    fn stale_response_is_dropped() {
        let mut host = host();
        host.set_attribute(SERVER_URL, "/data?table=old");
        let stale = last_ticket(host.element());
        host.set_attribute(SERVER_URL, "/data?table=new");
        let fresh = last_ticket(host.element());

        host.element_mut().on_columns(stale, Ok(vec!["old".into()]));
        assert!(host.element().renderer().configs.is_empty());

        host.element_mut().on_columns(fresh, Ok(vec!["new".into()]));
        let configs = &host.element().renderer().configs;
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].ajax.url, "/data?table=new");
    }

    #[test]
    fn config_serializes_with_renderer_option_names() {
        let config = TableConfig::server_side("/data", &["a".to_string()]);
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["serverSide"], true);
        assert_eq!(value["ajax"]["type"], "POST");
        assert_eq!(value["columns"][0]["title"], "a");
    }
}
