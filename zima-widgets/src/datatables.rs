//! Server-side processing convention of the table renderer.
//!
//! The renderer posts form fields (`draw`, `start`, `length`,
//! `search[value]`, `order[0][column]`, `order[0][dir]`) and expects
//! `{draw, recordsTotal, recordsFiltered, data}` back. A request carrying
//! `get-columns` asks for the column names instead.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, WidgetError};

/// Flag parameter that turns a data request into a column-name request
pub const GET_COLUMNS: &str = "get-columns";

const DEFAULT_LENGTH: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Requested ordering by column index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Order {
    pub column: usize,
    pub direction: SortDirection,
}

/// One draw of the table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawRequest {
    /// Echoed back so the renderer can discard out-of-order responses
    pub draw: u64,
    pub start: usize,
    /// `None` means all rows (`length=-1`)
    pub length: Option<usize>,
    pub search: String,
    pub order: Option<Order>,
}

impl Default for DrawRequest {
    fn default() -> Self {
        Self {
            draw: 1,
            start: 0,
            length: Some(DEFAULT_LENGTH),
            search: String::new(),
            order: None,
        }
    }
}

/// Whether the parameters ask for column names
pub fn wants_columns<'a, I>(params: I) -> bool
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    params
        .into_iter()
        .any(|(key, value)| key == GET_COLUMNS && !value.is_empty())
}

impl DrawRequest {
    /// Read a draw request from decoded query/form pairs. Later pairs win.
    pub fn from_params<'a, I>(params: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut request = Self::default();
        let mut order_column: Option<usize> = None;
        let mut direction = SortDirection::Asc;

        for (key, value) in params {
            match key {
                "draw" => request.draw = parse_number(key, value)?,
                "start" => request.start = parse_number(key, value)?,
                "length" => {
                    let length: i64 = parse_number(key, value)?;
                    request.length = if length < 0 {
                        None
                    } else {
                        Some(length as usize)
                    };
                }
                "search[value]" => request.search = value.to_string(),
                "order[0][column]" if !value.is_empty() => {
                    order_column = Some(parse_number(key, value)?)
                }
                "order[0][dir]" => {
                    direction = if value.eq_ignore_ascii_case("desc") {
                        SortDirection::Desc
                    } else {
                        SortDirection::Asc
                    }
                }
                _ => {}
            }
        }

        request.order = order_column.map(|column| Order { column, direction });
        Ok(request)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| WidgetError::invalid_parameter(key, value))
}

/// Response for one draw
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawResponse {
    pub draw: u64,
    pub records_total: usize,
    pub records_filtered: usize,
    pub data: Vec<Map<String, Value>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_renderer_defaults() {
        let request = DrawRequest::from_params(Vec::<(&str, &str)>::new()).unwrap();
        assert_eq!(request, DrawRequest::default());
        assert_eq!(request.length, Some(10));
    }

    #[test]
    fn reads_paging_search_and_order() {
        let request = DrawRequest::from_params([
            ("draw", "3"),
            ("start", "20"),
            ("length", "25"),
            ("search[value]", "foo"),
            ("order[0][column]", "2"),
            ("order[0][dir]", "desc"),
            ("columns[0][data]", "name"),
        ])
        .unwrap();

        assert_eq!(request.draw, 3);
        assert_eq!(request.start, 20);
        assert_eq!(request.length, Some(25));
        assert_eq!(request.search, "foo");
        assert_eq!(
            request.order,
            Some(Order {
                column: 2,
                direction: SortDirection::Desc
            })
        );
    }

    #[test]
    fn negative_length_means_all_rows() {
        let request = DrawRequest::from_params([("length", "-1")]).unwrap();
        assert_eq!(request.length, None);
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let err = DrawRequest::from_params([("start", "ten")]).unwrap_err();
        assert!(matches!(err, WidgetError::InvalidParameter { .. }));
    }

    #[test]
    fn empty_order_column_is_ignored() {
        let request = DrawRequest::from_params([("order[0][column]", "")]).unwrap();
        assert_eq!(request.order, None);
    }

    #[test]
    fn detects_column_requests() {
        assert!(wants_columns([("hash", "x"), ("get-columns", "true")]));
        assert!(!wants_columns([("get-columns", "")]));
        assert!(!wants_columns([("draw", "1")]));
    }

    #[test]
    fn response_uses_renderer_field_names() {
        let response = DrawResponse {
            draw: 2,
            records_total: 10,
            records_filtered: 3,
            data: vec![],
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["recordsTotal"], 10);
        assert_eq!(value["recordsFiltered"], 3);
    }
}
