//! CSV-backed table source for server-side processing.
//!
//! The header row gives the column names. A draw applies a literal
//! substring search over every column, sorts by the requested column
//! (numbers first in numeric order, then text), then slices the page.

use std::cmp::Ordering;
use std::path::Path;

use serde_json::{Map, Number, Value};
use zima_widgets::datatables::{DrawRequest, DrawResponse, SortDirection};

use crate::error::{ServerError, ServerResult};

#[derive(Debug, Clone, PartialEq)]
pub struct CsvTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl CsvTable {
    pub fn load(path: &Path) -> ServerResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .map_err(|e| ServerError::csv(path, e))?;

        let columns: Vec<String> = reader
            .headers()
            .map_err(|e| ServerError::csv(path, e))?
            .iter()
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| ServerError::csv(path, e))?;
            let mut row: Vec<String> = record.iter().map(str::to_string).collect();
            row.resize(columns.len(), String::new());
            rows.push(row);
        }

        tracing::debug!(path = %path.display(), columns = columns.len(), rows = rows.len(), "table loaded");
        Ok(Self { columns, rows })
    }

    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn draw(&self, request: &DrawRequest) -> DrawResponse {
        let mut matching: Vec<&Vec<String>> = if request.search.is_empty() {
            self.rows.iter().collect()
        } else {
            self.rows
                .iter()
                .filter(|row| row.iter().any(|cell| cell.contains(&request.search)))
                .collect()
        };
        let records_filtered = matching.len();

        if let Some(order) = request.order.filter(|o| o.column < self.columns.len()) {
            matching.sort_by_cached_key(|&row| SortKey::of(&row[order.column]));
            if order.direction == SortDirection::Desc {
                matching.reverse();
            }
        }

        let page = matching.into_iter().skip(request.start);
        let data = match request.length {
            Some(length) => page.take(length).map(|row| self.to_object(row)).collect(),
            None => page.map(|row| self.to_object(row)).collect(),
        };

        DrawResponse {
            draw: request.draw,
            records_total: self.rows.len(),
            records_filtered,
            data,
        }
    }

    fn to_object(&self, row: &[String]) -> Map<String, Value> {
        self.columns
            .iter()
            .zip(row)
            .map(|(column, cell)| (column.clone(), cell_value(cell)))
            .collect()
    }
}

fn parse_number(cell: &str) -> Option<f64> {
    cell.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Total order over cells: every number sorts before every text value
#[derive(Debug)]
enum SortKey<'a> {
    Num(f64),
    Text(&'a str),
}

impl<'a> SortKey<'a> {
    fn of(cell: &'a str) -> Self {
        match parse_number(cell) {
            Some(n) => Self::Num(n),
            None => Self::Text(cell),
        }
    }
}

impl Ord for SortKey<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Num(a), Self::Num(b)) => a.total_cmp(b),
            (Self::Num(_), Self::Text(_)) => Ordering::Less,
            (Self::Text(_), Self::Num(_)) => Ordering::Greater,
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for SortKey<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SortKey<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SortKey<'_> {}

/// Integers and finite floats become JSON numbers, everything else a string
fn cell_value(cell: &str) -> Value {
    let trimmed = cell.trim();
    if let Ok(int) = trimmed.parse::<i64>() {
        return Value::Number(int.into());
    }
    if let Some(number) = parse_number(trimmed).and_then(Number::from_f64) {
        return Value::Number(number);
    }
    Value::String(cell.to_string())
}
