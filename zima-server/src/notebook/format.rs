//! Notebook file format
//!
//! A notebook is a shell preamble followed by cells. Each cell starts with a
//! marker line `#%cell <id> <header>`; everything up to the next marker is
//! the cell's code. The only header key is `refresh_every=<seconds>`.
//!
//! ```text
//! export DATA=/srv/data
//! #%cell load refresh_every=60
//! curl -s "$DATA/feed.csv" > "$ZIMA_OUTPUT_DIR/feed.csv"
//! #%cell count
//! wc -l "$DATA"/*.csv
//! ```

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{ServerError, ServerResult};

/// Prefix of a cell marker line
pub const CELL_MARKER: &str = "#%cell ";

const REFRESH_EVERY: &str = "refresh_every";

static CELL_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9]+$").unwrap());

/// Check a cell id is non-empty and alphanumeric
pub fn validate_cell_id(id: &str) -> ServerResult<()> {
    if CELL_ID_RE.is_match(id) {
        Ok(())
    } else {
        Err(ServerError::InvalidName {
            what: "cell id",
            value: id.to_string(),
        })
    }
}

/// Hex md5 digest used to detect stale cells
pub fn content_hash(text: &str) -> String {
    format!("{:x}", md5::compute(text))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellHeader {
    /// Re-run the cell this often
    pub refresh_every: Option<Duration>,
}

impl CellHeader {
    pub fn parse(header: &str) -> ServerResult<Self> {
        let mut parsed = Self::default();

        let tokens = header
            .split(|c: char| c == ';' || c.is_whitespace())
            .filter(|t| !t.is_empty());

        for token in tokens {
            let (key, value) = match token.split_once('=') {
                Some((key, value)) => (key.trim(), Some(value.trim())),
                None => (token, None),
            };

            match key {
                REFRESH_EVERY => {
                    let every = value
                        .and_then(|v| v.parse::<f64>().ok())
                        .and_then(|seconds| Duration::try_from_secs_f64(seconds).ok())
                        .filter(|every| !every.is_zero())
                        .ok_or_else(|| {
                            ServerError::Parse(format!(
                                "{REFRESH_EVERY} needs a positive number of seconds ({token:?})"
                            ))
                        })?;
                    parsed.refresh_every = Some(every);
                }
                other => {
                    return Err(ServerError::Parse(format!(
                        "unknown cell attribute {other:?} in {header:?}"
                    )))
                }
            }
        }

        Ok(parsed)
    }

    pub fn to_header(&self) -> String {
        match self.refresh_every {
            Some(every) => format!("{REFRESH_EVERY}={}", every.as_secs_f64()),
            None => String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CellDef {
    pub id: String,
    pub code: String,
    pub header: CellHeader,
}

impl CellDef {
    pub fn code_hash(&self) -> String {
        content_hash(&self.code)
    }

    fn to_text(&self) -> String {
        let header = self.header.to_header();
        if header.is_empty() {
            format!("{CELL_MARKER}{}\n{}\n", self.id, self.code)
        } else {
            format!("{CELL_MARKER}{} {header}\n{}\n", self.id, self.code)
        }
    }
}

/// Parsed notebook: preamble plus ordered cells
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotebookDef {
    pub preamble: String,
    pub cells: Vec<CellDef>,
}

impl NotebookDef {
    pub fn parse(text: &str) -> ServerResult<Self> {
        let separator = format!("\n{CELL_MARKER}");
        let normalized;
        let text = if text.starts_with(CELL_MARKER) {
            normalized = format!("\n{text}");
            normalized.as_str()
        } else {
            text
        };

        let mut parts = text.split(separator.as_str());
        let preamble = parts.next().unwrap_or_default().to_string();

        let mut cells: Vec<CellDef> = Vec::new();
        for cell_text in parts {
            let cell = parse_cell(cell_text)?;
            if cells.iter().any(|c| c.id == cell.id) {
                return Err(ServerError::Parse(format!("duplicate cell {:?}", cell.id)));
            }
            cells.push(cell);
        }

        Ok(Self { preamble, cells })
    }

    /// Serialize back to the file format
    pub fn to_text(&self) -> String {
        let mut parts = Vec::with_capacity(self.cells.len() + 1);
        parts.push(self.preamble.clone());
        parts.extend(self.cells.iter().map(CellDef::to_text));
        parts.join("\n")
    }

    pub fn cell(&self, id: &str) -> Option<&CellDef> {
        self.cells.iter().find(|c| c.id == id)
    }

    pub fn preamble_hash(&self) -> String {
        content_hash(&self.preamble)
    }

    /// Copy of this notebook with one cell's code replaced
    pub fn with_cell_code(&self, id: &str, code: &str) -> ServerResult<Self> {
        if format!("\n{code}").contains(&format!("\n{CELL_MARKER}")) {
            return Err(ServerError::Parse(
                "cell code may not contain a cell marker line".to_string(),
            ));
        }

        let mut updated = self.clone();
        let cell = updated
            .cells
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| ServerError::CellNotFound(id.to_string()))?;
        cell.code = code.trim().to_string();
        Ok(updated)
    }
}

fn parse_cell(cell_text: &str) -> ServerResult<CellDef> {
    let (header_line, code) = cell_text.split_once('\n').unwrap_or((cell_text, ""));
    let header_line = header_line.trim();
    let (id, header) = match header_line.split_once(char::is_whitespace) {
        Some((id, header)) => (id, header),
        None => (header_line, ""),
    };

    validate_cell_id(id)
        .map_err(|_| ServerError::Parse(format!("invalid cell id {id:?}: only alphanumeric characters are allowed")))?;

    Ok(CellDef {
        id: id.to_string(),
        code: code.trim().to_string(),
        header: CellHeader::parse(header)?,
    })
}
