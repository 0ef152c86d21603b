use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppError;
use crate::models::document::Document;

pub const MAX_QUERY_CHARS: usize = 1000;
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Sort direction for an explicit `sortBy` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    /// Parse a sort order from a string (case-insensitive).
    pub fn from_str_ci(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "asc" => Some(SortOrder::Asc),
            "desc" => Some(SortOrder::Desc),
            _ => None,
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::Asc => write!(f, "asc"),
            SortOrder::Desc => write!(f, "desc"),
        }
    }
}

impl TryFrom<String> for SortOrder {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        SortOrder::from_str_ci(&value)
            .ok_or_else(|| format!("Invalid sort order '{value}'. Expected: asc, desc"))
    }
}

impl From<SortOrder> for String {
    fn from(order: SortOrder) -> Self {
        order.to_string()
    }
}

/// Offset pagination parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paging {
    pub page: u32,
    pub size: u32,
}

impl Default for Paging {
    fn default() -> Self {
        Self {
            page: 0,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Paging {
    pub fn new(page: u32, size: u32) -> Self {
        Self { page, size }
    }

    /// Offset of the first hit on this page.
    pub fn from(&self) -> u64 {
        u64::from(self.page) * u64::from(self.size)
    }

    /// Reject empty pages and windows the index cannot serve.
    pub fn validate(&self, max_result_window: u64) -> Result<(), AppError> {
        if self.size < 1 {
            return Err(AppError::Validation("Size must be >= 1".into()));
        }
        if self.from() + u64::from(self.size) > max_result_window {
            return Err(AppError::Validation(format!(
                "page * size + size must not exceed {max_result_window}"
            )));
        }
        Ok(())
    }
}

/// Generic search request accepted by `POST /api/search`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub query: String,
    /// Fields to match against, in caller order. Empty means default fields.
    #[serde(default)]
    pub fields: Vec<String>,
    /// Exact-match constraints ANDed with the text query.
    #[serde(default)]
    pub filters: BTreeMap<String, Value>,
    #[serde(default)]
    pub page: u32,
    #[serde(default = "default_size")]
    pub size: u32,
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub sort_order: SortOrder,
}

fn default_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            fields: vec![],
            filters: BTreeMap::new(),
            page: 0,
            size: DEFAULT_PAGE_SIZE,
            sort_by: None,
            sort_order: SortOrder::default(),
        }
    }

    pub fn paging(&self) -> Paging {
        Paging::new(self.page, self.size)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        validate_query_text(&self.query)?;
        if self.fields.iter().any(|f| f.trim().is_empty()) {
            return Err(AppError::Validation("Field names cannot be empty".into()));
        }
        if let Some(sort_by) = &self.sort_by {
            if sort_by.trim().is_empty() {
                return Err(AppError::Validation("sortBy cannot be empty".into()));
            }
        }
        Ok(())
    }
}

/// Free text must be non-blank and at most [`MAX_QUERY_CHARS`] characters.
pub fn validate_query_text(query: &str) -> Result<(), AppError> {
    if query.trim().is_empty() {
        return Err(AppError::Validation("Query is required".into()));
    }
    if query.chars().count() > MAX_QUERY_CHARS {
        return Err(AppError::Validation(format!(
            "Query must be between 1 and {MAX_QUERY_CHARS} characters"
        )));
    }
    Ok(())
}

/// A single hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// `None` when the index entry carries no usable source.
    pub document: Option<Document>,
    pub score: f32,
    #[serde(default)]
    pub highlight: Vec<String>,
}

/// One page of hits plus the unpaged match count.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub total_hits: u64,
    pub page: u32,
    pub size: u32,
    pub search_time_millis: u64,
    pub timestamp: DateTime<Utc>,
}
