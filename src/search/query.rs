//! Query translation.
//!
//! Search variants are turned into a typed [`Query`] tree and then rendered
//! to Elasticsearch Query DSL. The in-memory index evaluates the same tree,
//! so both backends agree on what each variant means.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{json, Value};

use crate::error::AppError;
use crate::models::search::{validate_query_text, Paging, SearchRequest, SortOrder};

pub const HIGHLIGHT_PRE_TAG: &str = "<strong>";
pub const HIGHLIGHT_POST_TAG: &str = "</strong>";
pub const HIGHLIGHT_FRAGMENT_SIZE: u32 = 150;
pub const HIGHLIGHT_FRAGMENTS: u32 = 3;

/// Fields highlighted by a standard search when the caller names none.
pub const DEFAULT_HIGHLIGHT_FIELDS: &[&str] = &["title", "content"];

/// Edit-distance tolerance for fuzzy text matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fuzziness {
    /// Tolerance scales with term length.
    Auto,
}

impl Fuzziness {
    fn to_dsl(self) -> Value {
        match self {
            Fuzziness::Auto => json!("AUTO"),
        }
    }

    /// Maximum edits allowed for a term of `term_len` characters.
    pub fn max_edits(self, term_len: usize) -> usize {
        match self {
            Fuzziness::Auto => match term_len {
                0..=2 => 0,
                3..=5 => 1,
                _ => 2,
            },
        }
    }
}

/// Similar-content tuning.
pub const MLT_MIN_TERM_FREQ: u32 = 1;
pub const MLT_MIN_DOC_FREQ: u32 = 1;
pub const MLT_MAX_QUERY_TERMS: u32 = 12;

/// A query against the search index.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Query-string syntax over all default-searched fields.
    QueryString { query: String },
    MultiMatch {
        query: String,
        fields: Vec<String>,
        fuzziness: Option<Fuzziness>,
        best_fields: bool,
    },
    Match {
        field: String,
        query: String,
        fuzziness: Fuzziness,
    },
    MatchPhrase { field: String, query: String },
    MoreLikeThis {
        fields: Vec<String>,
        like: String,
        min_term_freq: u32,
        min_doc_freq: u32,
        max_query_terms: u32,
    },
    Term { field: String, value: String },
    Prefix { field: String, value: String },
    Wildcard { field: String, value: String },
    Exists { field: String },
    Bool {
        must: Vec<Query>,
        filter: Vec<Query>,
        should: Vec<Query>,
    },
}

impl Query {
    pub fn to_dsl(&self) -> Value {
        match self {
            Query::QueryString { query } => json!({ "query_string": { "query": query } }),
            Query::MultiMatch {
                query,
                fields,
                fuzziness,
                best_fields,
            } => {
                let mut body = json!({ "query": query, "fields": fields });
                if let Some(f) = fuzziness {
                    body["fuzziness"] = f.to_dsl();
                }
                if *best_fields {
                    body["type"] = json!("best_fields");
                }
                json!({ "multi_match": body })
            }
            Query::Match {
                field,
                query,
                fuzziness,
            } => json!({
                "match": { field.as_str(): { "query": query, "fuzziness": fuzziness.to_dsl() } }
            }),
            Query::MatchPhrase { field, query } => json!({
                "match_phrase": { field.as_str(): { "query": query } }
            }),
            Query::MoreLikeThis {
                fields,
                like,
                min_term_freq,
                min_doc_freq,
                max_query_terms,
            } => json!({
                "more_like_this": {
                    "fields": fields,
                    "like": like,
                    "min_term_freq": min_term_freq,
                    "min_doc_freq": min_doc_freq,
                    "max_query_terms": max_query_terms,
                }
            }),
            Query::Term { field, value } => json!({
                "term": { field.as_str(): { "value": value } }
            }),
            Query::Prefix { field, value } => json!({
                "prefix": { field.as_str(): { "value": value } }
            }),
            Query::Wildcard { field, value } => json!({
                "wildcard": { field.as_str(): { "value": value } }
            }),
            Query::Exists { field } => json!({ "exists": { "field": field } }),
            Query::Bool {
                must,
                filter,
                should,
            } => {
                let mut body = serde_json::Map::new();
                if !must.is_empty() {
                    body.insert("must".into(), Value::Array(must.iter().map(Query::to_dsl).collect()));
                }
                if !filter.is_empty() {
                    body.insert(
                        "filter".into(),
                        Value::Array(filter.iter().map(Query::to_dsl).collect()),
                    );
                }
                if !should.is_empty() {
                    body.insert(
                        "should".into(),
                        Value::Array(should.iter().map(Query::to_dsl).collect()),
                    );
                    if must.is_empty() && filter.is_empty() {
                        body.insert("minimum_should_match".into(), json!(1));
                    }
                }
                json!({ "bool": Value::Object(body) })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    pub field: String,
    pub order: SortOrder,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Highlight {
    pub fields: Vec<String>,
    pub fragment_size: u32,
    pub number_of_fragments: u32,
}

impl Highlight {
    pub fn on<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            fragment_size: HIGHLIGHT_FRAGMENT_SIZE,
            number_of_fragments: HIGHLIGHT_FRAGMENTS,
        }
    }

    fn to_dsl(&self) -> Value {
        let fields: serde_json::Map<String, Value> = self
            .fields
            .iter()
            .map(|f| (f.clone(), json!({})))
            .collect();
        json!({
            "pre_tags": [HIGHLIGHT_PRE_TAG],
            "post_tags": [HIGHLIGHT_POST_TAG],
            "fragment_size": self.fragment_size,
            "number_of_fragments": self.number_of_fragments,
            "fields": fields,
        })
    }
}

/// A fully translated request: query plus sort, highlight and page window.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredQuery {
    pub query: Query,
    pub sort: Option<Sort>,
    pub highlight: Option<Highlight>,
    pub from: u64,
    pub size: u64,
}

impl StructuredQuery {
    /// Body for the `_search` endpoint.
    pub fn search_body(&self) -> Value {
        let mut body = json!({
            "query": self.query.to_dsl(),
            "from": self.from,
            "size": self.size,
        });
        if let Some(sort) = &self.sort {
            body["sort"] = json!([{ sort.field.as_str(): { "order": sort.order.to_string() } }]);
        }
        if let Some(highlight) = &self.highlight {
            body["highlight"] = highlight.to_dsl();
        }
        body
    }

    /// Body for the `_count` endpoint: same query, no window.
    pub fn count_body(&self) -> Value {
        json!({ "query": self.query.to_dsl() })
    }
}

/// Full-text match type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchType {
    /// Single field, fuzzy.
    Match,
    /// Single field, exact adjacent-term sequence.
    MatchPhrase,
    /// Several fields, fuzzy, best-fields scoring.
    #[default]
    MultiMatch,
}

impl MatchType {
    /// Parse a match type (case-insensitive). Unknown names are rejected.
    pub fn from_str_ci(s: &str) -> Result<Self, AppError> {
        match s.trim().to_lowercase().as_str() {
            "match" => Ok(MatchType::Match),
            "match_phrase" => Ok(MatchType::MatchPhrase),
            "multi_match" => Ok(MatchType::MultiMatch),
            _ => Err(AppError::UnsupportedQuery(format!(
                "Unknown match type '{s}'. Expected: match, match_phrase, multi_match"
            ))),
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchType::Match => write!(f, "match"),
            MatchType::MatchPhrase => write!(f, "match_phrase"),
            MatchType::MultiMatch => write!(f, "multi_match"),
        }
    }
}

/// Term-level query type name, as accepted on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TermType {
    #[default]
    Term,
    Terms,
    Prefix,
    Wildcard,
    Exists,
}

impl TermType {
    /// Parse a term type (case-insensitive). Unknown names are rejected.
    pub fn from_str_ci(s: &str) -> Result<Self, AppError> {
        match s.trim().to_lowercase().as_str() {
            "term" => Ok(TermType::Term),
            "terms" => Ok(TermType::Terms),
            "prefix" => Ok(TermType::Prefix),
            "wildcard" => Ok(TermType::Wildcard),
            "exists" => Ok(TermType::Exists),
            _ => Err(AppError::UnsupportedQuery(format!(
                "Unknown term type '{s}'. Expected: term, terms, prefix, wildcard, exists"
            ))),
        }
    }
}

impl fmt::Display for TermType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TermType::Term => write!(f, "term"),
            TermType::Terms => write!(f, "terms"),
            TermType::Prefix => write!(f, "prefix"),
            TermType::Wildcard => write!(f, "wildcard"),
            TermType::Exists => write!(f, "exists"),
        }
    }
}

/// A term-level condition with its value already shaped for the type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TermCondition {
    Term(String),
    Terms(Vec<String>),
    Prefix(String),
    Wildcard(String),
    Exists,
}

impl TermCondition {
    /// Combine a parsed type with the raw wire value.
    ///
    /// `terms` takes a comma-separated list; `exists` ignores the value.
    pub fn parse(term_type: TermType, raw: Option<&str>) -> Result<Self, AppError> {
        let required = || -> Result<String, AppError> {
            match raw.map(str::trim) {
                Some(v) if !v.is_empty() => Ok(v.to_string()),
                _ => Err(AppError::Validation(format!(
                    "A value is required for '{term_type}' queries"
                ))),
            }
        };

        Ok(match term_type {
            TermType::Term => TermCondition::Term(required()?),
            TermType::Prefix => TermCondition::Prefix(required()?),
            TermType::Wildcard => TermCondition::Wildcard(required()?),
            TermType::Exists => TermCondition::Exists,
            TermType::Terms => {
                let mut values: Vec<String> = Vec::new();
                for v in required()?.split(',').map(str::trim).filter(|v| !v.is_empty()) {
                    if !values.iter().any(|seen| seen == v) {
                        values.push(v.to_string());
                    }
                }
                if values.is_empty() {
                    return Err(AppError::Validation(
                        "A value is required for 'terms' queries".into(),
                    ));
                }
                TermCondition::Terms(values)
            }
        })
    }
}

/// Every search shape the façade accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchKind {
    Standard {
        query: String,
        fields: Vec<String>,
        filters: BTreeMap<String, Value>,
        sort: Option<Sort>,
    },
    SimilarContent {
        text: String,
    },
    FullText {
        query: String,
        fields: Vec<String>,
        match_type: MatchType,
    },
    TermLevel {
        field: String,
        condition: TermCondition,
    },
}

impl From<&SearchRequest> for SearchKind {
    fn from(request: &SearchRequest) -> Self {
        SearchKind::Standard {
            query: request.query.clone(),
            fields: request.fields.clone(),
            filters: request.filters.clone(),
            sort: request.sort_by.as_ref().map(|field| Sort {
                field: field.clone(),
                order: request.sort_order,
            }),
        }
    }
}

/// Coerce a filter value to the string used for exact matching.
pub fn filter_value_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Translate a search shape into a structured query for one page.
pub fn translate(kind: &SearchKind, paging: Paging) -> Result<StructuredQuery, AppError> {
    let (query, sort, highlight) = match kind {
        SearchKind::Standard {
            query,
            fields,
            filters,
            sort,
        } => {
            validate_query_text(query)?;
            let text = if fields.is_empty() {
                Query::QueryString {
                    query: query.clone(),
                }
            } else {
                Query::MultiMatch {
                    query: query.clone(),
                    fields: fields.clone(),
                    fuzziness: None,
                    best_fields: false,
                }
            };

            let main = if filters.is_empty() {
                text
            } else {
                Query::Bool {
                    must: vec![text],
                    filter: filters
                        .iter()
                        .map(|(field, value)| Query::Term {
                            field: field.clone(),
                            value: filter_value_string(value),
                        })
                        .collect(),
                    should: vec![],
                }
            };

            let highlight = if fields.is_empty() {
                Highlight::on(DEFAULT_HIGHLIGHT_FIELDS.iter().copied())
            } else {
                Highlight::on(fields.iter().cloned())
            };

            (main, sort.clone(), Some(highlight))
        }
        SearchKind::SimilarContent { text } => {
            validate_query_text(text)?;
            let query = Query::MoreLikeThis {
                fields: vec!["content".to_string()],
                like: text.clone(),
                min_term_freq: MLT_MIN_TERM_FREQ,
                min_doc_freq: MLT_MIN_DOC_FREQ,
                max_query_terms: MLT_MAX_QUERY_TERMS,
            };
            (query, None, Some(Highlight::on(["content"])))
        }
        SearchKind::FullText {
            query,
            fields,
            match_type,
        } => {
            validate_query_text(query)?;
            let first = fields
                .iter()
                .find(|f| !f.trim().is_empty())
                .ok_or_else(|| AppError::Validation("At least one field is required".into()))?;

            let query = match match_type {
                MatchType::Match => Query::Match {
                    field: first.clone(),
                    query: query.clone(),
                    fuzziness: Fuzziness::Auto,
                },
                MatchType::MatchPhrase => Query::MatchPhrase {
                    field: first.clone(),
                    query: query.clone(),
                },
                MatchType::MultiMatch => Query::MultiMatch {
                    query: query.clone(),
                    fields: fields.clone(),
                    fuzziness: Some(Fuzziness::Auto),
                    best_fields: true,
                },
            };
            (query, None, Some(Highlight::on(fields.iter().cloned())))
        }
        SearchKind::TermLevel { field, condition } => {
            if field.trim().is_empty() {
                return Err(AppError::Validation("Field is required".into()));
            }
            let field = field.clone();
            let query = match condition {
                TermCondition::Term(value) => Query::Term {
                    field,
                    value: value.clone(),
                },
                TermCondition::Terms(values) => Query::Bool {
                    must: vec![],
                    filter: vec![],
                    should: values
                        .iter()
                        .map(|value| Query::Term {
                            field: field.clone(),
                            value: value.clone(),
                        })
                        .collect(),
                },
                TermCondition::Prefix(value) => Query::Prefix {
                    field,
                    value: value.clone(),
                },
                TermCondition::Wildcard(value) => Query::Wildcard {
                    field,
                    value: value.clone(),
                },
                TermCondition::Exists => Query::Exists { field },
            };
            (query, None, None)
        }
    };

    Ok(StructuredQuery {
        query,
        sort,
        highlight,
        from: paging.from(),
        size: u64::from(paging.size),
    })
}
