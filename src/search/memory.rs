//! Process-local search index.
//!
//! Evaluates the typed [`Query`] tree directly against stored documents.
//! Analysis is deliberately simple: text is split on non-alphanumeric
//! characters and lowercased. `title`, `content` and `author` are analyzed
//! text fields; every other field (including `*.keyword` sub-fields and
//! `metadata.*`) matches on whole values.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use crate::error::AppError;
use crate::models::document::Document;
use crate::models::search::{SearchResult, SortOrder};
use crate::search::client::SearchIndex;
use crate::search::query::{
    Fuzziness, Highlight, Query, Sort, StructuredQuery, HIGHLIGHT_POST_TAG, HIGHLIGHT_PRE_TAG,
};

const TEXT_FIELDS: &[&str] = &["title", "content", "author"];
const QUERY_STRING_FIELDS: &[&str] = &["title", "content", "author", "category"];
const QUERY_STRING_OPERATORS: &[&str] = &["AND", "OR", "NOT"];
/// Share of similar-content terms a document must contain.
const MLT_MINIMUM_SHOULD_MATCH: f32 = 0.3;

#[derive(Default)]
pub struct InMemorySearchIndex {
    /// `None` while the index does not exist.
    docs: RwLock<Option<BTreeMap<String, Document>>>,
    failing_ids: Mutex<HashSet<String>>,
    fail_queries: AtomicBool,
    fail_counts: AtomicBool,
}

impl InMemorySearchIndex {
    /// An index that already exists and is empty.
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(Some(BTreeMap::new())),
            ..Default::default()
        }
    }

    /// Make `index_document` fail for this id.
    pub fn fail_indexing_for(&self, id: impl Into<String>) {
        self.failing_ids.lock().insert(id.into());
    }

    pub fn set_query_failure(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    pub fn set_count_failure(&self, fail: bool) {
        self.fail_counts.store(fail, Ordering::SeqCst);
    }

    pub fn exists(&self) -> bool {
        self.docs.read().is_some()
    }

    pub fn len(&self) -> usize {
        self.docs.read().as_ref().map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids currently indexed, in id order.
    pub fn ids(&self) -> Vec<String> {
        self.docs
            .read()
            .as_ref()
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn matching(&self, query: &Query) -> Vec<(Document, f32)> {
        self.docs
            .read()
            .as_ref()
            .map(|docs| {
                docs.values()
                    .filter_map(|doc| score(query, doc).map(|s| (doc.clone(), s)))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl SearchIndex for InMemorySearchIndex {
    async fn create_index(&self) -> Result<(), AppError> {
        let mut docs = self.docs.write();
        if docs.is_none() {
            *docs = Some(BTreeMap::new());
        }
        Ok(())
    }

    async fn delete_index(&self) -> Result<(), AppError> {
        *self.docs.write() = None;
        Ok(())
    }

    async fn index_document(&self, doc: &Document) -> Result<(), AppError> {
        if self.failing_ids.lock().contains(&doc.id) {
            return Err(AppError::Index(format!("Failed to index document '{}'", doc.id)));
        }
        // Writes to a missing index create it, as Elasticsearch does.
        self.docs
            .write()
            .get_or_insert_with(BTreeMap::new)
            .insert(doc.id.clone(), doc.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Document>, AppError> {
        Ok(self.docs.read().as_ref().and_then(|docs| docs.get(id).cloned()))
    }

    async fn delete_by_id(&self, id: &str) -> Result<(), AppError> {
        if let Some(docs) = self.docs.write().as_mut() {
            docs.remove(id);
        }
        Ok(())
    }

    async fn query(&self, query: &StructuredQuery) -> Result<Vec<SearchResult>, AppError> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(AppError::Index("search index unavailable".into()));
        }

        let mut hits = self.matching(&query.query);
        match &query.sort {
            Some(sort) => hits.sort_by(|a, b| compare_by_field(&a.0, &b.0, sort)),
            None => hits.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(CmpOrdering::Equal)
                    .then_with(|| a.0.id.cmp(&b.0.id))
            }),
        }

        let from = usize::try_from(query.from).unwrap_or(usize::MAX);
        let size = usize::try_from(query.size).unwrap_or(usize::MAX);
        let terms = highlight_terms(&query.query);

        Ok(hits
            .into_iter()
            .skip(from)
            .take(size)
            .map(|(doc, score)| {
                let highlight = query
                    .highlight
                    .as_ref()
                    .map(|h| highlight_fragments(&doc, h, &terms))
                    .unwrap_or_default();
                SearchResult {
                    document: Some(doc),
                    score,
                    highlight,
                }
            })
            .collect())
    }

    async fn count(&self, query: &StructuredQuery) -> Result<u64, AppError> {
        if self.fail_counts.load(Ordering::SeqCst) {
            return Err(AppError::Index("search index unavailable".into()));
        }
        Ok(self.matching(&query.query).len() as u64)
    }

    async fn refresh(&self) -> Result<(), AppError> {
        Ok(())
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn base_field(field: &str) -> &str {
    // multi_match boosts such as `title^2`
    let field = field.split('^').next().unwrap_or(field);
    field.strip_suffix(".keyword").unwrap_or(field)
}

fn is_text_field(field: &str) -> bool {
    !field.ends_with(".keyword") && TEXT_FIELDS.contains(&base_field(field))
}

fn json_values(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Null => {}
        Value::String(s) => out.push(s.clone()),
        Value::Array(items) => items.iter().for_each(|v| json_values(v, out)),
        other => out.push(other.to_string()),
    }
}

/// Raw values of `field` on `doc`. Empty when the field is absent or null.
fn field_values(doc: &Document, field: &str) -> Vec<String> {
    let field = field.split('^').next().unwrap_or(field);
    if let Some(path) = field.strip_prefix("metadata.") {
        let mut out = Vec::new();
        if let Some(v) = doc.metadata.get(path) {
            json_values(v, &mut out);
        }
        return out;
    }
    match base_field(field) {
        "id" => vec![doc.id.clone()],
        "title" => vec![doc.title.clone()],
        "content" => vec![doc.content.clone()],
        "category" => doc.category.iter().cloned().collect(),
        "author" => doc.author.iter().cloned().collect(),
        "createdAt" => vec![doc.created_at.to_rfc3339()],
        "updatedAt" => vec![doc.updated_at.to_rfc3339()],
        _ => vec![],
    }
}

/// Values a term-level query compares against: tokens for text fields,
/// whole values otherwise.
fn term_candidates(doc: &Document, field: &str) -> Vec<String> {
    let values = field_values(doc, field);
    if is_text_field(field) {
        values.iter().flat_map(|v| tokenize(v)).collect()
    } else {
        values
    }
}

/// Edit distance counting an adjacent transposition as one edit.
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut d = vec![vec![0usize; b.len() + 1]; a.len() + 1];
    for (i, row) in d.iter_mut().enumerate() {
        row[0] = i;
    }
    for j in 0..=b.len() {
        d[0][j] = j;
    }
    for i in 1..=a.len() {
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            d[i][j] = (d[i - 1][j] + 1)
                .min(d[i][j - 1] + 1)
                .min(d[i - 1][j - 1] + cost);
            if i > 1 && j > 1 && a[i - 1] == b[j - 2] && a[i - 2] == b[j - 1] {
                d[i][j] = d[i][j].min(d[i - 2][j - 2] + 1);
            }
        }
    }
    d[a.len()][b.len()]
}

fn token_matches(query_term: &str, token: &str, fuzziness: Option<Fuzziness>) -> bool {
    match fuzziness {
        None => query_term == token,
        Some(f) => {
            query_term == token
                || edit_distance(query_term, token) <= f.max_edits(query_term.chars().count())
        }
    }
}

/// Occurrences of any query term in the field's tokens.
fn text_score(doc: &Document, field: &str, terms: &[String], fuzziness: Option<Fuzziness>) -> f32 {
    let tokens: Vec<String> = field_values(doc, field)
        .iter()
        .flat_map(|v| tokenize(v))
        .collect();
    terms
        .iter()
        .map(|term| {
            tokens
                .iter()
                .filter(|t| token_matches(term, t, fuzziness))
                .count() as f32
        })
        .sum()
}

fn positive(score: f32) -> Option<f32> {
    (score > 0.0).then_some(score)
}

fn wildcard_regex(pattern: &str) -> Option<regex::Regex> {
    let mut re = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    regex::Regex::new(&re).ok()
}

/// Relevance of `doc` for `query`, or `None` when it does not match.
fn score(query: &Query, doc: &Document) -> Option<f32> {
    match query {
        Query::QueryString { query } => {
            let terms: Vec<String> = query
                .split_whitespace()
                .filter(|w| !QUERY_STRING_OPERATORS.contains(w))
                .flat_map(tokenize)
                .collect();
            positive(
                QUERY_STRING_FIELDS
                    .iter()
                    .map(|f| text_score(doc, f, &terms, None))
                    .sum(),
            )
        }
        Query::MultiMatch {
            query,
            fields,
            fuzziness,
            ..
        } => {
            let terms = tokenize(query);
            positive(
                fields
                    .iter()
                    .map(|f| text_score(doc, f, &terms, *fuzziness))
                    .fold(0.0, f32::max),
            )
        }
        Query::Match {
            field,
            query,
            fuzziness,
        } => positive(text_score(doc, field, &tokenize(query), Some(*fuzziness))),
        Query::MatchPhrase { field, query } => {
            let phrase = tokenize(query);
            if phrase.is_empty() {
                return None;
            }
            let hits = field_values(doc, field)
                .iter()
                .map(|v| {
                    tokenize(v)
                        .windows(phrase.len())
                        .filter(|w| *w == phrase.as_slice())
                        .count()
                })
                .sum::<usize>();
            positive(hits as f32)
        }
        Query::MoreLikeThis {
            fields,
            like,
            max_query_terms,
            ..
        } => {
            let mut terms: Vec<String> = Vec::new();
            for t in tokenize(like) {
                if terms.len() >= *max_query_terms as usize {
                    break;
                }
                if !terms.contains(&t) {
                    terms.push(t);
                }
            }
            if terms.is_empty() {
                return None;
            }
            let tokens: HashSet<String> = fields
                .iter()
                .flat_map(|f| field_values(doc, f))
                .flat_map(|v| tokenize(&v))
                .collect();
            let matched = terms.iter().filter(|t| tokens.contains(*t)).count();
            let required = ((terms.len() as f32 * MLT_MINIMUM_SHOULD_MATCH) as usize).max(1);
            (matched >= required).then_some(matched as f32)
        }
        Query::Term { field, value } => term_candidates(doc, field)
            .iter()
            .any(|v| v == value)
            .then_some(1.0),
        Query::Prefix { field, value } => term_candidates(doc, field)
            .iter()
            .any(|v| v.starts_with(value.as_str()))
            .then_some(1.0),
        Query::Wildcard { field, value } => {
            let re = wildcard_regex(value)?;
            term_candidates(doc, field)
                .iter()
                .any(|v| re.is_match(v))
                .then_some(1.0)
        }
        Query::Exists { field } => (!field_values(doc, field).is_empty()).then_some(1.0),
        Query::Bool {
            must,
            filter,
            should,
        } => {
            let mut total = 0.0;
            for q in must {
                total += score(q, doc)?;
            }
            for q in filter {
                score(q, doc)?;
            }
            let should_scores: Vec<f32> = should.iter().filter_map(|q| score(q, doc)).collect();
            if must.is_empty() && filter.is_empty() && !should.is_empty() && should_scores.is_empty()
            {
                return None;
            }
            total += should_scores.iter().sum::<f32>();
            Some(total)
        }
    }
}

enum SortKey {
    Number(f64),
    Text(String),
}

fn sort_key(doc: &Document, field: &str) -> Option<SortKey> {
    match base_field(field) {
        "createdAt" => return Some(SortKey::Number(doc.created_at.timestamp_millis() as f64)),
        "updatedAt" => return Some(SortKey::Number(doc.updated_at.timestamp_millis() as f64)),
        _ => {}
    }
    if let Some(path) = field.strip_prefix("metadata.") {
        if let Some(n) = doc.metadata.get(path).and_then(Value::as_f64) {
            return Some(SortKey::Number(n));
        }
    }
    field_values(doc, field).into_iter().next().map(SortKey::Text)
}

/// Field order with missing values last in either direction, then id.
fn compare_by_field(a: &Document, b: &Document, sort: &Sort) -> CmpOrdering {
    let ordered = |o: CmpOrdering| match sort.order {
        SortOrder::Asc => o,
        SortOrder::Desc => o.reverse(),
    };
    let by_field = match (sort_key(a, &sort.field), sort_key(b, &sort.field)) {
        (Some(SortKey::Number(x)), Some(SortKey::Number(y))) => {
            ordered(x.partial_cmp(&y).unwrap_or(CmpOrdering::Equal))
        }
        (Some(SortKey::Text(x)), Some(SortKey::Text(y))) => ordered(x.cmp(&y)),
        (Some(SortKey::Number(_)), Some(SortKey::Text(_))) => ordered(CmpOrdering::Less),
        (Some(SortKey::Text(_)), Some(SortKey::Number(_))) => ordered(CmpOrdering::Greater),
        (Some(_), None) => CmpOrdering::Less,
        (None, Some(_)) => CmpOrdering::Greater,
        (None, None) => CmpOrdering::Equal,
    };
    by_field.then_with(|| a.id.cmp(&b.id))
}

/// Query terms worth highlighting, with the fuzziness they were matched under.
fn highlight_terms(query: &Query) -> Vec<(String, Option<Fuzziness>)> {
    let mut out = Vec::new();
    collect_highlight_terms(query, &mut out);
    out
}

fn collect_highlight_terms(query: &Query, out: &mut Vec<(String, Option<Fuzziness>)>) {
    match query {
        Query::QueryString { query } => out.extend(
            query
                .split_whitespace()
                .filter(|w| !QUERY_STRING_OPERATORS.contains(w))
                .flat_map(tokenize)
                .map(|t| (t, None)),
        ),
        Query::MultiMatch {
            query, fuzziness, ..
        } => out.extend(tokenize(query).into_iter().map(|t| (t, *fuzziness))),
        Query::Match {
            query, fuzziness, ..
        } => out.extend(tokenize(query).into_iter().map(|t| (t, Some(*fuzziness)))),
        Query::MatchPhrase { query, .. } => out.extend(tokenize(query).into_iter().map(|t| (t, None))),
        Query::MoreLikeThis { like, .. } => out.extend(tokenize(like).into_iter().map(|t| (t, None))),
        Query::Bool { must, should, .. } => {
            for q in must.iter().chain(should) {
                collect_highlight_terms(q, out);
            }
        }
        Query::Term { .. }
        | Query::Prefix { .. }
        | Query::Wildcard { .. }
        | Query::Exists { .. } => {}
    }
}

/// Wrap matching words in highlight tags, one fragment per field value.
fn highlight_fragments(
    doc: &Document,
    highlight: &Highlight,
    terms: &[(String, Option<Fuzziness>)],
) -> Vec<String> {
    if terms.is_empty() {
        return vec![];
    }
    let mut fragments = Vec::new();
    for field in &highlight.fields {
        let mut per_field = 0;
        for value in field_values(doc, field) {
            if per_field >= highlight.number_of_fragments {
                break;
            }
            let mut matched = false;
            let mut plain_len = 0;
            let mut words: Vec<String> = Vec::new();
            for word in value.split(' ') {
                if plain_len > 0 && plain_len + word.chars().count() > highlight.fragment_size as usize {
                    break;
                }
                plain_len += word.chars().count() + 1;
                let hit = tokenize(word)
                    .iter()
                    .any(|t| terms.iter().any(|(q, f)| token_matches(q, t, *f)));
                if hit {
                    matched = true;
                    words.push(format!("{HIGHLIGHT_PRE_TAG}{word}{HIGHLIGHT_POST_TAG}"));
                } else {
                    words.push(word.to_string());
                }
            }
            if matched {
                fragments.push(words.join(" "));
                per_field += 1;
            }
        }
    }
    fragments
}
