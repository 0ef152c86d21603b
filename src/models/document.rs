use std::collections::BTreeMap;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppError;

/// A document as held by the store and mirrored into the search index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Unique, immutable identifier. Also the index document id.
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Free-form attributes. Values are arbitrary JSON.
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Check the invariants every stored document must satisfy.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.id.trim().is_empty() {
            return Err(AppError::Validation("Document id cannot be empty".into()));
        }
        if self.updated_at < self.created_at {
            return Err(AppError::Validation(format!(
                "Document '{}' has updatedAt before createdAt",
                self.id
            )));
        }
        Ok(())
    }
}

/// Round a timestamp down to the millisecond precision the store keeps.
pub fn store_precision(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(3)
}

/// Write payload accepted by the document management endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPayload {
    /// Optional on create; generated when missing or empty.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    /// Optional on create; defaults to the current time.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl DocumentPayload {
    /// Build a new document, assigning an id and timestamps.
    pub fn into_new_document(self, now: DateTime<Utc>) -> Result<Document, AppError> {
        let now = store_precision(now);
        let id = match self.id {
            Some(id) if !id.trim().is_empty() => id,
            _ => uuid::Uuid::new_v4().to_string(),
        };
        let created_at = self.created_at.map(store_precision).unwrap_or(now);
        if created_at > now {
            return Err(AppError::Validation(
                "createdAt cannot be in the future".into(),
            ));
        }

        let doc = Document {
            id,
            title: self.title,
            content: self.content,
            category: self.category,
            author: self.author,
            metadata: self.metadata,
            created_at,
            updated_at: now,
        };
        doc.validate()?;
        Ok(doc)
    }

    /// Apply this payload on top of an existing document.
    ///
    /// The id and creation time of `existing` are kept; a payload id that
    /// disagrees with the existing one is rejected.
    pub fn apply_to(self, existing: &Document, now: DateTime<Utc>) -> Result<Document, AppError> {
        let now = store_precision(now);
        if let Some(id) = self.id.as_deref() {
            if !id.is_empty() && id != existing.id {
                return Err(AppError::Validation(format!(
                    "Document id is immutable (expected '{}', got '{}')",
                    existing.id, id
                )));
            }
        }

        let doc = Document {
            id: existing.id.clone(),
            title: self.title,
            content: self.content,
            category: self.category,
            author: self.author,
            metadata: self.metadata,
            created_at: existing.created_at,
            updated_at: now.max(existing.created_at),
        };
        doc.validate()?;
        Ok(doc)
    }
}
