use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::db::repository::DocumentStore;
use crate::error::AppError;
use crate::models::document::Document;

/// Process-local document store.
///
/// Used by the `memory` backend and by tests. Documents are kept ordered by
/// id so listings are stable.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    docs: RwLock<BTreeMap<String, Document>>,
    unavailable: AtomicBool,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with a store error until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), AppError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::Store("document store unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn save(&self, doc: Document) -> Result<Document, AppError> {
        self.check_available()?;
        doc.validate()?;
        self.docs.write().insert(doc.id.clone(), doc.clone());
        Ok(doc)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Document>, AppError> {
        self.check_available()?;
        Ok(self.docs.read().get(id).cloned())
    }

    async fn find_all(&self) -> Result<Vec<Document>, AppError> {
        self.check_available()?;
        Ok(self.docs.read().values().cloned().collect())
    }

    async fn find_by_category(&self, category: &str) -> Result<Vec<Document>, AppError> {
        self.check_available()?;
        Ok(self
            .docs
            .read()
            .values()
            .filter(|d| d.category.as_deref() == Some(category))
            .cloned()
            .collect())
    }

    async fn update(&self, doc: Document) -> Result<Document, AppError> {
        self.check_available()?;
        doc.validate()?;
        let mut docs = self.docs.write();
        match docs.get_mut(&doc.id) {
            Some(slot) => {
                *slot = doc.clone();
                Ok(doc)
            }
            None => Err(AppError::NotFound(format!("Document '{}' not found", doc.id))),
        }
    }

    async fn delete_by_id(&self, id: &str) -> Result<(), AppError> {
        self.check_available()?;
        self.docs.write().remove(id);
        Ok(())
    }

    async fn count(&self) -> Result<u64, AppError> {
        self.check_available()?;
        Ok(self.docs.read().len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn doc(id: &str, category: Option<&str>) -> Document {
        let now = Utc::now();
        Document {
            id: id.to_string(),
            title: format!("Title {id}"),
            content: "body".to_string(),
            category: category.map(str::to_string),
            author: None,
            metadata: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_save_and_find() {
        let store = InMemoryDocumentStore::new();
        store.save(doc("a", Some("news"))).await.unwrap();
        store.save(doc("b", Some("sports"))).await.unwrap();
        store.save(doc("c", Some("news"))).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 3);
        assert_eq!(store.find_by_id("b").await.unwrap().unwrap().id, "b");
        assert!(store.find_by_id("zzz").await.unwrap().is_none());

        let news: Vec<String> = store
            .find_by_category("news")
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(news, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_update_requires_existing() {
        let store = InMemoryDocumentStore::new();
        assert!(matches!(
            store.update(doc("a", None)).await,
            Err(AppError::NotFound(_))
        ));

        store.save(doc("a", None)).await.unwrap();
        let mut changed = doc("a", None);
        changed.title = "New".to_string();
        store.update(changed).await.unwrap();
        assert_eq!(store.find_by_id("a").await.unwrap().unwrap().title, "New");
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let store = InMemoryDocumentStore::new();
        store.save(doc("a", None)).await.unwrap();
        store.delete_by_id("a").await.unwrap();
        store.delete_by_id("a").await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_reads() {
        let store = InMemoryDocumentStore::new();
        store.set_unavailable(true);
        assert!(matches!(store.find_all().await, Err(AppError::Store(_))));
        store.set_unavailable(false);
        assert!(store.find_all().await.unwrap().is_empty());
    }
}
