use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

use super::store::{DocumentId, DocumentPermission, DocumentStore, StoreError, UserId};

#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub title: String,
    pub content: String,
    pub owner: UserId,
    pub shared_with: HashSet<UserId>,
    /// Bumped on every successful write
    pub version: u64,
}

/// In-process document store, used when no database is configured
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    docs: RwLock<HashMap<DocumentId, DocumentRecord>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, document_id: DocumentId, title: &str, content: &str, owner: UserId) {
        self.docs.write().await.insert(
            document_id,
            DocumentRecord {
                title: title.to_string(),
                content: content.to_string(),
                owner,
                shared_with: HashSet::new(),
                version: 0,
            },
        );
    }

    /// Returns false if the document does not exist
    pub async fn share(&self, document_id: DocumentId, user_id: UserId) -> bool {
        match self.docs.write().await.get_mut(&document_id) {
            Some(doc) => {
                doc.shared_with.insert(user_id);
                true
            }
            None => false,
        }
    }

    pub async fn unshare(&self, document_id: DocumentId, user_id: UserId) -> bool {
        match self.docs.write().await.get_mut(&document_id) {
            Some(doc) => doc.shared_with.remove(&user_id),
            None => false,
        }
    }

    pub async fn remove(&self, document_id: DocumentId) -> Option<DocumentRecord> {
        self.docs.write().await.remove(&document_id)
    }

    pub async fn get(&self, document_id: DocumentId) -> Option<DocumentRecord> {
        self.docs.read().await.get(&document_id).cloned()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn permission(
        &self,
        document_id: DocumentId,
        user_id: UserId,
    ) -> Result<Option<DocumentPermission>, StoreError> {
        Ok(self.docs.read().await.get(&document_id).map(|doc| DocumentPermission {
            owner: doc.owner == user_id,
            shared: doc.shared_with.contains(&user_id),
        }))
    }

    async fn read_content(&self, document_id: DocumentId) -> Result<Option<String>, StoreError> {
        Ok(self.docs.read().await.get(&document_id).map(|doc| doc.content.clone()))
    }

    async fn write_content(&self, document_id: DocumentId, content: &str) -> Result<bool, StoreError> {
        match self.docs.write().await.get_mut(&document_id) {
            Some(doc) => {
                doc.content = content.to_string();
                doc.version += 1;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
