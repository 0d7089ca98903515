use std::sync::Arc;
use tracing::error;

use crate::db::{DocumentId, DocumentStore};

/// All reads and writes of document content made by the session layer
#[derive(Clone)]
pub struct PersistenceAdapter {
    store: Arc<dyn DocumentStore>,
}

impl PersistenceAdapter {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// `None` when the document no longer exists or the store is unreachable
    pub async fn read_content(&self, document_id: DocumentId) -> Option<String> {
        self.store.read_content(document_id).await.unwrap_or_else(|e| {
            error!("Failed to read content of document {}: {}", document_id, e);
            None
        })
    }

    /// `false` when the document no longer exists or the store is unreachable
    pub async fn write_content(&self, document_id: DocumentId, content: &str) -> bool {
        self.store
            .write_content(document_id, content)
            .await
            .unwrap_or_else(|e| {
                error!("Failed to write content of document {}: {}", document_id, e);
                false
            })
    }
}
