use async_trait::async_trait;
use thiserror::Error;

pub type DocumentId = i64;
pub type UserId = i64;

/// Permission facts for one user on one existing document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentPermission {
    pub owner: bool,
    pub shared: bool,
}

impl DocumentPermission {
    pub fn grants_access(&self) -> bool {
        self.owner || self.shared
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Durable storage holding document content, ownership and sharing facts.
///
/// `Ok(None)` / `Ok(false)` always mean the document does not exist (anymore);
/// `Err` is reserved for the store itself being unreachable.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Ownership and sharing facts for `user_id`, `None` if the document does not exist
    async fn permission(
        &self,
        document_id: DocumentId,
        user_id: UserId,
    ) -> Result<Option<DocumentPermission>, StoreError>;

    async fn read_content(&self, document_id: DocumentId) -> Result<Option<String>, StoreError>;

    /// Replace the stored content; `false` when the document no longer exists.
    /// Implementations must apply the write atomically.
    async fn write_content(&self, document_id: DocumentId, content: &str) -> Result<bool, StoreError>;

    /// Cheap connectivity probe used by the readiness endpoint
    async fn ping(&self) -> Result<(), StoreError>;
}
