use std::sync::Arc;
use tracing::{error, info};

use crate::auth::Identity;
use crate::db::{DocumentId, DocumentStore};

/// Connect-time authorization against the document store
#[derive(Clone)]
pub struct PermissionGate {
    store: Arc<dyn DocumentStore>,
}

impl PermissionGate {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// True iff the document exists and the caller owns it or was shared it.
    /// Missing documents, anonymous callers and store failures all deny.
    pub async fn authorize(&self, document_id: DocumentId, identity: &Identity) -> bool {
        let Some(user_id) = identity.user_id() else {
            info!("Anonymous caller denied access to document {}", document_id);
            return false;
        };

        match self.store.permission(document_id, user_id).await {
            Ok(Some(permission)) => permission.grants_access(),
            Ok(None) => {
                info!("Document {} not found for {}", document_id, identity.display_name());
                false
            }
            Err(e) => {
                error!("Permission check on document {} failed: {}", document_id, e);
                false
            }
        }
    }
}
