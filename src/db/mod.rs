pub mod memory;
pub mod pgstore;
pub mod store;

pub use memory::MemoryDocumentStore;
pub use pgstore::PgDocumentStore;
pub use store::*;
