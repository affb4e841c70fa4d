// Durable key/value storage for client-side state
// Settings and other small records live here between runs

pub mod error;
pub mod memory;
pub mod sqlite;
pub mod store;

pub use error::StorageError;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use store::KeyValueStore;

pub type Result<T> = std::result::Result<T, StorageError>;
