pub mod memory;
pub mod persistence;
pub mod table;

pub use memory::{MemoryStore, MemoryTransaction, StoreData};
pub use persistence::{SnapshotFile, StoreSnapshot};
pub use table::{ID_COLUMN, Row, Table};
