pub mod error;
pub mod memory;
pub mod notify;
pub mod path;
pub mod redb;
pub mod traits;
pub mod value;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use notify::{ChangeEvent, Dispatcher, Subscription};
pub use path::Path;
pub use redb::RedbStore;
pub use traits::{LedgerStore, TransactFn, WriteBatch, WriteOp};
