pub mod store;
pub mod tables;
pub mod memory;
pub mod layout;
pub mod wal;
pub mod checkpoint;
pub mod file_lock;
pub mod file_store;
