pub mod clock;
pub mod in_memory;
pub mod notifier;
pub mod rails;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
pub mod unit_of_work;
pub mod webhook;
