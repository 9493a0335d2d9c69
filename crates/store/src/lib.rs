//! Record store implementations for clinicdesk.
//!
//! All stores implement `clinicdesk_core::RecordStore`.

pub mod file_store;
pub mod http_client;
pub mod in_memory;
pub mod record;

pub use file_store::FileRecordStore;
pub use http_client::HttpRecordStore;
pub use in_memory::InMemoryRecordStore;
