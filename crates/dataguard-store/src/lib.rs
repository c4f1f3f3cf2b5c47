//! Persistence contracts for the Dataguard GDPR engine.
//!
//! The compliance services never talk to a storage engine directly. They depend
//! on the narrow, tenant-scoped traits in [`store`], which describe the query and
//! write shapes the engine requires. [`MemoryStore`] implements every trait (and
//! the [`AuditSink`](dataguard_core::AuditSink) contract) over in-process
//! collections and can be loaded from and saved to a JSON [`Snapshot`].

/// In-memory implementation of every store trait.
pub mod memory;
/// JSON snapshot of the whole store.
pub mod snapshot;
/// Store traits and query types.
pub mod store;

pub use memory::MemoryStore;
pub use snapshot::Snapshot;
pub use store::{
    ActivityStore, ConsentStore, PolicyStore, RecordQuery, RecordStore, RecordSummary,
    ScanCursor, SubjectRightsStore,
};
