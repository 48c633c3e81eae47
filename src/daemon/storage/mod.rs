//!  Storage is split in two:
//!   - [log_store::JsonLogStore] keeps the collector log as one document, rewritten on every
//!     change.
//!   - [received_storage::ReceivedStorage] appends side channel reports to per-day JSON line
//!     files.

pub mod entities;
pub mod log_store;
pub mod received_storage;
