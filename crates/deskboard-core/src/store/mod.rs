//! Local envelope store and typed collection bindings
//!
//! Every logical key (`notes`, `todos`, ...) lives inside one root JSON
//! object persisted as a single blob. Writes update memory first and then
//! rewrite the whole blob; bindings observe each other's writes through a
//! broadcast channel.

mod backend;
mod collection;
mod envelope;

pub use backend::{BlobStorage, MemoryBlobStorage};
pub use collection::CollectionHandle;
pub use envelope::{Envelope, EnvelopeStore, StoreChange};
