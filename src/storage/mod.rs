//! Storage backends for entities, facts, and registry-driven production
//! tables.
//!
//! The traits define the contract; the in-memory backends are the
//! thread-safe reference implementation used for embedded operation and
//! tests. A relational backend plugs in behind the same traits.

pub mod memory;
pub mod traits;

pub use memory::{InMemoryEntityStore, InMemoryFactStore, InMemoryProductionStore, InMemoryStores};
pub use traits::{EntityStore, FactStore, ProductionStore, StorageError};
