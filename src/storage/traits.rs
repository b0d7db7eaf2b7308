//! Abstract storage traits.
//!
//! These traits define the contract that storage backends must implement.
//! By using traits, we enable in-memory backends for testing and embedded
//! use, and relational backends for production.

use thiserror::Error;

use crate::entity::{Entity, EntityId};
use crate::fact::{Fact, FactId};
use crate::value::Row;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Entity not found.
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    /// Fact not found.
    #[error("Fact not found: {0}")]
    FactNotFound(FactId),

    /// Key already exists.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// The fact targeted for supersession is no longer current.
    #[error("Fact {0} is not current and cannot be superseded")]
    NotCurrent(FactId),

    /// Backend error.
    #[error("Storage backend error: {0}")]
    BackendError(String),
}

/// Storage trait for entity operations.
///
/// The canonical name is the identity key: implementations must enforce
/// uniqueness on it so that concurrent get-or-create races resolve via
/// insert-then-fallback-to-lookup rather than duplicate rows.
pub trait EntityStore: Send + Sync {
    /// Insert a new entity. Returns `DuplicateKey` if the id or canonical
    /// name already exists.
    fn insert(&self, entity: Entity) -> Result<(), StorageError>;

    /// Get an entity by ID.
    fn get(&self, id: EntityId) -> Result<Option<Entity>, StorageError>;

    /// Get an entity by canonical name (exact match).
    fn get_by_name(&self, canonical_name: &str) -> Result<Option<Entity>, StorageError>;

    /// Update an existing entity. The version must increase.
    fn update(&self, entity: Entity) -> Result<(), StorageError>;

    /// List entities of a given type name (as rendered by `EntityType`).
    fn list_by_type(&self, type_name: &str) -> Result<Vec<Entity>, StorageError>;
}

/// Storage trait for fact operations.
///
/// Only this layer may flip `is_current`/`superseded_by`, and the
/// supersession pair (insert new + close old) is a single atomic
/// operation.
pub trait FactStore: Send + Sync {
    /// Insert a new fact. Returns `DuplicateKey` if the ID exists.
    fn insert(&self, fact: Fact) -> Result<(), StorageError>;

    /// Get a fact by ID.
    fn get(&self, id: FactId) -> Result<Option<Fact>, StorageError>;

    /// Atomically insert `new_fact` and mark `old_id` superseded by it.
    ///
    /// Either both mutations apply or neither does. The old fact must
    /// still be current; the new fact's `supersedes` link is set by the
    /// store.
    fn insert_superseding(&self, new_fact: Fact, old_id: FactId) -> Result<(), StorageError>;

    /// All facts for a subject, most recent first.
    fn find_by_subject(&self, subject: EntityId) -> Result<Vec<Fact>, StorageError>;

    /// All facts for a (subject, predicate) key, most recent first,
    /// including superseded facts.
    fn find_by_subject_predicate(
        &self,
        subject: EntityId,
        predicate: &str,
    ) -> Result<Vec<Fact>, StorageError>;
}

/// Storage trait for registry-driven production tables.
///
/// Production tables hold the authoritative single value per field that
/// the underwriting model reads. The extraction writer is the only
/// component that writes through this trait.
pub trait ProductionStore: Send + Sync {
    /// Upsert: find the row matching `selector` (all keys equal) and
    /// overlay `values` onto it, or insert `selector + values` as a new
    /// row when no match exists.
    fn upsert(&self, table: &str, selector: &Row, values: &Row) -> Result<(), StorageError>;

    /// Insert a new row unconditionally.
    fn insert_row(&self, table: &str, values: &Row) -> Result<(), StorageError>;

    /// Fetch the first row matching `selector`, if any.
    fn get(&self, table: &str, selector: &Row) -> Result<Option<Row>, StorageError>;

    /// Number of rows in a table (0 for unknown tables).
    fn row_count(&self, table: &str) -> Result<usize, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time test: ensure traits are object-safe
    fn _assert_entity_store_object_safe(_: &dyn EntityStore) {}
    fn _assert_fact_store_object_safe(_: &dyn FactStore) {}
    fn _assert_production_store_object_safe(_: &dyn ProductionStore) {}

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::EntityNotFound(EntityId::nil());
        assert!(err.to_string().contains("Entity not found"));

        let err = StorageError::DuplicateKey("project:1".to_string());
        assert!(err.to_string().contains("project:1"));
    }
}
